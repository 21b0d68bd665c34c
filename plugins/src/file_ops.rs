//! Workspace-scoped file operations.
//!
//! Recoverable conditions (missing file, bad filename) come back as
//! error-shaped result values so the pipeline keeps going; only io
//! failures on an otherwise valid operation are exceptional.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use taskpipe_core::plugin::{StepContext, TaskPlugin};
use taskpipe_core::task::Task;

pub struct FileOperationsPlugin {
    workspace: PathBuf,
}

impl FileOperationsPlugin {
    pub fn new(workspace_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let workspace = workspace_dir.into();
        std::fs::create_dir_all(&workspace)?;
        Ok(Self { workspace })
    }

    fn resolve_filename(&self, task: &Task, ctx: &StepContext) -> Option<String> {
        if let Some(template) = ctx.option_str("filename_template") {
            return Some(template.replace("{task_id}", &task.id));
        }
        if let Some(name) = task.metadata.get("filename").and_then(|v| v.as_str()) {
            return Some(name.to_string());
        }
        Some(format!("{}.txt", task.id))
    }

    /// Content for a `create`: explicit metadata first, otherwise the
    /// most recent plain-text step output that is not a status line.
    fn content_for_create(task: &Task) -> String {
        if let Some(content) = task.metadata.get("file_content").and_then(|v| v.as_str()) {
            return content.to_string();
        }
        for value in task.results.values().rev() {
            if let Some(text) = value.as_str() {
                if !text.trim().is_empty()
                    && !text.starts_with("Created file:")
                    && !text.starts_with("Error:")
                {
                    return text.to_string();
                }
            }
        }
        task.results
            .get("final_output")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

fn safe_join(workspace: &Path, filename: &str) -> Option<PathBuf> {
    let candidate = Path::new(filename);
    if candidate.is_absolute()
        || candidate
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return None;
    }
    Some(workspace.join(candidate))
}

#[async_trait]
impl TaskPlugin for FileOperationsPlugin {
    fn name(&self) -> &str {
        "file_operations"
    }

    async fn execute(&self, task: &Task, ctx: &StepContext) -> anyhow::Result<Value> {
        let operation = ctx
            .option_str("operation")
            .map(str::to_string)
            .or_else(|| {
                task.metadata
                    .get("operation")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "create".to_string());

        let Some(filename) = self.resolve_filename(task, ctx) else {
            return Ok(json!("Error: no filename available"));
        };
        let Some(filepath) = safe_join(&self.workspace, &filename) else {
            return Ok(json!(format!("Error: invalid filename: {filename}")));
        };

        match operation.as_str() {
            "create" => {
                let content = Self::content_for_create(task);
                if let Some(parent) = filepath.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&filepath, content).await?;
                info!(path = %filepath.display(), "created file");
                Ok(json!(format!("Created file: {}", filepath.display())))
            }
            "edit" => {
                if !filepath.exists() {
                    return Ok(json!(format!(
                        "File not found for editing: {}",
                        filepath.display()
                    )));
                }
                let original = tokio::fs::read_to_string(&filepath).await?;
                let new_content = task
                    .metadata
                    .get("new_content")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&original);
                tokio::fs::write(&filepath, new_content).await?;
                Ok(json!(format!("Edited file: {}", filepath.display())))
            }
            "delete" => {
                if filepath.exists() {
                    tokio::fs::remove_file(&filepath).await?;
                    return Ok(json!(format!("Deleted file: {}", filepath.display())));
                }
                Ok(json!(format!("File operation {operation} completed")))
            }
            other => Ok(json!(format!("File operation {other} completed"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use taskpipe_core::steps::{StepDescriptor, StepKind};
    use taskpipe_core::task::TaskType;

    fn ctx_with_options(options: serde_json::Map<String, Value>) -> StepContext {
        StepContext {
            step: StepDescriptor {
                name: "save".to_string(),
                kind: StepKind::Plugin {
                    id: "file_operations".to_string(),
                    options,
                },
            },
            previous_results: IndexMap::new(),
        }
    }

    fn create_ctx(filename_template: &str) -> StepContext {
        let mut options = serde_json::Map::new();
        options.insert("operation".to_string(), json!("create"));
        options.insert("filename_template".to_string(), json!(filename_template));
        ctx_with_options(options)
    }

    #[tokio::test]
    async fn create_writes_last_text_result() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = FileOperationsPlugin::new(dir.path()).unwrap();

        let mut task = Task::new(TaskType::Create, "write a poem", IndexMap::new());
        task.results.insert("draft".to_string(), json!("roses are red"));
        task.results
            .insert("revise".to_string(), json!("violets are blue"));
        task.id = "create_abc".to_string();

        let out = plugin
            .execute(&task, &create_ctx("created_{task_id}.md"))
            .await
            .unwrap();
        let path = dir.path().join("created_create_abc.md");
        assert!(out.as_str().unwrap().starts_with("Created file:"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "violets are blue");
    }

    #[tokio::test]
    async fn create_skips_status_lines_when_picking_content() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = FileOperationsPlugin::new(dir.path()).unwrap();

        let mut task = Task::new(TaskType::Create, "x", IndexMap::new());
        task.results.insert("write".to_string(), json!("real output"));
        task.results
            .insert("save_first".to_string(), json!("Created file: /tmp/a"));
        task.id = "create_skip".to_string();

        plugin
            .execute(&task, &create_ctx("out_{task_id}.txt"))
            .await
            .unwrap();
        let body = std::fs::read_to_string(dir.path().join("out_create_skip.txt")).unwrap();
        assert_eq!(body, "real output");
    }

    #[tokio::test]
    async fn metadata_file_content_wins() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = FileOperationsPlugin::new(dir.path()).unwrap();

        let mut metadata = IndexMap::new();
        metadata.insert("file_content".to_string(), json!("explicit body"));
        metadata.insert("filename".to_string(), json!("explicit.txt"));
        let mut task = Task::new(TaskType::Create, "x", metadata);
        task.results.insert("draft".to_string(), json!("ignored"));

        plugin
            .execute(&task, &ctx_with_options(serde_json::Map::new()))
            .await
            .unwrap();
        let body = std::fs::read_to_string(dir.path().join("explicit.txt")).unwrap();
        assert_eq!(body, "explicit body");
    }

    #[tokio::test]
    async fn edit_missing_file_is_error_shaped_not_err() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = FileOperationsPlugin::new(dir.path()).unwrap();

        let mut options = serde_json::Map::new();
        options.insert("operation".to_string(), json!("edit"));
        options.insert("filename_template".to_string(), json!("nope.txt"));
        let task = Task::new(TaskType::Process, "x", IndexMap::new());

        let out = plugin
            .execute(&task, &ctx_with_options(options))
            .await
            .unwrap();
        assert!(out.as_str().unwrap().starts_with("File not found for editing:"));
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = FileOperationsPlugin::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("gone.txt"), "bye").unwrap();

        let mut options = serde_json::Map::new();
        options.insert("operation".to_string(), json!("delete"));
        options.insert("filename_template".to_string(), json!("gone.txt"));
        let task = Task::new(TaskType::Process, "x", IndexMap::new());

        let out = plugin
            .execute(&task, &ctx_with_options(options))
            .await
            .unwrap();
        assert!(out.as_str().unwrap().starts_with("Deleted file:"));
        assert!(!dir.path().join("gone.txt").exists());
    }

    #[tokio::test]
    async fn traversal_filenames_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = FileOperationsPlugin::new(dir.path().join("ws")).unwrap();

        let task = Task::new(TaskType::Process, "x", IndexMap::new());
        let out = plugin
            .execute(&task, &create_ctx("../escape.txt"))
            .await
            .unwrap();
        assert!(out.as_str().unwrap().starts_with("Error: invalid filename"));
        assert!(!dir.path().join("escape.txt").exists());
    }
}
