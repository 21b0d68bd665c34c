//! Sandboxed-ish code execution through a subprocess.
//!
//! Languages are allow-listed and the child is bounded by a timeout.
//! Execution problems (disallowed language, spawn failure, timeout,
//! non-zero exit) are all reported as the step's result value.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::warn;

use taskpipe_core::plugin::{StepContext, TaskPlugin};
use taskpipe_core::task::Task;

const EXEC_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CodeExecutionPlugin {
    allowed_languages: Vec<String>,
    timeout: Duration,
}

impl Default for CodeExecutionPlugin {
    fn default() -> Self {
        Self {
            allowed_languages: vec!["python".to_string(), "javascript".to_string()],
            timeout: EXEC_TIMEOUT,
        }
    }
}

impl CodeExecutionPlugin {
    pub fn new(allowed_languages: Vec<String>) -> Self {
        Self {
            allowed_languages,
            timeout: EXEC_TIMEOUT,
        }
    }

    async fn run_command(&self, program: &str, args: &[&str], language: &str) -> Value {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                if stdout.is_empty() {
                    json!(stderr.to_string())
                } else {
                    json!(stdout.to_string())
                }
            }
            Ok(Err(e)) => {
                warn!(language, "execution error: {e}");
                json!(format!("{language} execution error: {e}"))
            }
            Err(_) => json!(format!(
                "{language} execution error: timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }
}

#[async_trait]
impl TaskPlugin for CodeExecutionPlugin {
    fn name(&self) -> &str {
        "code_execution"
    }

    async fn execute(&self, task: &Task, _ctx: &StepContext) -> anyhow::Result<Value> {
        let language = task
            .metadata
            .get("language")
            .and_then(|v| v.as_str())
            .unwrap_or("python");
        let code = task
            .metadata
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or(&task.content);

        if !self.allowed_languages.iter().any(|l| l == language) {
            return Ok(json!(format!("Language {language} not allowed")));
        }

        let value = match language {
            "python" => self.run_command("python3", &["-c", code], "python").await,
            "javascript" => self.run_command("node", &["-e", code], "javascript").await,
            other => json!(format!("Language {other} not allowed")),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use taskpipe_core::steps::{StepDescriptor, StepKind};
    use taskpipe_core::task::TaskType;

    fn ctx() -> StepContext {
        StepContext {
            step: StepDescriptor {
                name: "run".to_string(),
                kind: StepKind::Plugin {
                    id: "code_execution".to_string(),
                    options: serde_json::Map::new(),
                },
            },
            previous_results: IndexMap::new(),
        }
    }

    #[tokio::test]
    async fn disallowed_language_is_reported_not_run() {
        let plugin = CodeExecutionPlugin::default();
        let mut metadata = IndexMap::new();
        metadata.insert("language".to_string(), json!("ruby"));
        let task = Task::new(TaskType::Code, "puts 1", metadata);

        let out = plugin.execute(&task, &ctx()).await.unwrap();
        assert_eq!(out, json!("Language ruby not allowed"));
    }

    #[tokio::test]
    async fn allow_list_can_be_narrowed() {
        let plugin = CodeExecutionPlugin::new(vec!["javascript".to_string()]);
        let task = Task::new(TaskType::Code, "print('x')", IndexMap::new());
        // Default language is python, which this instance disallows.
        let out = plugin.execute(&task, &ctx()).await.unwrap();
        assert_eq!(out, json!("Language python not allowed"));
    }

    #[tokio::test]
    async fn spawn_failure_is_error_shaped_value() {
        // A language in the allow-list whose interpreter we cannot
        // assume exists still must not produce Err.
        let plugin = CodeExecutionPlugin::default();
        let mut metadata = IndexMap::new();
        metadata.insert("language".to_string(), json!("python"));
        metadata.insert("code".to_string(), json!("print('hello')"));
        let task = Task::new(TaskType::Code, "", metadata);

        let out = plugin.execute(&task, &ctx()).await.unwrap();
        let text = out.as_str().unwrap();
        assert!(text.contains("hello") || text.contains("execution error"));
    }
}
