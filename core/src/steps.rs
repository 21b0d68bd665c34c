//! Step configuration loading.
//!
//! Each task type maps to a named list of step descriptors read from
//! `<task_configs_dir>/<name>.toml` once at startup. A step is either
//! a plugin call or a prompt call; the shape is resolved here, at load
//! time, so the executor never re-inspects raw config per execution.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;

/// One ordered stage in a task type's pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDescriptor {
    pub name: String,
    pub kind: StepKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    /// Side-effecting call dispatched to a registered plugin by id,
    /// with whatever extra options the step carries.
    Plugin {
        id: String,
        options: serde_json::Map<String, serde_json::Value>,
    },
    /// Generative-model call; the template is resolved against task
    /// state before being sent.
    Prompt { template: String },
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[allow(dead_code)]
    #[serde(default)]
    r#type: Option<String>,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    name: String,
    #[serde(default)]
    plugin: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(flatten)]
    options: serde_json::Map<String, serde_json::Value>,
}

impl RawStep {
    fn into_descriptor(self, file: &str) -> Result<StepDescriptor, ConfigError> {
        let kind = match (self.plugin, self.prompt) {
            (Some(id), None) => StepKind::Plugin {
                id,
                options: self.options,
            },
            (None, Some(template)) => StepKind::Prompt { template },
            (Some(_), Some(_)) => {
                return Err(ConfigError::Step {
                    file: file.to_string(),
                    reason: format!("step '{}' has both 'plugin' and 'prompt'", self.name),
                })
            }
            (None, None) => {
                return Err(ConfigError::Step {
                    file: file.to_string(),
                    reason: format!("step '{}' has neither 'plugin' nor 'prompt'", self.name),
                })
            }
        };
        Ok(StepDescriptor {
            name: self.name,
            kind,
        })
    }
}

/// Read-only map of config name -> ordered step list, loaded once.
#[derive(Debug, Default)]
pub struct StepConfigLoader {
    configs: HashMap<String, Vec<StepDescriptor>>,
}

impl StepConfigLoader {
    /// Load every `*.toml` under `dir`, writing the default pipelines
    /// first if the directory is empty or missing.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(dir)?;
        write_default_configs(dir)?;

        let mut configs = HashMap::new();
        let pattern = dir.join("*.toml");
        let entries =
            glob::glob(&pattern.to_string_lossy()).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        for entry in entries {
            let path = entry.map_err(|e| ConfigError::Invalid(e.to_string()))?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let steps = parse_config(&std::fs::read_to_string(&path)?, &name)?;
            info!(config = %name, steps = steps.len(), "loaded step config");
            configs.insert(name, steps);
        }

        Ok(Self { configs })
    }

    pub fn from_map(configs: HashMap<String, Vec<StepDescriptor>>) -> Self {
        Self { configs }
    }

    pub fn steps(&self, config_name: &str) -> Option<&[StepDescriptor]> {
        self.configs.get(config_name).map(|v| v.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(|s| s.as_str())
    }
}

fn parse_config(raw: &str, file: &str) -> Result<Vec<StepDescriptor>, ConfigError> {
    let cfg: RawConfig = toml::from_str(raw)?;
    let mut seen = HashSet::new();
    let mut steps = Vec::with_capacity(cfg.steps.len());
    for raw_step in cfg.steps {
        if !seen.insert(raw_step.name.clone()) {
            return Err(ConfigError::Step {
                file: file.to_string(),
                reason: format!("duplicate step name '{}'", raw_step.name),
            });
        }
        steps.push(raw_step.into_descriptor(file)?);
    }
    Ok(steps)
}

fn write_default_configs(dir: &Path) -> Result<(), ConfigError> {
    for (name, body) in DEFAULT_CONFIGS {
        let path = dir.join(format!("{name}.toml"));
        if !path.exists() {
            std::fs::write(&path, body)?;
            info!(config = %name, "wrote default step config");
        }
    }
    Ok(())
}

const DEFAULT_CONFIGS: &[(&str, &str)] = &[
    (
        "search_tasks",
        r#"type = "search"

[[steps]]
name = "web_search"
plugin = "web_search"

[[steps]]
name = "summarize"
prompt = "Summarize these search results in a clear, organized way: {web_search}"

[[steps]]
name = "create_report"
prompt = "Create a detailed report based on this summary: {summarize_result}"

[[steps]]
name = "save_report"
plugin = "file_operations"
operation = "create"
filename_template = "search_{task_id}.md"
"#,
    ),
    (
        "process_tasks",
        r#"type = "process"

[[steps]]
name = "analyze"
prompt = "Analyze this content and identify key points: {content}"

[[steps]]
name = "improve"
prompt = "Improve and enhance this content: {content}"

[[steps]]
name = "final_polish"
prompt = "Give this a final polish and make it perfect: {improve_result}"
"#,
    ),
    (
        "create_tasks",
        r#"type = "create"

[[steps]]
name = "outline"
prompt = "Create a detailed outline for: {content}"

[[steps]]
name = "draft"
prompt = "Write a first draft based on this outline: {outline_result}"

[[steps]]
name = "revise"
prompt = "Revise and improve this draft: {draft_result}"

[[steps]]
name = "save_document"
plugin = "file_operations"
operation = "create"
filename_template = "created_{task_id}.md"
"#,
    ),
    (
        "code_tasks",
        r#"type = "code"

[[steps]]
name = "analyze_requirements"
prompt = "Analyze these requirements and plan the implementation: {content}"

[[steps]]
name = "write_code"
prompt = "Write clean, working code based on this plan: {analyze_requirements_result}"

[[steps]]
name = "add_tests"
prompt = "Add comprehensive tests for this code: {write_code_result}"

[[steps]]
name = "save_code"
plugin = "file_operations"
operation = "create"
filename_template = "code_{task_id}.py"
"#,
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plugin_and_prompt_steps() {
        let raw = r#"
[[steps]]
name = "fetch"
plugin = "web_search"

[[steps]]
name = "summarize"
prompt = "Summarize: {fetch}"
"#;
        let steps = parse_config(raw, "test").unwrap();
        assert_eq!(steps.len(), 2);
        assert!(matches!(steps[0].kind, StepKind::Plugin { ref id, .. } if id == "web_search"));
        assert!(matches!(steps[1].kind, StepKind::Prompt { .. }));
    }

    #[test]
    fn plugin_step_keeps_extra_options() {
        let raw = r#"
[[steps]]
name = "save"
plugin = "file_operations"
operation = "create"
filename_template = "out_{task_id}.md"
"#;
        let steps = parse_config(raw, "test").unwrap();
        let StepKind::Plugin { ref options, .. } = steps[0].kind else {
            panic!("expected plugin step");
        };
        assert_eq!(options["operation"], "create");
        assert_eq!(options["filename_template"], "out_{task_id}.md");
    }

    #[test]
    fn rejects_step_with_both_shapes() {
        let raw = r#"
[[steps]]
name = "bad"
plugin = "web_search"
prompt = "also a prompt"
"#;
        assert!(parse_config(raw, "test").is_err());
    }

    #[test]
    fn rejects_step_with_neither_shape() {
        let raw = r#"
[[steps]]
name = "bad"
"#;
        assert!(parse_config(raw, "test").is_err());
    }

    #[test]
    fn rejects_duplicate_step_names() {
        let raw = r#"
[[steps]]
name = "twice"
prompt = "a"

[[steps]]
name = "twice"
prompt = "b"
"#;
        assert!(parse_config(raw, "test").is_err());
    }

    #[test]
    fn writes_and_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = StepConfigLoader::load(dir.path()).unwrap();
        for name in ["search_tasks", "process_tasks", "create_tasks", "code_tasks"] {
            assert!(loader.steps(name).is_some(), "missing default {name}");
        }
        let search = loader.steps("search_tasks").unwrap();
        assert_eq!(search[0].name, "web_search");
        assert_eq!(search.len(), 4);
    }
}
