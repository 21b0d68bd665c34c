//! Plugin capability contract and registry.
//!
//! A plugin is an external, side-effecting capability invoked by name
//! from a step. By convention a plugin returns an error-shaped *value*
//! for recoverable conditions and reserves `Err` for truly exceptional
//! ones: a returned value is recorded as the step result and the
//! pipeline continues, while `Err` aborts the run into the retry path.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::steps::StepDescriptor;
use crate::task::Task;

/// Context handed to a plugin for one step invocation.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// The step being executed, including its extra options table.
    pub step: StepDescriptor,
    /// Results accumulated by earlier steps of the same task.
    pub previous_results: indexmap::IndexMap<String, serde_json::Value>,
}

impl StepContext {
    /// Convenience accessor for a string-valued step option.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        match &self.step.kind {
            crate::steps::StepKind::Plugin { options, .. } => {
                options.get(key).and_then(|v| v.as_str())
            }
            crate::steps::StepKind::Prompt { .. } => None,
        }
    }
}

#[async_trait]
pub trait TaskPlugin: Send + Sync {
    /// Unique plugin identifier referenced by step configs.
    fn name(&self) -> &str;

    async fn execute(&self, task: &Task, ctx: &StepContext) -> anyhow::Result<serde_json::Value>;
}

/// Name -> plugin map, populated once at startup.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn TaskPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn TaskPlugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn TaskPlugin>> {
        self.plugins.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::StepKind;
    use crate::task::TaskType;
    use indexmap::IndexMap;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl TaskPlugin for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn execute(
            &self,
            task: &Task,
            _ctx: &StepContext,
        ) -> anyhow::Result<serde_json::Value> {
            Ok(json!(task.content))
        }
    }

    #[tokio::test]
    async fn registry_dispatches_by_name() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Echo));
        assert_eq!(registry.len(), 1);

        let task = Task::new(TaskType::Custom, "hello", IndexMap::new());
        let ctx = StepContext {
            step: StepDescriptor {
                name: "echo_step".to_string(),
                kind: StepKind::Plugin {
                    id: "echo".to_string(),
                    options: serde_json::Map::new(),
                },
            },
            previous_results: IndexMap::new(),
        };

        let plugin = registry.get("echo").unwrap();
        let out = plugin.execute(&task, &ctx).await.unwrap();
        assert_eq!(out, json!("hello"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn option_str_reads_plugin_options() {
        let mut options = serde_json::Map::new();
        options.insert("operation".to_string(), json!("create"));
        let ctx = StepContext {
            step: StepDescriptor {
                name: "save".to_string(),
                kind: StepKind::Plugin {
                    id: "file_operations".to_string(),
                    options,
                },
            },
            previous_results: IndexMap::new(),
        };
        assert_eq!(ctx.option_str("operation"), Some("create"));
        assert_eq!(ctx.option_str("missing"), None);
    }
}
