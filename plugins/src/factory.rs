//! Default plugin wiring.

use std::sync::Arc;

use tracing::info;

use taskpipe_core::config::AppConfig;
use taskpipe_core::plugin::PluginRegistry;

use crate::code_exec::CodeExecutionPlugin;
use crate::file_ops::FileOperationsPlugin;
use crate::web_search::{SearchProvider, WebSearchPlugin};

/// Build the registry with the stock plugin set: web search, file
/// operations, code execution.
pub fn default_registry(cfg: &AppConfig) -> anyhow::Result<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(WebSearchPlugin::new(SearchProvider::Serper)));
    registry.register(Arc::new(FileOperationsPlugin::new(&cfg.workspace_dir)?));
    registry.register(Arc::new(CodeExecutionPlugin::default()));
    info!(count = registry.len(), "initialized plugins");
    Ok(registry)
}
