use thiserror::Error;

use super::StoreError;

/// Errors raised while running a task through its pipeline.
///
/// Any of these aborts the current run and drives the retry counter;
/// error-shaped values *returned* by plugins are recorded as step
/// results instead and never surface here.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no step configuration named '{0}'")]
    ConfigNotFound(String),

    #[error("generative backend error: {0}")]
    Backend(String),

    #[error("plugin '{name}' failed: {source}")]
    Plugin {
        name: String,
        source: anyhow::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Invalid(String),

    #[error("step config '{file}': {reason}")]
    Step { file: String, reason: String },

    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
