use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model name passed to the generative backend.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_ollama_host")]
    pub ollama_host: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_top_p")]
    pub top_p: f64,

    /// -1 means no generation cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Throttle between non-final pipeline steps.
    #[serde(default = "default_delay_between_steps_ms")]
    pub delay_between_steps_ms: u64,

    /// Throttle between tasks in the worker loop.
    #[serde(default = "default_delay_between_tasks_ms")]
    pub delay_between_tasks_ms: u64,

    #[serde(default = "default_task_configs_dir")]
    pub task_configs_dir: String,

    /// Directory file-operation plugins are scoped to.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,

    /// Queue snapshot and task log database live here.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_model() -> String {
    "gpt-oss:20b".to_string()
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    0.9
}

fn default_max_tokens() -> i64 {
    -1
}

fn default_max_retries() -> u32 {
    3
}

fn default_delay_between_steps_ms() -> u64 {
    1_000
}

fn default_delay_between_tasks_ms() -> u64 {
    2_000
}

fn default_task_configs_dir() -> String {
    "task_configs".to_string()
}

fn default_workspace_dir() -> String {
    "workspace".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            ollama_host: default_ollama_host(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            delay_between_steps_ms: default_delay_between_steps_ms(),
            delay_between_tasks_ms: default_delay_between_tasks_ms(),
            task_configs_dir: default_task_configs_dir(),
            workspace_dir: default_workspace_dir(),
            data_dir: default_data_dir(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "taskpipe_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}
