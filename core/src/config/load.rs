use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default taskpipe data directory: ~/.taskpipe
pub fn get_taskpipe_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".taskpipe"))
}

/// Resolve the directory holding the queue snapshot and task database.
pub fn get_data_dir(cfg: &AppConfig) -> PathBuf {
    PathBuf::from(&cfg.data_dir)
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.taskpipe/config.toml (highest)
    let taskpipe_dir = get_taskpipe_dir()?;
    let user_config = taskpipe_dir.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg: AppConfig = if user_config.exists() {
        let s = std::fs::read_to_string(&user_config)?;
        toml::from_str::<AppConfig>(&s)?
    } else if local_config.exists() {
        let s = std::fs::read_to_string(local_config)?;
        toml::from_str::<AppConfig>(&s)?
    } else {
        AppConfig::default()
    };

    // Update logging directory to use taskpipe data directory if not set
    if cfg.logging.directory.is_none()
        || cfg
            .logging
            .directory
            .as_ref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(false)
    {
        let logs_dir = taskpipe_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)?;
        cfg.logging.directory = Some(logs_dir.to_string_lossy().to_string());
    }

    // Environment variable overrides (Priority 0: highest)
    if let Ok(v) = std::env::var("TASKPIPE_OLLAMA_HOST").or_else(|_| std::env::var("OLLAMA_HOST")) {
        if !v.trim().is_empty() {
            cfg.ollama_host = v;
        }
    }
    if let Ok(v) = std::env::var("TASKPIPE_MODEL") {
        if !v.trim().is_empty() {
            cfg.model = v;
        }
    }

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_from_empty_toml() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.delay_between_tasks_ms, 2_000);
        assert_eq!(cfg.ollama_host, "http://localhost:11434");
        assert!(cfg.logging.enabled);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
model = "llama3:8b"
max_retries = 5
"#,
        )
        .unwrap();
        assert_eq!(cfg.model, "llama3:8b");
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.temperature, 0.7);
    }
}
