use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default taskwave data directory: ~/.taskwave
pub fn get_taskwave_data_dir() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".taskwave"))
}

/// Load configuration from an explicit file, then apply environment overrides.
pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    let mut cfg = toml::from_str::<AppConfig>(&s)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.taskwave/config.toml
    let user_config = get_taskwave_data_dir().ok().map(|d| d.join("config.toml"));

    // Priority 2: ./taskwave.toml (current directory)
    let local_config = Path::new("taskwave.toml");

    let mut cfg: AppConfig = match user_config {
        Some(ref p) if p.exists() => {
            let s = std::fs::read_to_string(p)?;
            toml::from_str::<AppConfig>(&s)?
        }
        _ if local_config.exists() => {
            let s = std::fs::read_to_string(local_config)?;
            toml::from_str::<AppConfig>(&s)?
        }
        _ => AppConfig::default(),
    };

    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

// Environment variable overrides (Priority 0: highest)
fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Ok(v) = std::env::var("TASKWAVE_CONCURRENCY") {
        match v.trim().parse::<usize>() {
            Ok(n) => cfg.scheduler.concurrency_limit = n,
            Err(_) => tracing::warn!(value = %v, "ignoring invalid TASKWAVE_CONCURRENCY"),
        }
    }
    if let Ok(v) = std::env::var("TASKWAVE_STORE_PATH") {
        if !v.trim().is_empty() {
            cfg.store.path = v;
        }
    }
    if let Ok(v) = std::env::var("TASKWAVE_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.logging.level = v;
        }
    }
}
