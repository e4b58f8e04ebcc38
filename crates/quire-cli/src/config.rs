//! Notebook configuration for CLI commands.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use quire_core::NotebookConfig;

/// Load configuration from `path`, or from the user config file if present.
pub fn load(path: Option<&str>) -> anyhow::Result<NotebookConfig> {
    match path {
        Some(path) => read(Path::new(path)),
        None => match user_config_path() {
            Some(path) if path.exists() => read(&path),
            _ => Ok(NotebookConfig::default()),
        },
    }
}

/// `<config dir>/quire/config.json`.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("quire").join("config.json"))
}

fn read(path: &Path) -> anyhow::Result<NotebookConfig> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = NotebookConfig::from_json(&json)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}
