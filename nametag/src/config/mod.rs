//! Configuration management.
//!
//! Settings come from, in order:
//! 1. Default values
//! 2. Config file (`~/.nametag/config.toml`)
//! 3. Environment variables ([`Config::with_env`])

mod schema;

pub use schema::{
    Config, ConfigIssue, HrefRuleConfig, IssueLevel, MAX_BATCH_SIZE_LIMIT, MAX_COOLDOWN,
};

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Get the default config directory path.
#[must_use]
pub fn default_config_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nametag")
}

/// Get the default config file path.
#[must_use]
pub fn config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Get the default name cache file path.
#[must_use]
pub fn cache_path() -> PathBuf {
    default_config_dir().join("cache.json")
}

/// Load configuration from the default path.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub async fn load_config() -> Result<Config> {
    load_config_from(config_path()).await
}

/// Load configuration from a specific path; a missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub async fn load_config_from(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !tokio::fs::try_exists(path).await? {
        info!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = tokio::fs::read_to_string(path).await?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| Error::config(format!("failed to parse {}: {e}", path.display())))?;
    debug!(path = %path.display(), "loaded config file");

    Ok(config)
}

/// Save configuration to a specific path, creating parent directories.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub async fn save_config_to(config: &Config, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::config(format!("failed to serialize config: {e}")))?;
    tokio::fs::write(path, content).await?;
    info!(path = %path.display(), "saved config file");

    Ok(())
}

/// Create the default config file if it does not exist, then load it.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created or read.
pub async fn init_config() -> Result<Config> {
    let cfg_path = config_path();
    if !tokio::fs::try_exists(&cfg_path).await? {
        save_config_to(&Config::default(), &cfg_path).await?;
        info!("created default config at {}", cfg_path.display());
    }
    load_config_from(&cfg_path).await
}
