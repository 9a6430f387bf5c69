//! Configuration module
//!
//! This module handles application settings and the saved connection
//! profiles, both stored as TOML under the user's configuration directory.

pub mod profiles;

use crate::error::{BrowserError, Result};
use crate::query::DEFAULT_HISTORY_LIMIT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use profiles::{ProfileStore, TomlProfileStore};

/// Settings file name
const CONFIG_FILE: &str = "config.toml";

/// Directory name under the platform configuration directory
const APP_DIR: &str = "schema-browser";

/// Persistent application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Number of executed statements kept in history
    pub history_limit: usize,
    /// Connect timeout applied by the PostgreSQL driver
    pub connect_timeout_secs: u64,
    /// Rows per page when displaying results
    pub page_size: usize,
    /// Log filter used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Reported to the server as `application_name`
    pub application_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            connect_timeout_secs: 10,
            page_size: 50,
            log_filter: "info".to_string(),
            application_name: APP_DIR.to_string(),
        }
    }
}

impl Settings {
    /// Get the configuration directory path, creating it if needed
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| {
                BrowserError::Config("Could not find configuration directory".to_string())
            })?
            .join(APP_DIR);

        fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }

    /// Get the settings file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Load settings from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    /// Load settings from `path`, falling back to defaults if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    /// Save settings to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.history_limit, 50);
        assert_eq!(settings.page_size, 50);
        assert_eq!(settings.log_filter, "info");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "history_limit = 10\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.history_limit, 10);
        assert_eq!(settings.connect_timeout_secs, 10);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut settings = Settings::default();
        settings.page_size = 20;
        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "history_limit = \"many\"").unwrap();
        assert!(matches!(Settings::load_from(&path), Err(BrowserError::Config(_))));
    }
}
