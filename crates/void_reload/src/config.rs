//! Reload settings
//!
//! ```toml
//! debounce_ms = 250
//! watch_directories = ["scripts", "units"]
//! recursive = true
//! extensions = ["vs"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_debounce_ms() -> u64 {
    100
}

fn default_watch_directories() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

fn default_true() -> bool {
    true
}

/// Settings for watching unit sources and triggering reloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadConfig {
    /// Quiet period a file must see before its change is acted on
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Directories to watch for source changes
    #[serde(default = "default_watch_directories")]
    pub watch_directories: Vec<PathBuf>,
    /// Watch subdirectories too
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Accepted file extensions, without the dot; empty accepts everything
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            watch_directories: default_watch_directories(),
            recursive: true,
            extensions: Vec::new(),
        }
    }
}

impl ReloadConfig {
    /// Parse from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ReloadConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch_directories.is_empty() {
            return Err(ConfigError::Invalid("watch_directories must not be empty".into()));
        }
        if self.extensions.iter().any(|e| e.is_empty() || e.starts_with('.')) {
            return Err(ConfigError::Invalid(
                "extensions must be non-empty and given without a leading dot".into(),
            ));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Whether a file's extension is one we react to
    pub fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map_or(false, |ext| self.extensions.iter().any(|e| e == ext))
    }
}
