//! Error types for dependency tracking and reload propagation

use std::path::PathBuf;
use thiserror::Error;

use crate::unit::UnitName;

/// Result type for reload operations
pub type Result<T> = std::result::Result<T, ReloadError>;

/// Errors raised by a host loader.
///
/// The tracking layer passes these through untouched.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No unit is known under this name
    #[error("Unit '{0}' not found")]
    NotFound(String),

    /// The unit's body failed while it was being executed for the first time
    #[error("Unit '{name}' failed during load: {source}")]
    Execution {
        name: String,
        #[source]
        source: Box<UnitError>,
    },

    /// Any other loader-specific failure
    #[error("Failed to load unit '{name}': {message}")]
    Failed {
        name: String,
        message: String,
    },
}

impl LoadError {
    /// Create an execution error
    pub fn execution(name: impl Into<String>, source: UnitError) -> Self {
        LoadError::Execution {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Create a generic load failure
    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        LoadError::Failed {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Errors raised from inside a unit body or migration hook
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("{0}")]
    Message(String),

    /// A nested load performed by the body failed
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl From<&str> for UnitError {
    fn from(s: &str) -> Self {
        UnitError::Message(s.to_string())
    }
}

impl From<String> for UnitError {
    fn from(s: String) -> Self {
        UnitError::Message(s)
    }
}

/// Namespace snapshot errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The binding holds a native object that cannot be deep-copied
    #[error("Binding '{binding}' holds a native object and cannot be copied")]
    NonCopyable { binding: String },
}

/// Errors surfaced by [`DependencyTracker::reload`](crate::DependencyTracker::reload)
#[derive(Debug, Error)]
pub enum ReloadError {
    /// Re-executing a unit's body failed
    #[error("Re-initialization of '{unit}' failed: {source}")]
    Reinitialize {
        unit: UnitName,
        #[source]
        source: UnitError,
    },

    /// The pre-reload namespace could not be captured
    #[error("Snapshot of '{unit}' failed: {source}")]
    Snapshot {
        unit: UnitName,
        #[source]
        source: SnapshotError,
    },

    /// The unit's migration hook rejected the snapshot
    #[error("Migration hook of '{unit}' failed: {source}")]
    Migration {
        unit: UnitName,
        #[source]
        source: UnitError,
    },
}

impl ReloadError {
    /// Name of the unit whose reload failed
    pub fn unit(&self) -> &UnitName {
        match self {
            ReloadError::Reinitialize { unit, .. }
            | ReloadError::Snapshot { unit, .. }
            | ReloadError::Migration { unit, .. } => unit,
        }
    }
}

/// Errors from loading a [`ReloadConfig`](crate::ReloadConfig)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from the file watcher
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to create watcher: {0}")]
    Create(String),

    #[error("Failed to watch '{path}': {message}")]
    Watch { path: PathBuf, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
