//! Error types for Berth
//!
//! All modules use `BerthResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Berth operations
pub type BerthResult<T> = Result<T, BerthError>;

/// All errors that can occur in Berth
#[derive(Error, Debug)]
pub enum BerthError {
    // Broker errors
    #[error("failed to find created volume in storage: {handle}")]
    CreatedVolumeNotFound { handle: String },

    #[error("base resource type not found: {0}")]
    BaseResourceTypeNotFound(String),

    #[error("volume expired immediately after saving: {handle}")]
    VolumeExpiredImmediately { handle: String },

    #[error("volume {volume_id} still being created elsewhere after {attempts} attempts")]
    CreationContended { volume_id: i64, attempts: u32 },

    #[error("no volume storage configured for this worker")]
    StorageUnavailable,

    // Collaborator errors
    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("catalog already has volume {volume_id} for {identity}")]
    IdentityConflict { identity: String, volume_id: i64 },

    #[error("creation lock error: {0}")]
    Lock(String),

    #[error("storage error for volume {handle}: {reason}")]
    Storage { handle: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl BerthError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a storage error for a volume handle
    pub fn storage(handle: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Storage {
            handle: handle.into(),
            reason: reason.into(),
        }
    }

    /// Check if a later attempt with the same identity may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CreationContended { .. } | Self::Storage { .. } | Self::Lock(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CreatedVolumeNotFound { .. } => {
                Some("The catalog and volume storage disagree; inspect the worker's volumes")
            }
            Self::BaseResourceTypeNotFound(_) => {
                Some("Add the type to worker.base_resource_types in config.toml")
            }
            Self::StorageUnavailable => Some("Set storage.backend = \"podman\" in config.toml"),
            Self::CreationContended { .. } => {
                Some("Another worker is still creating this volume; retry later")
            }
            _ if self.is_retryable() => Some("This may be transient; run the command again"),
            _ => None,
        }
    }
}
