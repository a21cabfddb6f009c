//! Configuration schema for Berth
//!
//! Configuration is stored at `~/.config/berth/config.toml`

use crate::broker::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Identity of this worker
    pub worker: WorkerConfig,

    /// Find-or-create retry behaviour
    pub broker: BrokerConfig,

    /// Volume storage backend
    pub storage: StorageConfig,

    /// Catalog location
    pub catalog: CatalogConfig,

    /// Creation lock location
    pub locks: LocksConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Worker identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker name volumes are scoped to
    pub name: String,

    /// Team used when none is given on the command line
    pub team: String,

    /// Base resource types known to the catalog
    pub base_resource_types: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "local".to_string(),
            team: "main".to_string(),
            base_resource_types: vec![
                "git".to_string(),
                "registry-image".to_string(),
                "time".to_string(),
            ],
        }
    }
}

/// Broker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Delay between attempts while another process creates the volume
    pub retry_delay_ms: u64,

    /// Attempts before giving up (0 = retry forever)
    pub max_attempts: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Named podman volumes
    Podman,
    /// No storage attached to this worker
    None,
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Podman binary to execute
    pub podman_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Podman,
            podman_path: PathBuf::from("podman"),
        }
    }
}

/// Catalog settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog file (default: `<state_dir>/catalog.json`)
    pub path: Option<PathBuf>,
}

/// Creation lock settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocksConfig {
    /// Lock directory (default: `<state_dir>/locks`)
    pub dir: Option<PathBuf>,
}
