//! Volume storage service
//!
//! Physical volumes are keyed by handle. A physical volume belongs to a
//! catalog record iff their handles are equal; there is no other join
//! between the two stores.
//!
//! Implementations:
//! - `PodmanVolumeStore`: named podman volumes on the worker host
//! - `MemoryVolumeStore`: in-process, for tests and embedding

mod memory;
mod podman;

pub use memory::MemoryVolumeStore;
pub use podman::PodmanVolumeStore;

use crate::error::BerthResult;
use crate::volume::{VolumeProperties, VolumeSpec, VolumeStrategy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A physical volume as reported by the storage service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredVolume {
    pub handle: String,
    /// Mountpoint on the worker host
    pub path: PathBuf,
    pub strategy: VolumeStrategy,
    pub privileged: bool,
    pub size_limit: Option<u64>,
    pub properties: VolumeProperties,
    pub created_at: DateTime<Utc>,
    /// Set when the storage service has scheduled the volume for expiry
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredVolume {
    /// Describe a freshly created volume from its spec
    pub fn from_spec(handle: impl Into<String>, path: PathBuf, spec: &VolumeSpec) -> Self {
        Self {
            handle: handle.into(),
            path,
            strategy: spec.strategy.clone(),
            privileged: spec.privileged,
            size_limit: spec.size_limit,
            properties: spec.properties.clone(),
            created_at: Utc::now(),
            expires_at: None,
        }
    }
}

/// Network-attached volume provisioner
///
/// Calls return or fail without internal retry; retrying is the broker's
/// job.
#[async_trait]
pub trait VolumeStore: Send + Sync {
    /// Look up a volume by handle; `None` when it does not exist
    async fn lookup(&self, handle: &str) -> BerthResult<Option<StoredVolume>>;

    /// Create a volume with the given handle
    async fn create(&self, handle: &str, spec: &VolumeSpec) -> BerthResult<StoredVolume>;

    /// List volumes whose properties match `filter`
    async fn list(&self, filter: &VolumeProperties) -> BerthResult<Vec<StoredVolume>>;

    /// Destroy a volume
    async fn destroy(&self, handle: &str) -> BerthResult<()>;

    /// Human-readable backend name for display
    fn backend_name(&self) -> &'static str;
}
