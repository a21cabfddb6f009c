//! Metadata catalog of volume records
//!
//! The catalog owns record identity and lifecycle state. The broker only
//! changes state through `mark_created`.
//!
//! # Record States
//!
//! | State | Physical volume | Reached by |
//! |-------|-----------------|------------|
//! | Creating | maybe | `create_volume` |
//! | Created | confirmed | `mark_created` |

mod json;
mod memory;
mod state;

pub use json::JsonCatalog;
pub use memory::MemoryCatalog;
pub use state::{VolumeRecord, VolumeState};

use crate::error::BerthResult;
use crate::volume::{BaseResourceTypeRef, VolumeIdentity};
use async_trait::async_trait;

/// Record that exists but may lack a physical volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatingVolume {
    pub id: i64,
    pub handle: String,
}

/// Record whose physical volume has been confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedVolume {
    pub id: i64,
    pub handle: String,
}

/// Result of looking an identity up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoundVolume {
    Creating(CreatingVolume),
    Created(CreatedVolume),
}

/// Catalog-visible volume considered for redundancy cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedVolume {
    pub id: i64,
    pub handle: String,
}

/// Durable store of volume records
#[async_trait]
pub trait VolumeCatalog: Send + Sync {
    /// Find the record for an identity, in whichever state it is
    async fn find_volume(&self, identity: &VolumeIdentity) -> BerthResult<Option<FoundVolume>>;

    /// Insert a `Creating` record with a fresh handle.
    ///
    /// Fails with `IdentityConflict` when a record for the identity already
    /// exists.
    async fn create_volume(&self, identity: &VolumeIdentity) -> BerthResult<CreatingVolume>;

    /// Transition a `Creating` record to `Created`
    async fn mark_created(&self, volume: &CreatingVolume) -> BerthResult<CreatedVolume>;

    /// Resolve a base resource type by name
    async fn find_base_resource_type(&self, name: &str)
        -> BerthResult<Option<BaseResourceTypeRef>>;
}
