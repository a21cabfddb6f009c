//! Domain volumes handed back to callers

use crate::error::{BerthError, BerthResult};
use crate::storage::{StoredVolume, VolumeStore};
use crate::volume::{VolumeProperties, VolumeStrategy};
use chrono::Utc;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Lease policy attached to a domain volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeTtl {
    /// Kept until explicitly destroyed
    Indefinite,
}

impl fmt::Display for VolumeTtl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Indefinite => write!(f, "indefinite"),
        }
    }
}

/// A physical volume confirmed present in storage, plus its lease
#[derive(Clone)]
pub struct Volume {
    stored: StoredVolume,
    ttl: VolumeTtl,
    store: Arc<dyn VolumeStore>,
}

impl Volume {
    pub fn handle(&self) -> &str {
        &self.stored.handle
    }

    pub fn path(&self) -> &Path {
        &self.stored.path
    }

    pub fn properties(&self) -> &VolumeProperties {
        &self.stored.properties
    }

    pub fn strategy(&self) -> &VolumeStrategy {
        &self.stored.strategy
    }

    pub fn is_privileged(&self) -> bool {
        self.stored.privileged
    }

    pub fn ttl(&self) -> VolumeTtl {
        self.ttl
    }

    /// Storage-side description of the volume
    pub fn stored(&self) -> &StoredVolume {
        &self.stored
    }

    /// Destroy the physical volume
    pub async fn destroy(&self) -> BerthResult<()> {
        self.store.destroy(&self.stored.handle).await
    }
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("handle", &self.stored.handle)
            .field("path", &self.stored.path)
            .field("ttl", &self.ttl)
            .field("backend", &self.store.backend_name())
            .finish()
    }
}

/// Wraps storage volumes into domain volumes
#[derive(Clone)]
pub struct VolumeFactory {
    store: Arc<dyn VolumeStore>,
}

impl VolumeFactory {
    pub fn new(store: Arc<dyn VolumeStore>) -> Self {
        Self { store }
    }

    /// Build a volume that is kept until destroyed.
    ///
    /// Fails with `VolumeExpiredImmediately` when storage has already
    /// scheduled the volume to expire at or before now.
    pub fn build_with_indefinite_ttl(&self, stored: StoredVolume) -> BerthResult<Volume> {
        if stored.expires_at.is_some_and(|at| at <= Utc::now()) {
            return Err(BerthError::VolumeExpiredImmediately {
                handle: stored.handle,
            });
        }

        Ok(Volume {
            stored,
            ttl: VolumeTtl::Indefinite,
            store: Arc::clone(&self.store),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryVolumeStore;
    use crate::volume::VolumeSpec;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn builds_with_indefinite_ttl() {
        let store = Arc::new(MemoryVolumeStore::new());
        let stored = store.create("h1", &VolumeSpec::default()).await.unwrap();

        let volume = VolumeFactory::new(store.clone())
            .build_with_indefinite_ttl(stored)
            .unwrap();

        assert_eq!(volume.handle(), "h1");
        assert_eq!(volume.ttl(), VolumeTtl::Indefinite);
        assert_eq!(volume.ttl().to_string(), "indefinite");
    }

    #[tokio::test]
    async fn rejects_already_expired_volume() {
        let store = Arc::new(MemoryVolumeStore::new());
        let mut stored = store.create("h1", &VolumeSpec::default()).await.unwrap();
        stored.expires_at = Some(Utc::now() - ChronoDuration::seconds(5));

        let err = VolumeFactory::new(store)
            .build_with_indefinite_ttl(stored)
            .unwrap_err();
        assert!(matches!(err, BerthError::VolumeExpiredImmediately { handle } if handle == "h1"));
    }

    #[tokio::test]
    async fn future_expiry_is_accepted() {
        let store = Arc::new(MemoryVolumeStore::new());
        let mut stored = store.create("h1", &VolumeSpec::default()).await.unwrap();
        stored.expires_at = Some(Utc::now() + ChronoDuration::hours(1));

        assert!(VolumeFactory::new(store)
            .build_with_indefinite_ttl(stored)
            .is_ok());
    }

    #[tokio::test]
    async fn destroy_delegates_to_store() {
        let store = Arc::new(MemoryVolumeStore::new());
        let stored = store.create("h1", &VolumeSpec::default()).await.unwrap();
        let volume = VolumeFactory::new(store.clone())
            .build_with_indefinite_ttl(stored)
            .unwrap();

        volume.destroy().await.unwrap();
        assert!(!store.contains("h1"));
    }
}
