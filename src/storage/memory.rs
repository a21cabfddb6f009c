//! In-process volume store

use crate::error::{BerthError, BerthResult};
use crate::storage::{StoredVolume, VolumeStore};
use crate::volume::{VolumeProperties, VolumeSpec};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Volume store backed by a map, with call counters
#[derive(Debug, Default)]
pub struct MemoryVolumeStore {
    volumes: Mutex<BTreeMap<String, StoredVolume>>,
    fail_creates: Mutex<Option<String>>,
    create_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
    destroyed: Mutex<Vec<String>>,
}

impl MemoryVolumeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `create` fail with `reason`
    pub fn fail_creates(&self, reason: impl Into<String>) {
        *self.fail_creates.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason.into());
    }

    /// Mark a stored volume as expiring at `at`
    pub fn expire(&self, handle: &str, at: DateTime<Utc>) {
        if let Some(volume) = self.lock().get_mut(handle) {
            volume.expires_at = Some(at);
        }
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.lock().contains_key(handle)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    /// Handles passed to `destroy`, in call order
    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredVolume>> {
        self.volumes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl VolumeStore for MemoryVolumeStore {
    async fn lookup(&self, handle: &str) -> BerthResult<Option<StoredVolume>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lock().get(handle).cloned())
    }

    async fn create(&self, handle: &str, spec: &VolumeSpec) -> BerthResult<StoredVolume> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let failure = self
            .fail_creates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(reason) = failure {
            return Err(BerthError::storage(handle, reason));
        }

        let mut volumes = self.lock();
        if volumes.contains_key(handle) {
            return Err(BerthError::storage(handle, "volume already exists"));
        }

        let volume = StoredVolume::from_spec(handle, PathBuf::from("/volumes").join(handle), spec);
        volumes.insert(handle.to_string(), volume.clone());
        Ok(volume)
    }

    async fn list(&self, filter: &VolumeProperties) -> BerthResult<Vec<StoredVolume>> {
        Ok(self
            .lock()
            .values()
            .filter(|v| v.properties.matches(filter))
            .cloned()
            .collect())
    }

    async fn destroy(&self, handle: &str) -> BerthResult<()> {
        self.destroyed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle.to_string());
        self.lock().remove(handle);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_lookup() {
        let store = MemoryVolumeStore::new();
        let spec = VolumeSpec::default().with_property("kind", "cache");

        let created = store.create("h1", &spec).await.unwrap();
        assert_eq!(created.handle, "h1");
        assert_eq!(created.path, PathBuf::from("/volumes/h1"));

        let found = store.lookup("h1").await.unwrap().unwrap();
        assert_eq!(found, created);
        assert!(store.lookup("h2").await.unwrap().is_none());
        assert_eq!(store.create_calls(), 1);
        assert_eq!(store.lookup_calls(), 2);
    }

    #[tokio::test]
    async fn duplicate_create_fails() {
        let store = MemoryVolumeStore::new();
        store.create("h1", &VolumeSpec::default()).await.unwrap();
        assert!(store.create("h1", &VolumeSpec::default()).await.is_err());
    }

    #[tokio::test]
    async fn list_filters_by_properties() {
        let store = MemoryVolumeStore::new();
        store
            .create("a", &VolumeSpec::default().with_property("kind", "cache"))
            .await
            .unwrap();
        store
            .create("b", &VolumeSpec::default().with_property("kind", "rootfs"))
            .await
            .unwrap();

        let mut filter = VolumeProperties::new();
        filter.insert("kind", "rootfs");
        let listed = store.list(&filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].handle, "b");
    }

    #[tokio::test]
    async fn destroy_records_handle() {
        let store = MemoryVolumeStore::new();
        store.create("a", &VolumeSpec::default()).await.unwrap();
        store.destroy("a").await.unwrap();
        assert!(!store.contains("a"));
        assert_eq!(store.destroyed(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn injected_create_failure() {
        let store = MemoryVolumeStore::new();
        store.fail_creates("disk full");
        let err = store.create("a", &VolumeSpec::default()).await.unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert!(store.is_empty());
    }
}
