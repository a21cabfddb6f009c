//! In-process catalog

use crate::catalog::state::{CatalogState, VolumeRecord, VolumeState};
use crate::catalog::{CreatedVolume, CreatingVolume, FoundVolume, VolumeCatalog};
use crate::error::{BerthError, BerthResult};
use crate::volume::{BaseResourceTypeRef, VolumeIdentity};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Catalog held in memory, with call counters and failure injection
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
    fail_find: AtomicBool,
    fail_create: AtomicBool,
    fail_mark_created: AtomicBool,
    find_calls: AtomicUsize,
    create_calls: AtomicUsize,
    mark_created_calls: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_base_resource_type(&self, name: &str) -> BaseResourceTypeRef {
        self.lock().register_base_resource_type(name)
    }

    /// Seed a record directly, returning its ID
    pub fn insert(&self, identity: VolumeIdentity, handle: &str, state: VolumeState) -> i64 {
        self.lock().insert(identity, handle.to_string(), state)
    }

    /// Make `find_volume` fail until reset
    pub fn fail_find(&self, fail: bool) {
        self.fail_find.store(fail, Ordering::SeqCst);
    }

    /// Make `create_volume` fail until reset
    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make `mark_created` fail until reset
    pub fn fail_mark_created(&self, fail: bool) {
        self.fail_mark_created.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<VolumeRecord> {
        self.lock().records().to_vec()
    }

    pub fn state_of(&self, handle: &str) -> Option<VolumeState> {
        self.lock()
            .records()
            .iter()
            .find(|r| r.handle == handle)
            .map(|r| r.state)
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn mark_created_calls(&self) -> usize {
        self.mark_created_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl VolumeCatalog for MemoryCatalog {
    async fn find_volume(&self, identity: &VolumeIdentity) -> BerthResult<Option<FoundVolume>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_find.load(Ordering::SeqCst) {
            return Err(BerthError::Catalog("injected find_volume failure".to_string()));
        }
        Ok(self.lock().find(identity))
    }

    async fn create_volume(&self, identity: &VolumeIdentity) -> BerthResult<CreatingVolume> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BerthError::Catalog("injected create_volume failure".to_string()));
        }
        self.lock().create(identity)
    }

    async fn mark_created(&self, volume: &CreatingVolume) -> BerthResult<CreatedVolume> {
        self.mark_created_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_mark_created.load(Ordering::SeqCst) {
            return Err(BerthError::Catalog("injected mark_created failure".to_string()));
        }
        self.lock().mark_created(volume)
    }

    async fn find_base_resource_type(
        &self,
        name: &str,
    ) -> BerthResult<Option<BaseResourceTypeRef>> {
        Ok(self.lock().find_base_resource_type(name))
    }
}
