//! Volume lifecycle broker
//!
//! Mediates between the catalog and volume storage so that each volume
//! identity is physically created at most once, even with several workers
//! racing for the same identity.
//!
//! # Find-or-create
//!
//! | Catalog record | Storage volume | Action |
//! |----------------|----------------|--------|
//! | Created | present | return it, no lock |
//! | Created | missing | `CreatedVolumeNotFound` |
//! | Creating / none | any | lock, create if missing, mark created |
//!
//! A lock held by someone else means another process is creating the same
//! identity: sleep and start over from the catalog lookup.

mod reconcile;
mod retry;

pub use reconcile::Reconciled;
pub use retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};

use retry::count_attempt;

use crate::catalog::{CreatingVolume, FoundVolume, VolumeCatalog};
use crate::error::{BerthError, BerthResult};
use crate::lock::CreationLocks;
use crate::storage::{StoredVolume, VolumeStore};
use crate::volume::{
    CreatingContainerRef, TeamRef, UsedResourceCacheRef, Volume, VolumeFactory, VolumeIdentity,
    VolumeProperties, VolumeSpec, WorkerRef,
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Outcome of one pass over the catalog
enum Attempt {
    Done(Volume),
    /// Another holder has the creation lock
    Contended { volume_id: i64 },
    /// Catalog changed underneath us; start over at once
    Raced,
}

/// Finds or creates volumes for one worker
///
/// Holds no mutable state of its own; any number of brokers may share the
/// same catalog, locks and storage.
pub struct VolumeBroker {
    store: Option<Arc<dyn VolumeStore>>,
    catalog: Arc<dyn VolumeCatalog>,
    locks: Arc<dyn CreationLocks>,
    worker: WorkerRef,
    retry: RetryPolicy,
}

impl VolumeBroker {
    /// Create a broker for a worker with no storage attached
    pub fn new(
        catalog: Arc<dyn VolumeCatalog>,
        locks: Arc<dyn CreationLocks>,
        worker: WorkerRef,
    ) -> Self {
        Self {
            store: None,
            catalog,
            locks,
            worker,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn VolumeStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Find or create the volume holding a resource cache
    pub async fn find_or_create_volume_for_resource_cache(
        &self,
        spec: &VolumeSpec,
        cache: &UsedResourceCacheRef,
    ) -> BerthResult<Volume> {
        let identity = VolumeIdentity::ResourceCache {
            worker: self.worker.clone(),
            cache: *cache,
        };
        self.find_or_create(spec, &identity).await
    }

    /// Find or create the volume mounted at `mount_path` in a container
    pub async fn find_or_create_volume_for_container(
        &self,
        spec: &VolumeSpec,
        container: &CreatingContainerRef,
        team: &TeamRef,
        mount_path: &str,
    ) -> BerthResult<Volume> {
        let identity = VolumeIdentity::Container {
            team: team.clone(),
            worker: self.worker.clone(),
            container: container.clone(),
            mount_path: mount_path.to_string(),
        };
        self.find_or_create(spec, &identity).await
    }

    /// Find or create the root filesystem volume of a base resource type.
    ///
    /// An unknown type name fails with `BaseResourceTypeNotFound` before
    /// any lock or storage call.
    pub async fn find_or_create_volume_for_base_resource_type(
        &self,
        spec: &VolumeSpec,
        team: &TeamRef,
        type_name: &str,
    ) -> BerthResult<Volume> {
        let resource_type = self
            .catalog
            .find_base_resource_type(type_name)
            .await?
            .ok_or_else(|| {
                error!("Base resource type not found: {}", type_name);
                BerthError::BaseResourceTypeNotFound(type_name.to_string())
            })?;

        let identity = VolumeIdentity::BaseResourceType {
            team: team.clone(),
            worker: self.worker.clone(),
            resource_type,
        };
        self.find_or_create(spec, &identity).await
    }

    /// List storage volumes matching `filter`.
    ///
    /// A worker without storage has no volumes. If any volume fails to
    /// wrap, nothing is returned.
    pub async fn list_volumes(&self, filter: &VolumeProperties) -> BerthResult<Vec<Volume>> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };

        let stored = store.list(filter).await.map_err(|e| {
            error!("Failed to list volumes: {}", e);
            e
        })?;

        let factory = VolumeFactory::new(Arc::clone(store));
        stored
            .into_iter()
            .map(|s| factory.build_with_indefinite_ttl(s))
            .collect()
    }

    /// Look a storage volume up by handle
    pub async fn lookup_volume(&self, handle: &str) -> BerthResult<Option<Volume>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };

        let stored = store.lookup(handle).await.map_err(|e| {
            error!("Failed to look up volume {}: {}", handle, e);
            e
        })?;

        match stored {
            Some(stored) => Ok(Some(
                VolumeFactory::new(Arc::clone(store)).build_with_indefinite_ttl(stored)?,
            )),
            None => Ok(None),
        }
    }

    async fn find_or_create(
        &self,
        spec: &VolumeSpec,
        identity: &VolumeIdentity,
    ) -> BerthResult<Volume> {
        let store = self.store.as_ref().ok_or(BerthError::StorageUnavailable)?;
        let mut attempts = 0u32;

        loop {
            attempts = count_attempt(attempts);

            match self.attempt(store, spec, identity).await? {
                Attempt::Done(volume) => return Ok(volume),
                Attempt::Raced => {
                    debug!("Catalog changed for {}, retrying", identity);
                    if self.retry.exhausted(attempts) {
                        return Err(BerthError::Catalog(format!(
                            "catalog kept changing for {} after {} attempts",
                            identity, attempts
                        )));
                    }
                }
                Attempt::Contended { volume_id } => {
                    if self.retry.exhausted(attempts) {
                        error!(
                            "Gave up waiting for volume {} after {} attempts",
                            volume_id, attempts
                        );
                        return Err(BerthError::CreationContended {
                            volume_id,
                            attempts,
                        });
                    }
                    debug!(
                        "Volume {} is being created elsewhere (attempt {}), retrying in {:?}",
                        volume_id, attempts, self.retry.delay
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        store: &Arc<dyn VolumeStore>,
        spec: &VolumeSpec,
        identity: &VolumeIdentity,
    ) -> BerthResult<Attempt> {
        let found = self.catalog.find_volume(identity).await.map_err(|e| {
            error!("Failed to find volume in catalog: {}", e);
            e
        })?;

        let creating = match found {
            Some(FoundVolume::Created(created)) => {
                let stored = self.lookup_stored(store, &created.handle).await?.ok_or_else(|| {
                    error!(
                        "Created volume {} missing from {} storage",
                        created.handle,
                        store.backend_name()
                    );
                    BerthError::CreatedVolumeNotFound {
                        handle: created.handle.clone(),
                    }
                })?;
                return self.build(store, stored).map(Attempt::Done);
            }
            Some(FoundVolume::Creating(creating)) => {
                debug!("Resuming creation of volume {} for {}", creating.id, identity);
                creating
            }
            None => match self.catalog.create_volume(identity).await {
                Ok(creating) => creating,
                Err(BerthError::IdentityConflict { .. }) => return Ok(Attempt::Raced),
                Err(e) => {
                    error!("Failed to create volume in catalog: {}", e);
                    return Err(e);
                }
            },
        };

        let Some(_lock) = self.locks.try_acquire(creating.id).await.map_err(|e| {
            error!("Failed to acquire creation lock for volume {}: {}", creating.id, e);
            e
        })?
        else {
            return Ok(Attempt::Contended {
                volume_id: creating.id,
            });
        };

        if !self.still_creating(identity, &creating).await? {
            return Ok(Attempt::Raced);
        }

        let stored = match self.lookup_stored(store, &creating.handle).await? {
            Some(stored) => stored,
            None => {
                let stored = store.create(&creating.handle, spec).await.map_err(|e| {
                    error!("Failed to create volume {} in storage: {}", creating.handle, e);
                    e
                })?;
                info!(kind = identity.kind(), "Created volume {} for {}", creating.handle, identity);
                stored
            }
        };

        self.catalog.mark_created(&creating).await.map_err(|e| {
            error!("Failed to mark volume {} created: {}", creating.id, e);
            e
        })?;

        self.build(store, stored).map(Attempt::Done)
    }

    /// Re-read the catalog under the lock; a previous holder may have
    /// finished (or the record may be gone) since our first lookup.
    async fn still_creating(
        &self,
        identity: &VolumeIdentity,
        creating: &CreatingVolume,
    ) -> BerthResult<bool> {
        let found = self.catalog.find_volume(identity).await.map_err(|e| {
            error!("Failed to find volume in catalog: {}", e);
            e
        })?;
        Ok(matches!(found, Some(FoundVolume::Creating(ref c)) if c == creating))
    }

    async fn lookup_stored(
        &self,
        store: &Arc<dyn VolumeStore>,
        handle: &str,
    ) -> BerthResult<Option<StoredVolume>> {
        store.lookup(handle).await.map_err(|e| {
            error!("Failed to look up volume {} in storage: {}", handle, e);
            e
        })
    }

    fn build(&self, store: &Arc<dyn VolumeStore>, stored: StoredVolume) -> BerthResult<Volume> {
        VolumeFactory::new(Arc::clone(store))
            .build_with_indefinite_ttl(stored)
            .map_err(|e| {
                error!("Failed to build volume: {}", e);
                e
            })
    }
}
