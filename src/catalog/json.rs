//! File-backed catalog
//!
//! The whole catalog is one JSON document. Every operation takes an
//! exclusive `flock` on a sibling `.lock` file, so berth processes on the
//! same host see a serialized history.

use crate::catalog::state::{CatalogState, VolumeRecord};
use crate::catalog::{CreatedVolume, CreatingVolume, FoundVolume, VolumeCatalog};
use crate::error::{BerthError, BerthResult};
use crate::volume::{BaseResourceTypeRef, VolumeIdentity};
use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Catalog persisted as JSON on the local filesystem
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    path: PathBuf,
}

impl JsonCatalog {
    /// Open (or create) the catalog and register base resource types
    pub async fn open(
        path: impl Into<PathBuf>,
        base_resource_types: &[String],
    ) -> BerthResult<Self> {
        let catalog = Self { path: path.into() };

        let names = base_resource_types.to_vec();
        catalog
            .write(move |state| {
                for name in &names {
                    state.register_base_resource_type(name);
                }
                Ok(())
            })
            .await?;

        debug!("Opened catalog at {}", catalog.path.display());
        Ok(catalog)
    }

    /// All volume records, in insertion order
    pub async fn records(&self) -> BerthResult<Vec<VolumeRecord>> {
        self.read(|state| Ok(state.records().to_vec())).await
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    async fn read<T, F>(&self, f: F) -> BerthResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&CatalogState) -> BerthResult<T> + Send + 'static,
    {
        self.with_state(false, move |state| f(state)).await
    }

    async fn write<T, F>(&self, f: F) -> BerthResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut CatalogState) -> BerthResult<T> + Send + 'static,
    {
        self.with_state(true, f).await
    }

    async fn with_state<T, F>(&self, persist: bool, f: F) -> BerthResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut CatalogState) -> BerthResult<T> + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path();

        tokio::task::spawn_blocking(move || {
            let lock = open_lock(&lock_path)?;
            lock.lock_exclusive().map_err(|e| {
                BerthError::io(format!("locking catalog {}", lock_path.display()), e)
            })?;

            let result: BerthResult<T> = (|| {
                let mut state = load(&path)?;
                let value = f(&mut state)?;
                if persist {
                    store(&path, &state)?;
                }
                Ok(value)
            })();

            if let Err(e) = lock.unlock() {
                debug!("Failed to unlock catalog: {}", e);
            }
            result
        })
        .await
        .map_err(|e| BerthError::Catalog(format!("catalog task failed: {}", e)))?
    }
}

fn open_lock(lock_path: &Path) -> BerthResult<File> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| BerthError::io(format!("creating directory {}", parent.display()), e))?;
    }

    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| BerthError::io(format!("opening {}", lock_path.display()), e))
}

fn load(path: &Path) -> BerthResult<CatalogState> {
    if !path.exists() {
        return Ok(CatalogState::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| BerthError::io(format!("reading catalog {}", path.display()), e))?;
    if content.trim().is_empty() {
        return Ok(CatalogState::default());
    }

    serde_json::from_str(&content)
        .map_err(|e| BerthError::Catalog(format!("corrupt catalog {}: {}", path.display(), e)))
}

/// Write a sibling temp file and persist it over the catalog so readers
/// never see a torn document
fn store(path: &Path, state: &CatalogState) -> BerthResult<()> {
    let content = serde_json::to_string_pretty(state)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| BerthError::io(format!("creating temp file in {}", dir.display()), e))?;
    let written = tmp
        .write_all(content.as_bytes())
        .and_then(|()| tmp.as_file().sync_all());
    written.map_err(|e| BerthError::io(format!("writing catalog {}", tmp.path().display()), e))?;
    tmp.persist(path)
        .map_err(|e| BerthError::io(format!("replacing catalog {}", path.display()), e.error))?;
    Ok(())
}

#[async_trait]
impl VolumeCatalog for JsonCatalog {
    async fn find_volume(&self, identity: &VolumeIdentity) -> BerthResult<Option<FoundVolume>> {
        let identity = identity.clone();
        self.read(move |state| Ok(state.find(&identity))).await
    }

    async fn create_volume(&self, identity: &VolumeIdentity) -> BerthResult<CreatingVolume> {
        let identity = identity.clone();
        self.write(move |state| state.create(&identity)).await
    }

    async fn mark_created(&self, volume: &CreatingVolume) -> BerthResult<CreatedVolume> {
        let volume = volume.clone();
        self.write(move |state| state.mark_created(&volume)).await
    }

    async fn find_base_resource_type(
        &self,
        name: &str,
    ) -> BerthResult<Option<BaseResourceTypeRef>> {
        let name = name.to_string();
        self.read(move |state| Ok(state.find_base_resource_type(&name)))
            .await
    }
}
