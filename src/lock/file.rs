//! Creation locks backed by advisory file locks
//!
//! One lock file per volume ID under a shared directory. Any process on
//! the host that opens the same directory contends for the same locks.

use crate::error::{BerthError, BerthResult};
use crate::lock::{CreationLock, CreationLocks, LockRelease};
use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FileLocks {
    dir: PathBuf,
}

struct FileRelease {
    file: File,
}

impl LockRelease for FileRelease {
    fn release(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("Failed to release creation lock: {}", e);
        }
    }
}

impl FileLocks {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn lock_path(&self, volume_id: i64) -> PathBuf {
        self.dir.join(format!("volume-{}.lock", volume_id))
    }
}

#[async_trait]
impl CreationLocks for FileLocks {
    async fn try_acquire(&self, volume_id: i64) -> BerthResult<Option<CreationLock>> {
        let path = self.lock_path(volume_id);

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            BerthError::Lock(format!("creating lock dir {}: {}", self.dir.display(), e))
        })?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| BerthError::Lock(format!("opening {}: {}", path.display(), e)))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(CreationLock::new(
                volume_id,
                Box::new(FileRelease { file }),
            ))),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(BerthError::Lock(format!(
                "locking {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
