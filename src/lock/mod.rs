//! Creation locks
//!
//! Non-blocking mutual exclusion keyed by catalog volume ID. A lock is
//! held for a single creation attempt and released when its guard drops,
//! on every exit path.

mod file;
mod memory;

pub use file::FileLocks;
pub use memory::MemoryLocks;

use crate::error::BerthResult;
use async_trait::async_trait;
use std::fmt;

/// Releases a held lock; called exactly once, from `CreationLock::drop`
pub trait LockRelease: Send {
    fn release(&mut self);
}

/// Guard for a held creation lock
pub struct CreationLock {
    volume_id: i64,
    inner: Option<Box<dyn LockRelease>>,
}

impl CreationLock {
    pub fn new(volume_id: i64, inner: Box<dyn LockRelease>) -> Self {
        Self {
            volume_id,
            inner: Some(inner),
        }
    }

    pub fn volume_id(&self) -> i64 {
        self.volume_id
    }
}

impl Drop for CreationLock {
    fn drop(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.release();
        }
    }
}

impl fmt::Debug for CreationLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreationLock")
            .field("volume_id", &self.volume_id)
            .finish()
    }
}

/// Distributed creation lock manager
#[async_trait]
pub trait CreationLocks: Send + Sync {
    /// Try to take the lock for `volume_id` without waiting.
    ///
    /// `Ok(None)` means another holder has it; `Err` means the attempt
    /// itself failed.
    async fn try_acquire(&self, volume_id: i64) -> BerthResult<Option<CreationLock>>;
}
