//! In-process creation locks

use crate::error::BerthResult;
use crate::lock::{CreationLock, CreationLocks, LockRelease};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type HeldSet = Arc<Mutex<HashSet<i64>>>;

/// Locks shared by every broker holding a clone of the same `MemoryLocks`
#[derive(Debug, Clone, Default)]
pub struct MemoryLocks {
    held: HeldSet,
    acquire_calls: Arc<AtomicUsize>,
}

struct MemoryRelease {
    held: HeldSet,
    volume_id: i64,
}

impl LockRelease for MemoryRelease {
    fn release(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.volume_id);
    }
}

impl MemoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, volume_id: i64) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&volume_id)
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CreationLocks for MemoryLocks {
    async fn try_acquire(&self, volume_id: i64) -> BerthResult<Option<CreationLock>> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);

        let inserted = self
            .held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(volume_id);
        if !inserted {
            return Ok(None);
        }

        Ok(Some(CreationLock::new(
            volume_id,
            Box::new(MemoryRelease {
                held: Arc::clone(&self.held),
                volume_id,
            }),
        )))
    }
}
