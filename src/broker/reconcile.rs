//! Redundant volume cleanup
//!
//! Historical races can leave several catalog volumes for an identity that
//! should have one. The lowest ID was created first and is kept.

use super::VolumeBroker;
use crate::catalog::SavedVolume;
use crate::error::BerthResult;
use tracing::{debug, info};

/// Result of reconciling a set of redundant volumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub kept: SavedVolume,
    /// Handles destroyed in storage, in input order
    pub expired: Vec<String>,
}

impl VolumeBroker {
    /// Keep the lowest-ID volume of `volumes` and destroy the rest.
    ///
    /// Returns `None` for an empty set. Members already missing from storage
    /// are skipped and left out of `expired`. Destroys happen in input order
    /// and are not rolled back if a later one fails.
    pub async fn select_lowest_id_volume(
        &self,
        volumes: &[SavedVolume],
    ) -> BerthResult<Option<Reconciled>> {
        let Some(lowest) = volumes.iter().min_by_key(|v| v.id) else {
            return Ok(None);
        };

        let mut expired = Vec::new();
        for volume in volumes.iter().filter(|v| *v != lowest) {
            info!(
                "Expiring redundant volume {} (keeping {})",
                volume.handle, lowest.handle
            );
            if self.expire_volume(&volume.handle).await? {
                expired.push(volume.handle.clone());
            }
        }

        Ok(Some(Reconciled {
            kept: lowest.clone(),
            expired,
        }))
    }

    /// Destroy `handle` if storage still has it
    async fn expire_volume(&self, handle: &str) -> BerthResult<bool> {
        match self.lookup_volume(handle).await? {
            Some(volume) => {
                volume.destroy().await?;
                Ok(true)
            }
            None => {
                debug!("Volume {} already gone", handle);
                Ok(false)
            }
        }
    }
}
