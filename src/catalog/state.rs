//! Catalog document shared by the in-memory and JSON catalogs

use crate::catalog::{CreatedVolume, CreatingVolume, FoundVolume};
use crate::error::{BerthError, BerthResult};
use crate::volume::{BaseResourceTypeRef, VolumeIdentity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a catalog volume record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeState {
    /// Record exists; the physical volume may not
    Creating,
    /// Physical volume confirmed
    Created,
}

impl fmt::Display for VolumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Created => write!(f, "created"),
        }
    }
}

/// One volume row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub id: i64,
    pub handle: String,
    pub state: VolumeState,
    pub identity: VolumeIdentity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct CatalogState {
    last_volume_id: i64,
    last_type_id: i64,
    volumes: Vec<VolumeRecord>,
    base_resource_types: BTreeMap<String, BaseResourceTypeRef>,
}

impl CatalogState {
    pub(crate) fn find(&self, identity: &VolumeIdentity) -> Option<FoundVolume> {
        self.volumes
            .iter()
            .find(|r| &r.identity == identity)
            .map(|r| match r.state {
                VolumeState::Creating => FoundVolume::Creating(CreatingVolume {
                    id: r.id,
                    handle: r.handle.clone(),
                }),
                VolumeState::Created => FoundVolume::Created(CreatedVolume {
                    id: r.id,
                    handle: r.handle.clone(),
                }),
            })
    }

    pub(crate) fn create(&mut self, identity: &VolumeIdentity) -> BerthResult<CreatingVolume> {
        if let Some(existing) = self.volumes.iter().find(|r| &r.identity == identity) {
            return Err(BerthError::IdentityConflict {
                identity: identity.to_string(),
                volume_id: existing.id,
            });
        }

        let handle = Uuid::new_v4().to_string();
        let id = self.insert(identity.clone(), handle.clone(), VolumeState::Creating);
        Ok(CreatingVolume { id, handle })
    }

    pub(crate) fn mark_created(&mut self, volume: &CreatingVolume) -> BerthResult<CreatedVolume> {
        let record = self
            .volumes
            .iter_mut()
            .find(|r| r.id == volume.id)
            .ok_or_else(|| BerthError::Catalog(format!("volume {} not found", volume.id)))?;

        if record.handle != volume.handle {
            return Err(BerthError::Catalog(format!(
                "volume {} has handle {}, not {}",
                record.id, record.handle, volume.handle
            )));
        }
        if record.state != VolumeState::Creating {
            return Err(BerthError::Catalog(format!(
                "volume {} is {}, not creating",
                record.id, record.state
            )));
        }

        record.state = VolumeState::Created;
        record.updated_at = Utc::now();
        Ok(CreatedVolume {
            id: record.id,
            handle: record.handle.clone(),
        })
    }

    /// Insert a record with a known handle and state, returning its ID
    pub(crate) fn insert(
        &mut self,
        identity: VolumeIdentity,
        handle: String,
        state: VolumeState,
    ) -> i64 {
        self.last_volume_id += 1;
        let now = Utc::now();
        self.volumes.push(VolumeRecord {
            id: self.last_volume_id,
            handle,
            state,
            identity,
            created_at: now,
            updated_at: now,
        });
        self.last_volume_id
    }

    pub(crate) fn register_base_resource_type(&mut self, name: &str) -> BaseResourceTypeRef {
        if let Some(existing) = self.base_resource_types.get(name) {
            return existing.clone();
        }

        self.last_type_id += 1;
        let resource_type = BaseResourceTypeRef {
            id: self.last_type_id,
            name: name.to_string(),
        };
        self.base_resource_types
            .insert(name.to_string(), resource_type.clone());
        resource_type
    }

    pub(crate) fn find_base_resource_type(&self, name: &str) -> Option<BaseResourceTypeRef> {
        self.base_resource_types.get(name).cloned()
    }

    pub(crate) fn records(&self) -> &[VolumeRecord] {
        &self.volumes
    }
}
