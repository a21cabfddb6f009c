//! Volume identities
//!
//! An identity is the semantic key a caller asks for a volume by. Two
//! requests with equal identities on the same worker converge on the same
//! catalog record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Worker the volume lives on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerRef {
    pub name: String,
}

impl WorkerRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Team owning container and base-resource-type volumes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamRef {
    pub name: String,
}

impl TeamRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Container that is still being created and needs its volumes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CreatingContainerRef {
    pub handle: String,
}

impl CreatingContainerRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
        }
    }
}

/// Resource cache that is referenced by at least one build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsedResourceCacheRef {
    pub id: i64,
}

/// Base resource type resolved by name in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseResourceTypeRef {
    pub id: i64,
    pub name: String,
}

/// The three kinds of volume identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VolumeIdentity {
    /// Cache of a fetched resource version
    ResourceCache {
        worker: WorkerRef,
        cache: UsedResourceCacheRef,
    },
    /// Mount of a container being created
    Container {
        team: TeamRef,
        worker: WorkerRef,
        container: CreatingContainerRef,
        mount_path: String,
    },
    /// Root filesystem of a base resource type
    BaseResourceType {
        team: TeamRef,
        worker: WorkerRef,
        resource_type: BaseResourceTypeRef,
    },
}

impl VolumeIdentity {
    /// Worker the identity is scoped to
    pub fn worker(&self) -> &WorkerRef {
        match self {
            Self::ResourceCache { worker, .. }
            | Self::Container { worker, .. }
            | Self::BaseResourceType { worker, .. } => worker,
        }
    }

    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ResourceCache { .. } => "resource-cache",
            Self::Container { .. } => "container",
            Self::BaseResourceType { .. } => "base-resource-type",
        }
    }
}

impl fmt::Display for VolumeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceCache { worker, cache } => {
                write!(f, "resource-cache {} on {}", cache.id, worker.name)
            }
            Self::Container {
                team,
                worker,
                container,
                mount_path,
            } => write!(
                f,
                "container {}:{} on {} (team {})",
                container.handle, mount_path, worker.name, team.name
            ),
            Self::BaseResourceType {
                team,
                worker,
                resource_type,
            } => write!(
                f,
                "base-resource-type {} on {} (team {})",
                resource_type.name, worker.name, team.name
            ),
        }
    }
}
