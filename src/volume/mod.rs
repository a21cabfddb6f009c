//! Volume vocabulary shared by the broker and its collaborators
//!
//! - `identity`: what a caller asks for (resource cache, container mount,
//!   base resource type)
//! - `spec`: how the storage service should build the volume
//! - `domain`: the `Volume` handed back once storage confirms it exists

pub mod domain;
pub mod identity;
pub mod spec;

pub use domain::{Volume, VolumeFactory, VolumeTtl};
pub use identity::{
    BaseResourceTypeRef, CreatingContainerRef, TeamRef, UsedResourceCacheRef, VolumeIdentity,
    WorkerRef,
};
pub use spec::{VolumeProperties, VolumeSpec, VolumeStrategy};
