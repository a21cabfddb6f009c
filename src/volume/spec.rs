//! Volume specifications handed to the storage service

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// How the storage service should populate a new volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VolumeStrategy {
    /// Fresh empty volume
    #[default]
    Empty,
    /// Copy-on-write clone of an existing volume
    CopyOnWrite { parent: String },
    /// Populated from a path on the worker (e.g. an unpacked image)
    Import { path: PathBuf },
}

impl VolumeStrategy {
    /// Label value stored alongside the volume
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::CopyOnWrite { .. } => "cow",
            Self::Import { .. } => "import",
        }
    }
}

impl fmt::Display for VolumeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::CopyOnWrite { parent } => write!(f, "cow of {}", parent),
            Self::Import { path } => write!(f, "import from {}", path.display()),
        }
    }
}

/// Arbitrary key/value properties attached to a volume.
///
/// Also used as a filter: a volume matches when it carries every
/// key/value pair of the filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeProperties(BTreeMap<String, String>);

impl VolumeProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether these properties satisfy `filter`
    pub fn matches(&self, filter: &VolumeProperties) -> bool {
        filter
            .iter()
            .all(|(k, v)| self.0.get(k).is_some_and(|own| own == v))
    }
}

impl FromIterator<(String, String)> for VolumeProperties {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// What the caller wants the physical volume to look like
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub strategy: VolumeStrategy,
    pub privileged: bool,
    /// Size limit in bytes, if any
    pub size_limit: Option<u64>,
    pub properties: VolumeProperties,
}

impl VolumeSpec {
    pub fn new(strategy: VolumeStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn with_size_limit(mut self, bytes: u64) -> Self {
        self.size_limit = Some(bytes);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key, value);
        self
    }
}
