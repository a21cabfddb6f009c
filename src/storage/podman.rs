//! Podman-backed volume store
//!
//! Each berth volume is a named podman volume whose name is the handle.
//! Spec attributes podman cannot express natively are kept as labels so
//! `lookup` and `list` can rebuild the `StoredVolume`.

use crate::error::{BerthError, BerthResult};
use crate::storage::{StoredVolume, VolumeStore};
use crate::volume::{VolumeProperties, VolumeSpec, VolumeStrategy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info};

/// Volume label keys
pub mod labels {
    /// Marks volume as managed by berth
    pub const BERTH_VOLUME: &str = "io.berth.volume";
    pub const PRIVILEGED: &str = "io.berth.privileged";
    pub const STRATEGY: &str = "io.berth.strategy";
    /// Parent handle of a copy-on-write volume
    pub const PARENT: &str = "io.berth.parent";
    /// Source path of an imported volume
    pub const IMPORT_PATH: &str = "io.berth.import-path";
    pub const SIZE_LIMIT: &str = "io.berth.size-limit";
    /// Expiry timestamp (RFC3339), set by external reapers
    pub const EXPIRES_AT: &str = "io.berth.expires-at";
    /// Prefix for user properties
    pub const PROPERTY_PREFIX: &str = "io.berth.property.";
}

/// Subset of `podman volume inspect`/`ls` JSON we rely on
#[derive(Debug, Deserialize)]
struct PodmanVolume {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Mountpoint", default)]
    mountpoint: String,
    #[serde(rename = "Labels", default)]
    labels: Option<HashMap<String, String>>,
    #[serde(rename = "CreatedAt", default)]
    created_at: Option<String>,
}

/// Volume store driving the `podman volume` subcommands
pub struct PodmanVolumeStore {
    podman: PathBuf,
}

impl PodmanVolumeStore {
    pub fn new(podman: impl Into<PathBuf>) -> Self {
        Self {
            podman: podman.into(),
        }
    }

    /// Execute a podman command and return the output
    async fn exec(&self, args: &[&str]) -> BerthResult<std::process::Output> {
        debug!("Executing: podman {:?}", args);

        Command::new(&self.podman)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BerthError::command_failed(format!("podman {:?}", args), e))
    }

    /// Execute and fail with a storage error on a non-zero exit
    async fn exec_ok(&self, handle: &str, args: &[&str]) -> BerthResult<std::process::Output> {
        let output = self.exec(args).await?;
        if output.status.success() {
            Ok(output)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BerthError::storage(handle, stderr.trim().to_string()))
        }
    }

    /// Build `podman volume create` arguments for a spec
    fn create_args(handle: &str, spec: &VolumeSpec) -> Vec<String> {
        let mut args = vec!["volume".to_string(), "create".to_string()];
        let mut label = |k: &str, v: &str| {
            args.push("--label".to_string());
            args.push(format!("{}={}", k, v));
        };

        label(labels::BERTH_VOLUME, "true");
        label(labels::PRIVILEGED, if spec.privileged { "true" } else { "false" });
        label(labels::STRATEGY, spec.strategy.as_label());
        match &spec.strategy {
            VolumeStrategy::Empty => {}
            VolumeStrategy::CopyOnWrite { parent } => label(labels::PARENT, parent),
            VolumeStrategy::Import { path } => {
                label(labels::IMPORT_PATH, &path.to_string_lossy())
            }
        }
        if let Some(limit) = spec.size_limit {
            label(labels::SIZE_LIMIT, &limit.to_string());
        }
        for (k, v) in spec.properties.iter() {
            label(&format!("{}{}", labels::PROPERTY_PREFIX, k), v);
        }

        args.push(handle.to_string());
        args
    }

    /// Populate a freshly created volume according to its strategy
    async fn populate(&self, handle: &str, strategy: &VolumeStrategy) -> BerthResult<()> {
        match strategy {
            VolumeStrategy::Empty => Ok(()),
            VolumeStrategy::Import { path } => self.import(handle, path).await,
            VolumeStrategy::CopyOnWrite { parent } => {
                // podman has no native cow volumes; clone through a tarball
                let tarball = clone_tarball(handle)?;
                let tarball_str = tarball.path().to_string_lossy().to_string();

                self.exec_ok(
                    handle,
                    &[
                        "volume",
                        "export",
                        "--output",
                        tarball_str.as_str(),
                        parent.as_str(),
                    ],
                )
                .await?;
                self.import(handle, tarball.path()).await
            }
        }
    }

    async fn import(&self, handle: &str, source: &Path) -> BerthResult<()> {
        let source = source.to_string_lossy();
        self.exec_ok(handle, &["volume", "import", handle, source.as_ref()])
            .await?;
        Ok(())
    }

    fn is_missing(stderr: &str) -> bool {
        stderr.contains("no such volume")
    }

    fn parse_volumes(stdout: &[u8]) -> BerthResult<Vec<StoredVolume>> {
        let raw: Vec<PodmanVolume> = serde_json::from_slice(stdout)?;
        Ok(raw.into_iter().map(Self::to_stored).collect())
    }

    fn to_stored(raw: PodmanVolume) -> StoredVolume {
        let label_map = raw.labels.unwrap_or_default();
        let get = |k: &str| label_map.get(k).map(String::as_str);

        let strategy = match get(labels::STRATEGY) {
            Some("cow") => VolumeStrategy::CopyOnWrite {
                parent: get(labels::PARENT).unwrap_or_default().to_string(),
            },
            Some("import") => VolumeStrategy::Import {
                path: PathBuf::from(get(labels::IMPORT_PATH).unwrap_or_default()),
            },
            _ => VolumeStrategy::Empty,
        };

        let properties: VolumeProperties = label_map
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(labels::PROPERTY_PREFIX)
                    .map(|key| (key.to_string(), v.clone()))
            })
            .collect();

        let parse_time = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        };

        StoredVolume {
            path: PathBuf::from(&raw.mountpoint),
            handle: raw.name,
            strategy,
            privileged: get(labels::PRIVILEGED) == Some("true"),
            size_limit: get(labels::SIZE_LIMIT).and_then(|s| s.parse().ok()),
            properties,
            created_at: raw
                .created_at
                .as_deref()
                .and_then(parse_time)
                .unwrap_or_else(Utc::now),
            expires_at: get(labels::EXPIRES_AT).and_then(parse_time),
        }
    }
}

impl Default for PodmanVolumeStore {
    fn default() -> Self {
        Self::new("podman")
    }
}

/// Fresh, uniquely named tarball in the temp dir, removed when dropped
fn clone_tarball(handle: &str) -> BerthResult<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(&format!("berth-{}-", handle))
        .suffix(".tar")
        .tempfile()
        .map_err(|e| BerthError::io(format!("creating clone tarball for {}", handle), e))
}

#[async_trait]
impl VolumeStore for PodmanVolumeStore {
    async fn lookup(&self, handle: &str) -> BerthResult<Option<StoredVolume>> {
        let output = self.exec(&["volume", "inspect", handle]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if Self::is_missing(&stderr) {
                return Ok(None);
            }
            return Err(BerthError::storage(handle, stderr.trim().to_string()));
        }

        Ok(Self::parse_volumes(&output.stdout)?.into_iter().next())
    }

    async fn create(&self, handle: &str, spec: &VolumeSpec) -> BerthResult<StoredVolume> {
        let args = Self::create_args(handle, spec);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.exec_ok(handle, &args).await?;

        if let Err(e) = self.populate(handle, &spec.strategy).await {
            // leave no half-populated volume behind under this handle
            if let Err(rm) = self.destroy(handle).await {
                debug!("Failed to remove unpopulated volume {}: {}", handle, rm);
            }
            return Err(e);
        }

        info!("Created podman volume {}", handle);
        self.lookup(handle)
            .await?
            .ok_or_else(|| BerthError::storage(handle, "volume vanished after creation"))
    }

    async fn list(&self, filter: &VolumeProperties) -> BerthResult<Vec<StoredVolume>> {
        let mut args = vec![
            "volume".to_string(),
            "ls".to_string(),
            "--format".to_string(),
            "json".to_string(),
            "--filter".to_string(),
            format!("label={}=true", labels::BERTH_VOLUME),
        ];
        for (k, v) in filter.iter() {
            args.push("--filter".to_string());
            args.push(format!("label={}{}={}", labels::PROPERTY_PREFIX, k, v));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let output = self.exec_ok("*", &args).await?;
        let volumes = Self::parse_volumes(&output.stdout)?;

        // label filters are re-applied locally
        Ok(volumes
            .into_iter()
            .filter(|v| v.properties.matches(filter))
            .collect())
    }

    async fn destroy(&self, handle: &str) -> BerthResult<()> {
        self.exec_ok(handle, &["volume", "rm", "--force", handle])
            .await?;
        info!("Removed podman volume {}", handle);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "podman"
    }
}
