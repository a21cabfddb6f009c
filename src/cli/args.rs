//! CLI argument definitions using clap derive

use crate::catalog::SavedVolume;
use crate::volume::{VolumeProperties, VolumeSpec, VolumeStrategy};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Berth - volume lifecycle broker
///
/// Finds or creates worker volumes so that each identity is backed by
/// exactly one physical volume.
#[derive(Parser, Debug)]
#[command(name = "berth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BERTH_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find, create, list and clean up volumes
    Volume(VolumeArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the volume command
#[derive(Parser, Debug)]
pub struct VolumeArgs {
    #[command(subcommand)]
    pub action: VolumeAction,
}

/// Volume subcommands
#[derive(Subcommand, Debug)]
pub enum VolumeAction {
    /// Find or create the volume mounted at a path in a container
    ForContainer {
        /// Handle of the container being created
        #[arg(long)]
        container: String,

        /// Mount path inside the container
        #[arg(long)]
        mount_path: String,

        /// Team owning the container (default: worker.team)
        #[arg(long)]
        team: Option<String>,

        #[command(flatten)]
        spec: SpecArgs,
    },

    /// Find or create the volume holding a resource cache
    ForResourceCache {
        /// Used resource cache ID
        #[arg(long)]
        cache: i64,

        #[command(flatten)]
        spec: SpecArgs,
    },

    /// Find or create the root filesystem volume of a base resource type
    ForBaseResourceType {
        /// Base resource type name (e.g. git)
        #[arg(long = "type")]
        type_name: String,

        /// Team requesting the volume (default: worker.team)
        #[arg(long)]
        team: Option<String>,

        #[command(flatten)]
        spec: SpecArgs,
    },

    /// List volumes on this worker
    List {
        /// Only volumes with this property (KEY=VALUE, repeatable)
        #[arg(short, long, value_parser = parse_property)]
        property: Vec<(String, String)>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Look a volume up by handle
    Lookup {
        /// Volume handle
        handle: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Keep the lowest-ID volume of a duplicate set and destroy the rest
    Reconcile {
        /// Catalog volumes as ID=HANDLE
        #[arg(required = true, value_parser = parse_saved_volume)]
        volumes: Vec<SavedVolume>,
    },
}

/// Volume specification flags shared by the find-or-create commands
#[derive(Args, Debug, Default)]
pub struct SpecArgs {
    /// Create a privileged volume
    #[arg(long)]
    pub privileged: bool,

    /// Copy-on-write from this parent volume handle
    #[arg(long, conflicts_with = "import")]
    pub parent: Option<String>,

    /// Populate from this tarball
    #[arg(long)]
    pub import: Option<PathBuf>,

    /// Size limit in bytes
    #[arg(long)]
    pub size_limit: Option<u64>,

    /// Volume property (KEY=VALUE, repeatable)
    #[arg(long, value_parser = parse_property)]
    pub property: Vec<(String, String)>,
}

impl SpecArgs {
    /// Build the volume spec these flags describe
    pub fn to_spec(&self) -> VolumeSpec {
        let strategy = match (&self.parent, &self.import) {
            (Some(parent), _) => VolumeStrategy::CopyOnWrite {
                parent: parent.clone(),
            },
            (None, Some(path)) => VolumeStrategy::Import { path: path.clone() },
            (None, None) => VolumeStrategy::Empty,
        };

        let mut spec = VolumeSpec::new(strategy).privileged(self.privileged);
        if let Some(bytes) = self.size_limit {
            spec = spec.with_size_limit(bytes);
        }
        spec.properties = properties(&self.property);
        spec
    }
}

/// Collect KEY=VALUE pairs into a property map
pub fn properties(pairs: &[(String, String)]) -> VolumeProperties {
    pairs.iter().cloned().collect()
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for volume listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Handles only (one per line)
    Plain,
}

/// Parse a property in KEY=VALUE format
fn parse_property(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE format: no '=' found in '{s}'"))?;
    if pos == 0 {
        return Err(format!("invalid KEY=VALUE format: empty key in '{s}'"));
    }
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Parse a catalog volume in ID=HANDLE format
fn parse_saved_volume(s: &str) -> Result<SavedVolume, String> {
    let (id, handle) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid ID=HANDLE format: no '=' found in '{s}'"))?;
    let id = id
        .parse()
        .map_err(|_| format!("invalid volume ID '{id}' in '{s}'"))?;
    if handle.is_empty() {
        return Err(format!("invalid ID=HANDLE format: empty handle in '{s}'"));
    }
    Ok(SavedVolume {
        id,
        handle: handle.to_string(),
    })
}
