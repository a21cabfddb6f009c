//! Volume command - find, create, list and reconcile volumes

use crate::broker::{RetryPolicy, VolumeBroker};
use crate::catalog::{JsonCatalog, SavedVolume};
use crate::cli::args::{properties, OutputFormat, VolumeAction, VolumeArgs};
use crate::config::schema::StorageBackend;
use crate::config::{Config, ConfigManager};
use crate::error::BerthResult;
use crate::lock::FileLocks;
use crate::storage::{PodmanVolumeStore, StoredVolume};
use crate::ui::{self, UiContext};
use crate::volume::{CreatingContainerRef, TeamRef, UsedResourceCacheRef, Volume, WorkerRef};
use console::style;
use std::sync::Arc;
use tracing::debug;

/// Execute the volume command
pub async fn execute(args: VolumeArgs, config: &Config) -> BerthResult<()> {
    let broker = open_broker(config).await?;

    match args.action {
        VolumeAction::ForContainer {
            container,
            mount_path,
            team,
            spec,
        } => {
            let team = team_or_default(team, config);
            let volume = broker
                .find_or_create_volume_for_container(
                    &spec.to_spec(),
                    &CreatingContainerRef::new(container),
                    &team,
                    &mount_path,
                )
                .await?;
            print_ready(&volume);
        }
        VolumeAction::ForResourceCache { cache, spec } => {
            let volume = broker
                .find_or_create_volume_for_resource_cache(
                    &spec.to_spec(),
                    &UsedResourceCacheRef { id: cache },
                )
                .await?;
            print_ready(&volume);
        }
        VolumeAction::ForBaseResourceType {
            type_name,
            team,
            spec,
        } => {
            let team = team_or_default(team, config);
            let volume = broker
                .find_or_create_volume_for_base_resource_type(&spec.to_spec(), &team, &type_name)
                .await?;
            print_ready(&volume);
        }
        VolumeAction::List { property, format } => {
            let volumes = broker.list_volumes(&properties(&property)).await?;
            print_volumes(&volumes, format)?;
        }
        VolumeAction::Lookup { handle, format } => match broker.lookup_volume(&handle).await? {
            Some(volume) => print_volumes(std::slice::from_ref(&volume), format)?,
            None => {
                let ctx = UiContext::detect();
                ui::step_warn_hint(
                    &ctx,
                    &format!("Volume {} not found", handle),
                    "Run: berth volume list",
                );
            }
        },
        VolumeAction::Reconcile { volumes } => reconcile(&broker, &volumes).await?,
    }

    Ok(())
}

/// Wire the broker to the configured catalog, locks and storage
async fn open_broker(config: &Config) -> BerthResult<VolumeBroker> {
    ConfigManager::ensure_state_dirs(config).await?;

    let catalog = JsonCatalog::open(
        ConfigManager::catalog_path(config),
        &config.worker.base_resource_types,
    )
    .await?;
    let locks = FileLocks::new(ConfigManager::locks_dir(config));

    let broker = VolumeBroker::new(
        Arc::new(catalog),
        Arc::new(locks),
        WorkerRef::new(config.worker.name.clone()),
    )
    .with_retry(RetryPolicy::from_config(&config.broker));

    let broker = match config.storage.backend {
        StorageBackend::Podman => {
            debug!("Using podman at {}", config.storage.podman_path.display());
            broker.with_store(Arc::new(PodmanVolumeStore::new(
                config.storage.podman_path.clone(),
            )))
        }
        StorageBackend::None => {
            debug!("No volume storage configured");
            broker
        }
    };

    Ok(broker)
}

fn team_or_default(team: Option<String>, config: &Config) -> TeamRef {
    TeamRef::new(team.unwrap_or_else(|| config.worker.team.clone()))
}

async fn reconcile(broker: &VolumeBroker, volumes: &[SavedVolume]) -> BerthResult<()> {
    let ctx = UiContext::detect();

    if let Some(result) = broker.select_lowest_id_volume(volumes).await? {
        ui::step_ok_detail(
            &ctx,
            &format!("Kept volume {}", result.kept.id),
            &result.kept.handle,
        );
        if !result.expired.is_empty() {
            ui::remark(
                &ctx,
                &format!("{} redundant volume(s) expired", result.expired.len()),
            );
        }
    }

    Ok(())
}

fn print_ready(volume: &Volume) {
    let ctx = UiContext::detect();

    if ctx.use_fancy_output() {
        ui::step_ok_detail(&ctx, "Volume ready", volume.handle());
        ui::key_value(&ctx, "path", &volume.path().display().to_string());
        ui::key_value(&ctx, "strategy", &volume.strategy().to_string());
        ui::key_value(&ctx, "ttl", &volume.ttl().to_string());
    } else {
        println!("{}", volume.handle());
    }
}

fn print_volumes(volumes: &[Volume], format: OutputFormat) -> BerthResult<()> {
    if volumes.is_empty() {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => {
                let ctx = UiContext::detect();
                ui::step_info(&ctx, "No volumes found");
            }
        }
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_table(volumes),
        OutputFormat::Json => print_json(volumes)?,
        OutputFormat::Plain => print_plain(volumes),
    }

    Ok(())
}

fn print_table(volumes: &[Volume]) {
    let ctx = UiContext::detect();
    ui::intro(&ctx, "Volumes");

    println!(
        "{:<38} {:<8} {:<5} {:<17} {:<30}",
        style("HANDLE").bold(),
        style("STRATEGY").bold(),
        style("PRIV").bold(),
        style("CREATED").bold(),
        style("PROPERTIES").bold()
    );
    println!("{}", "-".repeat(101));

    for volume in volumes {
        let stored = volume.stored();
        let privileged = if stored.privileged {
            style("yes").yellow()
        } else {
            style("no").dim()
        };
        let created = stored.created_at.format("%Y-%m-%d %H:%M").to_string();
        let props = stored
            .properties
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");

        println!(
            "{:<38} {:<8} {:<5} {:<17} {:<30}",
            stored.handle,
            stored.strategy.as_label(),
            privileged,
            created,
            props
        );
    }

    println!();
    println!("{} volume(s)", volumes.len());
}

fn print_json(volumes: &[Volume]) -> BerthResult<()> {
    let stored: Vec<&StoredVolume> = volumes.iter().map(Volume::stored).collect();
    let json = serde_json::to_string_pretty(&stored)?;
    println!("{}", json);
    Ok(())
}

fn print_plain(volumes: &[Volume]) {
    for volume in volumes {
        println!("{}", volume.handle());
    }
}
