//! Integration tests for Berth

mod broker_tests {
    use async_trait::async_trait;
    use berth::broker::{RetryPolicy, VolumeBroker};
    use berth::catalog::{JsonCatalog, MemoryCatalog, SavedVolume, VolumeState};
    use berth::error::{BerthError, BerthResult};
    use berth::lock::{CreationLock, CreationLocks, FileLocks, MemoryLocks};
    use berth::storage::{MemoryVolumeStore, VolumeStore};
    use berth::volume::{
        CreatingContainerRef, TeamRef, UsedResourceCacheRef, VolumeIdentity, VolumeProperties,
        VolumeSpec, WorkerRef,
    };
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Refuses the first acquire as if another worker held the lock
    struct RefuseOnce {
        refused: AtomicBool,
        calls: AtomicUsize,
        inner: MemoryLocks,
    }

    impl RefuseOnce {
        fn new() -> Self {
            Self {
                refused: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
                inner: MemoryLocks::new(),
            }
        }
    }

    #[async_trait]
    impl CreationLocks for RefuseOnce {
        async fn try_acquire(&self, volume_id: i64) -> BerthResult<Option<CreationLock>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.refused.swap(true, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.try_acquire(volume_id).await
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(2), Some(500))
    }

    fn cache_identity(worker: &str, id: i64) -> VolumeIdentity {
        VolumeIdentity::ResourceCache {
            worker: WorkerRef::new(worker),
            cache: UsedResourceCacheRef { id },
        }
    }

    #[tokio::test]
    async fn concurrent_requests_create_once() {
        let catalog = Arc::new(MemoryCatalog::new());
        let locks = Arc::new(MemoryLocks::new());
        let store = Arc::new(MemoryVolumeStore::new());
        let broker = Arc::new(
            VolumeBroker::new(catalog.clone(), locks, WorkerRef::new("w1"))
                .with_store(store.clone())
                .with_retry(fast_retry()),
        );

        let calls = (0..8).map(|_| {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                broker
                    .find_or_create_volume_for_resource_cache(
                        &VolumeSpec::default(),
                        &UsedResourceCacheRef { id: 42 },
                    )
                    .await
                    .map(|v| v.handle().to_string())
            })
        });
        let handles: Vec<String> = join_all(calls)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert_eq!(store.create_calls(), 1);
        assert!(handles.iter().all(|h| h == &handles[0]));
        assert_eq!(catalog.records().len(), 1);
        assert_eq!(catalog.state_of(&handles[0]), Some(VolumeState::Created));
    }

    #[tokio::test]
    async fn creating_record_resumes_then_stays_idempotent() {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.insert(cache_identity("w1", 5), "h-crashed", VolumeState::Creating);
        let store = Arc::new(MemoryVolumeStore::new());
        let broker = VolumeBroker::new(catalog.clone(), Arc::new(MemoryLocks::new()), WorkerRef::new("w1"))
            .with_store(store.clone());

        let spec = VolumeSpec::default();
        let cache = UsedResourceCacheRef { id: 5 };
        let first = broker
            .find_or_create_volume_for_resource_cache(&spec, &cache)
            .await
            .unwrap();
        let second = broker
            .find_or_create_volume_for_resource_cache(&spec, &cache)
            .await
            .unwrap();

        assert_eq!(first.handle(), "h-crashed");
        assert_eq!(second.handle(), "h-crashed");
        assert_eq!(store.create_calls(), 1);
        assert_eq!(catalog.state_of("h-crashed"), Some(VolumeState::Created));
    }

    #[tokio::test]
    async fn created_record_never_takes_lock() {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.insert(cache_identity("w1", 9), "h-ready", VolumeState::Created);
        let store = Arc::new(MemoryVolumeStore::new());
        store.create("h-ready", &VolumeSpec::default()).await.unwrap();
        let locks = MemoryLocks::new();
        let broker = VolumeBroker::new(catalog, Arc::new(locks.clone()), WorkerRef::new("w1"))
            .with_store(store);

        let volume = broker
            .find_or_create_volume_for_resource_cache(
                &VolumeSpec::default(),
                &UsedResourceCacheRef { id: 9 },
            )
            .await
            .unwrap();

        assert_eq!(volume.handle(), "h-ready");
        assert_eq!(locks.acquire_calls(), 0);
    }

    #[tokio::test]
    async fn created_record_without_volume_is_a_consistency_error() {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.insert(cache_identity("w1", 3), "h-lost", VolumeState::Created);
        let store = Arc::new(MemoryVolumeStore::new());
        let broker = VolumeBroker::new(catalog, Arc::new(MemoryLocks::new()), WorkerRef::new("w1"))
            .with_store(store.clone());

        let err = broker
            .find_or_create_volume_for_resource_cache(
                &VolumeSpec::default(),
                &UsedResourceCacheRef { id: 3 },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, BerthError::CreatedVolumeNotFound { ref handle } if handle == "h-lost"));
        assert_eq!(store.create_calls(), 0);
    }

    #[tokio::test]
    async fn contention_retries_once() {
        let catalog = Arc::new(MemoryCatalog::new());
        let locks = Arc::new(RefuseOnce::new());
        let store = Arc::new(MemoryVolumeStore::new());
        let broker = VolumeBroker::new(catalog.clone(), locks.clone(), WorkerRef::new("w1"))
            .with_store(store.clone())
            .with_retry(fast_retry());

        broker
            .find_or_create_volume_for_resource_cache(
                &VolumeSpec::default(),
                &UsedResourceCacheRef { id: 1 },
            )
            .await
            .unwrap();

        assert_eq!(locks.calls.load(Ordering::SeqCst), 2);
        assert_eq!(catalog.create_calls(), 1);
        assert_eq!(store.create_calls(), 1);
    }

    #[tokio::test]
    async fn unbounded_wait_is_cancelled_by_timeout() {
        let catalog = Arc::new(MemoryCatalog::new());
        let id = catalog.insert(cache_identity("w1", 8), "h-busy", VolumeState::Creating);
        let locks = MemoryLocks::new();
        let _held = locks.try_acquire(id).await.unwrap().unwrap();
        let store = Arc::new(MemoryVolumeStore::new());
        let broker = VolumeBroker::new(catalog.clone(), Arc::new(locks.clone()), WorkerRef::new("w1"))
            .with_store(store.clone())
            .with_retry(RetryPolicy::unbounded(Duration::from_millis(5)));

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            broker.find_or_create_volume_for_resource_cache(
                &VolumeSpec::default(),
                &UsedResourceCacheRef { id: 8 },
            ),
        )
        .await;

        assert!(result.is_err());
        assert!(locks.acquire_calls() > 1);
        assert_eq!(store.create_calls(), 0);
        assert_eq!(catalog.state_of("h-busy"), Some(VolumeState::Creating));
    }

    #[tokio::test]
    async fn unknown_base_resource_type_fails_fast() {
        let catalog = Arc::new(MemoryCatalog::new());
        let locks = MemoryLocks::new();
        let store = Arc::new(MemoryVolumeStore::new());
        let broker = VolumeBroker::new(catalog.clone(), Arc::new(locks.clone()), WorkerRef::new("w1"))
            .with_store(store.clone());

        let err = broker
            .find_or_create_volume_for_base_resource_type(
                &VolumeSpec::default(),
                &TeamRef::new("main"),
                "no-such-type",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, BerthError::BaseResourceTypeNotFound(ref name) if name == "no-such-type"));
        assert_eq!(catalog.find_calls(), 0);
        assert_eq!(locks.acquire_calls(), 0);
        assert_eq!(store.create_calls(), 0);
        assert_eq!(store.lookup_calls(), 0);
    }

    #[tokio::test]
    async fn base_resource_type_volume_is_created() {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.register_base_resource_type("git");
        let store = Arc::new(MemoryVolumeStore::new());
        let broker = VolumeBroker::new(catalog.clone(), Arc::new(MemoryLocks::new()), WorkerRef::new("w1"))
            .with_store(store.clone());

        let spec = VolumeSpec::default().privileged(true);
        let volume = broker
            .find_or_create_volume_for_base_resource_type(&spec, &TeamRef::new("main"), "git")
            .await
            .unwrap();

        assert!(volume.is_privileged());
        assert_eq!(catalog.state_of(volume.handle()), Some(VolumeState::Created));
    }

    #[tokio::test]
    async fn container_mount_paths_get_separate_volumes() {
        let store = Arc::new(MemoryVolumeStore::new());
        let broker = VolumeBroker::new(
            Arc::new(MemoryCatalog::new()),
            Arc::new(MemoryLocks::new()),
            WorkerRef::new("w1"),
        )
        .with_store(store.clone());

        let container = CreatingContainerRef::new("c1");
        let team = TeamRef::new("main");
        let spec = VolumeSpec::default();
        let scratch = broker
            .find_or_create_volume_for_container(&spec, &container, &team, "/scratch")
            .await
            .unwrap();
        let output = broker
            .find_or_create_volume_for_container(&spec, &container, &team, "/output")
            .await
            .unwrap();
        let again = broker
            .find_or_create_volume_for_container(&spec, &container, &team, "/scratch")
            .await
            .unwrap();

        assert_ne!(scratch.handle(), output.handle());
        assert_eq!(scratch.handle(), again.handle());
        assert_eq!(store.create_calls(), 2);
    }

    #[tokio::test]
    async fn worker_without_storage_is_quiescent() {
        let broker = VolumeBroker::new(
            Arc::new(MemoryCatalog::new()),
            Arc::new(MemoryLocks::new()),
            WorkerRef::new("w1"),
        );

        assert!(broker.list_volumes(&VolumeProperties::new()).await.unwrap().is_empty());
        assert!(broker.lookup_volume("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_property() {
        let store = Arc::new(MemoryVolumeStore::new());
        store
            .create("a", &VolumeSpec::default().with_property("kind", "cache"))
            .await
            .unwrap();
        store
            .create("b", &VolumeSpec::default().with_property("kind", "scratch"))
            .await
            .unwrap();
        let broker = VolumeBroker::new(
            Arc::new(MemoryCatalog::new()),
            Arc::new(MemoryLocks::new()),
            WorkerRef::new("w1"),
        )
        .with_store(store);

        let mut filter = VolumeProperties::new();
        filter.insert("kind", "cache");
        let volumes = broker.list_volumes(&filter).await.unwrap();

        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].handle(), "a");
    }

    #[tokio::test]
    async fn reconcile_keeps_lowest_id() {
        let store = Arc::new(MemoryVolumeStore::new());
        for handle in ["h7", "h3", "h9"] {
            store.create(handle, &VolumeSpec::default()).await.unwrap();
        }
        let broker = VolumeBroker::new(
            Arc::new(MemoryCatalog::new()),
            Arc::new(MemoryLocks::new()),
            WorkerRef::new("w1"),
        )
        .with_store(store.clone());

        let volumes = [
            SavedVolume { id: 7, handle: "h7".to_string() },
            SavedVolume { id: 3, handle: "h3".to_string() },
            SavedVolume { id: 9, handle: "h9".to_string() },
        ];
        let result = broker.select_lowest_id_volume(&volumes).await.unwrap().unwrap();

        assert_eq!(result.kept.id, 3);
        assert_eq!(result.expired, vec!["h7".to_string(), "h9".to_string()]);
        assert_eq!(store.destroyed(), vec!["h7".to_string(), "h9".to_string()]);
        assert!(store.contains("h3"));
    }

    #[tokio::test]
    async fn file_backed_brokers_share_one_volume() {
        let temp = TempDir::new().unwrap();
        let catalog_path = temp.path().join("catalog.json");
        let locks_dir = temp.path().join("locks");
        std::fs::create_dir_all(&locks_dir).unwrap();
        let store = Arc::new(MemoryVolumeStore::new());

        let mut brokers = Vec::new();
        for _ in 0..4 {
            let catalog = JsonCatalog::open(&catalog_path, &["git".to_string()]).await.unwrap();
            brokers.push(Arc::new(
                VolumeBroker::new(
                    Arc::new(catalog),
                    Arc::new(FileLocks::new(&locks_dir)),
                    WorkerRef::new("w1"),
                )
                .with_store(store.clone())
                .with_retry(fast_retry()),
            ));
        }

        let calls = brokers.iter().map(|broker| {
            let broker = Arc::clone(broker);
            tokio::spawn(async move {
                broker
                    .find_or_create_volume_for_base_resource_type(
                        &VolumeSpec::default(),
                        &TeamRef::new("main"),
                        "git",
                    )
                    .await
                    .map(|v| v.handle().to_string())
            })
        });
        let handles: Vec<String> = join_all(calls)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert_eq!(store.create_calls(), 1);
        assert!(handles.iter().all(|h| h == &handles[0]));

        let records = JsonCatalog::open(&catalog_path, &[]).await.unwrap().records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, VolumeState::Created);
    }
}

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn berth() -> Command {
        cargo_bin_cmd!("berth")
    }

    /// Config with no storage and state under `dir`
    fn write_config(dir: &Path) -> PathBuf {
        let path = dir.join("config.toml");
        let content = format!(
            r#"
[worker]
name = "test-worker"

[storage]
backend = "none"

[catalog]
path = "{}"

[locks]
dir = "{}"
"#,
            dir.join("catalog.json").display(),
            dir.join("locks").display()
        );
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        berth()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Volume lifecycle broker"));
    }

    #[test]
    fn version_displays() {
        berth()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("berth"));
    }

    #[test]
    fn config_path_follows_flag() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        berth()
            .arg("--config")
            .arg(&config)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        berth()
            .arg("--config")
            .arg(&config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("test-worker"));
    }

    #[test]
    fn config_init_writes_defaults() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("nested").join("config.toml");
        berth()
            .arg("--config")
            .arg(&config)
            .args(["config", "init"])
            .assert()
            .success();
        assert!(config.exists());
    }

    #[test]
    fn list_without_storage_is_empty() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        berth()
            .arg("--config")
            .arg(&config)
            .args(["volume", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn find_or_create_without_storage_fails() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        berth()
            .arg("--config")
            .arg(&config)
            .args(["volume", "for-resource-cache", "--cache", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no volume storage configured"));
    }

    #[test]
    fn unknown_base_resource_type_fails() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        berth()
            .arg("--config")
            .arg(&config)
            .args(["volume", "for-base-resource-type", "--type", "nope"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("base resource type not found: nope"));
    }

    #[test]
    fn reconcile_requires_volumes() {
        berth().args(["volume", "reconcile"]).assert().failure();
    }

    #[test]
    fn reconcile_without_storage_expires_nothing() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path());
        berth()
            .arg("--config")
            .arg(&config)
            .args(["volume", "reconcile", "7=h7", "3=h3", "9=h9"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Kept volume 3"))
            .stdout(predicate::str::contains("expired").not());
    }
}
