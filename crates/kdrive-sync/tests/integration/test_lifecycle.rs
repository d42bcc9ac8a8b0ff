//! Startup validation, connectivity gating and shutdown

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kdrive_core::config::ConfigError;
use kdrive_core::domain::SyncStatus;
use kdrive_core::ports::IObjectStore;
use kdrive_store::MemoryObjectStore;
use kdrive_sync::watcher::ChangeKind;
use kdrive_sync::{start_sync_client, SyncError};

use crate::common::{base_config, ScriptedNotifier, TestEngine, BUCKET, TIMEOUT};

#[tokio::test]
async fn test_invalid_config_is_rejected_before_any_store_call() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    let (tx, _rx) = mpsc::channel(8);

    let config = base_config(dir.path()).bucket_name("").build();
    let (notifier, _events) = ScriptedNotifier::new();
    let result = start_sync_client(
        &config,
        store.clone(),
        notifier,
        tx.clone(),
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(
        result,
        Err(SyncError::Config(ConfigError::MissingBucketName))
    ));

    let missing = dir.path().join("missing");
    let config = base_config(&missing).build();
    let (notifier, _events) = ScriptedNotifier::new();
    let result =
        start_sync_client(&config, store.clone(), notifier, tx, CancellationToken::new()).await;
    assert!(matches!(
        result,
        Err(SyncError::Config(ConfigError::WorkingDirectoryNotFound(_)))
    ));

    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn test_connectivity_failure_disables_cloud_polling() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    store.insert(BUCKET, "remote.txt", b"r");
    store.set_unavailable(true);
    let config = base_config(dir.path())
        .initial_reconcile(true)
        .poll_interval(1)
        .build();
    let mut engine = TestEngine::start(dir, store.clone(), config);

    let state = engine.wait_cloud_ready().await;
    assert!(state.is_disabled(), "unexpected state: {state}");

    // Past several would-be ticks, nothing is listed again or fetched
    let lists = store.list_calls();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(store.list_calls(), lists);
    assert_eq!(store.get_calls(), 0);
    assert!(engine.local_files().is_empty());

    assert!(engine.stop().await);
}

#[tokio::test]
async fn test_cancellation_stops_both_loops_and_returns() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    let config = base_config(dir.path()).poll_interval(1).build();
    let (notifier, events) = ScriptedNotifier::new();
    let (tx, _rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();

    let task = {
        let shutdown = shutdown.clone();
        let store: Arc<dyn IObjectStore> = store.clone();
        tokio::spawn(async move { start_sync_client(&config, store, notifier, tx, shutdown).await })
    };

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!task.is_finished());
    assert!(store.list_calls() >= 2);

    shutdown.cancel();
    let result = tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();
    assert!(result.is_ok());

    // The watcher dropped its stream and the poller no longer ticks
    let event = kdrive_sync::watcher::ChangeEvent::new(dir.path().join("x"), ChangeKind::Create);
    assert!(events.send(event).await.is_err());
    let lists = store.list_calls();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(store.list_calls(), lists);
}

#[tokio::test]
async fn test_shutdown_aborts_transfers_past_grace_period() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    store.insert(BUCKET, "huge.bin", b"x");
    store.set_latency(Duration::from_secs(3600));
    let config = base_config(dir.path())
        .initial_reconcile(true)
        .shutdown_grace_period(1)
        .build();
    let mut engine = TestEngine::start(dir, store.clone(), config);

    let started = tokio::time::timeout(TIMEOUT, engine.status.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(started.status, SyncStatus::Downloading);
    assert_eq!(engine.handle().in_flight(), 1);

    assert!(!engine.stop().await);
    assert!(engine.local_files().is_empty());
}

#[tokio::test]
async fn test_shutdown_waits_for_short_transfers() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    store.insert(BUCKET, "small.bin", b"x");
    store.set_latency(Duration::from_millis(300));
    let config = base_config(dir.path())
        .initial_reconcile(true)
        .shutdown_grace_period(5)
        .build();
    let mut engine = TestEngine::start(dir, store.clone(), config);

    let started = tokio::time::timeout(TIMEOUT, engine.status.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(started.status, SyncStatus::Downloading);

    assert!(engine.stop().await);
    assert_eq!(engine.local_files(), vec!["small.bin"]);
    assert_eq!(engine.next_terminal().await.status, SyncStatus::Synced);
}

#[tokio::test]
async fn test_shutdown_is_bounded_while_listings_hang() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    let config = base_config(dir.path()).poll_interval(1).build();
    let mut engine = TestEngine::start(dir, store.clone(), config);
    engine.wait_cloud_ready().await;

    // Both the watcher's absence check and the next poll tick get stuck
    store.set_list_latency(Duration::from_secs(3600));
    engine.create_local("a.txt", b"a").await;
    assert!(crate::common::wait_until(|| store.list_calls() >= 3).await);

    let started = std::time::Instant::now();
    assert!(engine.stop().await);

    // Well inside the 2 second grace period plus scheduling slack
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(store.put_calls(), 0);
}
