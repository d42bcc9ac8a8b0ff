//! Store faults: retries, exhausted attempts, skipped ticks, a full status sink

use std::sync::Arc;

use tempfile::TempDir;

use kdrive_core::domain::{FileLocation, SyncStatus};
use kdrive_store::MemoryObjectStore;
use kdrive_sync::CloudState;

use crate::common::{base_config, wait_until, TestEngine, BUCKET};

#[tokio::test]
async fn test_transient_put_failures_are_retried_until_synced() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    store.fail_next_puts(2);
    let config = base_config(dir.path()).retry_max_attempts(3).build();
    let mut engine = TestEngine::start(dir, store.clone(), config);
    engine.wait_cloud_ready().await;

    engine.create_local("flaky.txt", b"data").await;

    let result = engine.next_terminal().await;
    assert_eq!(result.status, SyncStatus::Synced);
    assert_eq!(result.location, FileLocation::Cloud);
    assert_eq!(store.put_calls(), 3);
    assert_eq!(store.object(BUCKET, "flaky.txt").unwrap().data, b"data");

    assert!(engine.stop().await);
}

#[tokio::test]
async fn test_exhausted_upload_attempts_emit_failed() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    store.fail_next_puts(10);
    let config = base_config(dir.path()).retry_max_attempts(3).build();
    let mut engine = TestEngine::start(dir, store.clone(), config);
    engine.wait_cloud_ready().await;

    engine.create_local("doomed.txt", b"data").await;

    let result = engine.next_terminal().await;
    assert_eq!(result.filename.as_str(), "doomed.txt");
    assert_eq!(result.status, SyncStatus::Failed);
    assert_eq!(result.location, FileLocation::Local);
    assert!(result.error.is_some());
    assert_eq!(store.put_calls(), 3);
    assert!(store.keys(BUCKET).is_empty());

    // The engine keeps running after a failed transfer
    store.fail_next_puts(0);
    engine.create_local("next.txt", b"data").await;
    assert_eq!(engine.next_terminal().await.status, SyncStatus::Synced);

    assert!(engine.stop().await);
}

#[tokio::test]
async fn test_failed_download_leaves_no_partial_file() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    store.insert(BUCKET, "remote.bin", b"payload");
    store.fail_next_gets(10);
    let config = base_config(dir.path())
        .initial_reconcile(true)
        .retry_max_attempts(2)
        .build();
    let mut engine = TestEngine::start(dir, store.clone(), config);

    let result = engine.next_terminal().await;
    assert_eq!(result.filename.as_str(), "remote.bin");
    assert_eq!(result.status, SyncStatus::Failed);
    assert_eq!(result.location, FileLocation::Cloud);
    assert_eq!(store.get_calls(), 2);
    assert!(engine.local_files().is_empty());

    assert!(engine.stop().await);
}

#[tokio::test]
async fn test_listing_failure_skips_tick_then_recovers() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    let config = base_config(dir.path()).poll_interval(1).build();
    let mut engine = TestEngine::start(dir, store.clone(), config);
    assert_eq!(engine.wait_cloud_ready().await, CloudState::Online);

    store.set_unavailable(true);
    store.insert(BUCKET, "late.txt", b"late");

    let degraded = engine
        .wait_cloud_state(|s| matches!(s, CloudState::Degraded(_)))
        .await;
    assert!(degraded.to_string().starts_with("degraded"));
    assert_eq!(store.get_calls(), 0);
    assert!(engine.local_files().is_empty());

    store.set_unavailable(false);
    let result = engine.next_terminal().await;
    assert_eq!(result.filename.as_str(), "late.txt");
    assert_eq!(result.status, SyncStatus::Synced);
    assert_eq!(
        engine.wait_cloud_state(|s| *s == CloudState::Online).await,
        CloudState::Online
    );
    assert_eq!(
        std::fs::read(engine.dir.path().join("late.txt")).unwrap(),
        b"late"
    );

    assert!(engine.stop().await);
}

#[tokio::test]
async fn test_full_status_sink_drops_without_stalling_transfers() {
    const FILES: usize = 5;
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    for i in 0..FILES {
        store.insert(BUCKET, &format!("r{i}.txt"), b"r");
    }
    let config = base_config(dir.path())
        .initial_reconcile(true)
        .status_channel_capacity(1)
        .status_send_timeout_ms(10)
        .build();

    // Nobody reads the status channel
    let mut engine = TestEngine::start(dir, store.clone(), config);

    let dir_path = engine.dir.path().to_path_buf();
    assert!(wait_until(|| crate::common::local_files(&dir_path).len() == FILES).await);
    assert!(wait_until(|| engine.handle().status_dropped() > 0).await);
    let dropped = engine.handle().status_drop_counter();

    assert!(engine.stop().await);
    assert_eq!(store.get_calls(), FILES);

    // Downloading + Synced per file; everything but the first was dropped,
    // including records published while the engine drained
    assert_eq!(dropped.get(), (2 * FILES - 1) as u64);

    // Only the first event fit in the channel
    let mut delivered = 0;
    while engine.status.try_recv().is_ok() {
        delivered += 1;
    }
    assert_eq!(delivered, 1);
}
