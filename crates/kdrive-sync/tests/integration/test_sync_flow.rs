//! End-to-end flows: uploads, downloads, convergence and deduplication

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kdrive_core::domain::{BucketName, FileLocation, SyncStatus};
use kdrive_store::MemoryObjectStore;
use kdrive_sync::inventory::{LocalLister, Reconciler, RemoteLister};
use kdrive_sync::watcher::{ChangeKind, FileWatcher};
use kdrive_sync::{CloudState, SyncOrchestrator};

use crate::common::{base_config, wait_until, TestEngine, BUCKET, TIMEOUT};

#[tokio::test]
async fn test_round_trip_upload_then_download() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    let config = base_config(dir.path()).poll_interval(1).build();
    let mut engine = TestEngine::start(dir, store.clone(), config);
    assert_eq!(engine.wait_cloud_ready().await, CloudState::Online);

    engine.create_local("a.txt", b"local content").await;
    let uploaded = engine.next_terminal().await;
    assert_eq!(uploaded.filename.as_str(), "a.txt");
    assert_eq!(uploaded.status, SyncStatus::Synced);
    assert_eq!(uploaded.location, FileLocation::Cloud);
    assert_eq!(store.object(BUCKET, "a.txt").unwrap().data, b"local content");

    store.insert(BUCKET, "b.txt", b"remote content");
    let downloaded = engine.next_terminal().await;
    assert_eq!(downloaded.filename.as_str(), "b.txt");
    assert_eq!(downloaded.status, SyncStatus::Synced);
    assert_eq!(downloaded.location, FileLocation::Local);
    assert_eq!(
        std::fs::read(engine.dir.path().join("b.txt")).unwrap(),
        b"remote content"
    );

    assert!(engine.stop().await);
}

#[tokio::test]
async fn test_converged_engine_stops_transferring() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("local.txt"), b"l").unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    store.insert(BUCKET, "remote.txt", b"r");

    let config = base_config(dir.path())
        .initial_reconcile(true)
        .poll_interval(1)
        .build();
    let mut engine = TestEngine::start(dir, store.clone(), config);
    let synced = engine.terminals(2).await;
    assert!(synced.iter().all(|i| i.status == SyncStatus::Synced));

    let gets = store.get_calls();
    let puts = store.put_calls();
    let lists = store.list_calls();

    // Several poll ticks over a converged pair
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(store.list_calls() > lists);
    assert_eq!(store.get_calls(), gets);
    assert_eq!(store.put_calls(), puts);

    let reconciler = Reconciler::new(
        LocalLister::new(engine.dir.path()),
        RemoteLister::new(store.clone(), BucketName::new(BUCKET).unwrap()),
    );
    assert!(reconciler.reconcile().await.unwrap().is_converged());
    assert_eq!(engine.local_files(), vec!["local.txt", "remote.txt"]);

    assert!(engine.stop().await);
}

#[tokio::test]
async fn test_burst_of_events_uploads_each_file_once() {
    const FILES: usize = 20;
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    store.set_latency(Duration::from_millis(20));
    let config = base_config(dir.path()).max_concurrent_transfers(3).build();
    let mut engine = TestEngine::start(dir, store.clone(), config);
    engine.wait_cloud_ready().await;

    for i in 0..FILES {
        engine.create_local(&format!("file-{i:02}.txt"), b"x").await;
    }

    let results = engine.terminals(FILES).await;
    assert!(results.iter().all(|i| i.status == SyncStatus::Synced));
    let mut names: Vec<String> = results.iter().map(|i| i.filename.to_string()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), FILES);

    assert!(engine.stop().await);
    assert_eq!(store.put_calls(), FILES);
    assert_eq!(store.keys(BUCKET).len(), FILES);
    assert!(store.peak_in_flight() <= 3);
}

#[tokio::test]
async fn test_write_during_upload_reaches_the_bucket() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    store.set_latency(Duration::from_millis(300));
    let config = base_config(dir.path()).build();
    let mut engine = TestEngine::start(dir, store.clone(), config);
    engine.wait_cloud_ready().await;

    // The file is created before its content is complete
    engine.create_local("big.bin", b"partial").await;
    assert!(wait_until(|| store.put_calls() == 1).await);

    std::fs::write(engine.dir.path().join("big.bin"), b"partial+complete").unwrap();
    for _ in 0..3 {
        engine.notify("big.bin", ChangeKind::Write).await;
    }

    let first = engine.next_terminal().await;
    let second = engine.next_terminal().await;
    assert_eq!(first.status, SyncStatus::Synced);
    assert_eq!(second.status, SyncStatus::Synced);
    assert_eq!(second.filename.as_str(), "big.bin");

    // Once settled, further events see the final content already uploaded
    engine.notify("big.bin", ChangeKind::Write).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(engine.stop().await);
    assert_eq!(
        store.object(BUCKET, "big.bin").unwrap().data,
        b"partial+complete"
    );
    assert_eq!(store.put_calls(), 2);
}

#[tokio::test]
async fn test_ignored_events_trigger_nothing() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    let config = base_config(dir.path()).build();
    let mut engine = TestEngine::start(dir, store.clone(), config);
    engine.wait_cloud_ready().await;

    std::fs::write(engine.dir.path().join("touched.txt"), b"x").unwrap();
    engine.notify("touched.txt", ChangeKind::Other).await;
    std::fs::write(engine.dir.path().join(".partial.txt.kdrive-tmp"), b"x").unwrap();
    engine.notify(".partial.txt.kdrive-tmp", ChangeKind::Create).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(engine.stop().await);
    assert_eq!(store.put_calls(), 0);
}

#[tokio::test]
async fn test_real_file_watcher_uploads_new_file() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryObjectStore::with_bucket(BUCKET));
    let config = base_config(dir.path()).build();

    let (status_tx, mut status) = mpsc::channel(256);
    let shutdown = CancellationToken::new();
    let handle = SyncOrchestrator::new(&config, store.clone(), Arc::new(FileWatcher::new()))
        .unwrap()
        .start(status_tx, shutdown.clone());

    let mut changes = handle.cloud_state_changes();
    changes
        .wait_for(|s| *s != CloudState::Starting)
        .await
        .unwrap();

    std::fs::write(dir.path().join("watched.txt"), b"hello").unwrap();

    loop {
        let info = tokio::time::timeout(TIMEOUT, status.recv())
            .await
            .unwrap()
            .unwrap();
        if info.filename.as_str() == "watched.txt" && info.status == SyncStatus::Synced {
            break;
        }
    }

    shutdown.cancel();
    assert!(handle.join().await);
    assert_eq!(store.keys(BUCKET), vec!["watched.txt"]);
    assert_eq!(store.object(BUCKET, "watched.txt").unwrap().data, b"hello");
}
