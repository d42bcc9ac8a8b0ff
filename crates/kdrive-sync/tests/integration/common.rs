//! Shared fixtures for engine integration tests

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kdrive_core::config::{Config, ConfigBuilder};
use kdrive_core::domain::SyncInfo;
use kdrive_store::MemoryObjectStore;
use kdrive_sync::watcher::{ChangeEvent, ChangeKind, ChangeSubscription, IChangeNotifier};
use kdrive_sync::{CloudState, SyncHandle, SyncOrchestrator};

pub const BUCKET: &str = "bucket";

/// How long a test waits for any single engine reaction
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Notifier fed by the test through a channel
pub struct ScriptedNotifier {
    subscription: Mutex<Option<ChangeSubscription>>,
}

impl ScriptedNotifier {
    pub fn new() -> (Arc<Self>, mpsc::Sender<ChangeEvent>) {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (_error_tx, error_rx) = mpsc::channel(1);
        let notifier = Self {
            subscription: Mutex::new(Some(ChangeSubscription::new(event_rx, error_rx))),
        };
        (Arc::new(notifier), event_tx)
    }
}

impl IChangeNotifier for ScriptedNotifier {
    fn subscribe(&self, _path: &Path) -> anyhow::Result<ChangeSubscription> {
        self.subscription
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow::anyhow!("scripted notifier already subscribed"))
    }
}

/// Defaults tuned for fast tests: no initial pass, a long poll interval,
/// short retry delays
pub fn base_config(dir: &Path) -> ConfigBuilder {
    ConfigBuilder::new()
        .working_directory(dir.to_path_buf())
        .bucket_name(BUCKET)
        .poll_interval(60)
        .initial_reconcile(false)
        .shutdown_grace_period(2)
        .retry_base_delay_ms(10)
        .retry_max_delay_ms(50)
}

/// A running engine plus everything a test needs to drive and observe it
pub struct TestEngine {
    pub dir: TempDir,
    pub store: Arc<MemoryObjectStore>,
    pub events: mpsc::Sender<ChangeEvent>,
    pub status: mpsc::Receiver<SyncInfo>,
    pub shutdown: CancellationToken,
    handle: Option<SyncHandle>,
}

impl TestEngine {
    /// Starts an engine with a scripted notifier
    pub fn start(dir: TempDir, store: Arc<MemoryObjectStore>, config: Config) -> Self {
        let (notifier, events) = ScriptedNotifier::new();
        let (status_tx, status) = mpsc::channel(config.status.channel_capacity);
        let shutdown = CancellationToken::new();

        let handle = SyncOrchestrator::new(&config, store.clone(), notifier)
            .unwrap()
            .start(status_tx, shutdown.clone());

        Self {
            dir,
            store,
            events,
            status,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn handle(&self) -> &SyncHandle {
        self.handle.as_ref().unwrap()
    }

    /// Waits until the connectivity check has finished
    pub async fn wait_cloud_ready(&self) -> CloudState {
        self.wait_cloud_state(|s| *s != CloudState::Starting).await
    }

    /// Waits until the cloud state satisfies `f`
    pub async fn wait_cloud_state(&self, f: impl FnMut(&CloudState) -> bool) -> CloudState {
        let mut changes = self.handle().cloud_state_changes();
        let state = tokio::time::timeout(TIMEOUT, changes.wait_for(f))
            .await
            .unwrap()
            .unwrap()
            .clone();
        state
    }

    /// Writes a file into the working directory and reports it as created
    pub async fn create_local(&self, name: &str, data: &[u8]) {
        let path = self.dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        self.notify(name, ChangeKind::Create).await;
    }

    pub async fn notify(&self, name: &str, kind: ChangeKind) {
        let path = self.dir.path().join(name);
        self.events.send(ChangeEvent::new(path, kind)).await.unwrap();
    }

    /// Next `Synced` or `Failed` record, skipping in-progress ones
    pub async fn next_terminal(&mut self) -> SyncInfo {
        loop {
            let info = tokio::time::timeout(TIMEOUT, self.status.recv())
                .await
                .expect("timed out waiting for a status event")
                .expect("status channel closed");
            if info.status.is_terminal() {
                return info;
            }
        }
    }

    pub async fn terminals(&mut self, n: usize) -> Vec<SyncInfo> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.next_terminal().await);
        }
        out
    }

    /// Cancels the engine and waits for it to stop
    pub async fn stop(&mut self) -> bool {
        self.shutdown.cancel();
        let handle = self.handle.take().unwrap();
        tokio::time::timeout(TIMEOUT, handle.join()).await.unwrap()
    }

    /// Names of the regular files currently in the working directory
    pub fn local_files(&self) -> Vec<String> {
        local_files(self.dir.path())
    }
}

pub fn local_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Polls `f` until it holds or the test timeout elapses
pub async fn wait_until(mut f: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if f() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    f()
}
