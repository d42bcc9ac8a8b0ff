//! Sync orchestrator
//!
//! Owns the engine lifecycle. [`SyncOrchestrator::start`] wires the local
//! change watcher and the cloud poller into one [`TransferDispatcher`] and
//! returns a [`SyncHandle`]. Both loops and the dispatcher are bound to a
//! single `CancellationToken`:
//!
//! 1. the token is cancelled
//! 2. the dispatcher stops accepting work and waiting callers are released
//! 3. both loops exit
//! 4. in-flight transfers get `shutdown_grace_period` to finish
//! 5. whatever is still running is aborted

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use kdrive_core::config::Config;
use kdrive_core::domain::SyncInfo;
use kdrive_core::ports::IObjectStore;

use crate::dispatcher::{Submission, TransferDispatcher};
use crate::inventory::{LocalLister, Reconciler, RemoteLister};
use crate::poller::{CloudPoller, CloudState};
use crate::settings::SyncSettings;
use crate::status::{DropCounter, StatusPublisher};
use crate::transfer::{TransferExecutor, TransferJob};
use crate::watcher::{IChangeNotifier, LocalChangeWatcher};
use crate::SyncError;

// ============================================================================
// SyncOrchestrator
// ============================================================================

/// Validated, not yet running engine
pub struct SyncOrchestrator {
    settings: SyncSettings,
    store: Arc<dyn IObjectStore>,
    notifier: Arc<dyn IChangeNotifier>,
}

impl SyncOrchestrator {
    /// Validates `config` and prepares the engine
    ///
    /// Makes no store calls; an unusable configuration is rejected before
    /// anything touches the bucket.
    pub fn new(
        config: &Config,
        store: Arc<dyn IObjectStore>,
        notifier: Arc<dyn IChangeNotifier>,
    ) -> Result<Self, SyncError> {
        let settings = SyncSettings::from_config(config)?;
        Ok(Self::from_settings(settings, store, notifier))
    }

    pub fn from_settings(
        settings: SyncSettings,
        store: Arc<dyn IObjectStore>,
        notifier: Arc<dyn IChangeNotifier>,
    ) -> Self {
        Self {
            settings,
            store,
            notifier,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// A reconciler over the configured directory and bucket
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.local_lister(), self.remote_lister())
    }

    fn local_lister(&self) -> LocalLister {
        LocalLister::new(self.settings.working_directory.clone())
    }

    fn remote_lister(&self) -> RemoteLister {
        RemoteLister::new(Arc::clone(&self.store), self.settings.bucket.clone())
    }

    /// Starts both loops and returns immediately
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        self,
        status_tx: mpsc::Sender<SyncInfo>,
        shutdown: CancellationToken,
    ) -> SyncHandle {
        let settings = &self.settings;
        info!(
            working_directory = %settings.working_directory.display(),
            bucket = %settings.bucket,
            poll_interval_secs = settings.poll_interval.as_secs(),
            max_concurrent_transfers = settings.max_concurrent_transfers,
            "Starting sync engine"
        );

        let publisher = StatusPublisher::new(status_tx, settings.status_send_timeout);
        let executor = TransferExecutor::new(
            Arc::clone(&self.store),
            settings.bucket.clone(),
            settings.working_directory.clone(),
            settings.retry,
            publisher.clone(),
        );
        let dispatcher =
            TransferDispatcher::new(Arc::new(executor), settings.max_concurrent_transfers);
        let (state_tx, state_rx) = watch::channel(CloudState::Starting);

        let watcher_task = self.spawn_watcher(dispatcher.clone(), shutdown.clone());

        let poller = CloudPoller::new(
            self.local_lister(),
            self.remote_lister(),
            dispatcher.clone(),
            settings.poll_interval,
            state_tx,
        );
        let reconciler = settings.initial_reconcile.then(|| self.reconciler());
        let cloud_task = tokio::spawn(run_cloud(
            poller,
            reconciler,
            dispatcher.clone(),
            shutdown.clone(),
        ));

        let grace = settings.shutdown_grace_period;
        let supervisor = {
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                shutdown.cancelled().await;
                info!("Shutdown requested, stopping sync engine");
                dispatcher.stop_accepting();

                for (name, task) in [("watcher", watcher_task), ("cloud", Some(cloud_task))] {
                    if let Some(task) = task {
                        if let Err(e) = task.await {
                            error!(task = name, error = %e, "Sync loop ended abnormally");
                        }
                    }
                }

                let clean = dispatcher.drain(grace).await;
                info!(clean, "Sync engine stopped");
                clean
            })
        };

        SyncHandle {
            cloud_state: state_rx,
            publisher,
            dispatcher,
            shutdown,
            supervisor,
        }
    }

    fn spawn_watcher(
        &self,
        dispatcher: TransferDispatcher,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let dir: &Path = &self.settings.working_directory;
        match self.notifier.subscribe(dir) {
            Ok(subscription) => {
                let watcher = LocalChangeWatcher::new(self.remote_lister(), dispatcher);
                Some(tokio::spawn(watcher.run(subscription, shutdown)))
            }
            Err(e) => {
                let err_msg = format!("{e:#}");
                error!(
                    path = %dir.display(),
                    error = %err_msg,
                    "Failed to start change notifier, local changes will not be uploaded"
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Connectivity check, optional initial pass, then the poll loop
async fn run_cloud(
    poller: CloudPoller,
    reconciler: Option<Reconciler>,
    dispatcher: TransferDispatcher,
    shutdown: CancellationToken,
) {
    let connected = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return,
        result = poller.check_connectivity() => result.is_ok(),
    };
    if !connected {
        return;
    }

    if let Some(reconciler) = reconciler {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            _ = initial_pass(&reconciler, &dispatcher) => {}
        }
    }

    poller.run(shutdown).await;
}

async fn initial_pass(reconciler: &Reconciler, dispatcher: &TransferDispatcher) {
    let diff = match reconciler.reconcile().await {
        Ok(diff) => diff,
        Err(e) => {
            warn!(error = %e, "Initial reconciliation failed, relying on the loops");
            return;
        }
    };
    if diff.is_converged() {
        info!("Initial reconciliation: already in sync");
        return;
    }

    info!(
        uploads = diff.missing_in_cloud.len(),
        downloads = diff.missing_locally.len(),
        "Initial reconciliation"
    );
    let jobs = diff
        .missing_in_cloud
        .into_iter()
        .map(TransferJob::Upload)
        .chain(diff.missing_locally.into_iter().map(TransferJob::Download));
    for job in jobs {
        if dispatcher.dispatch(job).await == Submission::ShuttingDown {
            break;
        }
    }
}

// ============================================================================
// SyncHandle
// ============================================================================

/// Handle to a running engine
#[derive(Debug)]
pub struct SyncHandle {
    cloud_state: watch::Receiver<CloudState>,
    publisher: StatusPublisher,
    dispatcher: TransferDispatcher,
    shutdown: CancellationToken,
    supervisor: JoinHandle<bool>,
}

impl SyncHandle {
    /// Current cloud-side state
    pub fn cloud_state(&self) -> CloudState {
        self.cloud_state.borrow().clone()
    }

    /// A receiver notified on every cloud state change
    pub fn cloud_state_changes(&self) -> watch::Receiver<CloudState> {
        self.cloud_state.clone()
    }

    /// Status events dropped because the sink was full or closed
    pub fn status_dropped(&self) -> u64 {
        self.publisher.dropped()
    }

    /// The drop count, still readable after [`join`](Self::join)
    pub fn status_drop_counter(&self) -> DropCounter {
        self.publisher.drop_counter()
    }

    /// Transfers currently queued or running
    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight_count()
    }

    /// Cancels the engine's token
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Waits for the engine to stop
    ///
    /// Returns true if every in-flight transfer finished within the grace
    /// period.
    pub async fn join(self) -> bool {
        match self.supervisor.await {
            Ok(clean) => clean,
            Err(e) => {
                error!(error = %e, "Sync supervisor task failed");
                false
            }
        }
    }
}

/// Validates, starts the engine and blocks until `shutdown` is cancelled
/// and the engine has stopped
pub async fn start_sync_client(
    config: &Config,
    store: Arc<dyn IObjectStore>,
    notifier: Arc<dyn IChangeNotifier>,
    status_tx: mpsc::Sender<SyncInfo>,
    shutdown: CancellationToken,
) -> Result<(), SyncError> {
    let handle = SyncOrchestrator::new(config, store, notifier)?.start(status_tx, shutdown);
    if !handle.join().await {
        warn!("Some transfers were aborted at shutdown");
    }
    Ok(())
}
