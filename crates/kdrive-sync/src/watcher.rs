//! Local change watching
//!
//! Provides the filesystem change notifier capability ([`IChangeNotifier`]),
//! its `notify`-backed implementation ([`FileWatcher`]), and the
//! [`LocalChangeWatcher`] loop that turns create/write events into upload
//! requests.
//!
//! ## Architecture
//!
//! ```text
//! inotify / kqueue / ReadDirectoryChangesW
//!       │
//!       ▼
//!  FileWatcher ──→ ChangeSubscription ──→ LocalChangeWatcher ──→ TransferDispatcher
//!                   (events + errors)        │
//!                                            └─ remote absence check (RemoteLister)
//! ```
//!
//! The watch is non-recursive: subdirectories are not synchronised. Deletes,
//! renames and metadata changes are ignored.

use std::any::Any;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::event::{CreateKind, ModifyKind};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kdrive_core::domain::Filename;

use crate::dispatcher::{Submission, TransferDispatcher};
use crate::filesystem::is_temp_artifact;
use crate::inventory::RemoteLister;
use crate::transfer::TransferJob;

/// Capacity of the event channel between the OS watcher and the loop
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Capacity of the notifier error channel
const ERROR_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// ChangeEvent
// ============================================================================

/// Kind of a filesystem notification, reduced to what the engine acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// File content was written
    Write,
    /// A file was created
    Create,
    /// Anything else (delete, rename, metadata, directory events)
    Other,
}

/// One filesystem notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

// ============================================================================
// IChangeNotifier
// ============================================================================

/// An open notification stream for one directory
///
/// Dropping the subscription (or calling [`close`](ChangeSubscription::close))
/// stops the underlying watch; the event channel then closes.
pub struct ChangeSubscription {
    pub events: mpsc::Receiver<ChangeEvent>,
    pub errors: mpsc::Receiver<String>,
    _guard: Option<Box<dyn Any + Send>>,
}

impl ChangeSubscription {
    pub fn new(events: mpsc::Receiver<ChangeEvent>, errors: mpsc::Receiver<String>) -> Self {
        Self {
            events,
            errors,
            _guard: None,
        }
    }

    /// Keeps `guard` alive for as long as the subscription
    pub fn with_guard(mut self, guard: impl Any + Send) -> Self {
        self._guard = Some(Box::new(guard));
        self
    }

    /// Stops the watch
    pub fn close(self) {
        drop(self);
    }
}

impl std::fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSubscription")
            .field("guarded", &self._guard.is_some())
            .finish()
    }
}

/// Port for filesystem change notification
pub trait IChangeNotifier: Send + Sync {
    /// Starts watching `path` and returns the notification streams
    fn subscribe(&self, path: &Path) -> Result<ChangeSubscription>;
}

// ============================================================================
// FileWatcher
// ============================================================================

/// [`IChangeNotifier`] backed by the OS-native mechanism via `notify`
///
/// Each subscription owns its own `RecommendedWatcher`. The watcher
/// callback runs on a thread owned by `notify` and forwards mapped events
/// with `blocking_send`, so a slow consumer slows the watcher instead of
/// losing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileWatcher;

impl FileWatcher {
    pub fn new() -> Self {
        Self
    }
}

impl IChangeNotifier for FileWatcher {
    fn subscribe(&self, path: &Path) -> Result<ChangeSubscription> {
        let (event_tx, event_rx) = mpsc::channel::<ChangeEvent>(EVENT_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel::<String>(ERROR_CHANNEL_CAPACITY);

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if let Some(change) = map_notify_event(&event) {
                        if let Err(e) = event_tx.blocking_send(change) {
                            debug!(error = %e, "Change event receiver dropped");
                        }
                    }
                }
                Err(err) => {
                    if error_tx.try_send(err.to_string()).is_err() {
                        error!(error = %err, "File watcher error");
                    }
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch path: {}", path.display()))?;
        info!(path = %path.display(), "Watching working directory");

        Ok(ChangeSubscription::new(event_rx, error_rx).with_guard(watcher))
    }
}

/// Converts a `notify::Event` into a [`ChangeEvent`]
///
/// - `Create(File | Any | Other)` -> `Create`
/// - `Modify(Data(*) | Any)` -> `Write`
/// - everything else, including directory creation and renames -> `Other`
///
/// Returns `None` for events without paths.
fn map_notify_event(event: &notify::Event) -> Option<ChangeEvent> {
    let path = event.paths.first()?.clone();

    let kind = match &event.kind {
        EventKind::Create(CreateKind::Folder) => ChangeKind::Other,
        EventKind::Create(_) => ChangeKind::Create,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            ChangeKind::Write
        }
        _ => ChangeKind::Other,
    };

    Some(ChangeEvent { path, kind })
}

// ============================================================================
// LocalChangeWatcher
// ============================================================================

/// Turns create/write notifications into upload requests
///
/// A candidate is forwarded only if the bucket does not already hold a key
/// with the same name, or if a transfer of that file is still in flight (an
/// upload then runs once more). The absence check uses the lenient remote listing:
/// when the listing fails the candidate is still forwarded, and the
/// transfer's own retry and `Failed` status surface the fault.
#[derive(Debug)]
pub struct LocalChangeWatcher {
    remote: RemoteLister,
    dispatcher: TransferDispatcher,
}

impl LocalChangeWatcher {
    pub fn new(remote: RemoteLister, dispatcher: TransferDispatcher) -> Self {
        Self { remote, dispatcher }
    }

    /// Runs until the event stream closes or `shutdown` is cancelled
    pub async fn run(self, mut subscription: ChangeSubscription, shutdown: CancellationToken) {
        info!("Local change watcher starting");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, local change watcher stopping");
                    break;
                }

                event = subscription.events.recv() => match event {
                    Some(event) => {
                        let stopped = tokio::select! {
                            biased;
                            _ = shutdown.cancelled() => true,
                            _ = self.handle(event) => false,
                        };
                        if stopped {
                            info!("Shutdown requested while handling an event, local change watcher stopping");
                            break;
                        }
                    }
                    None => {
                        info!("Change notification stream closed");
                        break;
                    }
                },

                Some(err) = subscription.errors.recv() => {
                    warn!(error = %err, "Change notifier reported an error");
                }
            }
        }

        subscription.close();
        info!("Local change watcher stopped");
    }

    /// Applies one notification; returns the upload submission if one was made
    pub async fn handle(&self, event: ChangeEvent) -> Option<Submission> {
        let name = self.candidate(&event)?;

        // A running upload may have read the file before this change
        if !self.dispatcher.is_in_flight(&name) {
            let remote = self.remote.list().await;
            if remote.contains(&name) {
                debug!(filename = %name, "Already present in bucket, not uploading");
                return None;
            }
        }

        let submission = self.dispatcher.dispatch(TransferJob::Upload(name.clone())).await;
        debug!(filename = %name, ?submission, "Upload requested");
        Some(submission)
    }

    fn candidate(&self, event: &ChangeEvent) -> Option<Filename> {
        if !matches!(event.kind, ChangeKind::Write | ChangeKind::Create) {
            return None;
        }
        let name = Filename::from_event_path(&event.path)?;
        if is_temp_artifact(name.as_str()) {
            return None;
        }
        Some(name)
    }
}
