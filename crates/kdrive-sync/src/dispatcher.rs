//! Bounded transfer dispatch
//!
//! Provides [`TransferDispatcher`], the single entry point through which
//! the watcher, the poller and the initial reconciliation start transfers.
//!
//! ## Architecture
//!
//! ```text
//!  LocalChangeWatcher ──┐   dispatch()    ┌──────────────────────────┐
//!                       ├───────────────► │   TransferDispatcher     │
//!  CloudPoller ─────────┘                 │                          │
//!                                         │  in_flight: DashMap      │──► Rerun / AlreadyInFlight
//!                                         │  semaphore: permits      │──► (caller waits)
//!                                         │  tracker: TaskTracker    │
//!                                         └──────────────────────────┘
//!                                                      │ spawn
//!                                                      ▼
//!                                              TransferExecutor
//! ```
//!
//! - **Per-file serialization**: the in-flight registry is keyed by filename
//!   and covers both directions, so at most one transfer per file is queued
//!   or running at any time. An upload requested while the same file is
//!   already uploading marks the entry for a rerun: the upload runs once
//!   more after the current one finishes, reading the file afresh. An upload
//!   that finds the local file modified since it was read also runs again.
//!   Any other request for a registered file is coalesced into it.
//! - **Concurrency limiting**: a transfer starts only once it holds a
//!   semaphore permit. `dispatch` waits for the permit before returning,
//!   which is the backpressure signal to the triggering loop.
//! - **Shutdown**: [`stop_accepting`](TransferDispatcher::stop_accepting)
//!   refuses new work and releases waiting callers;
//!   [`drain`](TransferDispatcher::drain) waits for running transfers up to
//!   a deadline and then aborts the rest.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use kdrive_core::domain::Filename;

use crate::filesystem::temp_path_for;
use crate::transfer::{TransferExecutor, TransferJob};

/// Result of a dispatch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The transfer holds a permit and has been started
    Dispatched,
    /// An upload of the same file is running and will run once more after it
    Rerun,
    /// A transfer for the same filename is already queued or running
    AlreadyInFlight,
    /// The dispatcher no longer accepts work
    ShuttingDown,
}

/// Semaphore-gated, per-filename deduplicated dispatcher
#[derive(Clone)]
pub struct TransferDispatcher {
    executor: Arc<TransferExecutor>,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<DashMap<Filename, InFlight>>,
    tracker: TaskTracker,
    accepting: CancellationToken,
    abort: CancellationToken,
}

impl TransferDispatcher {
    /// Creates a dispatcher running at most `max_concurrent` transfers
    pub fn new(executor: Arc<TransferExecutor>, max_concurrent: usize) -> Self {
        Self {
            executor,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(DashMap::new()),
            tracker: TaskTracker::new(),
            accepting: CancellationToken::new(),
            abort: CancellationToken::new(),
        }
    }

    /// Registers `job` and starts it once a permit is free
    pub async fn dispatch(&self, job: TransferJob) -> Submission {
        if self.accepting.is_cancelled() {
            return Submission::ShuttingDown;
        }

        let name = job.filename().clone();
        match self.in_flight.entry(name.clone()) {
            Entry::Occupied(mut existing) => {
                let entry = existing.get_mut();
                if entry.job.is_upload() && job.is_upload() {
                    entry.rerun = true;
                    debug!(filename = %name, "Upload in flight, scheduling another run");
                    return Submission::Rerun;
                }
                debug!(
                    filename = %name,
                    requested = job.kind(),
                    running = entry.job.kind(),
                    "Transfer already in flight, coalescing"
                );
                return Submission::AlreadyInFlight;
            }
            Entry::Vacant(slot) => {
                slot.insert(InFlight {
                    job: job.clone(),
                    rerun: false,
                });
            }
        }
        let registration = Registration {
            in_flight: Arc::clone(&self.in_flight),
            name,
        };

        let permit = tokio::select! {
            permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return Submission::ShuttingDown,
            },
            _ = self.accepting.cancelled() => return Submission::ShuttingDown,
        };

        let executor = Arc::clone(&self.executor);
        let in_flight = Arc::clone(&self.in_flight);
        let abort = self.abort.clone();
        self.tracker.spawn(async move {
            let _permit = permit;
            let _registration = registration;

            tokio::select! {
                _ = run_until_settled(&executor, &in_flight, &job) => {}
                _ = abort.cancelled() => {
                    warn!(filename = %job.filename(), kind = job.kind(), "Transfer aborted at shutdown");
                    if let TransferJob::Download(name) = &job {
                        let tmp = temp_path_for(executor.working_directory(), name);
                        let _ = tokio::fs::remove_file(tmp).await;
                    }
                }
            }
        });

        Submission::Dispatched
    }

    /// Returns true if a transfer for `name` is queued or running
    pub fn is_in_flight(&self, name: &Filename) -> bool {
        self.in_flight.contains_key(name)
    }

    /// Number of transfers queued or running
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Refuses new work and releases callers waiting for a permit
    pub fn stop_accepting(&self) {
        self.accepting.cancel();
    }

    /// Waits up to `grace` for running transfers, then aborts the rest
    ///
    /// Returns true if every transfer finished on its own.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.stop_accepting();
        self.tracker.close();

        let running = self.tracker.len();
        if running > 0 {
            info!(running, grace_secs = grace.as_secs_f64(), "Waiting for in-flight transfers");
        }

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    remaining = self.tracker.len(),
                    "Grace period elapsed, aborting remaining transfers"
                );
                self.abort.cancel();
                self.tracker.wait().await;
                false
            }
        }
    }
}

impl std::fmt::Debug for TransferDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferDispatcher")
            .field("in_flight", &self.in_flight.len())
            .field("available_permits", &self.semaphore.available_permits())
            .field("accepting", &!self.accepting.is_cancelled())
            .finish()
    }
}

/// Registry entry for one file
#[derive(Debug)]
struct InFlight {
    job: TransferJob,
    /// Set when another upload of the file was requested while this one ran
    rerun: bool,
}

/// Runs `job` until no rerun is pending, then unregisters the file
///
/// Unregistering happens under the registry's shard lock, so a request
/// arriving concurrently either sets the rerun flag before the check or
/// finds the slot vacant and starts its own transfer.
async fn run_until_settled(
    executor: &TransferExecutor,
    in_flight: &DashMap<Filename, InFlight>,
    job: &TransferJob,
) {
    let name = job.filename();
    loop {
        // Failures are reported by the executor itself
        let outcome = executor.execute(job).await;

        let changed = match (job, &outcome) {
            (TransferJob::Upload(_), Ok(synced)) => {
                executor.local_changed_since(name, synced.last_modified).await
            }
            _ => false,
        };
        if !changed && in_flight.remove_if(name, |_, entry| !entry.rerun).is_some() {
            return;
        }

        match in_flight.get_mut(name) {
            Some(mut entry) => entry.rerun = false,
            None => return,
        }
        debug!(filename = %name, changed, "File changed during upload, uploading again");
    }
}

/// Removes a filename from the in-flight registry when dropped
struct Registration {
    in_flight: Arc<DashMap<Filename, InFlight>>,
    name: Filename,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.in_flight.remove(&self.name);
    }
}
