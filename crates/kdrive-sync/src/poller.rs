//! Cloud poller
//!
//! Lists the bucket on a fixed interval and requests a download for every
//! key missing from the working directory. Connectivity is checked once
//! before the loop starts; the outcome, and any later degradation, is
//! published as a [`CloudState`] on a `watch` channel.
//!
//! A tick whose listing fails is skipped entirely. Nothing is downloaded
//! against a view of the bucket the poller could not confirm.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kdrive_core::domain::diff;
use kdrive_core::ports::StoreError;

use crate::dispatcher::{Submission, TransferDispatcher};
use crate::inventory::{LocalLister, RemoteLister};
use crate::transfer::TransferJob;
use crate::SyncError;

/// Cloud-side health as seen by the poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudState {
    /// The connectivity check has not finished yet
    Starting,
    /// The last listing succeeded
    Online,
    /// The last listing failed; ticks are skipped until one succeeds
    Degraded(String),
    /// The connectivity check failed; cloud polling is off
    Disabled(String),
}

impl CloudState {
    pub fn is_disabled(&self) -> bool {
        matches!(self, CloudState::Disabled(_))
    }
}

impl fmt::Display for CloudState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudState::Starting => write!(f, "starting"),
            CloudState::Online => write!(f, "online"),
            CloudState::Degraded(reason) => write!(f, "degraded: {reason}"),
            CloudState::Disabled(reason) => write!(f, "disabled: {reason}"),
        }
    }
}

/// Interval-driven download trigger
#[derive(Debug)]
pub struct CloudPoller {
    local: LocalLister,
    remote: RemoteLister,
    dispatcher: TransferDispatcher,
    interval: Duration,
    state: watch::Sender<CloudState>,
}

impl CloudPoller {
    pub fn new(
        local: LocalLister,
        remote: RemoteLister,
        dispatcher: TransferDispatcher,
        interval: Duration,
        state: watch::Sender<CloudState>,
    ) -> Self {
        Self {
            local,
            remote,
            dispatcher,
            interval,
            state,
        }
    }

    /// One lightweight listing to confirm the bucket is reachable
    ///
    /// Publishes `Online` on success and `Disabled` on failure.
    pub async fn check_connectivity(&self) -> Result<(), StoreError> {
        match self.remote.try_list().await {
            Ok(inventory) => {
                info!(
                    bucket = %self.remote.bucket(),
                    objects = inventory.len(),
                    "Cloud connectivity confirmed"
                );
                self.set_state(CloudState::Online);
                Ok(())
            }
            Err(e) => {
                error!(
                    bucket = %self.remote.bucket(),
                    error = %e,
                    "Cloud connectivity check failed, cloud polling disabled"
                );
                self.set_state(CloudState::Disabled(e.to_string()));
                Err(e)
            }
        }
    }

    /// Lists both sides and requests downloads for keys missing locally
    ///
    /// Returns the number of downloads dispatched. Fails without
    /// dispatching anything if either listing fails.
    pub async fn poll_once(&self) -> Result<usize, SyncError> {
        let remote = self.remote.try_list().await?;
        let local = self.local.try_list().await?;
        let missing = diff(&remote, &local);

        let mut dispatched = 0;
        for name in missing {
            match self.dispatcher.dispatch(TransferJob::Download(name)).await {
                Submission::Dispatched => dispatched += 1,
                Submission::Rerun | Submission::AlreadyInFlight => {}
                Submission::ShuttingDown => break,
            }
        }
        Ok(dispatched)
    }

    /// Ticks every interval until `shutdown` is cancelled
    ///
    /// The first tick fires one interval after the call. Does not check
    /// connectivity; callers run [`check_connectivity`](Self::check_connectivity)
    /// first.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Cloud poller starting");

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, cloud poller stopping");
                    break;
                }

                _ = ticker.tick() => {
                    let stopped = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => true,
                        _ = self.tick() => false,
                    };
                    if stopped {
                        info!("Shutdown requested during a tick, cloud poller stopping");
                        break;
                    }
                }
            }
        }

        info!("Cloud poller stopped");
    }

    async fn tick(&self) {
        match self.poll_once().await {
            Ok(dispatched) => {
                if dispatched > 0 {
                    info!(dispatched, "Requested downloads for objects missing locally");
                } else {
                    debug!("Working directory up to date");
                }
                self.set_state(CloudState::Online);
            }
            Err(SyncError::Store(e)) => {
                warn!(error = %e, "Remote listing failed, skipping this tick");
                self.set_state(CloudState::Degraded(e.to_string()));
            }
            Err(e) => {
                warn!(error = %e, "Local listing failed, skipping this tick");
            }
        }
    }

    fn set_state(&self, state: CloudState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                info!(state = %state, "Cloud state changed");
                *current = state;
                true
            }
        });
    }
}
