//! Status channel publisher
//!
//! Every [`SyncInfo`] the engine emits goes through a [`StatusPublisher`].
//! The sink is a bounded `mpsc` channel owned by the presentation layer.
//! A publish waits up to the configured timeout for room; if the sink stays
//! full, or has been closed, the event is dropped and counted. The engine
//! never blocks on the sink for longer than the timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, warn};

use kdrive_core::domain::SyncInfo;

/// Publishes status records with a block-with-timeout policy
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    tx: mpsc::Sender<SyncInfo>,
    send_timeout: Duration,
    dropped: Arc<AtomicU64>,
}

impl StatusPublisher {
    pub fn new(tx: mpsc::Sender<SyncInfo>, send_timeout: Duration) -> Self {
        Self {
            tx,
            send_timeout,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sends `info`, returning false if it had to be dropped
    pub async fn publish(&self, info: SyncInfo) -> bool {
        match self.tx.send_timeout(info, self.send_timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(info)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    filename = %info.filename,
                    status = %info.status,
                    dropped = total,
                    "Status sink full, dropping event"
                );
                false
            }
            Err(SendTimeoutError::Closed(info)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    filename = %info.filename,
                    status = %info.status,
                    "Status sink closed, dropping event"
                );
                false
            }
        }
    }

    /// Number of events dropped so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// A view of the drop count that does not hold the sink open
    pub fn drop_counter(&self) -> DropCounter {
        DropCounter(Arc::clone(&self.dropped))
    }
}

/// Drop count shared with a [`StatusPublisher`], readable after it is gone
#[derive(Debug, Clone)]
pub struct DropCounter(Arc<AtomicU64>);

impl DropCounter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
