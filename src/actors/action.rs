//! ActionWorker - Performs the triggered action on new items
//!
//! ## Backpressure
//!
//! The poll scheduler enqueues without waiting. When the bounded queue is
//! full the item is dropped and a warning is logged: under sustained overload
//! fresh items win over complete coverage.
//!
//! ## Pacing
//!
//! The worker takes one item at a time, calls the feed client, then sleeps
//! for the configured pacing delay. The action rate therefore never exceeds
//! one per pacing interval, whatever the arrival rate.
//!
//! ## Termination
//!
//! The worker exits once every [`ActionHandle`] is dropped and the queue is
//! drained. An item that was taken from the queue is always finished.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::Item;
use crate::feed::FeedClient;
use crate::notify::{Notifier, notify_detached};

use super::messages::EnqueueOutcome;

/// Counters shared between the handles and the worker
#[derive(Debug, Default)]
pub struct ActionStats {
    accepted: AtomicU64,
    dropped: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl ActionStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn counts(&self) -> ActionCounts {
        ActionCounts {
            accepted: self.accepted(),
            dropped: self.dropped(),
            succeeded: self.succeeded(),
            failed: self.failed(),
        }
    }
}

/// Point-in-time copy of [`ActionStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionCounts {
    pub accepted: u64,
    pub dropped: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Single consumer of the action queue
pub struct ActionWorker {
    feed: Arc<dyn FeedClient>,
    notifier: Arc<dyn Notifier>,
    queue_rx: mpsc::Receiver<Item>,
    pacing: Duration,
    stats: Arc<ActionStats>,
}

impl ActionWorker {
    /// Create a worker and the producer handle for its queue
    ///
    /// `capacity` must be at least 1.
    pub fn new(
        feed: Arc<dyn FeedClient>,
        notifier: Arc<dyn Notifier>,
        capacity: usize,
        pacing: Duration,
    ) -> (Self, ActionHandle) {
        let (queue_tx, queue_rx) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(ActionStats::default());

        let worker = Self {
            feed,
            notifier,
            queue_rx,
            pacing,
            stats: Arc::clone(&stats),
        };
        let handle = ActionHandle {
            sender: queue_tx,
            stats,
        };

        (worker, handle)
    }

    /// Create and spawn a worker, returning its handle and task
    pub fn spawn(
        feed: Arc<dyn FeedClient>,
        notifier: Arc<dyn Notifier>,
        capacity: usize,
        pacing: Duration,
    ) -> (ActionHandle, JoinHandle<()>) {
        let (worker, handle) = Self::new(feed, notifier, capacity, pacing);
        let task = tokio::spawn(worker.run());
        (handle, task)
    }

    /// Drain the queue until it is closed and empty
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting action worker (pacing {:?})", self.pacing);

        while let Some(item) = self.queue_rx.recv().await {
            self.perform(&item).await;

            if !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        debug!(
            "action worker stopped ({} succeeded, {} failed)",
            self.stats.succeeded(),
            self.stats.failed()
        );
    }

    #[instrument(skip(self, item), fields(item = %item.id))]
    async fn perform(&self, item: &Item) {
        match self.feed.perform_action(item).await {
            Ok(true) => {
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                debug!("action performed on '{}' by {}", item.payload, item.actor_name);
            }
            Ok(false) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!("action on item {} was declined", item.id);
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!("action on item {} failed: {e}", item.id);
                notify_detached(
                    &self.notifier,
                    format!("action on item {} failed: {e}", item.id),
                );
            }
        }
    }
}

/// Producer side of the action queue
#[derive(Debug, Clone)]
pub struct ActionHandle {
    sender: mpsc::Sender<Item>,
    stats: Arc<ActionStats>,
}

impl ActionHandle {
    /// Enqueue without waiting; a full queue drops the item
    pub fn try_enqueue(&self, item: Item) -> EnqueueOutcome {
        match self.sender.try_send(item) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                EnqueueOutcome::Accepted
            }
            Err(TrySendError::Full(item)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("action queue full, dropping item {}", item.id);
                EnqueueOutcome::Dropped
            }
            Err(TrySendError::Closed(item)) => {
                warn!("action queue closed, item {} not enqueued", item.id);
                EnqueueOutcome::Closed
            }
        }
    }

    pub fn stats(&self) -> Arc<ActionStats> {
        Arc::clone(&self.stats)
    }

    /// Items currently waiting in the queue
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}
