//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to a specific actor via mpsc
//! 2. **Outcomes**: Plain values describing what one step of an actor did

use tokio::sync::oneshot;

/// Commands that can be sent to the poll scheduler
#[derive(Debug)]
pub enum PollerCommand {
    /// Run one poll cycle immediately, bypassing the interval timer
    ///
    /// Used for testing and manual refresh.
    PollNow {
        respond_to: oneshot::Sender<PollOutcome>,
    },

    /// Get poller statistics
    GetStats {
        respond_to: oneshot::Sender<PollerStats>,
    },
}

/// What a single poll cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// First successful fetch; the window was seeded and nothing was processed
    Seeded { window: usize },

    /// Items not in the previous fetch were processed in order
    Processed { fresh: usize, window: usize },

    /// The fetch failed; the dedup window is unchanged
    FetchFailed,

    /// Cancellation arrived between items; the window was not replaced
    Interrupted { processed: usize },
}

/// Poll scheduler statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Poll cycles started
    pub cycles: u64,

    /// Cycles whose fetch failed
    pub failed_fetches: u64,

    /// New items passed through ingestion
    pub processed: u64,

    /// Size of the dedup window
    pub window: usize,
}

/// Result of offering an item to the action queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,

    /// Queue full; the item was dropped
    Dropped,

    /// The worker is gone
    Closed,
}

/// Commands that can be sent to the item storage actor
#[derive(Debug)]
pub enum StorageCommand {
    /// Flush the write buffer to the backend
    Flush {
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Get storage statistics
    GetStats {
        respond_to: oneshot::Sender<StorageStats>,
    },

    /// Flush, close the backend and stop
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Rows written to the backend
    pub rows_written: u64,

    /// Rows waiting in the write buffer
    pub buffer_size: usize,

    /// Number of flush operations performed
    pub flush_count: u64,

    /// Rows lost to failed batch inserts
    pub rows_failed: u64,

    /// Items dropped because the actor's inbox was full
    pub rows_dropped: u64,
}
