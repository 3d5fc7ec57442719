//! Actor-based monitoring engine
//!
//! Each loop runs as an independent tokio task. Loops share nothing but the
//! [`aggregator::StatsAggregator`] and a cancellation token owned by the
//! [`crate::engine::Engine`].
//!
//! ## Architecture Overview
//!
//! ```text
//!                        ┌──────────────────┐
//!                        │      Engine      │ (lifecycle, cancellation, flush)
//!                        └────────┬─────────┘
//!                                 │ spawns
//!        ┌──────────────┬─────────┴────┬──────────────────┐
//!        │              │              │                  │
//! ┌──────▼──────┐ ┌─────▼──────┐ ┌─────▼────────┐ ┌───────▼─────────┐
//! │PollScheduler│ │ActionWorker│ │FollowerPoller│ │SummaryScheduler │
//! └──┬───┬───┬──┘ └─────▲──────┘ └─────┬────────┘ └─────────────────┘
//!    │   │   └──────────┘ bounded      │
//!    │   │              queue          │
//!    │   └────► ItemStorageActor       │
//!    │                                 │
//!    └────────► StatsAggregator ◄──────┘
//! ```
//!
//! ## Actor Types
//!
//! - **PollScheduler**: Fetches the feed, diffs against the dedup window, ingests new items
//! - **ActionWorker**: Drains the bounded action queue at a fixed pace
//! - **FollowerPoller**: Samples the follower count on a coarse interval
//! - **SummaryScheduler**: Fires flushes at the configured wall-clock minute
//! - **ItemStorageActor**: Batches observed items into the item store
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Actors with external control have an mpsc command channel
//! 2. **Queues**: Items flow to the action worker and storage actor over bounded mpsc channels
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod action;
pub mod aggregator;
pub mod dedup;
pub mod follower;
pub mod latency;
pub mod messages;
pub mod poller;
pub mod storage;
pub mod summary;
