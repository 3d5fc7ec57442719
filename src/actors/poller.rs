//! PollScheduler - Fetches the feed and forwards new items
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → fetch items → diff against dedup window → ingest each new item → replace window
//!     ↑                                                    │
//!     └─── Commands (PollNow, GetStats)                    ├→ StatsAggregator
//!                                                          ├→ ItemRecorder
//!                                                          ├→ trigger / LatencyReporter
//!                                                          └→ ActionHandle (non-blocking)
//! ```
//!
//! The first successful fetch only seeds the window; items that existed
//! before the monitor started are never processed. A failed fetch leaves the
//! window untouched so the next good fetch is diffed against the last known
//! state.
//!
//! ## Cancellation
//!
//! The loop checks the cancellation token before waiting on its timer and
//! between new items. A fetch that is already in flight finishes first.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::feed::FeedClient;
use crate::storage::ItemRecorder;
use crate::util::now_secs;
use crate::{FeedIdentity, Item};

use super::action::ActionHandle;
use super::aggregator::StatsAggregator;
use super::dedup::DedupWindow;
use super::latency::LatencyReporter;
use super::messages::{PollOutcome, PollerCommand, PollerStats};

/// Source of observation timestamps, seconds since epoch
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Items whose payload matches `pattern` get a latency report
pub struct Trigger {
    pub pattern: Regex,
    pub reporter: LatencyReporter,

    /// Post the report as a reply instead of only logging it
    pub reply: bool,
}

/// Actor that polls one feed container
pub struct PollScheduler {
    feed: Arc<dyn FeedClient>,
    identity: FeedIdentity,
    aggregator: StatsAggregator,
    recorder: Option<Arc<dyn ItemRecorder>>,
    trigger: Option<Trigger>,

    /// Producer side of the action queue; dropped when the loop exits
    actions: Option<ActionHandle>,

    window: DedupWindow,
    command_rx: mpsc::Receiver<PollerCommand>,
    cancel: CancellationToken,
    period: Duration,
    clock: Clock,
    stats: PollerStats,
}

impl PollScheduler {
    /// Create a scheduler and the handle used to command it
    pub fn new(
        feed: Arc<dyn FeedClient>,
        identity: FeedIdentity,
        aggregator: StatsAggregator,
        cancel: CancellationToken,
        period: Duration,
    ) -> (Self, PollerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let scheduler = Self {
            feed,
            identity,
            aggregator,
            recorder: None,
            trigger: None,
            actions: None,
            window: DedupWindow::new(),
            command_rx: cmd_rx,
            cancel,
            period,
            clock: Arc::new(now_secs),
            stats: PollerStats::default(),
        };

        (scheduler, PollerHandle { sender: cmd_tx })
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn ItemRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_actions(mut self, actions: ActionHandle) -> Self {
        self.actions = Some(actions);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Spawn the scheduler's loop
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the actor's main loop until cancelled
    #[instrument(skip(self), fields(feed = %self.identity))]
    pub async fn run(mut self) {
        debug!("starting poll scheduler (period {:?})", self.period);

        let cancel = self.cancel.clone();
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("cancellation observed");
                    break;
                }

                _ = ticker.tick() => {
                    self.poll_once().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PollerCommand::PollNow { respond_to } => {
                            debug!("received PollNow command");
                            let outcome = self.poll_once().await;
                            let _ = respond_to.send(outcome);
                        }

                        PollerCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.stats());
                        }
                    }
                }
            }
        }

        // closes the action queue; the worker drains what is left
        self.actions.take();
        debug!(
            "poll scheduler stopped after {} cycles ({} items processed)",
            self.stats.cycles, self.stats.processed
        );
    }

    /// Run one poll cycle
    ///
    /// New items are stamped as observed when the fetch returns, so the fetch
    /// itself counts towards their delay.
    #[instrument(skip(self), fields(feed = %self.identity))]
    pub async fn poll_once(&mut self) -> PollOutcome {
        self.stats.cycles += 1;

        let fetched = match self.feed.fetch_items(&self.identity).await {
            Ok(items) => items,
            Err(e) => {
                self.stats.failed_fetches += 1;
                warn!("fetch failed, keeping dedup window: {e}");
                return PollOutcome::FetchFailed;
            }
        };
        let observed_at = (self.clock)();

        if !self.window.is_seeded() {
            self.window.replace(&fetched);
            debug!("dedup window seeded with {} items", self.window.len());
            return PollOutcome::Seeded {
                window: self.window.len(),
            };
        }

        let fresh = self.window.diff(&fetched);
        trace!("{} fetched, {} new", fetched.len(), fresh.len());

        let mut processed = 0;
        for item in &fresh {
            if self.cancel.is_cancelled() {
                debug!("cancelled after {processed} of {} new items", fresh.len());
                return PollOutcome::Interrupted { processed };
            }
            self.ingest(item, observed_at).await;
            processed += 1;
        }

        self.window.replace(&fetched);
        PollOutcome::Processed {
            fresh: processed,
            window: self.window.len(),
        }
    }

    /// Hand one new item to every consumer, in a fixed order
    async fn ingest(&mut self, item: &Item, observed_at: i64) {
        self.stats.processed += 1;
        self.aggregator.record(item, observed_at);

        if let Some(recorder) = &self.recorder {
            recorder.record_item(item, observed_at);
        }

        if let Some(trigger) = self.trigger.as_mut() {
            if trigger.pattern.is_match(&item.payload) {
                if let Some(message) = trigger.reporter.report(item, observed_at) {
                    if trigger.reply {
                        match self.feed.post_reply(item, &message).await {
                            Ok(()) => info!("replied to item {}: {message}", item.id),
                            Err(e) => warn!("failed to reply to item {}: {e}", item.id),
                        }
                    } else {
                        info!("item {} from {}: {message}", item.id, item.actor_name);
                    }
                }
            }
        }

        if let Some(actions) = &self.actions {
            actions.try_enqueue(item.clone());
        }
    }

    pub fn stats(&self) -> PollerStats {
        PollerStats {
            window: self.window.len(),
            ..self.stats
        }
    }
}

/// Handle for controlling a PollScheduler
#[derive(Debug, Clone)]
pub struct PollerHandle {
    sender: mpsc::Sender<PollerCommand>,
}

impl PollerHandle {
    /// Run a poll cycle now; `None` once the scheduler has stopped
    pub async fn poll_now(&self) -> Option<PollOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::PollNow { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    pub async fn get_stats(&self) -> Option<PollerStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }
}
