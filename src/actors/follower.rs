//! FollowerPoller - Samples the monitored actor's follower count
//!
//! Runs on its own, coarser interval and appends each successful sample to
//! the aggregator's series. A failed fetch is logged and skipped; the next
//! tick simply tries again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::ActorId;
use crate::feed::FeedClient;

use super::aggregator::StatsAggregator;

pub struct FollowerPoller {
    feed: Arc<dyn FeedClient>,
    actor: ActorId,
    aggregator: StatsAggregator,
    cancel: CancellationToken,
    period: Duration,
}

impl FollowerPoller {
    pub fn new(
        feed: Arc<dyn FeedClient>,
        actor: ActorId,
        aggregator: StatsAggregator,
        cancel: CancellationToken,
        period: Duration,
    ) -> Self {
        Self {
            feed,
            actor,
            aggregator,
            cancel,
            period,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    #[instrument(skip(self), fields(actor = %self.actor))]
    pub async fn run(self) {
        debug!("starting follower poller (period {:?})", self.period);

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                _ = ticker.tick() => {
                    self.sample_once().await;
                }
            }
        }

        debug!("follower poller stopped");
    }

    /// Fetch one sample; returns whether it was recorded
    pub async fn sample_once(&self) -> bool {
        match self.feed.fetch_actor_stat(self.actor).await {
            Ok(followers) => {
                trace!("follower sample: {followers}");
                self.aggregator.sample_secondary(followers);
                true
            }
            Err(e) => {
                warn!("failed to fetch follower count: {e}");
                false
            }
        }
    }
}
