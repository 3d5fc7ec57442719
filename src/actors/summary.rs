//! Scheduled window flushes
//!
//! The summary loop wakes a few times a minute and fires once when the local
//! wall clock reaches the configured `hour:minute`. Without an hour it fires
//! every hour at `minute`.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Timelike};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::SummaryConfig;

/// How often the loop looks at the clock
const CHECK_INTERVAL: Duration = Duration::from_secs(20);

/// The wall-clock moment summaries are due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummarySchedule {
    /// `None` means every hour
    pub hour: Option<u32>,
    pub minute: u32,
}

impl SummarySchedule {
    pub fn from_config(config: &SummaryConfig) -> Self {
        Self {
            hour: config.scheduled_hour(),
            minute: config.minute,
        }
    }

    /// Whether `at` falls inside a scheduled minute
    pub fn is_due(&self, at: &DateTime<Local>) -> bool {
        at.minute() == self.minute && self.hour.is_none_or(|hour| at.hour() == hour)
    }
}

/// Identifies one wall-clock minute, so a minute fires at most once
type MinuteKey = (NaiveDate, u32, u32);

fn minute_key(at: &DateTime<Local>) -> MinuteKey {
    (at.date_naive(), at.hour(), at.minute())
}

pub struct SummaryScheduler {
    schedule: SummarySchedule,
    cancel: CancellationToken,
    last_fired: Option<MinuteKey>,
}

impl SummaryScheduler {
    pub fn new(schedule: SummarySchedule, cancel: CancellationToken) -> Self {
        Self {
            schedule,
            cancel,
            last_fired: None,
        }
    }

    /// Whether a summary should fire at `at`, marking the minute as fired
    pub fn check(&mut self, at: &DateTime<Local>) -> bool {
        if !self.schedule.is_due(at) {
            return false;
        }
        let key = minute_key(at);
        if self.last_fired == Some(key) {
            return false;
        }
        self.last_fired = Some(key);
        true
    }

    pub fn spawn<F, Fut>(self, on_due: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(self.run(on_due))
    }

    /// Call `on_due` at every scheduled minute until cancelled
    ///
    /// A summary already in progress finishes before cancellation is observed.
    #[instrument(skip(self, on_due))]
    pub async fn run<F, Fut>(mut self, mut on_due: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        debug!(
            "starting summary scheduler (hour {:?}, minute {})",
            self.schedule.hour, self.schedule.minute
        );

        let cancel = self.cancel.clone();
        let mut ticker = interval(CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = ticker.tick() => {
                    if self.check(&Local::now()) {
                        info!("scheduled summary due");
                        on_due().await;
                    }
                }
            }
        }

        debug!("summary scheduler stopped");
    }
}
