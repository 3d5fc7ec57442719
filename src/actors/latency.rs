//! Latency reports with cooldown suppression
//!
//! For items matching the trigger pattern, the reporter turns the gap between
//! emission and observation into a human-facing message. The poll period adds
//! a systematic delay, which the configured offset removes. At most one report
//! is produced per cooldown period; later qualifying items are suppressed.

use tracing::trace;

use crate::Item;
use crate::util::format_delay;

#[derive(Debug, Clone)]
pub struct LatencyReporter {
    /// Expected polling delay subtracted from every measurement
    offset: i64,

    /// Minimum seconds between two reports
    cooldown: i64,

    /// Observation time of the last report
    last_report: Option<i64>,
}

impl LatencyReporter {
    pub fn new(offset: i64, cooldown: i64) -> Self {
        Self {
            offset,
            cooldown,
            last_report: None,
        }
    }

    /// Corrected delay of an item, never negative
    pub fn corrected_delay(&self, item: &Item, observed_at: i64) -> i64 {
        ((observed_at - item.emitted_at) - self.offset).max(0)
    }

    /// Produce a report message, or `None` while the cooldown is running
    pub fn report(&mut self, item: &Item, observed_at: i64) -> Option<String> {
        let due = match self.last_report {
            None => true,
            Some(last) => observed_at - last > self.cooldown,
        };

        if !due {
            trace!("latency report for {} suppressed by cooldown", item.id);
            return None;
        }

        self.last_report = Some(observed_at);
        let delay = self.corrected_delay(item, observed_at);
        Some(format!("current delay: {}", format_delay(delay)))
    }

    pub fn last_report(&self) -> Option<i64> {
        self.last_report
    }
}
