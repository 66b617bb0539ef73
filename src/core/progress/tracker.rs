use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, Stream};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::core::downloader::TransferState;

/// Percentage of `transferred` over `total`, rounded and capped at 100.
///
/// A zero total yields 0 instead of dividing by zero.
pub fn percentage(transferred: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = transferred as f64 / total as f64 * 100.0;
    ratio.round().min(100.0) as u8
}

/// One reading of a live transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    pub bytes_transferred: u64,
    /// Reported total, or the nominal one when the server sent none.
    pub total_bytes: u64,
    pub total_known: bool,
    pub percentage: u8,
}

/// Periodic sampler over a [`TransferState`].
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    state: Arc<TransferState>,
    period: Duration,
    nominal_total: u64,
}

struct Cursor {
    tracker: ProgressTracker,
    ticker: Interval,
    halt: CancellationToken,
    last_percentage: u8,
}

impl ProgressTracker {
    pub fn new(state: Arc<TransferState>, period: Duration, nominal_total: u64) -> Self {
        Self {
            state,
            period,
            nominal_total,
        }
    }

    pub fn sample(&self) -> ProgressSample {
        let snap = self.state.snapshot();
        let (total, known) = match snap.total_bytes {
            Some(total) => (total, true),
            None => (self.nominal_total, false),
        };
        ProgressSample {
            bytes_transferred: snap.bytes_transferred,
            total_bytes: total,
            total_known: known,
            percentage: percentage(snap.bytes_transferred, total),
        }
    }

    /// Lazy sequence of samples, one per tick.
    ///
    /// Ends as soon as the transfer is finished or failed, or once `halt` is
    /// cancelled. Both are checked before and after every tick. Percentages
    /// never decrease within one stream.
    pub fn samples(self, halt: CancellationToken) -> impl Stream<Item = ProgressSample> {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cursor = Cursor {
            tracker: self,
            ticker,
            halt,
            last_percentage: 0,
        };

        stream::unfold(cursor, |mut cursor| async move {
            if cursor.should_stop() {
                return None;
            }
            tokio::select! {
                biased;
                _ = cursor.halt.cancelled() => return None,
                _ = cursor.ticker.tick() => {}
            }
            if cursor.should_stop() {
                return None;
            }

            let mut sample = cursor.tracker.sample();
            sample.percentage = sample.percentage.max(cursor.last_percentage);
            cursor.last_percentage = sample.percentage;
            Some((sample, cursor))
        })
    }
}

impl Cursor {
    fn should_stop(&self) -> bool {
        self.halt.is_cancelled() || self.tracker.state.is_terminal()
    }
}
