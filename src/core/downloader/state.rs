use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

const UNKNOWN_TOTAL: u64 = u64::MAX;

/// Live counters of one transfer.
///
/// Written only by the task driving the download; everyone else reads
/// through [`TransferState::snapshot`].
#[derive(Debug)]
pub struct TransferState {
    bytes_transferred: AtomicU64,
    total_bytes: AtomicU64,
    started_at: Instant,
    failed: AtomicBool,
    finished: AtomicBool,
    closed: AtomicBool,
}

/// Point-in-time copy of a [`TransferState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSnapshot {
    pub bytes_transferred: u64,
    pub total_bytes: Option<u64>,
    pub elapsed: Duration,
    pub failed: bool,
    pub finished: bool,
}

impl TransferState {
    pub fn new() -> Self {
        Self {
            bytes_transferred: AtomicU64::new(0),
            total_bytes: AtomicU64::new(UNKNOWN_TOTAL),
            started_at: Instant::now(),
            failed: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        let total = self.total_bytes.load(Ordering::Acquire);
        TransferSnapshot {
            bytes_transferred: self.bytes_transferred.load(Ordering::Acquire),
            total_bytes: (total != UNKNOWN_TOTAL).then_some(total),
            elapsed: self.started_at.elapsed(),
            failed: self.failed.load(Ordering::Acquire),
            finished: self.finished.load(Ordering::Acquire),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.finished.load(Ordering::Acquire) || self.failed.load(Ordering::Acquire)
    }

    pub(crate) fn set_total(&self, total: Option<u64>) {
        if let Some(total) = total {
            self.total_bytes.store(total, Ordering::Release);
        }
    }

    /// Count received bytes. Ignored once the transfer reached its terminal state.
    pub(crate) fn add_bytes(&self, n: u64) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.bytes_transferred.fetch_add(n, Ordering::AcqRel);
    }

    /// Record the single terminal outcome. Later calls are no-ops.
    pub(crate) fn finish(&self, failed: bool) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // `failed` is published before `finished`.
        self.failed.store(failed, Ordering::Release);
        self.finished.store(true, Ordering::Release);
        true
    }
}

impl Default for TransferState {
    fn default() -> Self {
        Self::new()
    }
}
