//! Pending seek buffer
//!
//! Holds at most one seek requested before the backend was ready. The entry
//! carries its own deadline; once that passes it is never handed out again,
//! regardless of when the next play event arrives.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingSeek {
    amount: f64,
    deadline: Instant,
}

/// Single-slot, time-bounded seek buffer
#[derive(Debug)]
pub struct SeekCoordinator {
    expiry: Duration,
    pending: Option<PendingSeek>,
}

impl SeekCoordinator {
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            pending: None,
        }
    }

    /// Buffer `amount`, replacing any earlier request (last write wins)
    pub fn request(&mut self, amount: f64, now: Instant) {
        self.pending = Some(PendingSeek {
            amount,
            deadline: now + self.expiry,
        });
    }

    /// Take the buffered amount if it is still valid at `now`
    ///
    /// The slot is emptied either way.
    pub fn try_consume(&mut self, now: Instant) -> Option<f64> {
        self.pending
            .take()
            .filter(|pending| now <= pending.deadline)
            .map(|pending| pending.amount)
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    /// Whether a still-valid seek is buffered at `now`
    pub fn is_pending(&self, now: Instant) -> bool {
        matches!(self.pending, Some(pending) if now <= pending.deadline)
    }
}
