//! Duration polling
//!
//! Backends often report no duration (or `0`) for a while after loading.
//! The poller probes once, and while the answer is unknown it arms a single
//! timer that posts a [`Command::DurationTick`] back into the controller's
//! queue after the poll interval. The controller answers the tick with
//! another `check`, so polling continues until a duration is known or the
//! poller is cancelled.
//!
//! Every armed timer carries a unique token. Re-checking aborts the previous
//! timer and only the newest token is honored, so overlapping triggers
//! collapse into one poll and a tick that was already queued when its timer
//! was cancelled is ignored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::command::Command;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Filter a raw backend duration down to a usable value
///
/// `None`, `0.0` and NaN all mean "not known yet".
pub fn known_duration(raw: Option<f64>) -> Option<f64> {
    raw.filter(|seconds| *seconds != 0.0 && !seconds.is_nan())
}

struct ArmedTimer {
    token: u64,
    handle: JoinHandle<()>,
}

/// Repeating duration probe, reporting at most once per load cycle
pub struct DurationPoller {
    interval: Duration,
    ticks: mpsc::WeakUnboundedSender<Command>,
    timer: Option<ArmedTimer>,
    reported: bool,
}

impl DurationPoller {
    pub fn new(interval: Duration, ticks: mpsc::WeakUnboundedSender<Command>) -> Self {
        Self {
            interval,
            ticks,
            timer: None,
            reported: false,
        }
    }

    /// Probe result handling
    ///
    /// Returns the duration when it should be reported to the caller. An
    /// unknown duration arms the next tick instead. Once a value has been
    /// reported, further checks in the same load cycle do nothing.
    pub fn check(&mut self, probe: Option<f64>) -> Option<f64> {
        self.cancel();
        if self.reported {
            return None;
        }

        match known_duration(probe) {
            Some(seconds) => {
                self.reported = true;
                Some(seconds)
            }
            None => {
                self.arm();
                None
            }
        }
    }

    /// Accept a tick if it belongs to the currently armed timer
    pub fn accept_tick(&mut self, token: u64) -> bool {
        match &self.timer {
            Some(timer) if timer.token == token => {
                self.timer = None;
                true
            }
            _ => false,
        }
    }

    /// Start a new load cycle
    pub fn reset(&mut self) {
        self.cancel();
        self.reported = false;
    }

    /// Abort any armed timer
    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            trace!(token = timer.token, "Cancelling duration poll");
            timer.handle.abort();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.timer.is_some()
    }

    pub fn has_reported(&self) -> bool {
        self.reported
    }

    fn arm(&mut self) {
        // Controller queue already gone: nobody left to poll for
        if self.ticks.upgrade().is_none() {
            return;
        }

        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        let interval = self.interval;
        let ticks = self.ticks.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            if let Some(tx) = ticks.upgrade() {
                let _ = tx.send(Command::DurationTick { token });
            }
        });

        trace!(token, interval_ms = interval.as_millis() as u64, "Duration unknown, polling");
        self.timer = Some(ArmedTimer { token, handle });
    }
}

impl Drop for DurationPoller {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for DurationPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurationPoller")
            .field("interval", &self.interval)
            .field("armed_token", &self.timer.as_ref().map(|t| t.token))
            .field("reported", &self.reported)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(100);

    fn tick_token(command: Command) -> u64 {
        match command {
            Command::DurationTick { token } => token,
            other => panic!("Expected DurationTick, got {:?}", other),
        }
    }

    #[test]
    fn test_known_duration_filter() {
        assert_eq!(known_duration(None), None);
        assert_eq!(known_duration(Some(0.0)), None);
        assert_eq!(known_duration(Some(f64::NAN)), None);
        assert_eq!(known_duration(Some(12.5)), Some(12.5));
        assert_eq!(known_duration(Some(f64::INFINITY)), Some(f64::INFINITY));
    }

    #[tokio::test(start_paused = true)]
    async fn test_known_duration_reports_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut poller = DurationPoller::new(INTERVAL, tx.downgrade());

        assert_eq!(poller.check(Some(90.0)), Some(90.0));
        assert!(poller.has_reported());
        assert!(!poller.is_polling());

        // Same load cycle: suppressed
        assert_eq!(poller.check(Some(90.0)), None);

        tokio::time::sleep(INTERVAL * 3).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_duration_arms_tick() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut poller = DurationPoller::new(INTERVAL, tx.downgrade());

        assert_eq!(poller.check(None), None);
        assert!(poller.is_polling());

        // Nothing before the interval elapses
        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2)).await;
        let token = tick_token(rx.recv().await.unwrap());
        assert!(poller.accept_tick(token));
        assert!(!poller.is_polling());

        // Second probe succeeds
        assert_eq!(poller.check(Some(30.0)), Some(30.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recheck_collapses_timers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut poller = DurationPoller::new(INTERVAL, tx.downgrade());

        poller.check(None);
        tokio::time::sleep(Duration::from_millis(50)).await;
        poller.check(None);
        poller.check(Some(0.0));

        tokio::time::sleep(INTERVAL * 2).await;

        // Only the last armed timer fires
        let token = tick_token(rx.recv().await.unwrap());
        assert!(rx.try_recv().is_err());
        assert!(poller.accept_tick(token));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_tick_rejected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut poller = DurationPoller::new(INTERVAL, tx.downgrade());

        poller.check(None);
        tokio::time::sleep(INTERVAL + Duration::from_millis(1)).await;
        let stale = tick_token(rx.recv().await.unwrap());

        // A fresh check supersedes the already-delivered tick
        poller.check(None);
        assert!(!poller.accept_tick(stale));
        assert!(poller.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_drop_stop_polling() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut poller = DurationPoller::new(INTERVAL, tx.downgrade());

        poller.check(None);
        poller.cancel();
        tokio::time::sleep(INTERVAL * 2).await;
        assert!(rx.try_recv().is_err());

        poller.check(None);
        drop(poller);
        tokio::time::sleep(INTERVAL * 2).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_starts_new_cycle() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut poller = DurationPoller::new(INTERVAL, tx.downgrade());

        assert_eq!(poller.check(Some(10.0)), Some(10.0));
        poller.reset();
        assert!(!poller.has_reported());
        assert_eq!(poller.check(Some(20.0)), Some(20.0));
    }
}
