//! Controller input messages
//!
//! Every input to a controller (host requests, adapter events, timer ticks)
//! travels through one queue of `Command`s so handlers run strictly one at a
//! time in delivery order.

use playsync_common::DesiredState;
use tokio::sync::oneshot;

use crate::adapter::AdapterEvent;
use crate::controller::PlaybackPhase;
use crate::error::SeekError;

/// Read-only adapter probes forwarded by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    CurrentTime,
    Duration,
    SecondsLoaded,
}

/// Controller input (host / adapter / timers -> controller)
#[derive(Debug)]
pub enum Command {
    /// Replace the desired state snapshot
    Update(DesiredState),

    /// Seek by absolute seconds, or by fraction when in (0, 1)
    SeekTo {
        amount: f64,
        reply: Option<oneshot::Sender<Result<f64, SeekError>>>,
    },

    /// Forward a read-only probe to the adapter
    Query {
        query: Query,
        reply: oneshot::Sender<Option<f64>>,
    },

    /// Ask the adapter whether it can play a source
    CanPlay {
        source: String,
        reply: oneshot::Sender<bool>,
    },

    /// Report the derived playback phase
    Phase { reply: oneshot::Sender<PlaybackPhase> },

    /// Lifecycle event from the adapter
    Adapter(AdapterEvent),

    /// Duration poll timer fired
    DurationTick { token: u64 },

    /// Deactivate and shut down the controller task
    Unmount { reply: Option<oneshot::Sender<()>> },
}
