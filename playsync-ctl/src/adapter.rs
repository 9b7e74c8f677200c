//! Backend adapter contract
//!
//! A `PlayerAdapter` drives one concrete backend (streaming SDK, file player,
//! ...). Commands are fire-and-forget: the adapter applies them on its own
//! schedule and reports progress asynchronously through an
//! [`AdapterEventSender`].
//!
//! # Optional operations
//!
//! Rate control, loop-on-ended and speculative preloading are not universal.
//! Each adapter declares what it supports in [`Capabilities`]; the
//! controller checks that declaration before calling an optional method, and
//! the default trait bodies are no-ops so unsupported operations need no code.

use playsync_common::DesiredState;
use tokio::sync::mpsc;

use crate::command::Command;

/// Optional features a backend declares up front
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capabilities {
    /// Backend honors `set_playback_rate`
    pub playback_rate: bool,

    /// Backend stops at end of media even when asked to loop, so the
    /// controller restarts it with a seek to 0
    pub loop_on_ended: bool,

    /// Source loaded speculatively before the caller picks one
    pub preload_source: Option<String>,
}

/// Imperative backend player
pub trait PlayerAdapter: Send {
    /// Optional features this backend supports
    fn capabilities(&self) -> Capabilities;

    /// Start loading `source`. `already_ready` is true when the backend has
    /// already signaled readiness once and only needs to swap media.
    fn load(&mut self, source: &str, already_ready: bool);

    fn play(&mut self);

    fn pause(&mut self);

    fn stop(&mut self);

    /// Seek to an absolute position in seconds
    fn seek_to(&mut self, seconds: f64);

    /// Set output volume (0.0 - 1.0)
    fn set_volume(&mut self, volume: f64);

    /// Only called when `Capabilities::playback_rate` is set
    fn set_playback_rate(&mut self, _rate: f64) {}

    /// Only called when `Capabilities::preload_source` is set
    fn should_preload(&self, _desired: &DesiredState) -> bool {
        false
    }

    /// Whether this backend can play `source`; backends without a matcher
    /// accept everything
    fn can_play(&self, _source: &str) -> bool {
        true
    }

    /// Current position in seconds, if known
    fn current_time(&self) -> Option<f64>;

    /// Media length in seconds, if known. Backends commonly report `None`
    /// or `0.0` for a while after loading.
    fn duration(&self) -> Option<f64>;

    /// Seconds buffered so far, if known
    fn seconds_loaded(&self) -> Option<f64>;
}

/// Lifecycle events an adapter reports back to its controller
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    /// Loaded source is ready to accept commands
    Ready,
    /// Playback actually started
    Play,
    /// Playback paused
    Pause,
    /// Stalled waiting for data
    Buffer,
    /// Recovered from a stall
    BufferEnd,
    /// Reached end of media
    Ended,
    /// Non-fatal backend failure
    Error(String),
}

/// Cloneable, non-blocking handle for reporting adapter events
///
/// Events are queued behind whatever the controller is currently doing, so
/// an adapter may report from inside a command without re-entering the
/// controller. The sender does not keep the controller alive; events sent
/// after it has shut down are dropped.
#[derive(Debug, Clone)]
pub struct AdapterEventSender {
    tx: mpsc::WeakUnboundedSender<Command>,
}

impl AdapterEventSender {
    pub fn new(tx: mpsc::WeakUnboundedSender<Command>) -> Self {
        Self { tx }
    }

    pub fn send(&self, event: AdapterEvent) {
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(Command::Adapter(event));
        }
    }

    pub fn ready(&self) {
        self.send(AdapterEvent::Ready);
    }

    pub fn play(&self) {
        self.send(AdapterEvent::Play);
    }

    pub fn pause(&self) {
        self.send(AdapterEvent::Pause);
    }

    pub fn ended(&self) {
        self.send(AdapterEvent::Ended);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(AdapterEvent::Error(message.into()));
    }

    /// Whether the owning controller is still accepting events
    pub fn is_connected(&self) -> bool {
        self.tx.upgrade().is_some_and(|tx| !tx.is_closed())
    }
}
