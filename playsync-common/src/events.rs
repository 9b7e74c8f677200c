//! Caller-facing event types and broadcast bus
//!
//! A controller never calls back into its caller directly. Every lifecycle
//! notification is wrapped in a [`ControllerEvent`] envelope and broadcast on
//! an [`EventBus`]; callers subscribe and filter by `controller_id` when
//! several controllers share one bus.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Lifecycle notifications delivered to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Backend finished loading the current source
    Ready,

    /// First real play of the current source (once per load)
    Start,

    /// Playback (re)started; fires on every resume
    Play,

    /// Backend paused
    Pause,

    /// Backend stalled waiting for data
    Buffer,

    /// Backend recovered from a stall
    BufferEnd,

    /// Media reached its end
    Ended,

    /// Media length became known (once per load cycle)
    Duration { seconds: f64 },

    /// Backend reported a non-fatal error
    Error { message: String },
}

impl PlayerEvent {
    /// Short lowercase name, used for log lines
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::Ready => "ready",
            PlayerEvent::Start => "start",
            PlayerEvent::Play => "play",
            PlayerEvent::Pause => "pause",
            PlayerEvent::Buffer => "buffer",
            PlayerEvent::BufferEnd => "buffer_end",
            PlayerEvent::Ended => "ended",
            PlayerEvent::Duration { .. } => "duration",
            PlayerEvent::Error { .. } => "error",
        }
    }
}

/// Event envelope broadcast on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerEvent {
    /// Controller instance that produced the event
    pub controller_id: Uuid,

    /// Wall-clock emission time
    pub timestamp: chrono::DateTime<chrono::Utc>,

    #[serde(flatten)]
    pub event: PlayerEvent,
}

impl ControllerEvent {
    pub fn new(controller_id: Uuid, event: PlayerEvent) -> Self {
        Self {
            controller_id,
            timestamp: chrono::Utc::now(),
            event,
        }
    }
}

/// Broadcast channel for controller events
///
/// Cloning the bus shares the underlying channel. Subscribers only receive
/// events emitted after they subscribe.
///
/// # Examples
///
/// ```
/// use playsync_common::events::{ControllerEvent, EventBus, PlayerEvent};
/// use uuid::Uuid;
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(ControllerEvent::new(Uuid::new_v4(), PlayerEvent::Ready));
/// assert_eq!(rx.try_recv().unwrap().event, PlayerEvent::Ready);
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ControllerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ControllerEvent,
    ) -> Result<usize, broadcast::error::SendError<ControllerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ControllerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
