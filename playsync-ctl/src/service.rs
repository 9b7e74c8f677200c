//! Controller task and host-facing handle
//!
//! `spawn_controller` moves a [`PlaybackController`] into its own tokio task.
//! The task owns the controller outright and drains one command queue, so
//! host requests, adapter events and poll ticks are handled strictly one at
//! a time in arrival order.
//!
//! The task exits after `unmount`, or once its [`ControllerHandle`] has been
//! dropped (adapters and timers only hold weak senders).

use playsync_common::{ControllerConfig, DesiredState, Error, EventBus, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::adapter::{AdapterEvent, AdapterEventSender, PlayerAdapter};
use crate::command::{Command, Query};
use crate::controller::{PlaybackController, PlaybackPhase};
use crate::error::SeekError;

/// Spawn a controller task and mount it with `initial`
///
/// `make_adapter` receives the event sender the adapter should report
/// lifecycle events through.
pub fn spawn_controller<A, F>(
    config: ControllerConfig,
    bus: EventBus,
    initial: DesiredState,
    make_adapter: F,
) -> ControllerHandle
where
    A: PlayerAdapter + 'static,
    F: FnOnce(AdapterEventSender) -> A,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let adapter = make_adapter(AdapterEventSender::new(tx.downgrade()));

    let mut controller = PlaybackController::new(adapter, config, bus, tx.downgrade());
    let id = controller.id();

    let task = tokio::spawn(async move {
        controller.mount(initial);

        while let Some(command) = rx.recv().await {
            if !controller.handle(command) {
                break;
            }
        }

        // Every handle dropped without an explicit unmount
        if controller.is_mounted() {
            controller.unmount();
        }
        debug!(controller = %controller.id(), "Controller task finished");
    });

    info!(controller = %id, "Controller task spawned");
    ControllerHandle {
        id,
        tx,
        task: Some(task),
    }
}

/// Host-side handle to a running controller
#[derive(Debug)]
pub struct ControllerHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Replace the desired state snapshot
    pub fn update(&self, desired: DesiredState) -> Result<()> {
        self.send(Command::Update(desired))
    }

    /// Seek and wait for the resolved absolute position
    pub async fn seek_to(&self, amount: f64) -> Result<std::result::Result<f64, SeekError>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SeekTo {
            amount,
            reply: Some(reply),
        })?;
        rx.await.map_err(|_| closed())
    }

    pub async fn current_time(&self) -> Result<Option<f64>> {
        self.query(Query::CurrentTime).await
    }

    pub async fn duration(&self) -> Result<Option<f64>> {
        self.query(Query::Duration).await
    }

    pub async fn seconds_loaded(&self) -> Result<Option<f64>> {
        self.query(Query::SecondsLoaded).await
    }

    pub async fn can_play(&self, source: impl Into<String>) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::CanPlay {
            source: source.into(),
            reply,
        })?;
        rx.await.map_err(|_| closed())
    }

    pub async fn phase(&self) -> Result<PlaybackPhase> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Phase { reply })?;
        rx.await.map_err(|_| closed())
    }

    /// Inject an adapter event as if the backend had reported it
    pub fn adapter_event(&self, event: AdapterEvent) -> Result<()> {
        self.send(Command::Adapter(event))
    }

    /// Deactivate the controller and wait for its task to finish
    pub async fn unmount(mut self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Unmount { reply: Some(reply) })?;
        rx.await.map_err(|_| closed())?;

        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| Error::ControllerClosed(format!("controller task failed: {}", e)))?;
        }
        Ok(())
    }

    async fn query(&self, query: Query) -> Result<Option<f64>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Query { query, reply })?;
        rx.await.map_err(|_| closed())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| closed())
    }
}

fn closed() -> Error {
    Error::ControllerClosed("controller task has exited".to_string())
}
