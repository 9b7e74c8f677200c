//! Shared fixtures for controller integration tests
//!
//! - `TestController`: a spawned controller backed by a `SimulatedAdapter`,
//!   with its call probe and an event receiver filtered to its own id
//! - `settle`: let simulated time pass and wait for the queue to drain

#![allow(dead_code)]

use std::time::Duration;

use playsync_common::{ControllerConfig, ControllerEvent, DesiredState, EventBus, PlayerEvent};
use playsync_ctl::{spawn_controller, AdapterCall, ControllerHandle, SimProbe, SimProfile, SimulatedAdapter};
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct TestController {
    pub handle: ControllerHandle,
    pub probe: SimProbe,
    events: broadcast::Receiver<ControllerEvent>,
}

impl TestController {
    /// Spawn on a private event bus
    pub fn spawn(profile: SimProfile, initial: DesiredState) -> Self {
        Self::spawn_on(&EventBus::new(256), profile, initial)
    }

    /// Spawn on a shared event bus
    pub fn spawn_on(bus: &EventBus, profile: SimProfile, initial: DesiredState) -> Self {
        let events = bus.subscribe();
        let mut probe = None;
        let handle = spawn_controller(ControllerConfig::default(), bus.clone(), initial, |sender| {
            let adapter = SimulatedAdapter::new(profile, Some(sender));
            probe = Some(adapter.probe());
            adapter
        });

        Self {
            handle,
            probe: probe.expect("adapter factory runs synchronously"),
            events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.handle.id()
    }

    /// Advance simulated time by `ms` and wait until every command queued
    /// so far has been handled
    pub async fn settle(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        // Queries are answered in order, so this returns after earlier commands
        let _ = self.handle.phase().await;
    }

    /// Events addressed to this controller since the last drain
    pub fn drain_events(&mut self) -> Vec<PlayerEvent> {
        let id = self.id();
        let mut out = Vec::new();
        while let Ok(envelope) = self.events.try_recv() {
            if envelope.controller_id == id {
                out.push(envelope.event);
            }
        }
        out
    }

    /// Sources passed to `load`, in order
    pub fn loads(&self) -> Vec<(String, bool)> {
        self.probe
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                AdapterCall::Load {
                    source,
                    already_ready,
                } => Some((source, already_ready)),
                _ => None,
            })
            .collect()
    }

    /// Positions passed to `seek_to`, in order
    pub fn seeks(&self) -> Vec<f64> {
        self.probe
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                AdapterCall::SeekTo(seconds) => Some(seconds),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &AdapterCall) -> usize {
        self.probe.calls().iter().filter(|c| *c == wanted).count()
    }
}
