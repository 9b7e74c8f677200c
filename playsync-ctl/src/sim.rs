//! In-process simulated backend
//!
//! `SimulatedAdapter` records every command it receives and, depending on its
//! [`SimProfile`], reports lifecycle events the way a real backend would:
//! readiness some time after each load, a duration that shows up late, play
//! and pause confirmations, and end of media.
//!
//! With [`SimProfile::manual`] it reports nothing on its own; tests drive the
//! controller's event handlers directly and inspect the call log through a
//! [`SimProbe`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use playsync_common::DesiredState;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

use crate::adapter::{AdapterEventSender, Capabilities, PlayerAdapter};

/// One command received by the simulated backend
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterCall {
    Load { source: String, already_ready: bool },
    Play,
    Pause,
    Stop,
    SeekTo(f64),
    SetVolume(f64),
    SetPlaybackRate(f64),
}

/// Simulated backend behavior
///
/// Fields missing from a deserialized profile take their
/// [`SimProfile::realistic`] values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimProfile {
    /// Report `Ready` this long after every load
    pub ready_after_ms: Option<u64>,

    /// Media length reported once available
    pub duration: Option<f64>,

    /// Delay between a load and the duration becoming available
    pub duration_after_ms: u64,

    /// Confirm `play()` with a `Play` event
    pub emit_play: bool,

    /// Confirm `pause()` with a `Pause` event
    pub emit_pause: bool,

    /// Report `Ended` this long after playback starts
    pub ended_after_ms: Option<u64>,

    /// Declare rate control support
    pub playback_rate: bool,

    /// Declare that looping needs a restart seek
    pub loop_on_ended: bool,

    /// Declare a speculative preload source
    pub preload_source: Option<String>,

    /// Sources accepted by `can_play`; empty accepts everything
    pub playable_prefixes: Vec<String>,
}

impl SimProfile {
    /// Report nothing; every event is injected by the test
    pub fn manual() -> Self {
        Self {
            ready_after_ms: None,
            duration: None,
            duration_after_ms: 0,
            emit_play: false,
            emit_pause: false,
            ended_after_ms: None,
            playback_rate: false,
            loop_on_ended: false,
            preload_source: None,
            playable_prefixes: Vec::new(),
        }
    }

    /// Behaves like a typical network-backed player
    pub fn realistic() -> Self {
        Self {
            ready_after_ms: Some(300),
            duration: Some(180.0),
            duration_after_ms: 250,
            emit_play: true,
            emit_pause: true,
            ended_after_ms: None,
            playback_rate: true,
            loop_on_ended: true,
            preload_source: None,
            playable_prefixes: Vec::new(),
        }
    }
}

impl Default for SimProfile {
    fn default() -> Self {
        Self::realistic()
    }
}

#[derive(Debug, Default)]
struct SimState {
    calls: Vec<AdapterCall>,
    source: Option<String>,
    duration: Option<f64>,
    duration_at: Option<(Instant, f64)>,
    position: f64,
    seconds_loaded: Option<f64>,
    preload_accepted: bool,
}

/// Read/write access to a simulated adapter's state from outside the
/// controller that owns it
#[derive(Debug, Clone)]
pub struct SimProbe {
    state: Arc<Mutex<SimState>>,
}

impl SimProbe {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every command received so far
    pub fn calls(&self) -> Vec<AdapterCall> {
        self.lock().calls.clone()
    }

    /// Drain the call log
    pub fn take_calls(&self) -> Vec<AdapterCall> {
        std::mem::take(&mut self.lock().calls)
    }

    /// Force the reported duration (overrides the profile)
    pub fn set_duration(&self, duration: Option<f64>) {
        let mut state = self.lock();
        state.duration = duration;
        state.duration_at = None;
    }

    pub fn set_seconds_loaded(&self, seconds: Option<f64>) {
        self.lock().seconds_loaded = seconds;
    }

    pub fn set_position(&self, seconds: f64) {
        self.lock().position = seconds;
    }

    /// Make `should_preload` accept or refuse
    pub fn set_preload_accepted(&self, accepted: bool) {
        self.lock().preload_accepted = accepted;
    }

    pub fn loaded_source(&self) -> Option<String> {
        self.lock().source.clone()
    }
}

/// Scriptable in-process backend
#[derive(Debug)]
pub struct SimulatedAdapter {
    profile: SimProfile,
    events: Option<AdapterEventSender>,
    state: Arc<Mutex<SimState>>,
    ready_task: Option<JoinHandle<()>>,
    ended_task: Option<JoinHandle<()>>,
}

impl SimulatedAdapter {
    /// Adapter that reports events through `events` per `profile`
    pub fn new(profile: SimProfile, events: Option<AdapterEventSender>) -> Self {
        let state = SimState {
            preload_accepted: profile.preload_source.is_some(),
            ..SimState::default()
        };
        Self {
            profile,
            events,
            state: Arc::new(Mutex::new(state)),
            ready_task: None,
            ended_task: None,
        }
    }

    /// Adapter that never reports events on its own
    pub fn manual(profile: SimProfile) -> Self {
        Self::new(
            SimProfile {
                ready_after_ms: None,
                emit_play: false,
                emit_pause: false,
                ended_after_ms: None,
                ..profile
            },
            None,
        )
    }

    pub fn probe(&self) -> SimProbe {
        SimProbe {
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: AdapterCall) {
        trace!(?call, "Simulated backend command");
        self.lock().calls.push(call);
    }

    fn abort_tasks(&mut self) {
        if let Some(task) = self.ready_task.take() {
            task.abort();
        }
        self.abort_ended();
    }

    fn abort_ended(&mut self) {
        if let Some(task) = self.ended_task.take() {
            task.abort();
        }
    }

    fn schedule<F>(&self, delay_ms: u64, report: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(&AdapterEventSender) + Send + 'static,
    {
        let events = self.events.clone().filter(AdapterEventSender::is_connected)?;
        Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            report(&events);
        }))
    }
}

impl Drop for SimulatedAdapter {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

impl PlayerAdapter for SimulatedAdapter {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            playback_rate: self.profile.playback_rate,
            loop_on_ended: self.profile.loop_on_ended,
            preload_source: self.profile.preload_source.clone(),
        }
    }

    fn load(&mut self, source: &str, already_ready: bool) {
        self.record(AdapterCall::Load {
            source: source.to_string(),
            already_ready,
        });
        self.abort_tasks();

        {
            let mut state = self.lock();
            state.source = Some(source.to_string());
            state.position = 0.0;
            if let Some(duration) = self.profile.duration {
                state.duration = None;
                let available_at =
                    Instant::now() + Duration::from_millis(self.profile.duration_after_ms);
                state.duration_at = Some((available_at, duration));
            }
        }

        if !self.can_play(source) {
            if let Some(events) = &self.events {
                events.error(format!("unsupported source: {}", source));
            }
            return;
        }

        if let Some(delay) = self.profile.ready_after_ms {
            self.ready_task = self.schedule(delay, |events| events.ready());
        }
    }

    fn play(&mut self) {
        self.record(AdapterCall::Play);
        if self.profile.emit_play {
            if let Some(events) = &self.events {
                events.play();
            }
        }
        if let Some(delay) = self.profile.ended_after_ms {
            self.abort_ended();
            self.ended_task = self.schedule(delay, |events| events.ended());
        }
    }

    fn pause(&mut self) {
        self.record(AdapterCall::Pause);
        self.abort_ended();
        if self.profile.emit_pause {
            if let Some(events) = &self.events {
                events.pause();
            }
        }
    }

    fn stop(&mut self) {
        self.record(AdapterCall::Stop);
        self.abort_tasks();
        self.lock().source = None;
    }

    fn seek_to(&mut self, seconds: f64) {
        self.record(AdapterCall::SeekTo(seconds));
        self.lock().position = seconds;
    }

    fn set_volume(&mut self, volume: f64) {
        self.record(AdapterCall::SetVolume(volume));
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.record(AdapterCall::SetPlaybackRate(rate));
    }

    fn should_preload(&self, desired: &DesiredState) -> bool {
        desired.source.is_none() && self.lock().preload_accepted
    }

    fn can_play(&self, source: &str) -> bool {
        self.profile.playable_prefixes.is_empty()
            || self
                .profile
                .playable_prefixes
                .iter()
                .any(|prefix| source.starts_with(prefix.as_str()))
    }

    fn current_time(&self) -> Option<f64> {
        let state = self.lock();
        state.source.as_ref().map(|_| state.position)
    }

    fn duration(&self) -> Option<f64> {
        let state = self.lock();
        state.duration.or_else(|| {
            state
                .duration_at
                .filter(|(at, _)| Instant::now() >= *at)
                .map(|(_, duration)| duration)
        })
    }

    fn seconds_loaded(&self) -> Option<f64> {
        self.lock().seconds_loaded
    }
}
