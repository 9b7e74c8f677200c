//! Playback controller - desired state reconciliation
//!
//! **Responsibilities:**
//! - Diff each new `DesiredState` against the previous snapshot and issue
//!   the matching adapter commands
//! - Defer loads, plays and seeks the backend cannot honor before readiness,
//!   and replay them when `Ready` / `Play` arrive
//! - Drive the duration poller once per load cycle
//! - Translate adapter lifecycle events into caller notifications
//!
//! # Lifecycle
//!
//! ```text
//! Unmounted -> Empty -> Loading -> Paused <-> Playing -> Ended
//!                          ^  (preloading)       |
//!                          +---- source change --+
//! ```
//!
//! Session state only exists while mounted. Unmounting drops it, which
//! aborts the poll timer and forgets buffered seeks and loads; adapter
//! events arriving afterwards find no session and are ignored.

use playsync_common::{ControllerConfig, ControllerEvent, DesiredState, EventBus, PlayerEvent};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::adapter::{AdapterEvent, Capabilities, PlayerAdapter};
use crate::command::{Command, Query};
use crate::error::SeekError;
use crate::poller::{known_duration, DurationPoller};
use crate::seek::SeekCoordinator;

/// Externally visible playback phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum PlaybackPhase {
    Unmounted,
    /// Mounted with nothing loaded
    Empty,
    /// A load is outstanding; `preloading` when it is the speculative source
    Loading { preloading: bool },
    Paused,
    Playing,
    Ended,
}

impl std::fmt::Display for PlaybackPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackPhase::Unmounted => write!(f, "unmounted"),
            PlaybackPhase::Empty => write!(f, "empty"),
            PlaybackPhase::Loading { preloading: true } => write!(f, "preloading"),
            PlaybackPhase::Loading { preloading: false } => write!(f, "loading"),
            PlaybackPhase::Paused => write!(f, "paused"),
            PlaybackPhase::Playing => write!(f, "playing"),
            PlaybackPhase::Ended => write!(f, "ended"),
        }
    }
}

/// Backend load progress for the current session
///
/// `speculative` marks the preload source, which the caller never sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadPhase {
    Idle,
    Loading { speculative: bool },
    Ready { speculative: bool },
}

impl LoadPhase {
    fn is_ready(self) -> bool {
        matches!(self, LoadPhase::Ready { .. })
    }

    fn is_preloading(self) -> bool {
        matches!(self, LoadPhase::Loading { speculative: true })
    }

    fn is_speculative(self) -> bool {
        matches!(
            self,
            LoadPhase::Loading { speculative: true } | LoadPhase::Ready { speculative: true }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Stopped,
    Paused,
    Playing,
    Ended,
}

/// State that lives exactly as long as the controller is mounted
#[derive(Debug)]
struct Session {
    load: LoadPhase,
    start_on_play: bool,
    seek: SeekCoordinator,
    pending_load: Option<String>,
    issued_source: Option<String>,
    transport: Transport,
    poller: DurationPoller,
}

impl Session {
    fn new(config: &ControllerConfig, ticks: mpsc::WeakUnboundedSender<Command>) -> Self {
        Self {
            load: LoadPhase::Idle,
            start_on_play: true,
            seek: SeekCoordinator::new(config.seek_expiry()),
            pending_load: None,
            issued_source: None,
            transport: Transport::Stopped,
            poller: DurationPoller::new(config.duration_poll_interval(), ticks),
        }
    }

    /// Hand `source` to the adapter and begin a new load cycle
    fn issue_load<A: PlayerAdapter>(
        &mut self,
        adapter: &mut A,
        source: &str,
        already_ready: bool,
        speculative: bool,
    ) {
        info!(source, already_ready, speculative, "Loading source");
        adapter.load(source, already_ready);
        self.load = LoadPhase::Loading { speculative };
        self.issued_source = Some(source.to_string());
        self.pending_load = None;
        self.transport = Transport::Stopped;
        self.poller.reset();
    }

    /// Forget everything tied to the loaded source
    fn unload(&mut self) {
        self.load = LoadPhase::Idle;
        self.issued_source = None;
        self.pending_load = None;
        self.transport = Transport::Stopped;
        self.seek.clear();
        self.poller.cancel();
    }

    fn phase(&self) -> PlaybackPhase {
        match self.load {
            LoadPhase::Idle => PlaybackPhase::Empty,
            LoadPhase::Loading { speculative } => PlaybackPhase::Loading {
                preloading: speculative,
            },
            LoadPhase::Ready { .. } => match self.transport {
                Transport::Playing => PlaybackPhase::Playing,
                Transport::Ended => PlaybackPhase::Ended,
                Transport::Paused | Transport::Stopped => PlaybackPhase::Paused,
            },
        }
    }
}

/// Tags caller notifications with the controller id
#[derive(Debug)]
struct Notifier {
    id: Uuid,
    bus: EventBus,
}

impl Notifier {
    fn emit(&self, event: PlayerEvent) {
        debug!(controller = %self.id, event = event.name(), "Notifying caller");
        self.bus.emit_lossy(ControllerEvent::new(self.id, event));
    }
}

/// Reconciles desired playback state with one backend adapter
pub struct PlaybackController<A: PlayerAdapter> {
    adapter: A,
    capabilities: Capabilities,
    config: ControllerConfig,
    desired: DesiredState,
    session: Option<Session>,
    notifier: Notifier,
    ticks: mpsc::WeakUnboundedSender<Command>,
}

impl<A: PlayerAdapter> PlaybackController<A> {
    /// Create an unmounted controller
    ///
    /// `ticks` is the controller's own input queue; duration poll timers
    /// post back into it.
    pub fn new(
        adapter: A,
        config: ControllerConfig,
        bus: EventBus,
        ticks: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        let capabilities = adapter.capabilities();
        Self {
            adapter,
            capabilities,
            config,
            desired: DesiredState::default(),
            session: None,
            notifier: Notifier {
                id: Uuid::new_v4(),
                bus,
            },
            ticks,
        }
    }

    pub fn id(&self) -> Uuid {
        self.notifier.id
    }

    pub fn desired(&self) -> &DesiredState {
        &self.desired
    }

    pub fn is_mounted(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the adapter has reported readiness for the loaded source
    pub fn is_ready(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.load.is_ready())
    }

    pub fn is_preloading(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.load.is_preloading())
    }

    /// Source waiting for the outstanding load to finish
    pub fn pending_load(&self) -> Option<&str> {
        self.session.as_ref().and_then(|s| s.pending_load.as_deref())
    }

    pub fn has_pending_seek(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.seek.is_pending(Instant::now()))
    }

    pub fn is_polling_duration(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.poller.is_polling())
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.session
            .as_ref()
            .map_or(PlaybackPhase::Unmounted, Session::phase)
    }

    /// Activate with an initial snapshot
    ///
    /// Loads the desired source, or the adapter's preload source when there
    /// is none and the adapter asks for it.
    pub fn mount(&mut self, desired: DesiredState) {
        if self.session.is_some() {
            debug!(controller = %self.id(), "Already mounted, ignoring mount");
            return;
        }

        info!(controller = %self.id(), "Mounting playback controller");
        self.desired = desired;
        let mut session = Session::new(&self.config, self.ticks.clone());

        if let Some(source) = self.desired.source.clone() {
            session.issue_load(&mut self.adapter, &source, false, false);
        } else if let Some(preload) = self.capabilities.preload_source.clone() {
            if self.adapter.should_preload(&self.desired) {
                session.issue_load(&mut self.adapter, &preload, false, true);
            }
        }

        self.session = Some(session);
    }

    /// Deactivate
    ///
    /// Stops the adapter unless only a speculative preload is in flight.
    pub fn unmount(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if session.load.is_preloading() {
            debug!("Unmounting during preload, leaving adapter untouched");
        } else {
            self.adapter.stop();
        }

        info!(controller = %self.id(), "Unmounted playback controller");
        // Dropping the session aborts the poll timer
    }

    /// Replace the desired state and issue commands for every changed field
    ///
    /// Each field is diffed on its own; one update may issue several
    /// commands.
    pub fn update(&mut self, next: DesiredState) {
        let prev = std::mem::replace(&mut self.desired, next);
        let Some(session) = self.session.as_mut() else {
            trace!("Not mounted, recording desired state only");
            return;
        };
        let next = &self.desired;
        let adapter = &mut self.adapter;

        if prev.source != next.source {
            match next.source.as_deref() {
                Some(source) => {
                    session.seek.clear();
                    session.start_on_play = true;

                    match session.load {
                        LoadPhase::Ready { .. } => session.issue_load(adapter, source, true, false),
                        LoadPhase::Idle => session.issue_load(adapter, source, false, false),
                        LoadPhase::Loading { .. } => {
                            if session.issued_source.as_deref() == Some(source) {
                                debug!(source, "Source already loading, dropping deferred load");
                                session.pending_load = None;
                                session.load = LoadPhase::Loading { speculative: false };
                            } else {
                                debug!(source, "Load outstanding, deferring until ready");
                                session.pending_load = Some(source.to_string());
                            }
                        }
                    }
                }
                None => {
                    info!("Source cleared, stopping");
                    adapter.stop();
                    session.unload();
                }
            }
        }

        if !prev.playing && next.playing {
            if session.load.is_ready() {
                adapter.play();
            } else {
                debug!("Not ready, play deferred until ready");
            }
        }

        // Not gated on readiness
        if prev.playing && !next.playing {
            adapter.pause();
            session.transport = Transport::Paused;
        }

        if prev.volume != next.volume && !next.muted {
            adapter.set_volume(next.volume);
        }

        if prev.muted != next.muted {
            adapter.set_volume(next.effective_volume());
        }

        if prev.playback_rate != next.playback_rate && self.capabilities.playback_rate {
            adapter.set_playback_rate(next.playback_rate);
        }
    }

    /// Seek by absolute seconds, or by fraction of duration when in (0, 1)
    ///
    /// Before readiness a non-zero seek is also buffered and replayed on the
    /// next play event within the expiry window. Fractions are resolved when
    /// the seek executes, not when it is buffered.
    pub fn seek_to(&mut self, amount: f64) -> Result<f64, SeekError> {
        let Some(session) = self.session.as_mut() else {
            return Err(SeekError::NotMounted);
        };

        if !session.load.is_ready() && amount != 0.0 {
            debug!(amount, "Not ready, buffering seek");
            session.seek.request(amount, Instant::now());
        }

        execute_seek(&mut self.adapter, amount)
    }

    pub fn current_time(&self) -> Option<f64> {
        self.adapter.current_time()
    }

    pub fn duration(&self) -> Option<f64> {
        self.adapter.duration()
    }

    pub fn seconds_loaded(&self) -> Option<f64> {
        self.adapter.seconds_loaded()
    }

    pub fn can_play(&self, source: &str) -> bool {
        self.adapter.can_play(source)
    }

    /// Apply one adapter lifecycle event
    pub fn handle_adapter_event(&mut self, event: AdapterEvent) {
        if self.session.is_none() {
            trace!(?event, "Ignoring adapter event after unmount");
            return;
        }

        match event {
            AdapterEvent::Ready => self.on_ready(),
            AdapterEvent::Play => self.on_play(),
            AdapterEvent::Ended => self.on_ended(),
            AdapterEvent::Pause => {
                if let Some(session) = self.session.as_mut() {
                    session.transport = Transport::Paused;
                }
                self.notify_visible(PlayerEvent::Pause);
            }
            AdapterEvent::Buffer => self.notify_visible(PlayerEvent::Buffer),
            AdapterEvent::BufferEnd => self.notify_visible(PlayerEvent::BufferEnd),
            AdapterEvent::Error(message) => {
                warn!(controller = %self.id(), "Adapter error: {}", message);
                self.notify_visible(PlayerEvent::Error { message });
            }
        }
    }

    /// Duration poll timer fired
    pub fn on_duration_tick(&mut self, token: u64) {
        let Some(session) = self.session.as_mut() else {
            trace!(token, "Ignoring duration tick after unmount");
            return;
        };
        if !session.poller.accept_tick(token) {
            trace!(token, "Ignoring superseded duration tick");
            return;
        }
        self.check_duration();
    }

    /// Dispatch one queued command. Returns false once the controller
    /// should shut down.
    pub fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Update(desired) => self.update(desired),
            Command::SeekTo { amount, reply } => {
                let result = self.seek_to(amount);
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Command::Query { query, reply } => {
                let value = match query {
                    Query::CurrentTime => self.current_time(),
                    Query::Duration => self.duration(),
                    Query::SecondsLoaded => self.seconds_loaded(),
                };
                let _ = reply.send(value);
            }
            Command::CanPlay { source, reply } => {
                let _ = reply.send(self.can_play(&source));
            }
            Command::Phase { reply } => {
                let _ = reply.send(self.phase());
            }
            Command::Adapter(event) => self.handle_adapter_event(event),
            Command::DurationTick { token } => self.on_duration_tick(token),
            Command::Unmount { reply } => {
                self.unmount();
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
                return false;
            }
        }
        true
    }

    fn on_ready(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let was_preloading = session.load.is_preloading();
        let speculative = session.load.is_speculative();
        session.load = LoadPhase::Ready { speculative };
        if !speculative {
            self.notifier.emit(PlayerEvent::Ready);
        }

        // A deferred load outranks auto-play
        if let Some(target) = session.pending_load.take() {
            debug!(source = %target, "Replaying deferred load");
            session.issue_load(&mut self.adapter, &target, false, false);
            return;
        }

        if self.desired.playing || was_preloading {
            self.adapter.play();
        }

        self.check_duration();
    }

    fn on_play(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.transport = Transport::Playing;
        if session.load.is_speculative() {
            trace!("Speculative source playing, not surfaced");
            return;
        }

        if session.start_on_play {
            if self.capabilities.playback_rate {
                self.adapter.set_playback_rate(self.desired.playback_rate);
            }
            self.adapter.set_volume(self.desired.effective_volume());
            self.notifier.emit(PlayerEvent::Start);
            session.start_on_play = false;
        }

        self.notifier.emit(PlayerEvent::Play);

        if let Some(amount) = session.seek.try_consume(Instant::now()) {
            debug!(amount, "Replaying buffered seek");
            let _ = execute_seek(&mut self.adapter, amount);
        }

        self.check_duration();
    }

    fn on_ended(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if self.capabilities.loop_on_ended && self.desired.loop_playback {
            debug!("Looping, restarting from the beginning");
            let _ = execute_seek(&mut self.adapter, 0.0);
            session.transport = Transport::Playing;
        } else {
            session.transport = Transport::Ended;
        }

        self.notify_visible(PlayerEvent::Ended);
    }

    fn check_duration(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.load.is_speculative() {
            return;
        }

        if let Some(seconds) = session.poller.check(self.adapter.duration()) {
            info!(seconds, "Duration known");
            self.notifier.emit(PlayerEvent::Duration { seconds });
        }
    }

    /// Emit unless the loaded source is the speculative preload
    fn notify_visible(&self, event: PlayerEvent) {
        let speculative = self
            .session
            .as_ref()
            .is_some_and(|s| s.load.is_speculative());
        if !speculative {
            self.notifier.emit(event);
        }
    }
}

impl<A: PlayerAdapter> std::fmt::Debug for PlaybackController<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("id", &self.notifier.id)
            .field("capabilities", &self.capabilities)
            .field("desired", &self.desired)
            .field("session", &self.session)
            .finish()
    }
}

/// Resolve `amount` to an absolute position and issue the seek
fn execute_seek<A: PlayerAdapter>(adapter: &mut A, amount: f64) -> Result<f64, SeekError> {
    if amount > 0.0 && amount < 1.0 {
        let Some(duration) = known_duration(adapter.duration()) else {
            warn!(
                fraction = amount,
                "Could not seek using fraction, duration not yet available"
            );
            return Err(SeekError::DurationUnknown { fraction: amount });
        };
        let position = duration * amount;
        adapter.seek_to(position);
        return Ok(position);
    }

    adapter.seek_to(amount);
    Ok(amount)
}
