//! # playsync Controller Library (playsync-ctl)
//!
//! Reconciles declarative playback intent with an imperative, asynchronous
//! backend player.
//!
//! **Purpose:** Diff successive `DesiredState` snapshots into adapter
//! commands, hold back commands the backend cannot honor yet, replay them
//! once it reports readiness, and poll for media duration until it is known.
//!
//! **Architecture:** One tokio task per controller serializes host updates,
//! adapter events and timer ticks into a single synchronous state machine.

pub mod adapter;
pub mod command;
pub mod controller;
pub mod error;
pub mod poller;
pub mod scenario;
pub mod seek;
pub mod service;
pub mod sim;

pub use adapter::{AdapterEvent, AdapterEventSender, Capabilities, PlayerAdapter};
pub use controller::{PlaybackController, PlaybackPhase};
pub use error::SeekError;
pub use scenario::{DesiredPatch, Scenario, Step};
pub use service::{spawn_controller, ControllerHandle};
pub use sim::{AdapterCall, SimProbe, SimProfile, SimulatedAdapter};
