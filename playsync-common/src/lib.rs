//! # playsync Common Library
//!
//! Shared code for the playsync reconciliation crates including:
//! - Desired playback state snapshots (`DesiredState`)
//! - Caller-facing event types and the broadcast `EventBus`
//! - Controller configuration loading
//! - Common error types

pub mod config;
pub mod desired;
pub mod error;
pub mod events;

pub use config::ControllerConfig;
pub use desired::DesiredState;
pub use error::{Error, Result};
pub use events::{ControllerEvent, EventBus, PlayerEvent};
