//! Desired playback state snapshots
//!
//! A `DesiredState` is the caller's complete declaration of what playback
//! should look like right now. Snapshots are immutable; each update replaces
//! the previous one wholesale and the controller diffs the pair.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Caller-declared playback intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesiredState {
    /// Opaque media identifier (URL, path, ...). `None` means no media selected.
    pub source: Option<String>,

    /// Whether the caller wants media to be playing
    pub playing: bool,

    /// Output volume (0.0 - 1.0)
    pub volume: f64,

    /// Mute overrides volume without forgetting it
    pub muted: bool,

    /// Playback speed multiplier (> 0)
    pub playback_rate: f64,

    /// Restart from the beginning when media ends
    #[serde(rename = "loop")]
    pub loop_playback: bool,
}

impl Default for DesiredState {
    fn default() -> Self {
        Self {
            source: None,
            playing: false,
            volume: 0.8,
            muted: false,
            playback_rate: 1.0,
            loop_playback: false,
        }
    }
}

impl DesiredState {
    /// Snapshot selecting `source` with every other field at its default
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::default()
        }
    }

    pub fn source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    pub fn playing(mut self, playing: bool) -> Self {
        self.playing = playing;
        self
    }

    pub fn volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    pub fn muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    pub fn playback_rate(mut self, rate: f64) -> Self {
        self.playback_rate = rate;
        self
    }

    pub fn loop_playback(mut self, loop_playback: bool) -> Self {
        self.loop_playback = loop_playback;
        self
    }

    /// Volume the adapter should actually receive, honoring mute
    pub fn effective_volume(&self) -> f64 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    /// Reject snapshots with out-of-range numeric fields
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(Error::InvalidInput(format!(
                "volume must be within 0.0..=1.0, got {}",
                self.volume
            )));
        }
        if !(self.playback_rate > 0.0 && self.playback_rate.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "playback_rate must be a positive number, got {}",
                self.playback_rate
            )));
        }
        if matches!(&self.source, Some(s) if s.trim().is_empty()) {
            return Err(Error::InvalidInput("source must not be blank".to_string()));
        }
        Ok(())
    }
}
