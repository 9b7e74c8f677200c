//! Error types for playsync-ctl
//!
//! Nothing in the controller is fatal. These errors describe why a single
//! request produced no adapter command; the caller may simply retry later.

use thiserror::Error;

/// Why a seek request issued no adapter command
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeekError {
    /// Fraction seek requested before the backend reported a duration
    #[error("could not seek to fraction {fraction}: duration not yet available")]
    DurationUnknown { fraction: f64 },

    /// Seek requested while no session is active
    #[error("controller is not mounted")]
    NotMounted,
}
