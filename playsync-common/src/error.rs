//! Common error types for playsync

use thiserror::Error;

/// Common result type for playsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across playsync crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML document could not be parsed
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The controller task has exited and no longer accepts commands
    #[error("Controller closed: {0}")]
    ControllerClosed(String),
}
