//! Error types for the penaltybox service.

use thiserror::Error;

/// Main error type for penaltybox operations.
#[derive(Error, Debug)]
pub enum PenaltyBoxError {
    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure loading or merging configuration sources
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for penaltybox operations.
pub type Result<T> = std::result::Result<T, PenaltyBoxError>;
