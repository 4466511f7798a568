//! Error types for the probe domain values.

use thiserror::Error;

/// Errors raised while constructing or decoding domain values.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Hour or minute out of range, or an unparsable `HH:MM` string
    #[error("Invalid time of day: {0}")]
    InvalidTime(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
