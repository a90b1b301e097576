//! Error definitions for the TSL Tally Tester

use thiserror::Error;

/// TSL Tally Tester error types
#[derive(Error, Debug)]
pub enum TslError {
    #[error("Invalid address: {0} (must be 0-126)")]
    InvalidAddress(u8),

    #[error("Address out of range: {0} (bank holds addresses 0-79)")]
    AddressOutOfRange(usize),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Sending is not enabled")]
    NotEnabled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Channel error: {0}")]
    Channel(String),
}

/// Result type alias for TSL Tally Tester operations
pub type TslResult<T> = Result<T, TslError>;
