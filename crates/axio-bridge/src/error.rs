//! Error types for axio-bridge

use thiserror::Error;

/// Bridge error type
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias for axio-bridge
pub type Result<T> = std::result::Result<T, BridgeError>;
