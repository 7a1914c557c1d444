//! Error types for axio-gateway

use thiserror::Error;

/// Gateway error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for axio-gateway
pub type Result<T> = std::result::Result<T, GatewayError>;
