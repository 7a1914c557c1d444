//! Error types for axio-server

use thiserror::Error;

/// Realtime server error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("not connected to namespace: {0}")]
    NotConnected(String),

    #[error("connection rejected: {0}")]
    ConnectRejected(String),

    #[error("write buffer full for connection: {0}")]
    BufferFull(String),

    #[error("connection closed: {0}")]
    Closed(String),

    #[error("server is already serving")]
    AlreadyServing,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for axio-server
pub type Result<T> = std::result::Result<T, Error>;
