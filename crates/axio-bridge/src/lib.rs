//! axio-bridge: realtime server adapter for axum
//!
//! Mounts an axio realtime server on an axum router and hands the HTTP
//! request context to every connect, disconnect, error and event callback.

pub mod context;
pub mod cors;
pub mod error;
pub mod routes;
pub mod wrapper;

pub use context::{Context, ContextValues, REQUEST_ID_HEADER};
pub use cors::apply_cors_headers;
pub use error::{BridgeError, Result};
pub use routes::router;
pub use wrapper::{ContextPolicy, ContextSlot, SocketBridge, Wrapper};
