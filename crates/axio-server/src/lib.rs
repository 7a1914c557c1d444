//! axio-server: namespaced realtime event server
//!
//! Clients open a WebSocket, join namespaces and exchange named events.
//! Supports rooms, broadcast and a server-driven heartbeat.
//! Built with axum for HTTP handling.

pub mod conn;
pub mod error;
mod handler;
pub mod message;
mod namespace;
pub mod options;
pub mod server;
mod session;
pub mod traits;

pub use conn::{Conn, Handshake};
pub use error::{Error, Result};
pub use message::{ClientFrame, ServerFrame, DEFAULT_NAMESPACE};
pub use options::Options;
pub use server::Server;
pub use session::reason;
pub use traits::{
    Connection, ConnectHandler, DisconnectHandler, ErrorHandler, EventHandler, SocketServer,
};
