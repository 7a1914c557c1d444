//! Server abstraction
//!
//! [`SocketServer`] is the registration and HTTP surface a bridge needs from a
//! realtime server. [`Server`](crate::Server) implements it; tests and other
//! backends can provide their own.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use http::Extensions;

use crate::{Error, Result};

/// Called when a client joins a namespace. An `Err` rejects the join.
pub type ConnectHandler<C> = Arc<dyn Fn(C) -> anyhow::Result<()> + Send + Sync>;

/// Called when a client leaves a namespace, with the reason
pub type DisconnectHandler<C> = Arc<dyn Fn(C, String) + Send + Sync>;

/// Called on namespace errors with the failing session's handle in that
/// namespace, which may not have joined it
pub type ErrorHandler<C> = Arc<dyn Fn(Option<C>, Error) + Send + Sync>;

/// Called for a named event with its payload rendered as a string
pub type EventHandler<C> = Arc<dyn Fn(C, String) + Send + Sync>;

/// One client's membership in one namespace
pub trait Connection: Clone + Send + Sync + 'static {
    /// Session id, shared by every namespace the client joined
    fn id(&self) -> &str;

    /// Namespace this handle belongs to
    fn namespace(&self) -> &str;

    /// Extensions of the HTTP request that opened the session
    fn extensions(&self) -> &Extensions;
}

/// Realtime server as seen from an HTTP framework
#[async_trait]
pub trait SocketServer: Send + Sync + 'static {
    /// Connection handle passed to handlers
    type Conn: Connection;

    /// Register the connect handler of `nsp`
    fn on_connect(&self, nsp: &str, handler: ConnectHandler<Self::Conn>);

    /// Register the disconnect handler of `nsp`
    fn on_disconnect(&self, nsp: &str, handler: DisconnectHandler<Self::Conn>);

    /// Register the error handler of `nsp`
    fn on_error(&self, nsp: &str, handler: ErrorHandler<Self::Conn>);

    /// Register the handler of `event` in `nsp`
    fn on_event(&self, nsp: &str, event: &str, handler: EventHandler<Self::Conn>);

    /// Run the accept loop. Returns only when the server can accept no more
    /// sessions.
    async fn serve(&self) -> Result<()>;

    /// Handle one HTTP request addressed to the realtime endpoint
    async fn serve_http(&self, request: Request) -> Result<Response>;
}
