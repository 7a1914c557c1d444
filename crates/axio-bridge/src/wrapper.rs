//! Context-bridging wrapper
//!
//! [`Wrapper`] narrows a [`SocketServer`] to the five operations of
//! [`SocketBridge`]. Every registered callback receives the request
//! [`Context`] in addition to what the server passes.

use std::convert::Infallible;
use std::sync::{Arc, Once};

use async_trait::async_trait;
use axio_server::{Connection, Error, Options, Server, SocketServer};
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::cors::apply_cors_headers;
use crate::{BridgeError, Result};

/// How callbacks pick the context they receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextPolicy {
    /// The context of the most recent request, whichever connection fired.
    /// Concurrent requests race on it.
    #[default]
    Latest,
    /// The context of the request that opened the connection, falling back
    /// to the most recent one when the connection carries none
    PerConnection,
}

/// Slot holding the most recently bridged context
#[derive(Debug, Default)]
pub struct ContextSlot {
    current: RwLock<Option<Context>>,
    policy: ContextPolicy,
}

impl ContextSlot {
    pub fn new(policy: ContextPolicy) -> Self {
        Self {
            current: RwLock::new(None),
            policy,
        }
    }

    /// Replace the stored context
    pub fn store(&self, ctx: Context) {
        *self.current.write() = Some(ctx);
    }

    /// The stored context, if any request was bridged yet
    pub fn current(&self) -> Option<Context> {
        self.current.read().clone()
    }

    pub fn policy(&self) -> ContextPolicy {
        self.policy
    }

    /// Context for a callback fired on `conn`
    pub fn resolve<C: Connection>(&self, conn: Option<&C>) -> Context {
        if self.policy() == ContextPolicy::PerConnection {
            if let Some(ctx) = conn.and_then(|c| c.extensions().get::<Context>()) {
                return ctx.clone();
            }
        }

        self.current().unwrap_or_else(|| {
            debug!("No request bridged yet, using an empty context");
            Context::default()
        })
    }
}

/// Registration and HTTP surface exposed to application code
#[async_trait]
pub trait SocketBridge: Send + Sync {
    type Conn: Connection;

    /// Register a connect callback. Its error rejects the connection.
    fn on_connect<F>(&self, nsp: &str, f: F)
    where
        F: Fn(Context, Self::Conn) -> anyhow::Result<()> + Send + Sync + 'static;

    /// Register a disconnect callback; receives the disconnect reason
    fn on_disconnect<F>(&self, nsp: &str, f: F)
    where
        F: Fn(Context, Self::Conn, String) + Send + Sync + 'static;

    /// Register an error callback
    fn on_error<F>(&self, nsp: &str, f: F)
    where
        F: Fn(Context, Error) + Send + Sync + 'static;

    /// Register a callback for a named event; receives the payload string
    fn on_event<F>(&self, nsp: &str, event: &str, f: F)
    where
        F: Fn(Context, Self::Conn, String) + Send + Sync + 'static;

    /// HTTP entry point. Never fails.
    async fn handler_func(&self, ctx: Context, request: Request)
    -> std::result::Result<Response, Infallible>;
}

/// Bridges a realtime server into axum
pub struct Wrapper<S: SocketServer = Server> {
    server: Arc<S>,
    slot: Arc<ContextSlot>,
    serve_once: Once,
}

impl Wrapper<Server> {
    /// Create a wrapper owning a new [`Server`]
    pub fn new(options: Options) -> Self {
        Self::from_arc(Arc::new(Server::new(options)))
    }
}

impl<S: SocketServer> Wrapper<S> {
    /// Wrap an existing server. Fails when no server is given.
    pub fn with_server(server: impl Into<Option<Arc<S>>>) -> Result<Self> {
        let server = server.into().ok_or_else(|| {
            BridgeError::InvalidArgument("socket server can not be None".to_string())
        })?;
        Ok(Self::from_arc(server))
    }

    fn from_arc(server: Arc<S>) -> Self {
        Self {
            server,
            slot: Arc::new(ContextSlot::default()),
            serve_once: Once::new(),
        }
    }

    /// Choose how callbacks pick their context. Only takes effect before
    /// any callback is registered.
    pub fn with_policy(mut self, policy: ContextPolicy) -> Self {
        match Arc::get_mut(&mut self.slot) {
            Some(slot) => slot.policy = policy,
            None => warn!(
                "Callbacks already registered, keeping context policy {:?}",
                self.slot.policy
            ),
        }
        self
    }

    pub fn policy(&self) -> ContextPolicy {
        self.slot.policy()
    }

    /// The wrapped server
    pub fn server(&self) -> &Arc<S> {
        &self.server
    }

    /// Context stored by the most recent [`SocketBridge::handler_func`] call
    pub fn context(&self) -> Option<Context> {
        self.slot.current()
    }

    fn start_serving(&self) {
        self.serve_once.call_once(|| {
            let server = self.server.clone();
            tokio::spawn(async move {
                if let Err(e) = server.serve().await {
                    warn!("Realtime accept loop ended: {}", e);
                }
            });
            info!("Realtime accept loop spawned");
        });
    }
}

#[async_trait]
impl<S: SocketServer> SocketBridge for Wrapper<S> {
    type Conn = S::Conn;

    fn on_connect<F>(&self, nsp: &str, f: F)
    where
        F: Fn(Context, S::Conn) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let slot = self.slot.clone();
        self.server.on_connect(
            nsp,
            Arc::new(move |conn: S::Conn| {
                let ctx = slot.resolve(Some(&conn));
                f(ctx, conn)
            }),
        );
    }

    fn on_disconnect<F>(&self, nsp: &str, f: F)
    where
        F: Fn(Context, S::Conn, String) + Send + Sync + 'static,
    {
        let slot = self.slot.clone();
        self.server.on_disconnect(
            nsp,
            Arc::new(move |conn: S::Conn, reason: String| {
                let ctx = slot.resolve(Some(&conn));
                f(ctx, conn, reason)
            }),
        );
    }

    fn on_error<F>(&self, nsp: &str, f: F)
    where
        F: Fn(Context, Error) + Send + Sync + 'static,
    {
        let slot = self.slot.clone();
        self.server.on_error(
            nsp,
            Arc::new(move |conn: Option<S::Conn>, error: Error| {
                let ctx = slot.resolve(conn.as_ref());
                f(ctx, error)
            }),
        );
    }

    fn on_event<F>(&self, nsp: &str, event: &str, f: F)
    where
        F: Fn(Context, S::Conn, String) + Send + Sync + 'static,
    {
        let slot = self.slot.clone();
        self.server.on_event(
            nsp,
            event,
            Arc::new(move |conn: S::Conn, payload: String| {
                let ctx = slot.resolve(Some(&conn));
                f(ctx, conn, payload)
            }),
        );
    }

    async fn handler_func(
        &self,
        ctx: Context,
        mut request: Request,
    ) -> std::result::Result<Response, Infallible> {
        self.start_serving();

        debug!(
            "Bridging {} {} ({})",
            ctx.method(),
            ctx.path(),
            ctx.request_id()
        );
        if self.slot.policy() == ContextPolicy::PerConnection {
            request.extensions_mut().insert(ctx.clone());
        }
        self.slot.store(ctx);

        let mut response = match self.server.serve_http(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Realtime server failed to handle request: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        };
        apply_cors_headers(response.headers_mut());

        Ok(response)
    }
}
