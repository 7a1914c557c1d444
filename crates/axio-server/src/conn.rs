//! Connection handles
//!
//! A [`Conn`] is one client's membership in one namespace. Clones share the
//! same outbound queue.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use http::{Extensions, HeaderMap, Uri};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::message::ServerFrame;
use crate::namespace::Registry;
use crate::session::reason;
use crate::traits::Connection;
use crate::{Error, Result};

/// Request data captured when the WebSocket was opened
#[derive(Debug, Default)]
pub struct Handshake {
    pub uri: Uri,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
    pub extensions: Extensions,
}

/// Handle to a client connected to a namespace
#[derive(Clone)]
pub struct Conn {
    inner: Arc<ConnInner>,
}

struct ConnInner {
    sid: String,
    nsp: String,
    tx: mpsc::Sender<ServerFrame>,
    handshake: Arc<Handshake>,
    registry: Weak<Registry>,
}

impl Conn {
    pub(crate) fn new(
        sid: String,
        nsp: String,
        tx: mpsc::Sender<ServerFrame>,
        handshake: Arc<Handshake>,
        registry: Weak<Registry>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnInner {
                sid,
                nsp,
                tx,
                handshake,
                registry,
            }),
        }
    }

    /// Session id
    pub fn id(&self) -> &str {
        &self.inner.sid
    }

    /// Namespace of this handle
    pub fn namespace(&self) -> &str {
        &self.inner.nsp
    }

    /// URI the session was opened with
    pub fn uri(&self) -> &Uri {
        &self.inner.handshake.uri
    }

    /// Peer address, when the HTTP server recorded one
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.handshake.remote_addr
    }

    /// Handshake request headers
    pub fn remote_headers(&self) -> &HeaderMap {
        &self.inner.handshake.headers
    }

    /// One handshake request header as text
    pub fn remote_header(&self, name: &str) -> Option<&str> {
        self.inner
            .handshake
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
    }

    /// Handshake request extensions
    pub fn extensions(&self) -> &Extensions {
        &self.inner.handshake.extensions
    }

    /// Send a named event to this client
    pub fn emit(&self, event: &str, data: impl Serialize) -> Result<()> {
        let frame = ServerFrame::Event {
            nsp: self.inner.nsp.clone(),
            event: event.to_string(),
            data: serde_json::to_value(data)?,
        };
        self.send(frame)
    }

    /// Queue a frame without waiting for buffer space
    pub(crate) fn send(&self, frame: ServerFrame) -> Result<()> {
        self.inner.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => Error::BufferFull(self.inner.sid.clone()),
            TrySendError::Closed(_) => Error::Closed(self.inner.sid.clone()),
        })
    }

    /// Join a room of this namespace
    pub fn join(&self, room: &str) {
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.join(&self.inner.nsp, room, &self.inner.sid);
        }
    }

    /// Leave a room of this namespace
    pub fn leave(&self, room: &str) {
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.leave(&self.inner.nsp, room, &self.inner.sid);
        }
    }

    /// Leave every room of this namespace
    pub fn leave_all(&self) {
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.leave_all(&self.inner.nsp, &self.inner.sid);
        }
    }

    /// Rooms this connection is in, sorted
    pub fn rooms(&self) -> Vec<String> {
        self.inner
            .registry
            .upgrade()
            .map(|registry| registry.rooms_of(&self.inner.nsp, &self.inner.sid))
            .unwrap_or_default()
    }

    /// Drop the client from this namespace. The session stays open.
    pub fn close(&self) {
        if let Err(e) = self.send(ServerFrame::Disconnected {
            nsp: self.inner.nsp.clone(),
        }) {
            debug!("Could not notify {} of namespace close: {}", self.inner.sid, e);
        }
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.disconnect(&self.inner.nsp, &self.inner.sid, reason::SERVER_DISCONNECT);
        }
    }
}

impl Connection for Conn {
    fn id(&self) -> &str {
        Conn::id(self)
    }

    fn namespace(&self) -> &str {
        Conn::namespace(self)
    }

    fn extensions(&self) -> &Extensions {
        Conn::extensions(self)
    }
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("sid", &self.inner.sid)
            .field("nsp", &self.inner.nsp)
            .finish()
    }
}
