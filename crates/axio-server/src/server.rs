//! Realtime server
//!
//! Owns the namespace registry and the accept queue fed by
//! [`SocketServer::serve_http`].

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use crate::conn::Conn;
use crate::handler::{handle_request, Incoming};
use crate::message::ServerFrame;
use crate::namespace::Registry;
use crate::options::Options;
use crate::session;
use crate::traits::{ConnectHandler, DisconnectHandler, ErrorHandler, EventHandler, SocketServer};
use crate::{Error, Result};

/// Namespaced realtime event server over WebSocket
pub struct Server {
    options: Options,
    registry: Arc<Registry>,
    accept_tx: mpsc::Sender<Incoming>,
    accept_rx: Mutex<Option<mpsc::Receiver<Incoming>>>,
}

impl Server {
    /// Create a server. Nothing is accepted until [`SocketServer::serve`] runs.
    pub fn new(options: Options) -> Self {
        let (accept_tx, accept_rx) = mpsc::channel(options.accept_backlog.max(1));
        Self {
            options,
            registry: Arc::new(Registry::new()),
            accept_tx,
            accept_rx: Mutex::new(Some(accept_rx)),
        }
    }

    /// Options the server was built with
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Emit an event to every connection in `room` of `nsp`. Returns the
    /// number of connections reached.
    pub fn broadcast_to_room(
        &self,
        nsp: &str,
        room: &str,
        event: &str,
        data: impl Serialize,
    ) -> Result<usize> {
        let frame = Self::event_frame(nsp, event, data)?;
        Ok(self.registry.broadcast(nsp, Some(room), &frame))
    }

    /// Emit an event to every connection of `nsp`
    pub fn broadcast_to_namespace(
        &self,
        nsp: &str,
        event: &str,
        data: impl Serialize,
    ) -> Result<usize> {
        let frame = Self::event_frame(nsp, event, data)?;
        Ok(self.registry.broadcast(nsp, None, &frame))
    }

    fn event_frame(nsp: &str, event: &str, data: impl Serialize) -> Result<ServerFrame> {
        Ok(ServerFrame::Event {
            nsp: nsp.to_string(),
            event: event.to_string(),
            data: serde_json::to_value(data)?,
        })
    }

    /// Number of connections in a room
    pub fn room_len(&self, nsp: &str, room: &str) -> usize {
        self.registry.room_len(nsp, room)
    }

    /// Non-empty rooms of a namespace, sorted
    pub fn rooms(&self, nsp: &str) -> Vec<String> {
        self.registry.rooms(nsp)
    }

    /// Remove every member from a room
    pub fn clear_room(&self, nsp: &str, room: &str) {
        self.registry.clear_room(nsp, room);
    }

    /// Number of connections in a namespace
    pub fn count(&self, nsp: &str) -> usize {
        self.registry.count(nsp)
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

#[async_trait]
impl SocketServer for Server {
    type Conn = Conn;

    fn on_connect(&self, nsp: &str, handler: ConnectHandler<Conn>) {
        self.registry.set_connect(nsp, handler);
    }

    fn on_disconnect(&self, nsp: &str, handler: DisconnectHandler<Conn>) {
        self.registry.set_disconnect(nsp, handler);
    }

    fn on_error(&self, nsp: &str, handler: ErrorHandler<Conn>) {
        self.registry.set_error(nsp, handler);
    }

    fn on_event(&self, nsp: &str, event: &str, handler: EventHandler<Conn>) {
        self.registry.set_event(nsp, event, handler);
    }

    async fn serve(&self) -> Result<()> {
        let mut accept_rx = self.accept_rx.lock().take().ok_or(Error::AlreadyServing)?;
        info!("Realtime accept loop started");

        while let Some(incoming) = accept_rx.recv().await {
            tokio::spawn(session::run(
                incoming.socket,
                incoming.handshake,
                self.registry.clone(),
                self.options.clone(),
            ));
        }

        info!("Realtime accept loop stopped");
        Ok(())
    }

    async fn serve_http(&self, request: Request) -> Result<Response> {
        Ok(handle_request(request, self.accept_tx.clone(), &self.options).await)
    }
}
