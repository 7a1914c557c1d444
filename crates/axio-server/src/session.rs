//! WebSocket session
//!
//! One task per upgraded socket. Reads client frames, dispatches them through
//! the registry, writes queued server frames and enforces the heartbeat.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::conn::{Conn, Handshake};
use crate::message::{payload_string, ClientFrame, ServerFrame, DEFAULT_NAMESPACE};
use crate::namespace::Registry;
use crate::options::Options;

/// Disconnect reasons handed to disconnect handlers
pub mod reason {
    /// The client left the namespace
    pub const CLIENT_DISCONNECT: &str = "client namespace disconnect";
    /// The server closed the namespace connection
    pub const SERVER_DISCONNECT: &str = "server namespace disconnect";
    /// The socket was closed
    pub const TRANSPORT_CLOSE: &str = "transport close";
    /// The socket failed
    pub const TRANSPORT_ERROR: &str = "transport error";
    /// No traffic within the heartbeat deadline
    pub const PING_TIMEOUT: &str = "ping timeout";
}

struct Session {
    sid: String,
    handshake: Arc<Handshake>,
    registry: Arc<Registry>,
    tx: mpsc::Sender<ServerFrame>,
}

impl Session {
    async fn send(&self, frame: ServerFrame) {
        if self.tx.send(frame).await.is_err() {
            debug!("Writer gone for session: {}", self.sid);
        }
    }

    async fn handle_text(&self, text: &str) {
        let frame = match ClientFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Bad frame from {}: {}", self.sid, e);
                self.send(ServerFrame::Error {
                    message: e.to_string(),
                })
                .await;
                self.registry
                    .error(DEFAULT_NAMESPACE, Some(self.conn(DEFAULT_NAMESPACE)), e);
                return;
            }
        };

        match frame {
            ClientFrame::Connect { nsp } => self.connect(nsp).await,
            ClientFrame::Disconnect { nsp } => {
                self.registry
                    .disconnect(&nsp, &self.sid, reason::CLIENT_DISCONNECT);
            }
            ClientFrame::Event { nsp, event, data } => {
                if let Err(e) = self
                    .registry
                    .event(&nsp, &self.sid, &event, payload_string(&data))
                {
                    self.send(ServerFrame::Error {
                        message: e.to_string(),
                    })
                    .await;
                    self.registry.error(&nsp, Some(self.conn(&nsp)), e);
                }
            }
            ClientFrame::Ping => self.send(ServerFrame::Pong).await,
            ClientFrame::Pong => {}
        }
    }

    /// Handle for this session in `nsp`, joined or not
    fn conn(&self, nsp: &str) -> Conn {
        Conn::new(
            self.sid.clone(),
            nsp.to_string(),
            self.tx.clone(),
            self.handshake.clone(),
            Arc::downgrade(&self.registry),
        )
    }

    async fn connect(&self, nsp: String) {
        let conn = self.conn(&nsp);

        match self.registry.insert(conn.clone()) {
            Ok(true) => {}
            Ok(false) => {
                debug!("{} already joined {}", self.sid, nsp);
                return;
            }
            Err(e) => {
                info!("{} refused from {}: {}", self.sid, nsp, e);
                self.send(ServerFrame::ConnectError {
                    nsp,
                    message: e.to_string(),
                })
                .await;
                return;
            }
        }

        // Acknowledge before the handler runs so its emits follow the ack
        self.send(ServerFrame::Connected {
            nsp: nsp.clone(),
            sid: self.sid.clone(),
        })
        .await;

        match self.registry.run_connect(conn) {
            Ok(()) => info!("{} joined {}", self.sid, nsp),
            Err(e) => {
                info!("{} rejected by {}: {}", self.sid, nsp, e);
                self.send(ServerFrame::ConnectError {
                    nsp,
                    message: e.to_string(),
                })
                .await;
            }
        }
    }
}

/// Drive one upgraded socket until it closes or times out
pub(crate) async fn run(
    socket: WebSocket,
    handshake: Arc<Handshake>,
    registry: Arc<Registry>,
    options: Options,
) {
    let sid = uuid::Uuid::new_v4().to_string();
    info!("New realtime session: {}", sid);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerFrame>(options.write_buffer.max(1));

    // Task to send frames to client
    let sid_send = sid.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match frame.to_text() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode frame: {}", e);
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
        debug!("Send task ended for session: {}", sid_send);
    });

    let session = Session {
        sid: sid.clone(),
        handshake,
        registry,
        tx,
    };

    session
        .send(ServerFrame::Open {
            sid: sid.clone(),
            ping_interval: options.ping_interval.as_millis() as u64,
            ping_timeout: options.ping_timeout.as_millis() as u64,
        })
        .await;

    let mut heartbeat = tokio::time::interval(options.ping_interval);
    // The first tick completes immediately
    heartbeat.tick().await;
    let mut last_seen = Instant::now();

    let reason = loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if last_seen.elapsed() >= options.heartbeat_deadline() {
                    break reason::PING_TIMEOUT;
                }
                session.send(ServerFrame::Ping).await;
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    last_seen = Instant::now();
                    session.handle_text(text.as_str()).await;
                }
                Some(Ok(WsMessage::Binary(_))) => {
                    last_seen = Instant::now();
                    session
                        .send(ServerFrame::Error {
                            message: "binary frames are not supported".to_string(),
                        })
                        .await;
                }
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {
                    last_seen = Instant::now();
                }
                Some(Ok(WsMessage::Close(_))) | None => break reason::TRANSPORT_CLOSE,
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    break reason::TRANSPORT_ERROR;
                }
            }
        }
    };

    session.registry.disconnect_all(&sid, reason);
    writer.abort();

    info!("Realtime session closed: {} ({})", sid, reason);
}
