//! HTTP entry point
//!
//! Accepts WebSocket upgrades and queues the upgraded socket for the accept
//! loop. Only the WebSocket transport is served.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocket, ws::WebSocketUpgrade, ConnectInfo, FromRequestParts, Request},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::conn::Handshake;
use crate::options::Options;

/// Upgraded socket waiting for the accept loop
pub(crate) struct Incoming {
    pub socket: WebSocket,
    pub handshake: Arc<Handshake>,
}

/// Engine-style error body for requests that are not upgrades
fn transport_unknown() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "code": 0,
            "message": "Transport unknown",
        })),
    )
        .into_response()
}

/// Handle one HTTP request to the realtime endpoint
pub(crate) async fn handle_request(
    request: Request,
    accept_tx: mpsc::Sender<Incoming>,
    options: &Options,
) -> Response {
    let (mut parts, _body) = request.into_parts();

    if parts.method == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }

    let upgrade: WebSocketUpgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            debug!(
                "Rejected {} {}: {}",
                parts.method,
                parts.uri,
                rejection.body_text()
            );
            return transport_unknown();
        }
    };

    let handshake = Arc::new(Handshake {
        uri: parts.uri.clone(),
        headers: parts.headers.clone(),
        remote_addr: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0),
        extensions: parts.extensions.clone(),
    });

    upgrade
        .max_message_size(options.max_payload)
        .on_failed_upgrade(|e| warn!("WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| async move {
            if accept_tx.send(Incoming { socket, handshake }).await.is_err() {
                warn!("Accept loop is gone, dropping socket");
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[tokio::test]
    async fn test_options_preflight() {
        let (tx, _rx) = mpsc::channel(1);
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/socket.io")
            .body(Body::empty())
            .unwrap();

        let response = handle_request(request, tx, &Options::default()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_plain_get_is_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        let request = Request::builder()
            .uri("/socket.io?transport=polling")
            .body(Body::empty())
            .unwrap();

        let response = handle_request(request, tx, &Options::default()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
