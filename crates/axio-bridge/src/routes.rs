//! Route definitions
//!
//! Mounts a [`Wrapper`] under a path prefix of an axum router.

use std::convert::Infallible;
use std::sync::Arc;

use axio_server::SocketServer;
use axum::extract::{Request, State};
use axum::response::Response;
use axum::routing::any;
use axum::Router;

use crate::context::Context;
use crate::wrapper::{SocketBridge, Wrapper};

/// Create a router forwarding every method on `path` and below to `bridge`
pub fn router<S: SocketServer>(bridge: Arc<Wrapper<S>>, path: &str) -> Router {
    let prefix = path.trim_end_matches('/');
    let router = if prefix.is_empty() {
        Router::new().route("/", any(bridge_request::<S>))
    } else {
        // The wildcard below does not match an empty tail
        Router::new()
            .route(prefix, any(bridge_request::<S>))
            .route(&format!("{}/", prefix), any(bridge_request::<S>))
    };

    router
        .route(&format!("{}/{{*rest}}", prefix), any(bridge_request::<S>))
        .with_state(bridge)
}

async fn bridge_request<S: SocketServer>(
    State(bridge): State<Arc<Wrapper<S>>>,
    ctx: Context,
    request: Request,
) -> Result<Response, Infallible> {
    bridge.handler_func(ctx, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapper::ContextPolicy;
    use axio_server::{Conn, Options};
    use axum::body::{to_bytes, Body};
    use futures::{SinkExt, StreamExt};
    use http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
    use http::{Method, StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::Message;
    use tower::ServiceExt;

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Next non-heartbeat frame
    async fn next_frame(client: &mut Client) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = msg {
                let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                if frame["type"] != "ping" {
                    return frame;
                }
            }
        }
    }

    /// Open a socket as `user` and read the `open` frame
    async fn connect_as(addr: std::net::SocketAddr, user: &str) -> Client {
        let mut request = format!("ws://{}/socket.io/", addr)
            .into_client_request()
            .unwrap();
        request.headers_mut().insert("x-user", user.parse().unwrap());
        let (mut client, _) = tokio_tungstenite::connect_async(request).await.unwrap();
        assert_eq!(next_frame(&mut client).await["type"], "open");
        client
    }

    async fn expect_seen(rx: &mut mpsc::UnboundedReceiver<String>, want: &str) {
        let got = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, want);
    }

    fn app() -> Router {
        router(Arc::new(Wrapper::new(Options::default())), "/socket.io/")
    }

    #[tokio::test]
    async fn test_plain_get_is_rejected_with_cors() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/socket.io/?transport=polling")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["message"], "Transport unknown");
    }

    #[tokio::test]
    async fn test_preflight_on_prefix_root() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/socket.io")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_unrelated_path_is_not_bridged() {
        let response = app()
            .oneshot(Request::builder().uri("/other").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_event_sees_upgrade_request_context() {
        let bridge = Arc::new(Wrapper::new(Options::default()));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        bridge.on_connect("/", |_ctx, _conn: Conn| Ok(()));
        bridge.on_event("/", "message", move |ctx: Context, conn: Conn, payload| {
            let user = ctx.header("x-user").unwrap_or_default().to_string();
            events_tx.send((user, payload)).unwrap();
            conn.emit("ack", "ok").unwrap();
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(bridge.clone(), "/socket.io");
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let mut request = format!("ws://{}/socket.io/", addr)
            .into_client_request()
            .unwrap();
        request
            .headers_mut()
            .insert("x-user", "alice".parse().unwrap());
        let (mut client, response) = tokio_tungstenite::connect_async(request).await.unwrap();
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        assert_eq!(next_frame(&mut client).await["type"], "open");

        client
            .send(Message::text(r#"{"type":"connect","nsp":"/"}"#))
            .await
            .unwrap();
        client
            .send(Message::text(
                r#"{"type":"event","nsp":"/","event":"message","data":"hello"}"#,
            ))
            .await
            .unwrap();

        let (user, payload) = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user, "alice");
        assert_eq!(payload, "hello");
        assert_eq!(bridge.context().unwrap().path(), "/socket.io/");

        let seen = [next_frame(&mut client).await, next_frame(&mut client).await];
        assert_eq!(seen[0]["type"], "connected");
        assert_eq!(
            seen[1],
            json!({"type": "event", "nsp": "/", "event": "ack", "data": "ok"})
        );
    }

    #[tokio::test]
    async fn test_per_connection_context_reaches_every_callback() {
        let bridge = Arc::new(
            Wrapper::new(Options::default()).with_policy(ContextPolicy::PerConnection),
        );
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        fn user(ctx: &Context) -> String {
            ctx.header("x-user").unwrap_or_default().to_string()
        }

        let tx = seen_tx.clone();
        bridge.on_connect("/", move |ctx, _conn: Conn| {
            tx.send(format!("connect:{}", user(&ctx))).unwrap();
            Ok(())
        });
        let tx = seen_tx.clone();
        bridge.on_event("/", "message", move |ctx, _conn: Conn, _payload| {
            tx.send(format!("event:{}", user(&ctx))).unwrap();
        });
        let tx = seen_tx.clone();
        bridge.on_error("/", move |ctx, _error| {
            tx.send(format!("error:{}", user(&ctx))).unwrap();
        });
        let tx = seen_tx;
        bridge.on_disconnect("/", move |ctx, _conn: Conn, reason| {
            tx.send(format!("disconnect:{}:{}", user(&ctx), reason)).unwrap();
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(bridge.clone(), "/socket.io");
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let mut alice = connect_as(addr, "alice").await;
        let mut bob = connect_as(addr, "bob").await;
        // Bob's upgrade is the most recent request
        assert_eq!(bridge.context().unwrap().header("x-user"), Some("bob"));

        alice
            .send(Message::text(r#"{"type":"connect","nsp":"/"}"#))
            .await
            .unwrap();
        assert_eq!(next_frame(&mut alice).await["type"], "connected");
        expect_seen(&mut seen_rx, "connect:alice").await;

        alice
            .send(Message::text(
                r#"{"type":"event","nsp":"/","event":"message","data":"hi"}"#,
            ))
            .await
            .unwrap();
        expect_seen(&mut seen_rx, "event:alice").await;

        alice.send(Message::text("{bad json")).await.unwrap();
        assert_eq!(next_frame(&mut alice).await["type"], "error");
        expect_seen(&mut seen_rx, "error:alice").await;

        bob.send(Message::text(r#"{"type":"connect","nsp":"/"}"#))
            .await
            .unwrap();
        assert_eq!(next_frame(&mut bob).await["type"], "connected");
        expect_seen(&mut seen_rx, "connect:bob").await;

        alice.close(None).await.unwrap();
        expect_seen(&mut seen_rx, "disconnect:alice:transport close").await;
    }
}
