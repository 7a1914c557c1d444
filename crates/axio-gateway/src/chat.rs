//! Demo handlers
//!
//! `/` echoes every `message` event back to its sender. `/chat` is a
//! single-lobby chat room keyed by the user name found in the context.

use std::sync::{Arc, Weak};

use axio_bridge::{Context, SocketBridge, Wrapper};
use axio_server::{Conn, Server, DEFAULT_NAMESPACE};
use serde_json::json;
use tracing::{info, warn};

use crate::middleware::USER_KEY;

pub const CHAT_NAMESPACE: &str = "/chat";
pub const LOBBY: &str = "lobby";

/// Register all demo handlers on `bridge`
pub fn register(bridge: &Wrapper) {
    register_echo(bridge);
    register_chat(bridge);
}

fn register_echo(bridge: &Wrapper) {
    bridge.on_connect(DEFAULT_NAMESPACE, |ctx, conn: Conn| {
        info!("{} connected (request {})", conn.id(), ctx.request_id());
        Ok(())
    });

    bridge.on_event(DEFAULT_NAMESPACE, "message", |_ctx, conn: Conn, payload| {
        if let Err(e) = conn.emit("message", payload) {
            warn!("Echo to {} failed: {}", conn.id(), e);
        }
    });

    bridge.on_disconnect(DEFAULT_NAMESPACE, |_ctx, conn: Conn, reason| {
        info!("{} disconnected: {}", conn.id(), reason);
    });

    bridge.on_error(DEFAULT_NAMESPACE, |ctx, error| {
        warn!("Realtime error (request {}): {}", ctx.request_id(), error);
    });
}

fn register_chat(bridge: &Wrapper) {
    let server = Arc::downgrade(bridge.server());
    bridge.on_connect(CHAT_NAMESPACE, move |ctx, conn: Conn| {
        let user = user_of(&ctx).ok_or_else(|| anyhow::anyhow!("a user name is required"))?;
        conn.join(LOBBY);
        announce(&server, "joined", json!({ "user": user }))?;
        info!("{} joined {} as {}", conn.id(), CHAT_NAMESPACE, user);
        Ok(())
    });

    let server = Arc::downgrade(bridge.server());
    bridge.on_event(CHAT_NAMESPACE, "chat", move |ctx, conn: Conn, text| {
        let user = user_of(&ctx).unwrap_or_else(|| conn.id().to_string());
        if let Err(e) = announce(&server, "chat", json!({ "user": user, "text": text })) {
            warn!("Chat broadcast failed: {}", e);
        }
    });

    let server = Arc::downgrade(bridge.server());
    bridge.on_disconnect(CHAT_NAMESPACE, move |ctx, conn: Conn, reason| {
        let user = user_of(&ctx).unwrap_or_else(|| conn.id().to_string());
        info!("{} left {}: {}", user, CHAT_NAMESPACE, reason);
        if let Err(e) = announce(&server, "left", json!({ "user": user })) {
            warn!("Leave broadcast failed: {}", e);
        }
    });
}

/// Broadcast to the lobby; a no-op once the server is gone
fn announce(server: &Weak<Server>, event: &str, data: serde_json::Value) -> anyhow::Result<()> {
    if let Some(server) = server.upgrade() {
        server.broadcast_to_room(CHAT_NAMESPACE, LOBBY, event, data)?;
    }
    Ok(())
}

fn user_of(ctx: &Context) -> Option<String> {
    ctx.get(USER_KEY)
        .and_then(|value| value.as_str().map(str::to_string))
}
