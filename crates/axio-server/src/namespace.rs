//! Namespace registry
//!
//! Holds the handlers, live connections and rooms of every namespace.
//! Handlers are always called after the map guard is released so they can
//! call back into the registry.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::conn::Conn;
use crate::message::ServerFrame;
use crate::traits::{ConnectHandler, DisconnectHandler, ErrorHandler, EventHandler};
use crate::{Error, Result};

#[derive(Default, Clone)]
struct Handlers {
    connect: Option<ConnectHandler<Conn>>,
    disconnect: Option<DisconnectHandler<Conn>>,
    error: Option<ErrorHandler<Conn>>,
    events: HashMap<String, EventHandler<Conn>>,
}

#[derive(Default)]
struct Namespace {
    handlers: Handlers,
    conns: HashMap<String, Conn>,
    rooms: HashMap<String, HashSet<String>>,
}

impl Namespace {
    fn leave_all(&mut self, sid: &str) {
        self.rooms.retain(|_, members| {
            members.remove(sid);
            !members.is_empty()
        });
    }
}

/// Namespaces keyed by name
#[derive(Default)]
pub(crate) struct Registry {
    namespaces: DashMap<String, Namespace>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connect(&self, nsp: &str, handler: ConnectHandler<Conn>) {
        self.namespaces
            .entry(nsp.to_string())
            .or_default()
            .handlers
            .connect = Some(handler);
    }

    pub fn set_disconnect(&self, nsp: &str, handler: DisconnectHandler<Conn>) {
        self.namespaces
            .entry(nsp.to_string())
            .or_default()
            .handlers
            .disconnect = Some(handler);
    }

    pub fn set_error(&self, nsp: &str, handler: ErrorHandler<Conn>) {
        self.namespaces
            .entry(nsp.to_string())
            .or_default()
            .handlers
            .error = Some(handler);
    }

    pub fn set_event(&self, nsp: &str, event: &str, handler: EventHandler<Conn>) {
        self.namespaces
            .entry(nsp.to_string())
            .or_default()
            .handlers
            .events
            .insert(event.to_string(), handler);
    }

    /// Register `conn` and run the connect handler. A handler error removes
    /// the connection again.
    #[cfg(test)]
    pub fn connect(&self, conn: Conn) -> Result<()> {
        if self.insert(conn.clone())? {
            self.run_connect(conn)?;
        }
        Ok(())
    }

    /// Add `conn` to its namespace without running any handler. Returns
    /// `false` when the session already joined.
    pub fn insert(&self, conn: Conn) -> Result<bool> {
        let mut ns = self
            .namespaces
            .get_mut(conn.namespace())
            .ok_or_else(|| Error::InvalidNamespace(conn.namespace().to_string()))?;
        if ns.conns.contains_key(conn.id()) {
            return Ok(false);
        }
        ns.conns.insert(conn.id().to_string(), conn);
        Ok(true)
    }

    /// Run the connect handler of an inserted connection. A handler error
    /// removes the connection without running the disconnect handler.
    pub fn run_connect(&self, conn: Conn) -> Result<()> {
        let handler = self
            .namespaces
            .get(conn.namespace())
            .and_then(|ns| ns.handlers.connect.clone());

        if let Some(handler) = handler {
            if let Err(e) = handler(conn.clone()) {
                self.remove(conn.namespace(), conn.id());
                return Err(Error::ConnectRejected(e.to_string()));
            }
        }
        Ok(())
    }

    fn remove(&self, nsp: &str, sid: &str) -> Option<(Conn, Option<DisconnectHandler<Conn>>)> {
        let mut ns = self.namespaces.get_mut(nsp)?;
        let conn = ns.conns.remove(sid)?;
        ns.leave_all(sid);
        Some((conn, ns.handlers.disconnect.clone()))
    }

    /// Remove the connection and run the disconnect handler. Returns whether
    /// the connection was present.
    pub fn disconnect(&self, nsp: &str, sid: &str, reason: &str) -> bool {
        match self.remove(nsp, sid) {
            Some((conn, handler)) => {
                debug!("{} left {}: {}", sid, nsp, reason);
                if let Some(handler) = handler {
                    handler(conn, reason.to_string());
                }
                true
            }
            None => false,
        }
    }

    /// Disconnect a session from every namespace it joined
    pub fn disconnect_all(&self, sid: &str, reason: &str) {
        let joined: Vec<String> = self
            .namespaces
            .iter()
            .filter(|ns| ns.conns.contains_key(sid))
            .map(|ns| ns.key().clone())
            .collect();

        for nsp in joined {
            self.disconnect(&nsp, sid, reason);
        }
    }

    pub fn lookup(&self, nsp: &str, sid: &str) -> Option<Conn> {
        self.namespaces.get(nsp)?.conns.get(sid).cloned()
    }

    /// Dispatch an event from `sid` to the handler registered for it
    pub fn event(&self, nsp: &str, sid: &str, event: &str, data: String) -> Result<()> {
        let (conn, handler) = {
            let ns = self
                .namespaces
                .get(nsp)
                .ok_or_else(|| Error::InvalidNamespace(nsp.to_string()))?;
            let conn = ns
                .conns
                .get(sid)
                .cloned()
                .ok_or_else(|| Error::NotConnected(nsp.to_string()))?;
            (conn, ns.handlers.events.get(event).cloned())
        };

        match handler {
            Some(handler) => handler(conn, data),
            None => debug!("No handler for event '{}' in {}", event, nsp),
        }
        Ok(())
    }

    /// Hand an error to the namespace's error handler
    pub fn error(&self, nsp: &str, conn: Option<Conn>, error: Error) {
        let handler = self
            .namespaces
            .get(nsp)
            .and_then(|ns| ns.handlers.error.clone());

        match handler {
            Some(handler) => handler(conn, error),
            None => warn!("Unhandled error in {}: {}", nsp, error),
        }
    }

    pub fn join(&self, nsp: &str, room: &str, sid: &str) {
        if let Some(mut ns) = self.namespaces.get_mut(nsp) {
            if ns.conns.contains_key(sid) {
                ns.rooms
                    .entry(room.to_string())
                    .or_default()
                    .insert(sid.to_string());
            }
        }
    }

    pub fn leave(&self, nsp: &str, room: &str, sid: &str) {
        if let Some(mut ns) = self.namespaces.get_mut(nsp) {
            let now_empty = match ns.rooms.get_mut(room) {
                Some(members) => {
                    members.remove(sid);
                    members.is_empty()
                }
                None => false,
            };
            if now_empty {
                ns.rooms.remove(room);
            }
        }
    }

    pub fn leave_all(&self, nsp: &str, sid: &str) {
        if let Some(mut ns) = self.namespaces.get_mut(nsp) {
            ns.leave_all(sid);
        }
    }

    pub fn rooms_of(&self, nsp: &str, sid: &str) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .namespaces
            .get(nsp)
            .map(|ns| {
                ns.rooms
                    .iter()
                    .filter(|(_, members)| members.contains(sid))
                    .map(|(room, _)| room.clone())
                    .collect()
            })
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    pub fn rooms(&self, nsp: &str) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .namespaces
            .get(nsp)
            .map(|ns| ns.rooms.keys().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    pub fn room_len(&self, nsp: &str, room: &str) -> usize {
        self.namespaces
            .get(nsp)
            .and_then(|ns| ns.rooms.get(room).map(HashSet::len))
            .unwrap_or(0)
    }

    pub fn clear_room(&self, nsp: &str, room: &str) {
        if let Some(mut ns) = self.namespaces.get_mut(nsp) {
            ns.rooms.remove(room);
        }
    }

    pub fn count(&self, nsp: &str) -> usize {
        self.namespaces
            .get(nsp)
            .map(|ns| ns.conns.len())
            .unwrap_or(0)
    }

    /// Send `frame` to every connection of `nsp`, or of one room. Returns the
    /// number of connections that accepted it.
    pub fn broadcast(&self, nsp: &str, room: Option<&str>, frame: &ServerFrame) -> usize {
        let targets: Vec<Conn> = match self.namespaces.get(nsp) {
            Some(ns) => match room {
                Some(room) => ns
                    .rooms
                    .get(room)
                    .map(|members| {
                        members
                            .iter()
                            .filter_map(|sid| ns.conns.get(sid).cloned())
                            .collect()
                    })
                    .unwrap_or_default(),
                None => ns.conns.values().cloned().collect(),
            },
            None => return 0,
        };

        targets
            .iter()
            .filter(|conn| match conn.send(frame.clone()) {
                Ok(()) => true,
                Err(e) => {
                    debug!("Broadcast to {} skipped: {}", conn.id(), e);
                    false
                }
            })
            .count()
    }
}
