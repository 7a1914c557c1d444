//! Wire frame types
//!
//! Every frame is one JSON text message on the WebSocket, tagged by `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Namespace used when a frame omits `nsp`
pub const DEFAULT_NAMESPACE: &str = "/";

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Frame from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Join a namespace
    Connect {
        #[serde(default = "default_namespace")]
        nsp: String,
    },

    /// Leave a namespace
    Disconnect {
        #[serde(default = "default_namespace")]
        nsp: String,
    },

    /// Named event with an arbitrary payload
    Event {
        #[serde(default = "default_namespace")]
        nsp: String,
        event: String,
        #[serde(default)]
        data: Value,
    },

    /// Client-initiated keepalive
    Ping,

    /// Answer to a server ping
    Pong,
}

/// Frame from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// First frame of every session; intervals in milliseconds
    Open {
        sid: String,
        ping_interval: u64,
        ping_timeout: u64,
    },

    /// Namespace join accepted
    Connected { nsp: String, sid: String },

    /// Namespace join refused
    ConnectError { nsp: String, message: String },

    /// Named event
    Event {
        nsp: String,
        event: String,
        data: Value,
    },

    /// The server dropped the client from a namespace
    Disconnected { nsp: String },

    Ping,

    Pong,

    /// Protocol level error
    Error { message: String },
}

impl ServerFrame {
    /// Encode to the JSON text sent on the socket
    pub fn to_text(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl ClientFrame {
    /// Decode a JSON text message
    pub fn parse(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Render an event payload as the string handed to event handlers.
///
/// JSON strings are passed through without quotes, `null` becomes the empty
/// string and any other value is its compact JSON text.
pub fn payload_string(data: &Value) -> String {
    match data {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connect_defaults_to_root_namespace() {
        let frame = ClientFrame::parse(r#"{"type":"connect"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Connect {
                nsp: "/".to_string()
            }
        );
    }

    #[test]
    fn test_deserialize_event_frame() {
        let json = r#"{"type":"event","nsp":"/chat","event":"message","data":"hello"}"#;
        match ClientFrame::parse(json).unwrap() {
            ClientFrame::Event { nsp, event, data } => {
                assert_eq!(nsp, "/chat");
                assert_eq!(event, "message");
                assert_eq!(data, json!("hello"));
            }
            other => panic!("Wrong frame type: {:?}", other),
        }
    }

    #[test]
    fn test_event_without_data() {
        match ClientFrame::parse(r#"{"type":"event","event":"tick"}"#).unwrap() {
            ClientFrame::Event { nsp, data, .. } => {
                assert_eq!(nsp, "/");
                assert!(data.is_null());
            }
            other => panic!("Wrong frame type: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_frame_type_is_rejected() {
        assert!(ClientFrame::parse(r#"{"type":"upgrade"}"#).is_err());
        assert!(ClientFrame::parse("not json").is_err());
    }

    #[test]
    fn test_serialize_server_frames() {
        let open = ServerFrame::Open {
            sid: "abc".to_string(),
            ping_interval: 25000,
            ping_timeout: 20000,
        };
        let text = open.to_text().unwrap();
        assert!(text.contains(r#""type":"open""#));
        assert!(text.contains(r#""ping_interval":25000"#));

        let err = ServerFrame::ConnectError {
            nsp: "/admin".to_string(),
            message: "denied".to_string(),
        };
        assert!(err.to_text().unwrap().contains(r#""type":"connect_error""#));
    }

    #[test]
    fn test_payload_string() {
        assert_eq!(payload_string(&json!("hello")), "hello");
        assert_eq!(payload_string(&Value::Null), "");
        assert_eq!(payload_string(&json!(42)), "42");
        assert_eq!(payload_string(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
