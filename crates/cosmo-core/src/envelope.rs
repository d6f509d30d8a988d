//! The envelope exchanged between clients and relay nodes.

use serde::{Deserialize, Serialize};

use crate::planet::Planet;

/// Kind of event carried by an [`Envelope`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Presence announcement, broadcast immediately.
    Connection,
    /// Chat content, delayed through the transport layer.
    Message,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Message => "message",
        }
    }
}

/// JSON frame exchanged over the node sockets.
///
/// `id` is the sender's epoch-millisecond clock at send time. The relay never
/// rewrites it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: EventKind,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planet: Option<String>,
    /// Set when the message is known to be lost in transit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    /// Parse a text frame.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Build a chat message as delivered back from the transport layer.
    ///
    /// The origin tag is always Earth, since only Earth forwards messages.
    pub fn delivered(username: String, message: String, id: i64, error: Option<String>) -> Self {
        Self {
            event: EventKind::Message,
            username,
            message: Some(message),
            id,
            planet: Some(Planet::Earth.as_str().to_owned()),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_connection_frame() {
        let raw = r#"{"event":"connection","username":"Alice","planet":"Earth","id":1700000000000}"#;
        let env = Envelope::from_json(raw).unwrap();
        assert_eq!(env.event, EventKind::Connection);
        assert_eq!(env.username, "Alice");
        assert_eq!(env.planet.as_deref(), Some("Earth"));
        assert_eq!(env.id, 1_700_000_000_000);
        assert!(env.message.is_none());
    }

    #[test]
    fn parse_message_frame() {
        let raw = r#"{"event":"message","username":"Alice","message":"hi","id":1700000001000}"#;
        let env = Envelope::from_json(raw).unwrap();
        assert_eq!(env.event, EventKind::Message);
        assert_eq!(env.message.as_deref(), Some("hi"));
        assert!(env.planet.is_none());
    }

    #[test]
    fn unknown_event_is_rejected() {
        let raw = r#"{"event":"typing","username":"Alice","id":1}"#;
        assert!(Envelope::from_json(raw).is_err());
    }

    #[test]
    fn missing_id_is_rejected() {
        let raw = r#"{"event":"connection","username":"Alice"}"#;
        assert!(Envelope::from_json(raw).is_err());
    }

    #[test]
    fn not_json_is_rejected() {
        assert!(Envelope::from_json("hello").is_err());
    }

    #[test]
    fn delivered_envelope_serializes_in_wire_order() {
        let env = Envelope::delivered("Alice".into(), "hi".into(), 1_700_000_001_000, None);
        let json = serde_json::to_string(&env).unwrap();
        assert_eq!(
            json,
            r#"{"event":"message","username":"Alice","message":"hi","id":1700000001000,"planet":"Earth"}"#
        );
    }

    #[test]
    fn delivered_envelope_carries_error() {
        let env = Envelope::delivered("Bob".into(), "x".into(), 5, Some("lost".into()));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["error"], "lost");
        assert_eq!(value["planet"], "Earth");
    }

    #[test]
    fn event_kind_names() {
        assert_eq!(EventKind::Connection.as_str(), "connection");
        assert_eq!(EventKind::Message.as_str(), "message");
    }
}
