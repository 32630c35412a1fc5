//! Envelope codec and reserved event payloads.
//!
//! Every transport frame carries exactly one envelope: `{"event": string, "data": any}`.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::BrokerError;

/// Reserved event names
pub mod events {
    pub const WELCOME: &str = "welcome";
    pub const RECONNECT: &str = "reconnect";
    pub const SESSION_RESTORED: &str = "session-restored";
    pub const JOIN_ROOM: &str = "join-room";
    pub const LEAVE_ROOM: &str = "leave-room";
    pub const SET_TAGS: &str = "set-tags";
    pub const LOGOUT: &str = "logout";
    pub const ERROR: &str = "error";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Decode a raw frame
    pub fn parse(raw: &str) -> Result<Self, BrokerError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Decode the payload into a typed structure
    pub fn decode<T: DeserializeOwned>(data: Value) -> Result<T, BrokerError> {
        Ok(serde_json::from_value(data)?)
    }
}

/// Serialize an envelope for outbound transmission
pub fn format(event: &str, data: Value) -> Arc<str> {
    Arc::from(json!({ "event": event, "data": data }).to_string())
}

/// Serialize an envelope from a typed payload
pub fn format_payload<T: Serialize>(event: &str, payload: &T) -> Result<Arc<str>, BrokerError> {
    Ok(format(event, serde_json::to_value(payload)?))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomePayload {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPayload {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRestoredPayload {
    pub id: String,
    pub rooms: Vec<String>,
    pub tags: Vec<String>,
}

/// Body of `join-room` and `leave-room`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPayload {
    pub room: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagsPayload {
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_shape() {
        let frame = format("chat", json!({"text": "hi"}));
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"event": "chat", "data": {"text": "hi"}}));
    }

    #[test]
    fn test_parse_missing_data_defaults_to_null() {
        let envelope = Envelope::parse(r#"{"event":"logout"}"#).unwrap();
        assert_eq!(envelope.event, "logout");
        assert_eq!(envelope.data, Value::Null);
    }

    #[test]
    fn test_parse_rejects_malformed_frames() {
        assert!(matches!(Envelope::parse("not json"), Err(BrokerError::Protocol(_))));
        assert!(matches!(Envelope::parse(r#"{"data":1}"#), Err(BrokerError::Protocol(_))));
        assert!(matches!(Envelope::parse(r#"{"event":7}"#), Err(BrokerError::Protocol(_))));
    }

    #[test]
    fn test_room_payload_optional_id() {
        let payload: RoomPayload = Envelope::decode(json!({"room": "lobby"})).unwrap();
        assert_eq!(payload.room, "lobby");
        assert!(payload.id.is_none());

        let payload: RoomPayload = Envelope::decode(json!({"room": "lobby", "id": "dev-1"})).unwrap();
        assert_eq!(payload.id.as_deref(), Some("dev-1"));
    }

    #[test]
    fn test_session_restored_payload_serializes() {
        let frame = format_payload(
            events::SESSION_RESTORED,
            &SessionRestoredPayload {
                id: "x".into(),
                rooms: vec!["A".into(), "B".into()],
                tags: vec!["t1".into()],
            },
        )
        .unwrap();
        let envelope = Envelope::parse(&frame).unwrap();
        assert_eq!(envelope.event, "session-restored");
        assert_eq!(envelope.data, json!({"id": "x", "rooms": ["A", "B"], "tags": ["t1"]}));
    }
}
