//! Domain message envelope and type tags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

use crate::types::{Error, MessageId, Result};

/// Type tag of an inbound domain message.
///
/// Unrecognized tags deserialize to [`MessageType::Unknown`] instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    ServerTime,
    Snapshots,
    Alerts,
    Chats,
    Unknown,
}

impl MessageType {
    pub const ALL: [MessageType; 5] = [
        MessageType::ServerTime,
        MessageType::Snapshots,
        MessageType::Alerts,
        MessageType::Chats,
        MessageType::Unknown,
    ];

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "server_time" => MessageType::ServerTime,
            "snapshots" => MessageType::Snapshots,
            "alerts" => MessageType::Alerts,
            "chats" => MessageType::Chats,
            _ => MessageType::Unknown,
        }
    }

    pub fn as_tag(self) -> &'static str {
        match self {
            MessageType::ServerTime => "server_time",
            MessageType::Snapshots => "snapshots",
            MessageType::Alerts => "alerts",
            MessageType::Chats => "chats",
            MessageType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(MessageType::from_tag(&tag))
    }
}

/// Destination a message resolves to before transport handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub topic: String,
    pub key: String,
}

/// Tagged domain message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: MessageId,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub payload: Value,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(kind: MessageType, payload: Value) -> Self {
        Self {
            id: MessageId::new(),
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Build a message from a raw tag; unknown tags become `Unknown`.
    pub fn tagged(tag: &str, payload: Value) -> Self {
        Self::new(MessageType::from_tag(tag), payload)
    }

    /// Resolve the transport destination from the payload's `topic` and `key`.
    pub fn route(&self) -> Result<Route> {
        let field = |name: &str| -> Result<String> {
            match self.payload.get(name).and_then(Value::as_str) {
                Some(s) if !s.is_empty() => Ok(s.to_string()),
                _ => Err(Error::routing(format!(
                    "message {} ({}) has no '{}' field",
                    self.id, self.kind, name
                ))),
            }
        };

        Ok(Route {
            topic: field("topic")?,
            key: field("key")?,
        })
    }

    /// Wire bytes handed to the transport (the JSON payload).
    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_tag_maps_to_unknown_variant() {
        assert_eq!(MessageType::from_tag("snapshots"), MessageType::Snapshots);
        assert_eq!(MessageType::from_tag("weather"), MessageType::Unknown);
        assert_eq!(MessageType::from_tag(""), MessageType::Unknown);
    }

    #[test]
    fn test_deserialize_unknown_tag() {
        let msg: Message =
            serde_json::from_value(json!({"type": "telemetry", "payload": {"a": 1}})).unwrap();
        assert_eq!(msg.kind, MessageType::Unknown);
        assert_eq!(msg.payload, json!({"a": 1}));
    }

    #[test]
    fn test_tag_round_trip_for_known_types() {
        for kind in MessageType::ALL {
            assert_eq!(MessageType::from_tag(kind.as_tag()), kind);
        }
    }

    #[test]
    fn test_route_from_payload() {
        let msg = Message::new(
            MessageType::Snapshots,
            json!({"topic": "snapshots", "key": "XLK", "snapshots": []}),
        );
        let route = msg.route().unwrap();
        assert_eq!(route.topic, "snapshots");
        assert_eq!(route.key, "XLK");
    }

    #[test]
    fn test_route_missing_key() {
        let msg = Message::new(MessageType::Alerts, json!({"topic": "alerts"}));
        let err = msg.route().unwrap_err();
        assert!(err.to_string().contains("'key'"));
    }
}
