//! Broadcast messages and their wire envelope.
//!
//! On the wire a message is the JSON object consumers dispatch on:
//!
//! ```json
//! {"type": "broadcast_changes", "change": {...}}
//! {"type": "broadcast_changes", "errored": {...}}
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::Error;

/// Consumer handler that receives change broadcasts.
pub const HANDLER_TYPE: &str = "broadcast_changes";

/// Kind of broadcast, which selects the payload key in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A change that applied and should be shown to the audience.
    Change,
    /// A change that failed, reported back to its author.
    Error,
}

impl MessageKind {
    /// Envelope key carrying the payload.
    pub fn key(&self) -> &'static str {
        match self {
            MessageKind::Change => "change",
            MessageKind::Error => "errored",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Change => f.write_str("change"),
            MessageKind::Error => f.write_str("error"),
        }
    }
}

/// A message sent to one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Envelope", try_from = "Envelope")]
pub struct BroadcastMessage {
    /// Kind of broadcast.
    pub kind: MessageKind,
    /// Serialized change.
    pub payload: Value,
}

impl BroadcastMessage {
    /// Create a change broadcast.
    pub fn change(payload: Value) -> Self {
        Self {
            kind: MessageKind::Change,
            payload,
        }
    }

    /// Create an error broadcast.
    pub fn error(payload: Value) -> Self {
        Self {
            kind: MessageKind::Error,
            payload,
        }
    }

    /// Check if this is an error broadcast.
    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }

    /// Encode the envelope as JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode an envelope from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    handler: String,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    change: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    errored: Option<Value>,
}

// A present key always yields Some, even when its value is null.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl From<BroadcastMessage> for Envelope {
    fn from(message: BroadcastMessage) -> Self {
        let (change, errored) = match message.kind {
            MessageKind::Change => (Some(message.payload), None),
            MessageKind::Error => (None, Some(message.payload)),
        };
        Self {
            handler: HANDLER_TYPE.to_string(),
            change,
            errored,
        }
    }
}

impl TryFrom<Envelope> for BroadcastMessage {
    type Error = Error;

    fn try_from(envelope: Envelope) -> Result<Self, Error> {
        if envelope.handler != HANDLER_TYPE {
            return Err(Error::InvalidMessage(format!(
                "unexpected message type {:?}, expected {:?}",
                envelope.handler, HANDLER_TYPE
            )));
        }

        match (envelope.change, envelope.errored) {
            (Some(payload), None) => Ok(Self::change(payload)),
            (None, Some(payload)) => Ok(Self::error(payload)),
            (Some(_), Some(_)) => Err(Error::InvalidMessage(
                "envelope carries both change and errored payloads".to_string(),
            )),
            (None, None) => Err(Error::InvalidMessage(
                "envelope carries no payload".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_change_envelope_shape() {
        let message = BroadcastMessage::change(json!({"server_rev": 5}));
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(
            value,
            json!({"type": "broadcast_changes", "change": {"server_rev": 5}})
        );
    }

    #[test]
    fn test_error_envelope_shape() {
        let message = BroadcastMessage::error(json!({"server_rev": 6}));
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(
            value,
            json!({"type": "broadcast_changes", "errored": {"server_rev": 6}})
        );
        assert!(message.is_error());
    }

    #[test]
    fn test_null_payload_survives_decoding() {
        let message =
            BroadcastMessage::from_json(br#"{"type": "broadcast_changes", "change": null}"#)
                .unwrap();
        assert_eq!(message, BroadcastMessage::change(Value::Null));
    }

    #[test]
    fn test_rejects_wrong_type() {
        let result = BroadcastMessage::from_json(br#"{"type": "chat_message", "change": 1}"#);
        assert!(matches!(result, Err(Error::Deserialization(_))));
    }

    #[test]
    fn test_rejects_ambiguous_or_empty_envelopes() {
        let both = br#"{"type": "broadcast_changes", "change": 1, "errored": 2}"#;
        let neither = br#"{"type": "broadcast_changes"}"#;

        let err = BroadcastMessage::from_json(both).unwrap_err();
        assert!(err.to_string().contains("both change and errored"));

        let err = BroadcastMessage::from_json(neither).unwrap_err();
        assert!(err.to_string().contains("no payload"));
    }

    #[test]
    fn test_kind_keys() {
        assert_eq!(MessageKind::Change.key(), "change");
        assert_eq!(MessageKind::Error.key(), "errored");
        assert_eq!(MessageKind::Error.to_string(), "error");
    }
}
