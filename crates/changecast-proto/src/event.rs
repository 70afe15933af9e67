//! Change notifications emitted after a change record is committed.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};

/// A committed change, as seen by the broadcast router.
///
/// The router only reads these fields; it never mutates an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Channel the change belongs to.
    #[serde(default, deserialize_with = "id_from_string_or_number")]
    pub channel_id: Option<String>,
    /// User the change is scoped to.
    #[serde(default, deserialize_with = "id_from_string_or_number")]
    pub user_id: Option<String>,
    /// Author of the change. Used only to route errors.
    #[serde(default, deserialize_with = "id_from_string_or_number")]
    pub created_by_id: Option<String>,
    /// Whether the change failed to apply.
    #[serde(default)]
    pub errored: bool,
    /// Serialized change, opaque to the router.
    pub payload: Value,
}

impl ChangeEvent {
    /// Create an event with the given payload and no identifiers.
    pub fn new(payload: Value) -> Self {
        Self {
            channel_id: None,
            user_id: None,
            created_by_id: None,
            errored: false,
            payload,
        }
    }

    /// Set the channel ID.
    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    /// Set the user ID.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the author ID.
    pub fn created_by(mut self, created_by_id: impl Into<String>) -> Self {
        self.created_by_id = Some(created_by_id.into());
        self
    }

    /// Mark the change as errored.
    pub fn with_errored(mut self, errored: bool) -> Self {
        self.errored = errored;
        self
    }

    /// Whether any of the channel, user or author IDs is present.
    pub fn has_identity(&self) -> bool {
        [&self.channel_id, &self.user_id, &self.created_by_id]
            .iter()
            .any(|id| id.as_deref().is_some_and(|id| !id.is_empty()))
    }
}

/// Accept an ID given as a JSON string or number; numbers are stringified.
fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(Number),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|id| match id {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    }))
}
