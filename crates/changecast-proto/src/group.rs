//! Broadcast group names.
//!
//! A group name is the routing key handed to a transport. Channel groups are
//! keyed by a channel ID, user groups by a user ID; either falls back to
//! [`PLACEHOLDER_GROUP`] when the ID is absent.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Group used when a channel or user ID is absent.
pub const PLACEHOLDER_GROUP: &str = "dummy";

/// Maximum length of a group name in bytes (exclusive).
pub const MAX_GROUP_NAME_LEN: usize = 100;

/// A routing key identifying a broadcast audience.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupName(String);

impl GroupName {
    /// Channel-scoped group for an optional channel ID.
    pub fn channel(channel_id: Option<&str>) -> Self {
        Self::from_id(channel_id)
    }

    /// User-scoped group for an optional user ID.
    pub fn user(user_id: Option<&str>) -> Self {
        Self::from_id(user_id)
    }

    /// Use an identity verbatim as a destination.
    pub fn raw(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The placeholder group.
    pub fn placeholder() -> Self {
        Self(PLACEHOLDER_GROUP.to_string())
    }

    /// Group for an optional ID, falling back to the placeholder.
    pub fn from_id(id: Option<&str>) -> Self {
        match id {
            Some(id) if !id.is_empty() => Self(id.to_string()),
            _ => Self::placeholder(),
        }
    }

    /// Get the group name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this group name is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this is the placeholder group.
    pub fn is_placeholder(&self) -> bool {
        self.0 == PLACEHOLDER_GROUP
    }

    /// Check that the name can be used as a channel layer group.
    ///
    /// Names must be 1 to 99 bytes of ASCII alphanumerics, `-`, `_` or `.`.
    pub fn validate(&self) -> Result<(), Error> {
        if self.0.is_empty() {
            return Err(self.invalid("name is empty"));
        }
        if self.0.len() >= MAX_GROUP_NAME_LEN {
            return Err(self.invalid(format!(
                "length {} exceeds maximum {}",
                self.0.len(),
                MAX_GROUP_NAME_LEN - 1
            )));
        }
        if let Some(c) = self
            .0
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(self.invalid(format!("character {:?} is not allowed", c)));
        }
        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidGroupName {
            name: self.0.clone(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GroupName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GroupName {
    fn from(name: &str) -> Self {
        Self::raw(name)
    }
}

impl From<String> for GroupName {
    fn from(name: String) -> Self {
        Self::raw(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_ids_are_used_verbatim() {
        assert_eq!(GroupName::channel(Some("abc")).as_str(), "abc");
        assert_eq!(GroupName::user(Some("u1")).as_str(), "u1");
    }

    #[test]
    fn test_absent_ids_become_placeholder() {
        assert_eq!(GroupName::channel(None).as_str(), PLACEHOLDER_GROUP);
        assert_eq!(GroupName::user(None).as_str(), PLACEHOLDER_GROUP);
        assert!(GroupName::user(Some("")).is_placeholder());
        assert!(!GroupName::user(Some("u1")).is_placeholder());
    }

    #[test]
    fn test_raw_keeps_empty_names() {
        let name = GroupName::raw("");
        assert!(name.is_empty());
        assert!(name.validate().is_err());
    }

    #[test]
    fn test_validate() {
        assert!(GroupName::raw("a1b2-c3_d4.e5").validate().is_ok());
        assert!(GroupName::raw("42").validate().is_ok());
        assert!(GroupName::raw("has space").validate().is_err());
        assert!(GroupName::raw("ünïcode").validate().is_err());
        assert!(GroupName::raw("x".repeat(99)).validate().is_ok());

        match GroupName::raw("x".repeat(100)).validate() {
            Err(Error::InvalidGroupName { name, reason }) => {
                assert_eq!(name.len(), 100);
                assert!(reason.contains("exceeds maximum 99"));
            }
            other => panic!("expected invalid group name, got {:?}", other),
        }
    }

    #[test]
    fn test_serde_is_transparent() {
        let json = serde_json::to_string(&GroupName::raw("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }
}
