//! Turning committed change records into change events.
//!
//! The persistence layer owns the record type. It implements [`ChangeRecord`]
//! to expose the routing fields and supplies a [`ChangeSerializer`] that
//! produces the wire payload; [`build_event`] combines the two.

use serde::Serialize;
use serde_json::Value;

use changecast_proto::ChangeEvent;

use crate::error::Error;

/// Routing fields of a persisted change record.
pub trait ChangeRecord {
    /// Channel the change belongs to.
    fn channel_id(&self) -> Option<String>;

    /// User the change is scoped to.
    fn user_id(&self) -> Option<String>;

    /// Author of the change.
    fn created_by_id(&self) -> Option<String>;

    /// Whether the change failed to apply.
    fn errored(&self) -> bool;
}

/// Produces the wire payload for a record.
pub trait ChangeSerializer<R: ?Sized> {
    /// Serialize `record` into its payload.
    fn serialize(&self, record: &R) -> Result<Value, Error>;
}

/// Serializes any `serde::Serialize` record with `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl<R: Serialize + ?Sized> ChangeSerializer<R> for JsonSerializer {
    fn serialize(&self, record: &R) -> Result<Value, Error> {
        serde_json::to_value(record).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Build the change event for a committed record.
pub fn build_event<R, S>(record: &R, serializer: &S) -> Result<ChangeEvent, Error>
where
    R: ChangeRecord + ?Sized,
    S: ChangeSerializer<R> + ?Sized,
{
    Ok(ChangeEvent {
        channel_id: record.channel_id(),
        user_id: record.user_id(),
        created_by_id: record.created_by_id(),
        errored: record.errored(),
        payload: serializer.serialize(record)?,
    })
}
