//! Canonical form of a streamed event.
//!
//! Events arrive as loosely-typed JSON objects. Only three properties matter
//! here: the string identifier `id_str`, the numeric duplicate `id` (dropped),
//! and the presence of `retweeted_status` (a reshare of another event).
//! Everything else is archived verbatim.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{EventId, InvalidEventId};

/// Field holding the trusted, string form of the identifier.
pub const ID_STR_FIELD: &str = "id_str";

/// Numeric duplicate of the identifier injected by the platform.
pub const NUMERIC_ID_FIELD: &str = "id";

/// Field present only when the event reshares another one.
pub const RESHARE_FIELD: &str = "retweeted_status";

/// Errors that make an event impossible to canonicalize.
#[derive(Debug, Error)]
pub enum EventError {
    /// The record is not a JSON object.
    #[error("event is not a JSON object")]
    NotAnObject,

    /// The `id_str` field is missing.
    #[error("event has no {ID_STR_FIELD} field")]
    MissingId,

    /// The `id_str` field is present but not a string.
    #[error("event {ID_STR_FIELD} is not a string: {0}")]
    IdNotString(Value),

    /// The `id_str` field is a string but not a decimal identifier.
    #[error(transparent)]
    InvalidId(#[from] InvalidEventId),

    /// Serializing the canonical event failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// An event with its identifier extracted and the numeric duplicate removed.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEvent {
    id: EventId,
    is_reshare: bool,
    fields: Map<String, Value>,
}

impl CanonicalEvent {
    /// Canonicalizes a decoded stream record.
    pub fn from_value(value: Value) -> Result<Self, EventError> {
        let Value::Object(mut fields) = value else {
            return Err(EventError::NotAnObject);
        };

        fields.remove(NUMERIC_ID_FIELD);

        let id = match fields.get(ID_STR_FIELD) {
            None => return Err(EventError::MissingId),
            Some(Value::String(s)) => EventId::parse(s)?,
            Some(other) => return Err(EventError::IdNotString(other.clone())),
        };

        // Presence is what counts; the platform never sends an empty one.
        let is_reshare = fields.contains_key(RESHARE_FIELD);

        Ok(CanonicalEvent {
            id,
            is_reshare,
            fields,
        })
    }

    /// Returns the event identifier.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Returns true if this event reshares another one.
    pub fn is_reshare(&self) -> bool {
        self.is_reshare
    }

    /// Serializes the event deterministically.
    ///
    /// Keys come out sorted and indented by two spaces, so equivalent events
    /// always produce identical bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        let sorted: BTreeMap<&String, &Value> = self.fields.iter().collect();
        Ok(serde_json::to_vec_pretty(&sorted)?)
    }
}
