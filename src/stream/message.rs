//! Decoding of individual stream records.

use serde_json::{Map, Value};

/// Field present on every event (as opposed to control notices).
const TEXT_FIELD: &str = "text";

/// One decoded line of the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Empty keep-alive line.
    KeepAlive,

    /// An event to archive.
    Event(Value),

    /// A control notice (rate limit, withheld content, disconnect, ...).
    Notice(Map<String, Value>),
}

/// Decodes one line of the stream.
///
/// # Errors
///
/// Returns the JSON error if a non-empty line is not a JSON object.
pub fn decode_line(line: &[u8]) -> Result<StreamMessage, serde_json::Error> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(StreamMessage::KeepAlive);
    }

    let fields: Map<String, Value> = serde_json::from_slice(line)?;
    if fields.get(TEXT_FIELD).is_some_and(|text| !text.is_null()) {
        Ok(StreamMessage::Event(Value::Object(fields)))
    } else {
        Ok(StreamMessage::Notice(fields))
    }
}

impl StreamMessage {
    /// Returns the notice kind (its first key), for logging.
    pub fn notice_kind(&self) -> Option<&str> {
        match self {
            StreamMessage::Notice(fields) => fields.keys().next().map(String::as_str),
            _ => None,
        }
    }
}
