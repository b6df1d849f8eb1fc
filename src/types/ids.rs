//! Newtype wrapper for event identifiers.
//!
//! Upstream events carry a 64-bit identifier twice: once as a JSON number
//! (which loses precision in many decoders) and once as a decimal string.
//! Only the string form is trusted; it is parsed into an [`EventId`] and
//! rendered back to decimal to get the canonical file name.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The unique identifier of a streamed event.
///
/// Ordering follows the numeric value, which is what the queue consumer
/// sorts by within one drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

/// Error returned when a string is not a plain decimal identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid event id: {0:?}")]
pub struct InvalidEventId(pub String);

impl EventId {
    /// Parses a decimal identifier.
    ///
    /// Only ASCII digits are accepted: no sign, no whitespace, no empty
    /// string. Leading zeros are accepted and dropped by [`fmt::Display`].
    pub fn parse(s: &str) -> Result<Self, InvalidEventId> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidEventId(s.to_string()));
        }
        s.parse::<u64>()
            .map(EventId)
            .map_err(|_| InvalidEventId(s.to_string()))
    }

    /// Returns the file name used for this event in both the archive and
    /// the queue: `<decimal-id>.json`.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EventId {
    fn from(n: u64) -> Self {
        EventId(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn display_parse_roundtrip(n: u64) {
            let id = EventId(n);
            prop_assert_eq!(EventId::parse(&id.to_string()), Ok(id));
        }

        #[test]
        fn ordering_matches_underlying(a: u64, b: u64) {
            prop_assert_eq!(EventId(a).cmp(&EventId(b)), a.cmp(&b));
        }

        #[test]
        fn rejects_non_digits(s in "[0-9]{0,5}[^0-9][0-9]{0,5}") {
            prop_assert!(EventId::parse(&s).is_err());
        }
    }

    #[test]
    fn rejects_empty_and_signed() {
        assert!(EventId::parse("").is_err());
        assert!(EventId::parse("+42").is_err());
        assert!(EventId::parse("-42").is_err());
        assert!(EventId::parse(" 42").is_err());
    }

    #[test]
    fn rejects_overflow() {
        assert!(EventId::parse("18446744073709551616").is_err());
        assert_eq!(
            EventId::parse("18446744073709551615"),
            Ok(EventId(u64::MAX))
        );
    }

    #[test]
    fn leading_zeros_canonicalize() {
        let id = EventId::parse("0042").unwrap();
        assert_eq!(id, EventId(42));
        assert_eq!(id.file_name(), "42.json");
    }
}
