//! Repost error types.
//!
//! The consumer needs to tell two kinds of failure apart:
//!
//! - **Permanent** failures will never succeed: the target event is gone
//!   (HTTP 404) or the platform refuses to reshare it (HTTP 403 with the
//!   share-validation message). The queue item is quarantined.
//! - **Transient** failures are everything else, including transport errors
//!   with no HTTP status at all. The consumer stops and leaves the item in
//!   place for the next run.

use std::fmt;
use thiserror::Error;

/// Message the platform sends with a 403 when an event cannot be reshared.
pub const SHARE_VALIDATION_FAILED: &str =
    "sharing is not permissible for this status (Share validations failed)";

/// The kind of repost error, categorized for quarantine decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionErrorKind {
    /// Might succeed later; the item stays queued.
    Transient,

    /// Will never succeed; the item is quarantined.
    Permanent,
}

/// A failed repost.
#[derive(Debug, Error)]
pub struct ActionError {
    /// The HTTP status code, if a response was received.
    pub status: Option<u16>,

    /// The platform's error message, if one was returned.
    pub message: Option<String>,

    /// The underlying transport error, if any.
    #[source]
    pub source: Option<reqwest::Error>,
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.message) {
            (Some(code), Some(message)) => write!(f, "repost failed (HTTP {code}): {message:?}"),
            (Some(code), None) => write!(f, "repost failed (HTTP {code})"),
            (None, Some(message)) => write!(f, "repost failed: {message}"),
            (None, None) => write!(f, "repost failed"),
        }
    }
}

impl ActionError {
    /// Creates an error from a non-success HTTP response.
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        ActionError {
            status: Some(status),
            message,
            source: None,
        }
    }

    /// Creates an error for a request that got no usable response.
    pub fn transport(source: reqwest::Error) -> Self {
        ActionError {
            status: source.status().map(|s| s.as_u16()),
            message: Some(source.to_string()),
            source: Some(source),
        }
    }

    /// Categorizes this error.
    pub fn kind(&self) -> ActionErrorKind {
        classify(self.status, self.message.as_deref())
    }

    /// Returns true if retrying can never succeed.
    pub fn is_permanent(&self) -> bool {
        self.kind() == ActionErrorKind::Permanent
    }
}

/// Categorizes a status code and message.
///
/// Defined for every input: anything not recognized as permanent is
/// transient.
pub fn classify(status: Option<u16>, message: Option<&str>) -> ActionErrorKind {
    match (status, message) {
        (Some(404), _) => ActionErrorKind::Permanent,
        (Some(403), Some(SHARE_VALIDATION_FAILED)) => ActionErrorKind::Permanent,
        _ => ActionErrorKind::Transient,
    }
}
