//! The republish action and its error classification.
//!
//! The consumer only sees the [`ActionInvoker`] trait, so tests can drive it
//! with scripted outcomes while production uses [`HttpInvoker`].

mod error;
mod http;
pub mod oauth;

use std::future::Future;

use crate::types::EventId;

pub use error::{ActionError, ActionErrorKind, SHARE_VALIDATION_FAILED, classify};
pub use http::{DEFAULT_API_URL, HttpInvoker};
pub(crate) use http::is_json_media_type;
pub use oauth::{AccessToken, AuthError, OAuthSigner};

/// Performs the republish of one event.
///
/// Implementations must be idempotent: after a crash the consumer may repeat
/// the call for an item whose earlier call already succeeded.
pub trait ActionInvoker {
    /// Reposts the event with this id.
    fn invoke(&self, id: EventId) -> impl Future<Output = Result<(), ActionError>> + Send;
}

/// Returns true if the error means the item can never be reposted.
pub fn is_permanent(error: &ActionError) -> bool {
    error.is_permanent()
}
