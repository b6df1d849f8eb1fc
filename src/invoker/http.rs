//! Reposting over the platform's HTTP API.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::error::ActionError;
use super::oauth::OAuthSigner;
use super::ActionInvoker;
use crate::types::EventId;

/// Base URL of the REST API.
pub const DEFAULT_API_URL: &str = "https://api.twitter.com/1.1";

/// Error body returned with non-200 responses.
///
/// Older responses carry a bare string, newer ones a list of
/// `{code, message}` objects.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Value,
}

impl ErrorBody {
    fn message(&self) -> Option<String> {
        match &self.errors {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => items
                .first()
                .and_then(|item| item.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    }
}

/// Reposts events with signed `POST statuses/retweet/<id>.json` calls.
#[derive(Debug, Clone)]
pub struct HttpInvoker {
    client: reqwest::Client,
    api_url: String,
    signer: OAuthSigner,
}

impl HttpInvoker {
    pub fn new(client: reqwest::Client, api_url: impl Into<String>, signer: OAuthSigner) -> Self {
        HttpInvoker {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            signer,
        }
    }

    /// Returns the endpoint used to repost an event.
    pub fn repost_url(&self, id: EventId) -> String {
        format!("{}/statuses/retweet/{}.json", self.api_url, id)
    }

    async fn repost(&self, id: EventId) -> Result<(), ActionError> {
        let url = self.repost_url(id);
        let params = [("trim_user", "true")];
        let authorization = self.signer.authorization("POST", &url, &params);

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, authorization)
            .form(&params)
            .send()
            .await
            .map_err(ActionError::transport)?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            debug!(%id, "reposted");
            return Ok(());
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_json_media_type);
        let message = if is_json {
            // Best effort: an unreadable body still leaves the status code.
            response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message())
        } else {
            None
        };

        Err(ActionError::from_status(status.as_u16(), message))
    }
}

impl ActionInvoker for HttpInvoker {
    async fn invoke(&self, id: EventId) -> Result<(), ActionError> {
        self.repost(id).await
    }
}

/// Checks whether a `Content-Type` value names JSON, ignoring parameters.
pub(crate) fn is_json_media_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::oauth::AccessToken;

    fn invoker(api_url: &str) -> HttpInvoker {
        HttpInvoker::new(
            reqwest::Client::new(),
            api_url,
            OAuthSigner::new(
                "ck",
                "cs",
                AccessToken {
                    token: "tk".into(),
                    token_secret: "ts".into(),
                },
            ),
        )
    }

    #[test]
    fn repost_url_uses_decimal_id() {
        let invoker = invoker("https://api.example.com/1.1/");
        assert_eq!(
            invoker.repost_url(EventId(123)),
            "https://api.example.com/1.1/statuses/retweet/123.json"
        );
    }

    #[test]
    fn error_body_string_message() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"errors": "sharing is not permissible"}"#).unwrap();
        assert_eq!(body.message().as_deref(), Some("sharing is not permissible"));
    }

    #[test]
    fn error_body_list_message() {
        let body: ErrorBody = serde_json::from_str(
            r#"{"errors": [{"code": 327, "message": "already retweeted"}]}"#,
        )
        .unwrap();
        assert_eq!(body.message().as_deref(), Some("already retweeted"));
    }

    #[test]
    fn error_body_without_errors() {
        let body: ErrorBody = serde_json::from_str(r#"{"other": 1}"#).unwrap();
        assert_eq!(body.message(), None);
    }

    #[test]
    fn json_media_type_detection() {
        assert!(is_json_media_type("application/json"));
        assert!(is_json_media_type("application/json; charset=utf-8"));
        assert!(is_json_media_type("Application/JSON"));
        assert!(!is_json_media_type("text/html; charset=utf-8"));
        assert!(!is_json_media_type(""));
    }

    #[tokio::test]
    async fn unreachable_host_is_transient() {
        // Port 9 on localhost refuses connections.
        let err = invoker("http://127.0.0.1:9").invoke(EventId(1)).await.unwrap_err();
        assert!(!err.is_permanent());
    }
}
