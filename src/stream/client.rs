//! Opening the filtered event stream.

use futures::TryStreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::io::AsyncBufRead;
use tokio_util::io::StreamReader;
use tracing::info;

use super::session::StreamError;
use crate::invoker::OAuthSigner;

/// Filter endpoint of the streaming API.
pub const DEFAULT_STREAM_URL: &str = "https://stream.twitter.com/1.1/statuses/filter.json";

/// Merges search keywords into the single comma-separated `track` value.
pub fn merge_keywords(keywords: &[String]) -> String {
    keywords.join(",")
}

/// Opens signed connections to the filter stream.
#[derive(Debug, Clone)]
pub struct StreamClient {
    client: reqwest::Client,
    url: String,
    signer: OAuthSigner,
}

impl StreamClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>, signer: OAuthSigner) -> Self {
        StreamClient {
            client,
            url: url.into(),
            signer,
        }
    }

    /// Opens the stream tracking `keywords` and returns its body as lines.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Status` for a non-200 response and
    /// `StreamError::NotJson` if the body is not `application/json`.
    pub async fn connect(
        &self,
        keywords: &[String],
    ) -> Result<impl AsyncBufRead + Unpin + Send + 'static, StreamError> {
        let track = merge_keywords(keywords);
        let params = [("track", track.as_str())];
        let authorization = self.signer.authorization("POST", &self.url, &params);

        let response = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, authorization)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(StreamError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !crate::invoker::is_json_media_type(&content_type) {
            return Err(StreamError::NotJson(content_type));
        }

        info!(%track, "stream connected");
        let body = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
        Ok(StreamReader::new(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_comma_joined() {
        let keywords = vec!["rust".to_string(), "tokio".to_string()];
        assert_eq!(merge_keywords(&keywords), "rust,tokio");
        assert_eq!(merge_keywords(&["solo".to_string()]), "solo");
    }
}
