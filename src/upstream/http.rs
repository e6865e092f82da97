//! HTTP upstream
//!
//! Forwards the request to `{scheme}://{destination}/chat/completions`, where
//! the destination is the host and optional path prefix the client named
//! (e.g. `api.openai.com/v1`). The authorization header and body go through
//! untouched and the response body streams back as it arrives.

use futures::{StreamExt, TryStreamExt};
use reqwest::Client;

use crate::error::{Error, Result};

use super::{ByteStream, Upstream, UpstreamError, UpstreamRequest};

/// Upstream backed by OpenAI-compatible HTTP APIs
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
    scheme: String,
}

impl HttpUpstream {
    /// Create an upstream that reaches destinations over https
    pub fn new() -> Result<Self> {
        Self::with_scheme("https")
    }

    /// Create an upstream using `scheme` (`http` or `https`)
    pub fn with_scheme(scheme: impl Into<String>) -> Result<Self> {
        let client = Client::builder().build()?;
        Self::with_client(client, scheme)
    }

    /// Create an upstream with a preconfigured client
    pub fn with_client(client: Client, scheme: impl Into<String>) -> Result<Self> {
        let scheme = scheme.into().to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(Error::config(format!(
                "upstream scheme must be http or https: {scheme}"
            )));
        }

        Ok(Self { client, scheme })
    }

    /// Scheme used to reach destinations
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Full URL for a destination
    pub fn url_for(&self, destination: &str) -> String {
        format!(
            "{}://{}/chat/completions",
            self.scheme,
            destination.trim_end_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl Upstream for HttpUpstream {
    async fn call(&self, request: &UpstreamRequest) -> std::result::Result<ByteStream, UpstreamError> {
        let url = self.url_for(&request.destination);
        tracing::debug!(url = %url, body_len = request.body.len(), "Forwarding upstream call");

        let response = self
            .client
            .post(&url)
            .header("Authorization", &request.authorization)
            .header("Content-Type", "application/json")
            .body(request.body.clone())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes_stream().map_err(transport_error).boxed())
    }
}

fn transport_error(err: reqwest::Error) -> UpstreamError {
    if err.is_body() || err.is_decode() {
        // Connection dropped or framing broke mid-body.
        UpstreamError::Truncated
    } else {
        UpstreamError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for() {
        let upstream = HttpUpstream::new().unwrap();
        assert_eq!(upstream.scheme(), "https");
        assert_eq!(
            upstream.url_for("api.openai.com/v1"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            upstream.url_for("api.example.com/"),
            "https://api.example.com/chat/completions"
        );
    }

    #[test]
    fn test_plain_http_scheme() {
        let upstream = HttpUpstream::with_scheme("HTTP").unwrap();
        assert_eq!(
            upstream.url_for("127.0.0.1:11434/v1"),
            "http://127.0.0.1:11434/v1/chat/completions"
        );
    }

    #[test]
    fn test_rejects_unknown_scheme() {
        let result = HttpUpstream::with_scheme("ftp");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
