//! Ollama HTTP client.
//!
//! Two endpoints are used: `GET /api/tags` for the model listing and
//! `POST /api/chat` (non-streaming) for completions. Each gets its own
//! `reqwest` client so the listing stays snappy while chat calls may run
//! for minutes.

use std::time::Duration;

use reqwest::Client as HttpClient;

use super::config::RelayConfig;
use super::errors::RelayError;
use super::types::{ChatMessage, ChatRequest, ChatResponse, TagsResponse};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout, shared by both clients.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── OllamaClient ────────────────────────────────────────────────────────────

/// Client for a single Ollama server.
///
/// Cheap to clone: the underlying `reqwest::Client`s are reference counted.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    /// HTTP client for chat requests (`request_timeout`).
    http: HttpClient,
    /// HTTP client for model listing (`listing_timeout`).
    http_listing: HttpClient,
    base_url: String,
    request_timeout: Duration,
    listing_timeout: Duration,
}

impl OllamaClient {
    /// Build a client from the relay configuration.
    ///
    /// Does NOT check connectivity; that happens on the first request.
    pub fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        Self::new(
            &config.base_url,
            config.request_timeout(),
            config.listing_timeout(),
        )
    }

    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        listing_timeout: Duration,
    ) -> Result<Self, RelayError> {
        let base_url = base_url.trim_end_matches('/').to_string();

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(request_timeout))
            .timeout(request_timeout)
            .build()
            .map_err(|e| RelayError::Config {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let http_listing = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(listing_timeout))
            .timeout(listing_timeout)
            .build()
            .map_err(|e| RelayError::Config {
                reason: format!("failed to build listing HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            http_listing,
            base_url,
            request_timeout,
            listing_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    // ─── Model listing ───────────────────────────────────────────────────

    /// List the names of all installed models, in server order.
    pub async fn list_model_names(&self) -> Result<Vec<String>, RelayError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .http_listing
            .get(&url)
            .send()
            .await
            .map_err(|e| map_transport_error(e, &url, self.listing_timeout))?;

        let body_text = read_success_body(response, &url, self.listing_timeout).await?;

        let tags: TagsResponse =
            serde_json::from_str(&body_text).map_err(|e| RelayError::MalformedResponse {
                reason: format!("tags payload: {e}"),
            })?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    // ─── Chat (non-streaming) ────────────────────────────────────────────

    /// Send one non-streaming chat request and return the assistant content
    /// verbatim.
    pub async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, RelayError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model,
            messages,
            stream: false,
        };

        tracing::info!(
            url = %url,
            model = %model,
            message_count = messages.len(),
            timeout_secs = self.request_timeout.as_secs(),
            "relaying chat request"
        );

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, &url, self.request_timeout))?;

        let body_text = read_success_body(response, &url, self.request_timeout).await?;

        let parsed: ChatResponse =
            serde_json::from_str(&body_text).map_err(|e| RelayError::MalformedResponse {
                reason: format!("chat payload: {e}"),
            })?;

        tracing::debug!(
            model = %model,
            response_chars = parsed.message.content.chars().count(),
            "chat response received"
        );

        Ok(parsed.message.content)
    }

    // ─── Health Check ────────────────────────────────────────────────────

    /// Whether the server answers the listing endpoint with a 2xx.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.http_listing.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

// ─── Error mapping ───────────────────────────────────────────────────────────

/// Read the body of a response, turning non-2xx statuses into
/// `UpstreamHttp`.
async fn read_success_body(
    response: reqwest::Response,
    url: &str,
    timeout: Duration,
) -> Result<String, RelayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RelayError::UpstreamHttp {
            status: status.as_u16(),
            body,
        });
    }

    response
        .text()
        .await
        .map_err(|e| map_transport_error(e, url, timeout))
}

/// Classify a `reqwest` transport failure.
///
/// Timeouts are checked first: a connect timeout reports both
/// `is_timeout()` and `is_connect()`.
fn map_transport_error(err: reqwest::Error, url: &str, timeout: Duration) -> RelayError {
    if err.is_timeout() {
        RelayError::Timeout {
            duration_secs: timeout.as_secs(),
        }
    } else if err.is_decode() {
        RelayError::MalformedResponse {
            reason: err.to_string(),
        }
    } else {
        RelayError::NetworkUnavailable {
            endpoint: url.to_string(),
            reason: err.to_string(),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_stripped() {
        let client = OllamaClient::new(
            "http://localhost:11434/",
            Duration::from_secs(60),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_from_config_uses_configured_timeout() {
        let config = RelayConfig {
            request_timeout_secs: 42,
            ..RelayConfig::default()
        };
        let client = OllamaClient::from_config(&config).unwrap();
        assert_eq!(client.request_timeout(), Duration::from_secs(42));
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        // Port 9 (discard) is essentially never served on loopback.
        let client = OllamaClient::new(
            "http://127.0.0.1:9",
            Duration::from_secs(2),
            Duration::from_secs(2),
        )
        .unwrap();
        assert!(!client.health_check().await);
    }
}
