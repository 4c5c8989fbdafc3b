//! Relay error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. None of them are
//! meant to reach the browser as failures: the relay renders them with
//! [`RelayError::user_message`] and writes the text where the assistant's
//! reply would have gone.

use thiserror::Error;

/// Errors that can occur while talking to the inference server.
#[derive(Debug, Error)]
pub enum RelayError {
    /// TCP/HTTP connection to the inference server failed.
    #[error("cannot connect to inference server at {endpoint}: {reason}")]
    NetworkUnavailable { endpoint: String, reason: String },

    /// The inference server did not answer within the configured timeout.
    #[error("inference server timed out after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the inference server.
    #[error("inference server returned HTTP {status}: {body}")]
    UpstreamHttp { status: u16, body: String },

    /// The response body was not the JSON shape we expect.
    #[error("invalid response from inference server: {reason}")]
    MalformedResponse { reason: String },

    /// The selected model is the "no models available" sentinel.
    #[error("no models available: pull a model on the inference server and refresh the model list")]
    NoModelsAvailable,

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    Config { reason: String },
}

impl RelayError {
    /// Text shown in the chat in place of the assistant's response.
    pub fn user_message(&self) -> String {
        format!("Error: {self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::registry::NO_MODELS_AVAILABLE;

    #[test]
    fn test_user_message_connection_failed() {
        let err = RelayError::NetworkUnavailable {
            endpoint: "http://127.0.0.1:11434/api/chat".into(),
            reason: "connection refused".into(),
        };
        let text = err.user_message();
        assert!(text.starts_with("Error: cannot connect to inference server"));
        assert!(text.contains("127.0.0.1:11434"));
    }

    #[test]
    fn test_user_message_http_includes_status_and_body() {
        let err = RelayError::UpstreamHttp {
            status: 404,
            body: r#"{"error":"model 'x' not found"}"#.into(),
        };
        let text = err.user_message();
        assert!(text.contains("404"));
        assert!(text.contains("model 'x' not found"));
    }

    #[test]
    fn test_no_models_message_names_sentinel() {
        let text = RelayError::NoModelsAvailable.user_message();
        assert!(text.contains(NO_MODELS_AVAILABLE));
    }
}
