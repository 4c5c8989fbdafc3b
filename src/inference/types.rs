//! Wire types for the Ollama HTTP API.
//!
//! Only the fields the relay actually reads or writes are modelled; unknown
//! response fields are ignored by serde.

use serde::{Deserialize, Serialize};

// ─── Messages ────────────────────────────────────────────────────────────────

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in the upstream conversation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ─── /api/chat ───────────────────────────────────────────────────────────────

/// Request body for `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
}

/// Response body of a non-streaming `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub message: ResponseMessage,
}

/// The `message` object of a chat response.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    pub content: String,
}

// ─── /api/tags ───────────────────────────────────────────────────────────────

/// Raw `GET /api/tags` response shape.
#[derive(Debug, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<TagModel>,
}

/// Raw model entry from the tags API. Everything but `name` is ignored.
#[derive(Debug, Deserialize)]
pub struct TagModel {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = ChatMessage::assistant("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn test_chat_request_shape() {
        let messages = vec![ChatMessage::user("hello")];
        let req = ChatRequest {
            model: "m1",
            messages: &messages,
            stream: false,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "m1",
                "messages": [{"role": "user", "content": "hello"}],
                "stream": false
            })
        );
    }

    #[test]
    fn test_chat_response_ignores_extra_fields() {
        let body = r#"{"model":"m1","created_at":"2024-01-01T00:00:00Z",
            "message":{"role":"assistant","content":"hi"},"done":true}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.message.content, "hi");
    }

    #[test]
    fn test_chat_response_missing_message_is_error() {
        let parsed = serde_json::from_str::<ChatResponse>(r#"{"done":true}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_tags_response_missing_models_defaults_empty() {
        let parsed: TagsResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.models.is_empty());
    }

    #[test]
    fn test_tags_response_reads_names() {
        let body = r#"{"models":[
            {"name":"llama3:8b","size":4661224676,"details":{"parameter_size":"8B"}},
            {"name":"deepseek-coder:latest","size":776080839}
        ]}"#;
        let parsed: TagsResponse = serde_json::from_str(body).unwrap();
        let names: Vec<_> = parsed.models.into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["llama3:8b", "deepseek-coder:latest"]);
    }
}
