//! Relay invoker — forwards a session's pending prompt to the inference
//! server and returns display text.
//!
//! Network failures never escape as errors: they are rendered into the text
//! that replaces the assistant's reply. The only `Err` is a session contract
//! violation (relaying a session that has no pending turn).

use crate::conversation::{Session, SessionError};

use super::client::OllamaClient;
use super::errors::RelayError;
use super::registry::is_sentinel;
use super::types::ChatMessage;

/// Compose the upstream payload: optional system message, prior history,
/// then the prompt being answered. Blank system prompts are skipped.
pub fn compose_messages(
    system_prompt: Option<&str>,
    history: &[ChatMessage],
    prompt: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
        messages.push(ChatMessage::system(system));
    }
    messages.extend_from_slice(history);
    messages.push(ChatMessage::user(prompt));
    messages
}

/// Relays pending turns to one inference server.
#[derive(Debug, Clone)]
pub struct RelayInvoker {
    client: OllamaClient,
}

impl RelayInvoker {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }

    /// Build the payload for the session's pending turn.
    pub fn build_messages(
        session: &Session,
        system_prompt: Option<&str>,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        let pending = session.pending_turn().ok_or_else(|| SessionError::InvalidState {
            reason: "relay requested but the session has no pending turn".into(),
        })?;
        Ok(compose_messages(
            system_prompt,
            &session.to_upstream_messages(),
            &pending.prompt,
        ))
    }

    /// Send a prepared payload. Returns the assistant content or the
    /// rendered error text.
    pub async fn send(&self, model: &str, messages: &[ChatMessage]) -> String {
        match self.try_send(model, messages).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(model = %model, error = %e, "relay failed");
                e.user_message()
            }
        }
    }

    /// Like [`send`](Self::send) but keeps the error kind.
    pub async fn try_send(&self, model: &str, messages: &[ChatMessage]) -> Result<String, RelayError> {
        if is_sentinel(model) {
            return Err(RelayError::NoModelsAvailable);
        }
        self.client.chat(model, messages).await
    }

    /// Relay the session's pending turn to `model`.
    pub async fn invoke(
        &self,
        session: &Session,
        model: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, SessionError> {
        let messages = Self::build_messages(session, system_prompt)?;
        Ok(self.send(model, &messages).await)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::inference::registry::NO_MODELS_AVAILABLE;
    use crate::inference::types::Role;

    fn invoker_for(base_url: &str) -> RelayInvoker {
        let client =
            OllamaClient::new(base_url, Duration::from_secs(2), Duration::from_secs(2)).unwrap();
        RelayInvoker::new(client)
    }

    #[test]
    fn test_compose_with_system_prompt() {
        let history = vec![ChatMessage::user("q1"), ChatMessage::assistant("a1")];
        let messages = compose_messages(Some("be terse"), &history, "q2");
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(messages[3].content, "q2");
    }

    #[test]
    fn test_compose_skips_blank_system_prompt() {
        let messages = compose_messages(Some("  "), &[], "hello");
        assert_eq!(messages, vec![ChatMessage::user("hello")]);
    }

    #[test]
    fn test_build_messages_uses_pending_prompt() {
        let mut session = Session::new();
        let h = session.append_user_turn("q1").unwrap().unwrap();
        session.resolve_turn(h, "a1").unwrap();
        session.append_user_turn("q2").unwrap();

        let messages = RelayInvoker::build_messages(&session, None).unwrap();
        assert_eq!(
            messages,
            vec![
                ChatMessage::user("q1"),
                ChatMessage::assistant("a1"),
                ChatMessage::user("q2"),
            ]
        );
    }

    #[test]
    fn test_build_messages_without_pending_turn_is_error() {
        let session = Session::new();
        assert!(RelayInvoker::build_messages(&session, None).is_err());
    }

    #[tokio::test]
    async fn test_sentinel_short_circuits() {
        // Nothing listens here; a network attempt would produce a
        // connection error instead of the no-models text.
        let invoker = invoker_for("http://127.0.0.1:9");
        let mut session = Session::new();
        session.append_user_turn("hello").unwrap();

        let text = invoker
            .invoke(&session, NO_MODELS_AVAILABLE, None)
            .await
            .unwrap();
        assert_eq!(text, RelayError::NoModelsAvailable.user_message());
    }

    #[tokio::test]
    async fn test_invoke_without_pending_turn_is_error() {
        let invoker = invoker_for("http://127.0.0.1:9");
        let session = Session::new();
        assert!(invoker.invoke(&session, "m1", None).await.is_err());
    }
}
