//! Session — the turn history of one chat connection.
//!
//! Responsibilities:
//! - Keep turns in conversation order
//! - Allow at most one pending turn, always the trailing one
//! - Undo / retry / clear on whole turns
//! - Build the upstream history (`Vec<ChatMessage>`) from completed turns

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::inference::types::ChatMessage;

use super::errors::SessionError;

// ─── Turn ───────────────────────────────────────────────────────────────────

/// Opaque identifier of one turn, handed out by append and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TurnHandle(Uuid);

impl TurnHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TurnHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Response state of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnState {
    /// Submitted, waiting for the relay.
    Pending,
    /// Response text (or relay error text) has arrived.
    Resolved(String),
}

/// One prompt/response exchange.
#[derive(Debug, Clone)]
pub struct Turn {
    pub handle: TurnHandle,
    pub prompt: String,
    pub state: TurnState,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Turn {
    fn pending(prompt: String) -> Self {
        Self {
            handle: TurnHandle::new(),
            prompt,
            state: TurnState::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, TurnState::Pending)
    }

    pub fn response(&self) -> Option<&str> {
        match &self.state {
            TurnState::Pending => None,
            TurnState::Resolved(text) => Some(text),
        }
    }
}

/// What a retry hands to the relay: the re-appended turn's handle, the
/// history before it, and its prompt.
#[derive(Debug, Clone)]
pub struct RetryRequest {
    pub handle: TurnHandle,
    pub history: Vec<ChatMessage>,
    pub prompt: String,
}

// ─── Session ────────────────────────────────────────────────────────────────

/// Ordered turns of one connection. Lives in memory only.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    turns: Vec<Turn>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            turns: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// The trailing turn, if it is pending.
    pub fn pending_turn(&self) -> Option<&Turn> {
        self.turns.last().filter(|t| t.is_pending())
    }

    // ─── Mutations ──────────────────────────────────────────────────────

    /// Append a pending turn for `prompt`.
    ///
    /// Blank prompts are ignored (`Ok(None)`). Appending while the trailing
    /// turn is still pending is a contract violation.
    pub fn append_user_turn(&mut self, prompt: &str) -> Result<Option<TurnHandle>, SessionError> {
        if prompt.trim().is_empty() {
            return Ok(None);
        }
        if let Some(pending) = self.pending_turn() {
            return Err(SessionError::invalid(format!(
                "turn {} is still waiting for a response",
                pending.handle
            )));
        }

        let turn = Turn::pending(prompt.to_string());
        let handle = turn.handle;
        self.turns.push(turn);
        tracing::debug!(session = %self.id, turn = %handle, "user turn appended");
        Ok(Some(handle))
    }

    /// Record the response of the pending turn `handle`.
    ///
    /// Fails unless `handle` names the trailing turn and that turn is still
    /// pending; a response for an undone or retried turn must not land on
    /// whatever turn replaced it.
    pub fn resolve_turn(&mut self, handle: TurnHandle, response: impl Into<String>) -> Result<(), SessionError> {
        let last = self
            .turns
            .last_mut()
            .ok_or_else(|| SessionError::invalid(format!("cannot resolve turn {handle}: session is empty")))?;

        if last.handle != handle {
            return Err(SessionError::invalid(format!(
                "cannot resolve turn {handle}: it is not the most recent turn"
            )));
        }
        if !last.is_pending() {
            return Err(SessionError::invalid(format!(
                "cannot resolve turn {handle}: it already has a response"
            )));
        }

        last.state = TurnState::Resolved(response.into());
        last.resolved_at = Some(Utc::now());
        Ok(())
    }

    /// Remove the trailing turn, pending or not.
    pub fn undo(&mut self) -> Option<Turn> {
        let removed = self.turns.pop();
        if let Some(turn) = &removed {
            tracing::debug!(session = %self.id, turn = %turn.handle, "turn undone");
        }
        removed
    }

    /// Replace the trailing turn with a fresh pending turn for the same
    /// prompt. Returns `None` on an empty session.
    pub fn retry(&mut self) -> Option<RetryRequest> {
        let last = self.turns.pop()?;
        let history = self.to_upstream_messages();

        let turn = Turn::pending(last.prompt);
        let handle = turn.handle;
        let prompt = turn.prompt.clone();
        self.turns.push(turn);

        tracing::debug!(
            session = %self.id,
            replaced = %last.handle,
            turn = %handle,
            "turn re-queued for retry"
        );
        Some(RetryRequest {
            handle,
            history,
            prompt,
        })
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    // ─── Upstream history ───────────────────────────────────────────────

    /// Completed turns as alternating user/assistant messages. Pending turns
    /// are skipped.
    pub fn to_upstream_messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .filter_map(|turn| {
                turn.response().map(|response| {
                    [
                        ChatMessage::user(turn.prompt.clone()),
                        ChatMessage::assistant(response),
                    ]
                })
            })
            .flatten()
            .collect()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
