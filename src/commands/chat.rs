//! Chat commands: submit, retry, undo, clear, system prompt.
//!
//! Submit and retry run in two phases: mutate the session and build the
//! payload under the lock, then relay with the lock released and write the
//! reply back. The relay runs as its own task, so the turn still resolves
//! when the caller disconnects mid-request. If the turn was undone, retried
//! or cleared in between, the late reply is dropped.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::conversation::TurnHandle;
use crate::inference::relay::compose_messages;
use crate::inference::{ChatMessage, RelayInvoker};

use super::{ApiError, AppState, SessionSnapshot};

// ─── Request Types ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct SystemPromptRequest {
    pub system_prompt: Option<String>,
}

// ─── Relay job ──────────────────────────────────────────────────────────────

/// A relay call prepared under the connection lock.
#[derive(Debug)]
struct RelayJob {
    handle: TurnHandle,
    model: String,
    messages: Vec<ChatMessage>,
}

/// Relay a prepared job on a detached task and wait for the write-back.
///
/// Dropping the returned future (client gone) does not cancel the task.
async fn spawn_relay(state: &AppState, id: Uuid, job: RelayJob) -> Result<(), ApiError> {
    tokio::spawn(run_relay(state.clone(), id, job))
        .await
        .map_err(|e| ApiError::Internal {
            reason: format!("relay task failed: {e}"),
        })?
}

/// Relay a prepared job and write the reply into its turn.
async fn run_relay(state: AppState, id: Uuid, job: RelayJob) -> Result<(), ApiError> {
    let reply = state.invoker.send(&job.model, &job.messages).await;

    state.with_connection(id, |conn| {
        if let Err(e) = conn.session.resolve_turn(job.handle, reply) {
            tracing::warn!(
                session = %id,
                turn = %job.handle,
                error = %e,
                "dropping reply for a turn that is no longer pending"
            );
        }
        Ok(())
    })
}

// ─── Commands ───────────────────────────────────────────────────────────────

/// Append the prompt as a pending turn and relay it.
///
/// Blank prompts leave the session unchanged.
pub async fn submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let job = state.with_connection(id, |conn| {
        let Some(handle) = conn.session.append_user_turn(&req.prompt)? else {
            return Ok(None);
        };
        let messages = RelayInvoker::build_messages(&conn.session, conn.system_prompt.as_deref())?;
        Ok(Some(RelayJob {
            handle,
            model: conn.selected_model.clone(),
            messages,
        }))
    })?;

    if let Some(job) = job {
        spawn_relay(&state, id, job).await?;
    }
    state.snapshot(id).map(Json)
}

/// Re-ask the last prompt, replacing its response.
pub async fn retry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let job = state.with_connection(id, |conn| {
        Ok(conn.session.retry().map(|retry| RelayJob {
            handle: retry.handle,
            model: conn.selected_model.clone(),
            messages: compose_messages(
                conn.system_prompt.as_deref(),
                &retry.history,
                &retry.prompt,
            ),
        }))
    })?;

    if let Some(job) = job {
        spawn_relay(&state, id, job).await?;
    }
    state.snapshot(id).map(Json)
}

/// Remove the last turn.
pub async fn undo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state.with_connection(id, |conn| {
        conn.session.undo();
        Ok(SessionSnapshot::of(conn))
    })
    .map(Json)
}

/// Remove every turn.
pub async fn clear(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state.with_connection(id, |conn| {
        conn.session.clear();
        Ok(SessionSnapshot::of(conn))
    })
    .map(Json)
}

/// Replace the connection's system prompt. `null` or blank removes it.
pub async fn set_system_prompt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SystemPromptRequest>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state.with_connection(id, |conn| {
        conn.system_prompt = req.system_prompt.filter(|p| !p.trim().is_empty());
        Ok(SessionSnapshot::of(conn))
    })
    .map(Json)
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{connect, state_for};
    use crate::inference::{RelayError, NO_MODELS_AVAILABLE};

    #[tokio::test]
    async fn test_submit_blank_is_noop() {
        let state = state_for("http://127.0.0.1:9", Some("m1"));
        let id = connect(&state, &[], Some("m1"));

        let Json(snap) = submit(
            State(state.clone()),
            Path(id),
            Json(SubmitRequest { prompt: "   ".into() }),
        )
        .await
        .unwrap();
        assert!(snap.turns.is_empty());
    }

    #[tokio::test]
    async fn test_submit_with_sentinel_resolves_to_error_text() {
        let state = state_for("http://127.0.0.1:9", None);
        let id = connect(&state, &[], None);

        let Json(snap) = submit(
            State(state.clone()),
            Path(id),
            Json(SubmitRequest { prompt: "hello".into() }),
        )
        .await
        .unwrap();

        assert_eq!(snap.selected_model, NO_MODELS_AVAILABLE);
        assert_eq!(snap.turns.len(), 1);
        assert!(!snap.turns[0].pending);
        assert_eq!(
            snap.turns[0].response.as_deref(),
            Some(RelayError::NoModelsAvailable.user_message().as_str())
        );
    }

    #[tokio::test]
    async fn test_submit_while_pending_conflicts() {
        let state = state_for("http://127.0.0.1:9", None);
        let id = connect(&state, &[], None);
        state
            .with_connection(id, |conn| {
                conn.session.append_user_turn("in flight")?;
                Ok(())
            })
            .unwrap();

        let err = submit(
            State(state.clone()),
            Path(id),
            Json(SubmitRequest { prompt: "again".into() }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_undo_and_clear() {
        let state = state_for("http://127.0.0.1:9", None);
        let id = connect(&state, &[], None);
        for prompt in ["one", "two"] {
            submit(
                State(state.clone()),
                Path(id),
                Json(SubmitRequest { prompt: prompt.into() }),
            )
            .await
            .unwrap();
        }

        let Json(snap) = undo(State(state.clone()), Path(id)).await.unwrap();
        assert_eq!(snap.turns.len(), 1);
        assert_eq!(snap.turns[0].prompt, "one");

        let Json(snap) = clear(State(state.clone()), Path(id)).await.unwrap();
        assert!(snap.turns.is_empty());

        let Json(snap) = undo(State(state), Path(id)).await.unwrap();
        assert!(snap.turns.is_empty());
    }

    #[tokio::test]
    async fn test_retry_empty_is_noop() {
        let state = state_for("http://127.0.0.1:9", None);
        let id = connect(&state, &[], None);
        let Json(snap) = retry(State(state), Path(id)).await.unwrap();
        assert!(snap.turns.is_empty());
    }

    #[tokio::test]
    async fn test_set_system_prompt_blank_clears() {
        let state = state_for("http://127.0.0.1:9", None);
        let id = connect(&state, &[], None);

        let Json(snap) = set_system_prompt(
            State(state.clone()),
            Path(id),
            Json(SystemPromptRequest {
                system_prompt: Some("You are a coding assistant.".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(snap.system_prompt.as_deref(), Some("You are a coding assistant."));

        let Json(snap) = set_system_prompt(
            State(state),
            Path(id),
            Json(SystemPromptRequest {
                system_prompt: Some(" ".into()),
            }),
        )
        .await
        .unwrap();
        assert!(snap.system_prompt.is_none());
    }
}
