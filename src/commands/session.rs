//! Connection lifecycle commands: create, load, delete.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use super::{ApiError, AppState, Connection, SessionSnapshot};

/// Open a new connection with a freshly fetched model list.
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let models = state.registry.fetch_models().await;
    let connection = Connection::new(models, state.system_prompt.clone());
    let snapshot = SessionSnapshot::of(&connection);

    let id = state.insert_connection(connection)?;
    tracing::info!(
        session = %id,
        selected_model = %snapshot.selected_model,
        "session created"
    );
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// Current state of a connection.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state.snapshot(id).map(Json)
}

/// Drop a connection and its history.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let removed = state.remove_connection(id)?;
    tracing::info!(session = %id, turns = removed.session.len(), "session deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::state_for;
    use crate::inference::NO_MODELS_AVAILABLE;

    #[tokio::test]
    async fn test_create_with_unreachable_server_uses_default() {
        let state = state_for("http://127.0.0.1:9", Some("deepseek-coder:latest"));
        let (status, Json(snap)) = create_session(State(state.clone())).await.unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(snap.models.as_slice(), &["deepseek-coder:latest".to_string()]);
        assert_eq!(snap.selected_model, "deepseek-coder:latest");
        assert!(snap.turns.is_empty());
        assert!(state.snapshot(snap.session_id).is_ok());
    }

    #[tokio::test]
    async fn test_create_without_default_selects_sentinel() {
        let state = state_for("http://127.0.0.1:9", None);
        let (_, Json(snap)) = create_session(State(state)).await.unwrap();
        assert_eq!(snap.selected_model, NO_MODELS_AVAILABLE);
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let state = state_for("http://127.0.0.1:9", None);
        let (_, Json(snap)) = create_session(State(state.clone())).await.unwrap();

        let status = delete_session(State(state.clone()), Path(snap.session_id))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = get_session(State(state), Path(snap.session_id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::SessionNotFound { .. }));
    }
}
