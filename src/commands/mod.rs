//! HTTP commands exposed to the browser chat page.
//!
//! Each route maps one UI action (submit, retry, undo, clear, model refresh,
//! model change) onto the conversation session and the relay. Handlers hold
//! the connection lock only for synchronous session mutations, never across
//! a relay call.

pub mod chat;
pub mod ollama;
pub mod session;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::conversation::{Session, SessionError, TurnHandle};
use crate::inference::config::DEFAULT_SESSION_IDLE_TIMEOUT_SECS;
use crate::inference::{ModelList, ModelRegistry, RelayInvoker};

/// The single-page chat UI.
const INDEX_HTML: &str = include_str!("../../static/index.html");

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Errors returned to the browser as `{ "error": ... }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("session not found: '{session_id}'")]
    SessionNotFound { session_id: Uuid },

    /// The request breaks the session contract (e.g. submit while a reply
    /// is still pending).
    #[error(transparent)]
    Conflict(#[from] SessionError),

    #[error("unknown model: '{model}'")]
    UnknownModel { model: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UnknownModel { .. } => StatusCode::BAD_REQUEST,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        match &self {
            ApiError::Conflict(e) => tracing::error!(error = %e, "session contract violated"),
            ApiError::Internal { .. } => tracing::error!(error = %self, "request failed"),
            _ => tracing::debug!(error = %self, "request rejected"),
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

// ─── Connection state ───────────────────────────────────────────────────────

/// Everything one browser connection owns.
#[derive(Debug)]
pub struct Connection {
    pub session: Session,
    pub models: ModelList,
    pub selected_model: String,
    pub system_prompt: Option<String>,
    /// Last time a request touched this connection.
    last_seen: Instant,
}

impl Connection {
    pub fn new(models: ModelList, system_prompt: Option<String>) -> Self {
        let selected_model = models.default_model().to_string();
        Self {
            session: Session::new(),
            models,
            selected_model,
            system_prompt,
            last_seen: Instant::now(),
        }
    }

    /// Idle past `timeout` with no reply in flight.
    fn is_expired(&self, timeout: Duration) -> bool {
        self.session.pending_turn().is_none() && self.last_seen.elapsed() >= timeout
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: ModelRegistry,
    pub invoker: RelayInvoker,
    /// System prompt given to new connections.
    pub system_prompt: Option<String>,
    idle_timeout: Duration,
    connections: Arc<Mutex<HashMap<Uuid, Connection>>>,
}

impl AppState {
    pub fn new(
        registry: ModelRegistry,
        invoker: RelayInvoker,
        system_prompt: Option<String>,
    ) -> Self {
        Self {
            registry,
            invoker,
            system_prompt,
            idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_TIMEOUT_SECS),
            connections: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Drop connections idle for longer than `idle_timeout`.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Register a connection and return its id. Expired connections are
    /// swept first.
    pub fn insert_connection(&self, connection: Connection) -> Result<Uuid, ApiError> {
        let id = connection.session.id();
        let mut map = self.lock()?;

        let before = map.len();
        map.retain(|_, conn| !conn.is_expired(self.idle_timeout));
        let evicted = before - map.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = map.len(), "evicted idle connections");
        }

        map.insert(id, connection);
        Ok(id)
    }

    pub fn remove_connection(&self, id: Uuid) -> Result<Connection, ApiError> {
        let mut map = self.lock()?;
        map.remove(&id)
            .ok_or(ApiError::SessionNotFound { session_id: id })
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Run `f` against one connection under the lock.
    ///
    /// `f` must stay synchronous: the std mutex guard is not `Send` and must
    /// never live across an `.await`.
    pub fn with_connection<T, F>(&self, id: Uuid, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&mut Connection) -> Result<T, ApiError>,
    {
        let mut map = self.lock()?;
        let connection = map
            .get_mut(&id)
            .ok_or(ApiError::SessionNotFound { session_id: id })?;
        connection.last_seen = Instant::now();
        f(connection)
    }

    pub fn snapshot(&self, id: Uuid) -> Result<SessionSnapshot, ApiError> {
        self.with_connection(id, |conn| Ok(SessionSnapshot::of(conn)))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Connection>>, ApiError> {
        self.connections.lock().map_err(|e| ApiError::Internal {
            reason: format!("lock poisoned: {e}"),
        })
    }
}

// ─── Response Types ─────────────────────────────────────────────────────────

/// One turn as rendered by the page.
#[derive(Debug, Serialize)]
pub struct TurnView {
    pub id: TurnHandle,
    pub prompt: String,
    pub response: Option<String>,
    pub pending: bool,
    pub created_at: DateTime<Utc>,
}

/// Full state of one connection, returned by every mutating route.
#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub turns: Vec<TurnView>,
    pub models: ModelList,
    pub selected_model: String,
    pub system_prompt: Option<String>,
}

impl SessionSnapshot {
    pub fn of(conn: &Connection) -> Self {
        Self {
            session_id: conn.session.id(),
            turns: conn
                .session
                .turns()
                .iter()
                .map(|t| TurnView {
                    id: t.handle,
                    prompt: t.prompt.clone(),
                    response: t.response().map(str::to_string),
                    pending: t.is_pending(),
                    created_at: t.created_at,
                })
                .collect(),
            models: conn.models.clone(),
            selected_model: conn.selected_model.clone(),
            system_prompt: conn.system_prompt.clone(),
        }
    }
}

// ─── Router ─────────────────────────────────────────────────────────────────

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(ollama::health))
        .route("/api/sessions", post(session::create_session))
        .route(
            "/api/sessions/:id",
            get(session::get_session).delete(session::delete_session),
        )
        .route("/api/sessions/:id/submit", post(chat::submit))
        .route("/api/sessions/:id/retry", post(chat::retry))
        .route("/api/sessions/:id/undo", post(chat::undo))
        .route("/api/sessions/:id/clear", post(chat::clear))
        .route("/api/sessions/:id/system-prompt", put(chat::set_system_prompt))
        .route("/api/sessions/:id/models/refresh", post(ollama::refresh_models))
        .route("/api/sessions/:id/model", put(ollama::select_model))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// ─── Test support ───────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_unknown_session_is_not_found() {
        let state = state_for("http://127.0.0.1:9", Some("m1"));
        let err = state.snapshot(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApiError::SessionNotFound { .. }));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_status_mapping() {
        let conflict = ApiError::from(SessionError::InvalidState {
            reason: "x".into(),
        });
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);

        let unknown = ApiError::UnknownModel { model: "x".into() };
        assert_eq!(unknown.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_snapshot_reflects_connection() {
        let state = state_for("http://127.0.0.1:9", None);
        let id = connect(&state, &["a", "b"], Some("b"));
        state
            .with_connection(id, |conn| {
                conn.session.append_user_turn("hello")?;
                Ok(())
            })
            .unwrap();

        let snap = state.snapshot(id).unwrap();
        assert_eq!(snap.session_id, id);
        assert_eq!(snap.selected_model, "b");
        assert_eq!(snap.turns.len(), 1);
        assert!(snap.turns[0].pending);
        assert!(snap.turns[0].response.is_none());
    }

    #[test]
    fn test_idle_connections_evicted_on_insert() {
        let state = state_for("http://127.0.0.1:9", None).with_idle_timeout(Duration::ZERO);
        let idle = connect(&state, &["a"], None);
        let busy = connect(&state, &["a"], None);
        assert!(matches!(
            state.snapshot(idle),
            Err(ApiError::SessionNotFound { .. })
        ));

        state
            .with_connection(busy, |conn| {
                conn.session.append_user_turn("in flight")?;
                Ok(())
            })
            .unwrap();
        let fresh = connect(&state, &["a"], None);

        // A connection waiting on a reply is never evicted.
        assert_eq!(state.connection_count(), 2);
        assert!(state.snapshot(busy).is_ok());
        assert!(state.snapshot(fresh).is_ok());
    }

    #[test]
    fn test_active_connections_survive_insert() {
        let state = state_for("http://127.0.0.1:9", None);
        let first = connect(&state, &["a"], None);
        connect(&state, &["a"], None);
        assert_eq!(state.connection_count(), 2);
        assert!(state.snapshot(first).is_ok());
    }

    #[test]
    fn test_index_page_wiring() {
        // Connection is released when the tab goes away.
        assert!(INDEX_HTML.contains(r#"addEventListener("pagehide""#));
        assert!(INDEX_HTML.contains(r#"method: "DELETE", keepalive: true"#));
        // The prompt shows as pending before the relay returns.
        assert!(INDEX_HTML.contains("pending: true"));
    }

    #[test]
    fn test_remove_connection() {
        let state = state_for("http://127.0.0.1:9", None);
        let id = connect(&state, &["a"], None);
        assert_eq!(state.connection_count(), 1);
        state.remove_connection(id).unwrap();
        assert_eq!(state.connection_count(), 0);
        assert!(state.remove_connection(id).is_err());
    }
}
