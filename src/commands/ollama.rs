//! Model commands: refresh the listing, change the selected model, health.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, AppState, SessionSnapshot};

#[derive(Debug, Deserialize)]
pub struct SelectModelRequest {
    pub model: String,
}

/// Health report for the front end.
#[derive(Debug, Serialize)]
pub struct HealthInfo {
    pub status: &'static str,
    pub version: &'static str,
    pub inference_server: String,
    pub inference_server_reachable: bool,
    pub connections: usize,
}

/// Report relay liveness and whether the inference server answers.
pub async fn health(State(state): State<AppState>) -> Json<HealthInfo> {
    let client = state.invoker.client();
    Json(HealthInfo {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        inference_server: client.base_url().to_string(),
        inference_server_reachable: client.health_check().await,
        connections: state.connection_count(),
    })
}

/// Re-fetch the model listing for one connection.
///
/// The current selection survives if the model is still listed; otherwise
/// the new default entry is selected.
pub async fn refresh_models(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    // Fail fast before touching the network.
    state.with_connection(id, |_| Ok(()))?;

    let models = state.registry.fetch_models().await;

    state
        .with_connection(id, |conn| {
            conn.selected_model = models.select(Some(conn.selected_model.as_str())).to_string();
            conn.models = models;
            Ok(SessionSnapshot::of(conn))
        })
        .map(Json)
}

/// Change the model used for subsequent relays. Must be a listed model.
pub async fn select_model(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SelectModelRequest>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state
        .with_connection(id, |conn| {
            if !conn.models.contains(&req.model) {
                return Err(ApiError::UnknownModel { model: req.model });
            }
            tracing::info!(session = %id, model = %req.model, "model selected");
            conn.selected_model = req.model;
            Ok(SessionSnapshot::of(conn))
        })
        .map(Json)
}
