use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::app::AppState;
use crate::auth::session_actor;
use crate::error::{from_keys, unauthorized, ApiError};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateRequest {
    pub owner_id: String,
    pub author_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateResponse {
    pub token: String,
    pub author_id: String,
}

#[derive(Serialize)]
pub struct ActiveKeyResponse {
    pub token: Option<String>,
}

/// POST /keys/rotate: issue a new extension token, revoking older ones.
pub async fn rotate_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RotateRequest>,
) -> Result<Json<RotateResponse>, ApiError> {
    let actor = session_actor(&state, &headers)?;
    if !actor.owns(&req.owner_id) {
        warn!(owner_id = %actor.owner_id, op = "rotate_key", "rotation requested for another owner");
        return Err(unauthorized());
    }
    let key = state
        .keys
        .rotate(&actor.owner_id, &req.author_id)
        .map_err(from_keys)?;
    Ok(Json(RotateResponse {
        token: key.token,
        author_id: key.author_id,
    }))
}

/// GET /keys/active
pub async fn active_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ActiveKeyResponse>, ApiError> {
    let actor = session_actor(&state, &headers)?;
    let token = state
        .keys
        .fetch_active(&actor.owner_id)
        .map_err(from_keys)?;
    Ok(Json(ActiveKeyResponse { token }))
}
