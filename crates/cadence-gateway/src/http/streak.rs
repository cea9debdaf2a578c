use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::session_actor;
use crate::error::{from_notes, ApiError};

#[derive(Serialize)]
pub struct StreakResponse {
    pub streak: u32,
}

/// GET /streak: consecutive days with at least one sent note, counted
/// back from the most recent such day.
pub async fn streak_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StreakResponse>, ApiError> {
    let actor = session_actor(&state, &headers)?;
    let samples = state
        .notes
        .daily_counts(&actor.owner_id)
        .map_err(from_notes)?;
    Ok(Json(StreakResponse {
        streak: cadence_notes::streak(&samples),
    }))
}
