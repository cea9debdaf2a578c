//! Endpoints for the browser extension.
//!
//! Auth: `x-capability-token`, `x-owner-id` and `x-author-id` headers. The
//! token must be the owner's currently active key.

use axum::{extract::State, http::HeaderMap, Json};
use cadence_scheduler::ScheduledTrigger;
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::extension_actor;
use crate::error::{from_scheduler, ApiError};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSchedules {
    pub active_schedules: Vec<ScheduledTrigger>,
}

/// GET /extension/schedules
pub async fn schedules_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ActiveSchedules>, ApiError> {
    let actor = extension_actor(&state, &headers)?;
    let active_schedules = state
        .schedules
        .active_schedules(&actor.owner_id)
        .map_err(from_scheduler)?;
    Ok(Json(ActiveSchedules { active_schedules }))
}
