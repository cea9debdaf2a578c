//! Session-authenticated schedule endpoints.
//!
//! `POST /schedules`                  `{itemId, targetTimestamp}` → 204
//! `POST /schedules/cancel`           `{triggerName}` → 204
//! `POST /schedules/should-publish`   `{itemId}` → `{shouldPublish}`
//! `POST /schedules/requeue`          `{itemId}` → note, back in `queued`
//! `GET  /schedules`                  → `{schedules}`
//! `GET  /schedules/{item_id}`        → latest trigger, or 404

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use cadence_notes::Note;
use cadence_scheduler::ScheduledTrigger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::session_actor;
use crate::error::{api_error, from_scheduler, ApiError};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleRequest {
    pub item_id: String,
    /// RFC 3339 with any offset; stored in UTC.
    pub target_timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelScheduleRequest {
    pub trigger_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRequest {
    pub item_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShouldPublishResponse {
    pub should_publish: bool,
}

#[derive(Serialize)]
pub struct ScheduleList {
    pub schedules: Vec<ScheduledTrigger>,
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<StatusCode, ApiError> {
    let actor = session_actor(&state, &headers)?;
    state
        .schedules
        .create_schedule_for_item(&actor, &req.item_id, req.target_timestamp)
        .await
        .map_err(from_scheduler)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn cancel_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CancelScheduleRequest>,
) -> Result<StatusCode, ApiError> {
    let actor = session_actor(&state, &headers)?;
    state
        .schedules
        .cancel_schedule(&actor, &req.trigger_name)
        .await
        .map_err(from_scheduler)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn should_publish_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ItemRequest>,
) -> Result<Json<ShouldPublishResponse>, ApiError> {
    let actor = session_actor(&state, &headers)?;
    let should_publish = state
        .schedules
        .should_publish_for(&actor, &req.item_id)
        .map_err(from_scheduler)?;
    Ok(Json(ShouldPublishResponse { should_publish }))
}

pub async fn requeue_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ItemRequest>,
) -> Result<Json<Note>, ApiError> {
    let actor = session_actor(&state, &headers)?;
    let note = state
        .schedules
        .reschedule_to_queue(&actor, &req.item_id)
        .await
        .map_err(from_scheduler)?;
    Ok(Json(note))
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ScheduleList>, ApiError> {
    let actor = session_actor(&state, &headers)?;
    let schedules = state
        .schedules
        .list_triggers(&actor)
        .map_err(from_scheduler)?;
    Ok(Json(ScheduleList { schedules }))
}

pub async fn latest_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(item_id): Path<String>,
) -> Result<Json<ScheduledTrigger>, ApiError> {
    let actor = session_actor(&state, &headers)?;
    match state
        .schedules
        .latest_trigger_for_item(&actor, &item_id)
        .map_err(from_scheduler)?
    {
        Some(trigger) => Ok(Json(trigger)),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("no schedule for item {item_id}"),
        )),
    }
}
