//! Weekly slot endpoints (session auth).
//!
//! `GET /slots/next?utcOffsetMinutes=120` suggests the next enabled slot
//! time in the caller's offset. The suggestion is not scheduled; the client
//! sends it back through `POST /schedules`.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use cadence_slots::{next_occurrence, RecurringSlot, SlotInput};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::session_actor;
use crate::error::{bad_request, from_slots, ApiError};

#[derive(Serialize)]
pub struct SlotList {
    pub slots: Vec<RecurringSlot>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextQuery {
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

#[derive(Serialize)]
pub struct NextSlot {
    pub next: Option<DateTime<FixedOffset>>,
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SlotList>, ApiError> {
    let actor = session_actor(&state, &headers)?;
    let slots = state.slots.list_slots(&actor.owner_id).map_err(from_slots)?;
    Ok(Json(SlotList { slots }))
}

/// PUT /slots: insert or update one slot by its time of day.
pub async fn upsert_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(slot): Json<SlotInput>,
) -> Result<Json<RecurringSlot>, ApiError> {
    let actor = session_actor(&state, &headers)?;
    let stored = state
        .slots
        .upsert_slot(&actor.owner_id, &slot)
        .map_err(from_slots)?;
    Ok(Json(stored))
}

/// POST /slots/seed: idempotently install the default slots.
pub async fn seed_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SlotList>, ApiError> {
    let actor = session_actor(&state, &headers)?;
    state
        .slots
        .seed_defaults(&actor.owner_id)
        .map_err(from_slots)?;
    let slots = state.slots.list_slots(&actor.owner_id).map_err(from_slots)?;
    Ok(Json(SlotList { slots }))
}

pub async fn next_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<NextQuery>,
) -> Result<Json<NextSlot>, ApiError> {
    let actor = session_actor(&state, &headers)?;
    let offset = query
        .utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| bad_request("utcOffsetMinutes out of range"))?;
    let slots = state.slots.list_slots(&actor.owner_id).map_err(from_slots)?;
    let next = next_occurrence(&slots, Utc::now().with_timezone(&offset));
    Ok(Json(NextSlot { next }))
}
