//! Minimal note intake (session auth). Status changes beyond creation go
//! through the schedule endpoints.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use cadence_notes::{Note, NoteStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::session_actor;
use crate::error::{api_error, from_notes, unauthorized, ApiError};

#[derive(Deserialize)]
pub struct CreateNoteRequest {
    pub body: String,
    /// `draft` (default), `inspiration` or `queued`.
    #[serde(default)]
    pub status: Option<NoteStatus>,
}

#[derive(Serialize)]
pub struct NoteList {
    pub notes: Vec<Note>,
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateNoteRequest>,
) -> Result<(StatusCode, Json<Note>), ApiError> {
    let actor = session_actor(&state, &headers)?;
    let note = state
        .notes
        .create(
            &actor.owner_id,
            &req.body,
            req.status.unwrap_or(NoteStatus::Draft),
        )
        .map_err(from_notes)?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<NoteList>, ApiError> {
    let actor = session_actor(&state, &headers)?;
    let notes = state
        .notes
        .list_for_owner(&actor.owner_id)
        .map_err(from_notes)?;
    Ok(Json(NoteList { notes }))
}

pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Note>, ApiError> {
    let actor = session_actor(&state, &headers)?;
    match state.notes.get(&id).map_err(from_notes)? {
        Some(note) if actor.owns(&note.owner_id) => Ok(Json(note)),
        Some(_) => Err(unauthorized()),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("note not found: {id}"),
        )),
    }
}
