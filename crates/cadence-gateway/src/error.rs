//! Error bodies and the mapping from crate errors to HTTP statuses.
//!
//! Every authorization failure renders the same `{"error":"unauthorized"}`
//! body so callers cannot tell a bad token from a foreign note.

use axum::{http::StatusCode, Json};
use cadence_keys::KeyError;
use cadence_notes::NoteError;
use cadence_scheduler::SchedulerError;
use cadence_slots::SlotError;
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn unauthorized() -> ApiError {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody {
            error: "unauthorized".to_string(),
            code: None,
        }),
    )
}

pub fn api_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
            code: Some(code),
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
}

fn internal(code: &'static str, e: &dyn std::fmt::Display) -> ApiError {
    error!(code, error = %e, "internal error");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, code, "internal error")
}

pub fn from_scheduler(e: SchedulerError) -> ApiError {
    let status = match &e {
        SchedulerError::Unauthorized { .. } => return unauthorized(),
        SchedulerError::NotFound { .. } => StatusCode::NOT_FOUND,
        SchedulerError::AlreadyScheduled { .. }
        | SchedulerError::InvalidTransition { .. }
        | SchedulerError::Conflict(_) => StatusCode::CONFLICT,
        SchedulerError::ScheduleInPast { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SchedulerError::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
        SchedulerError::UnsupportedDirective(_) => StatusCode::BAD_REQUEST,
        SchedulerError::Gateway(_) | SchedulerError::Publish(_) => StatusCode::BAD_GATEWAY,
        SchedulerError::Notes(inner) => return note_status(inner, &e),
        SchedulerError::Storage(_) => return internal(e.code(), &e),
    };
    api_error(status, e.code(), e.to_string())
}

pub fn from_notes(e: NoteError) -> ApiError {
    note_status(&e, &e)
}

fn note_status(inner: &NoteError, shown: &dyn std::fmt::Display) -> ApiError {
    let status = match inner {
        NoteError::NotFound { .. } => StatusCode::NOT_FOUND,
        NoteError::InvalidTransition { .. } => StatusCode::CONFLICT,
        NoteError::InvalidStatus(_) | NoteError::EmptyBody => StatusCode::BAD_REQUEST,
        NoteError::Database(_) => return internal(inner.code(), shown),
    };
    api_error(status, inner.code(), shown.to_string())
}

pub fn from_slots(e: SlotError) -> ApiError {
    match &e {
        SlotError::InvalidSlot(_) | SlotError::InvalidMeridiem(_) => {
            api_error(StatusCode::BAD_REQUEST, e.code(), e.to_string())
        }
        SlotError::Database(_) => internal(e.code(), &e),
    }
}

/// Verification failures are all the same 401; storage trouble is a 500.
pub fn from_keys(e: KeyError) -> ApiError {
    match &e {
        KeyError::Database(_) | KeyError::Signing(_) => internal(e.code(), &e),
        _ => {
            warn!(code = e.code(), "capability token rejected");
            unauthorized()
        }
    }
}
