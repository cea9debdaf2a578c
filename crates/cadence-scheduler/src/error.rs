use cadence_notes::{NoteError, NoteStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::publish::PublishError;

/// Errors that can occur within the scheduling engine.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No note or trigger with the given id exists.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// The actor does not own the note or trigger.
    #[error("owner {owner_id} is not allowed to {reason}")]
    Unauthorized { owner_id: String, reason: String },

    /// The item already has a live trigger and superseding is disabled.
    #[error("item {item_id} is already scheduled")]
    AlreadyScheduled { item_id: String },

    /// The requested time is in the past or inside the minimum lead time.
    #[error("schedule target {target} is not far enough in the future")]
    ScheduleInPast { target: DateTime<Utc> },

    /// The owner reached the outstanding-schedule ceiling of their plan.
    #[error("owner {owner_id} reached the limit of {limit} scheduled notes")]
    QuotaExceeded { owner_id: String, limit: usize },

    /// The note state machine does not allow `from -> to`.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: NoteStatus, to: NoteStatus },

    /// A concurrent caller changed the note or trigger first.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The gateway cannot express this kind of directive.
    #[error("unsupported directive: {0}")]
    UnsupportedDirective(String),

    #[error("trigger gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    /// Note store failure other than not-found or a transition error.
    #[error("note store error: {0}")]
    Notes(NoteError),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl From<NoteError> for SchedulerError {
    fn from(e: NoteError) -> Self {
        match e {
            NoteError::NotFound { id } => SchedulerError::NotFound { what: "note", id },
            NoteError::InvalidTransition { from, to } => {
                SchedulerError::InvalidTransition { from, to }
            }
            other => SchedulerError::Notes(other),
        }
    }
}

impl SchedulerError {
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::NotFound { .. } => "NOT_FOUND",
            SchedulerError::Unauthorized { .. } => "UNAUTHORIZED",
            SchedulerError::AlreadyScheduled { .. } => "ALREADY_SCHEDULED",
            SchedulerError::ScheduleInPast { .. } => "SCHEDULE_IN_PAST",
            SchedulerError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            SchedulerError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SchedulerError::Conflict(_) => "CONFLICT",
            SchedulerError::UnsupportedDirective(_) => "UNSUPPORTED_DIRECTIVE",
            SchedulerError::Gateway(_) => "GATEWAY_ERROR",
            SchedulerError::Publish(_) => "PUBLISH_ERROR",
            SchedulerError::Notes(e) => e.code(),
            SchedulerError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
