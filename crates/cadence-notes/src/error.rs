use thiserror::Error;

use crate::types::NoteStatus;

/// Errors that can occur during note operations.
#[derive(Debug, Error)]
pub enum NoteError {
    /// The requested note does not exist.
    #[error("note not found: {id}")]
    NotFound { id: String },

    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The state machine does not allow `from -> to`.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: NoteStatus, to: NoteStatus },

    /// A stored or submitted status string is not a known status.
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    /// Notes are created with a non-empty body.
    #[error("note body is empty")]
    EmptyBody,
}

impl NoteError {
    pub fn code(&self) -> &'static str {
        match self {
            NoteError::NotFound { .. } => "NOT_FOUND",
            NoteError::Database(_) => "DATABASE_ERROR",
            NoteError::InvalidTransition { .. } => "INVALID_TRANSITION",
            NoteError::InvalidStatus(_) => "INVALID_STATUS",
            NoteError::EmptyBody => "EMPTY_BODY",
        }
    }
}

pub type Result<T> = std::result::Result<T, NoteError>;
