use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Hour outside 1..=12, minute outside 0..=59, or a blank owner.
    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    #[error("Invalid meridiem: {0}")]
    InvalidMeridiem(String),
}

impl SlotError {
    pub fn code(&self) -> &'static str {
        match self {
            SlotError::Database(_) => "DATABASE_ERROR",
            SlotError::InvalidSlot(_) => "INVALID_SLOT",
            SlotError::InvalidMeridiem(_) => "INVALID_MERIDIEM",
        }
    }
}

pub type Result<T> = std::result::Result<T, SlotError>;
