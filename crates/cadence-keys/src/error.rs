use thiserror::Error;

/// Errors from issuing and checking extension capability tokens.
///
/// The HTTP layer collapses every variant into one generic 401; the detail
/// here is for logs and tests only.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Malformed token, bad signature or past expiry.
    #[error("invalid token: {0}")]
    InvalidSignature(String),

    /// The token is valid but names a different owner or author.
    #[error("token claims do not match the presented identity")]
    Mismatch,

    /// The token is genuine but no longer the owner's active key.
    #[error("token is not the active key for owner {owner_id}")]
    Inactive { owner_id: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("signing error: {0}")]
    Signing(String),
}

impl KeyError {
    pub fn code(&self) -> &'static str {
        match self {
            KeyError::InvalidSignature(_) => "INVALID_SIGNATURE",
            KeyError::Mismatch => "MISMATCH",
            KeyError::Inactive { .. } => "INACTIVE",
            KeyError::Database(_) => "DATABASE_ERROR",
            KeyError::Signing(_) => "SIGNING_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, KeyError>;
