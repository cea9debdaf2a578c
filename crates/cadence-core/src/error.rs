use thiserror::Error;

#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),
}

impl CadenceError {
    /// Short error code string sent to clients in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CadenceError::Config(_) => "CONFIG_ERROR",
            CadenceError::InvalidCredential(_) => "INVALID_CREDENTIAL",
        }
    }
}

pub type Result<T> = std::result::Result<T, CadenceError>;
