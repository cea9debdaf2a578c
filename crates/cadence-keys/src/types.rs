use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One issued capability token. At most one row per owner is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionKey {
    pub id: String,
    pub owner_id: String,
    pub author_id: String,
    /// The raw signed token, as handed to the extension.
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Claims carried inside a capability token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub owner_id: String,
    pub author_id: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Unique per issuance, so two rotations in the same second still
    /// produce different tokens.
    pub jti: String,
}
