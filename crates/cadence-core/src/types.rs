use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CadenceError;

/// Subscription tier of an owner. Drives the outstanding-schedule quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Pro,
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::Free => write!(f, "free"),
            Plan::Pro => write!(f, "pro"),
        }
    }
}

impl std::str::FromStr for Plan {
    type Err = CadenceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "pro" => Ok(Plan::Pro),
            other => Err(CadenceError::InvalidCredential(format!("unknown plan: {other}"))),
        }
    }
}

/// The authenticated caller of an engine operation.
///
/// Produced at the HTTP boundary (session headers or a verified capability
/// token) and passed explicitly into every call; the engine never reads an
/// ambient "current user".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub owner_id: String,
    #[serde(default)]
    pub plan: Plan,
}

impl Actor {
    pub fn new(owner_id: impl Into<String>, plan: Plan) -> Result<Self, CadenceError> {
        let owner_id = owner_id.into();
        if owner_id.trim().is_empty() {
            return Err(CadenceError::InvalidCredential("empty owner id".to_string()));
        }
        Ok(Self { owner_id, plan })
    }

    /// True when `owner_id` names this actor.
    pub fn owns(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.owner_id)
    }
}
