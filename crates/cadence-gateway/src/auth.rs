//! Caller identification for the two authenticated surfaces.
//!
//! Session routes trust the sign-in layer in front of the gateway: in
//! `token` mode it must present the shared service token as a bearer token,
//! in `trusted-proxy` mode the forwarded headers alone are accepted.
//! Extension routes carry a capability token that is verified against the
//! owner's active key on every request.

use axum::http::HeaderMap;
use cadence_core::config::{
    AuthMode, AUTHOR_ID_HEADER, CAPABILITY_TOKEN_HEADER, OWNER_ID_HEADER, OWNER_PLAN_HEADER,
};
use cadence_core::{Actor, Plan};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::app::AppState;
use crate::error::{from_keys, unauthorized, ApiError};

pub fn session_actor(state: &AppState, headers: &HeaderMap) -> Result<Actor, ApiError> {
    let auth = &state.config.gateway.auth;
    if auth.mode == AuthMode::Token {
        let Some(expected) = auth.token.as_deref() else {
            // Token mode without a configured token denies everything.
            return Err(unauthorized());
        };
        match extract_bearer(headers) {
            Some(presented) if secrets_match(presented, expected) => {}
            _ => {
                debug!("session request without a valid service token");
                return Err(unauthorized());
            }
        }
    }

    let owner_id = header(headers, OWNER_ID_HEADER).ok_or_else(unauthorized)?;
    let plan = match header(headers, OWNER_PLAN_HEADER) {
        Some(raw) => raw.parse::<Plan>().map_err(|_| unauthorized())?,
        None => Plan::default(),
    };
    Actor::new(owner_id, plan).map_err(|_| unauthorized())
}

/// Verify the extension's capability token and return the owner it acts for.
pub fn extension_actor(state: &AppState, headers: &HeaderMap) -> Result<Actor, ApiError> {
    let token = header(headers, CAPABILITY_TOKEN_HEADER).ok_or_else(unauthorized)?;
    let owner_id = header(headers, OWNER_ID_HEADER).ok_or_else(unauthorized)?;
    let author_id = header(headers, AUTHOR_ID_HEADER).ok_or_else(unauthorized)?;

    let claims = state
        .keys
        .verify(token, owner_id, author_id)
        .map_err(from_keys)?;
    Actor::new(claims.owner_id, Plan::default()).map_err(|_| unauthorized())
}

/// Compare two secrets through their SHA-256 digests, so the comparison
/// time does not depend on how long a matching prefix is.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(expected.as_bytes())
}

pub fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}
