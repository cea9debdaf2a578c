use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use cadence_core::config::WEBHOOK_SECRET_HEADER;
use cadence_scheduler::{FirePayload, PublishOutcome};
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::AppState;
use crate::auth::{header, secrets_match};
use crate::error::{bad_request, from_scheduler, unauthorized, ApiError};

/// POST /webhooks/publish
///
/// Called by the external trigger service when a schedule fires. The
/// shared secret header is checked before the body is parsed; the body
/// names the note. Repeated deliveries for the same note answer `skipped`.
pub async fn publish_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PublishOutcome>, ApiError> {
    let presented = header(&headers, WEBHOOK_SECRET_HEADER);
    let authorized = presented
        .is_some_and(|secret| secrets_match(secret, &state.config.scheduler.webhook_secret));
    if !authorized {
        warn!(body_len = body.len(), "publish callback with bad or missing secret");
        return Err(unauthorized());
    }

    let payload: FirePayload = serde_json::from_slice(&body)
        .map_err(|e| bad_request(format!("invalid publish payload: {e}")))?;

    let outcome = state
        .schedules
        .handle_fire(&payload)
        .await
        .map_err(from_scheduler)?;
    info!(item_id = %payload.item_id, ?outcome, "publish callback handled");
    Ok(Json(outcome))
}
