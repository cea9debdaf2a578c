use axum::Json;
use serde_json::{json, Value};

/// GET /health: liveness probe, returns server metadata.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
