use axum::{
    routing::{get, post},
    Router,
};
use cadence_core::CadenceConfig;
use cadence_keys::KeyManager;
use cadence_notes::NoteStore;
use cadence_scheduler::ScheduleManager;
use cadence_slots::SlotStore;
use std::sync::Arc;

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: CadenceConfig,
    pub notes: Arc<dyn NoteStore>,
    pub slots: Arc<dyn SlotStore>,
    pub schedules: ScheduleManager,
    pub keys: KeyManager,
}

impl AppState {
    pub fn new(
        config: CadenceConfig,
        notes: Arc<dyn NoteStore>,
        slots: Arc<dyn SlotStore>,
        schedules: ScheduleManager,
        keys: KeyManager,
    ) -> Self {
        Self {
            config,
            notes,
            slots,
            schedules,
            keys,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    use crate::http::{extension, health, keys, notes, schedules, slots, streak, webhooks};

    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/schedules",
            post(schedules::create_handler).get(schedules::list_handler),
        )
        .route("/schedules/cancel", post(schedules::cancel_handler))
        .route(
            "/schedules/should-publish",
            post(schedules::should_publish_handler),
        )
        .route("/schedules/requeue", post(schedules::requeue_handler))
        .route("/schedules/{item_id}", get(schedules::latest_handler))
        .route("/webhooks/publish", post(webhooks::publish_handler))
        .route("/extension/schedules", get(extension::schedules_handler))
        .route("/keys/rotate", post(keys::rotate_handler))
        .route("/keys/active", get(keys::active_handler))
        .route("/slots", get(slots::list_handler).put(slots::upsert_handler))
        .route("/slots/seed", post(slots::seed_handler))
        .route("/slots/next", get(slots::next_handler))
        .route("/notes", post(notes::create_handler).get(notes::list_handler))
        .route("/notes/{id}", get(notes::get_handler))
        .route("/streak", get(streak::streak_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
