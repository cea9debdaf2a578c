//! `cadence-scheduler`: turns scheduled notes into one-shot external
//! triggers and keeps both sides consistent.
//!
//! # Overview
//!
//! There is no polling loop here. [`ScheduleManager::create_schedule_for_item`]
//! registers a one-shot callback with an external trigger service
//! ([`SchedulerGateway`]) and records it in the `scheduled_triggers` table.
//! When the service calls back, [`ScheduleManager::handle_fire`] re-checks
//! the note status and publishes at most once, however many times the
//! callback is delivered.
//!
//! # Directives
//!
//! | Variant     | Produced today | Behaviour                                   |
//! |-------------|----------------|---------------------------------------------|
//! | `Once`      | yes            | Single fire at an absolute UTC instant      |
//! | `Recurring` | no             | Weekly rule; gateways reject it             |

pub mod db;
pub mod error;
pub mod gateway;
pub mod locks;
pub mod manager;
pub mod memory;
pub mod publish;
pub mod store;
pub mod translate;
pub mod types;

pub use error::{Result, SchedulerError};
pub use gateway::{DeleteOutcome, GatewayError, HttpSchedulerGateway, RegisterTrigger, SchedulerGateway};
pub use manager::{ScheduleManager, ScheduleSettings};
pub use memory::MemoryTriggerStore;
pub use publish::{HttpPublisher, LogPublisher, PublishError, Publisher};
pub use store::{SqliteTriggerStore, TriggerStore};
pub use types::{FirePayload, NewTrigger, PublishOutcome, ScheduledTrigger, TriggerDirective};
