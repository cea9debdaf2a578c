use cadence_notes::NoteStatus;
use cadence_slots::WeeklyPattern;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the external trigger service is asked to do.
///
/// Only `Once` is ever produced: every scheduling action materialises one
/// absolute-time trigger. `Recurring` names the weekly-rule alternative so
/// that the gap is explicit; no gateway accepts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerDirective {
    /// Fire exactly once at the given UTC instant.
    Once { at: DateTime<Utc> },

    /// Fire on every enabled weekday at the pattern's time.
    Recurring(WeeklyPattern),
}

/// A persisted trigger record. At most one exists per item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTrigger {
    pub id: String,
    pub item_id: String,
    pub owner_id: String,
    /// Deterministic per-item name used with the external service.
    pub name: String,
    pub directive: TriggerDirective,
    pub target_at: DateTime<Utc>,
    /// Identifier returned by the external service.
    pub external_id: String,
    /// Bumped every time the row is superseded; deletes compare against it.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting or superseding an item's trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrigger {
    pub item_id: String,
    pub owner_id: String,
    pub name: String,
    pub directive: TriggerDirective,
    pub target_at: DateTime<Utc>,
    pub external_id: String,
}

/// Body the external service posts back to `/webhooks/publish`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirePayload {
    pub item_id: String,
    pub owner_id: String,
}

/// Result of a publish callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// The note moved to `sent`.
    #[serde(rename_all = "camelCase")]
    Published { sent_at: DateTime<Utc> },
    /// The note was not `scheduled` (duplicate delivery, cancelled, ...).
    Skipped { status: NoteStatus },
}
