//! Turns a concrete target instant into the directive handed to the
//! external trigger service.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use cadence_slots::WeeklyPattern;

use crate::error::{Result, SchedulerError};
use crate::types::TriggerDirective;

/// Deterministic trigger name for an item. Re-registering under the same
/// name replaces the previous external trigger.
pub fn trigger_name(item_id: &str) -> String {
    format!("note-{item_id}")
}

/// A single fire at `at`, truncated to whole seconds.
pub fn once(at: DateTime<Utc>) -> TriggerDirective {
    let at = at.with_nanosecond(0).unwrap_or(at);
    TriggerDirective::Once { at }
}

/// Reject targets that are not at least `min_lead` after `now`.
pub fn ensure_future(target: DateTime<Utc>, now: DateTime<Utc>, min_lead: Duration) -> Result<()> {
    if target < now + min_lead {
        return Err(SchedulerError::ScheduleInPast { target });
    }
    Ok(())
}

impl TriggerDirective {
    /// Five-field cron rendering for services that only speak cron.
    ///
    /// `Once` pins minute, hour, day and month; it matches again a year
    /// later, so consumers must delete the trigger after the first fire.
    pub fn cron_expression(&self) -> String {
        match self {
            TriggerDirective::Once { at } => {
                format!("{} {} {} {} *", at.minute(), at.hour(), at.day(), at.month())
            }
            TriggerDirective::Recurring(pattern) => recurring_cron(pattern),
        }
    }

    /// The absolute instant of a one-shot directive.
    pub fn fire_at(&self) -> Option<DateTime<Utc>> {
        match self {
            TriggerDirective::Once { at } => Some(*at),
            TriggerDirective::Recurring(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TriggerDirective::Once { .. } => "once",
            TriggerDirective::Recurring(_) => "recurring",
        }
    }
}

fn recurring_cron(pattern: &WeeklyPattern) -> String {
    let days = pattern.cron_days();
    let dow = if days.len() == 7 {
        "*".to_string()
    } else {
        days.iter().map(u8::to_string).collect::<Vec<_>>().join(",")
    };
    format!("{} {} * * {}", pattern.minute, pattern.hour, dow)
}
