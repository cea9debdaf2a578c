use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::Result;

/// Initialise the trigger schema in `conn`.
///
/// `item_id` is unique: an item has at most one live trigger, and
/// re-scheduling supersedes the row in place.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS scheduled_triggers (
            id          TEXT    NOT NULL PRIMARY KEY,
            item_id     TEXT    NOT NULL UNIQUE,
            owner_id    TEXT    NOT NULL,
            name        TEXT    NOT NULL,
            directive   TEXT    NOT NULL,   -- JSON-encoded TriggerDirective
            target_at   TEXT    NOT NULL,   -- ISO-8601 UTC
            external_id TEXT    NOT NULL,
            version     INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_triggers_owner ON scheduled_triggers (owner_id, target_at);
        CREATE INDEX IF NOT EXISTS idx_triggers_name ON scheduled_triggers (name);
        ",
    )?;
    Ok(())
}

pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
