use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::Result;

/// Initialise the notes table and its indexes.
///
/// Safe to call on every startup: uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS notes (
            id            TEXT PRIMARY KEY,
            owner_id      TEXT NOT NULL,
            body          TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'draft',
            scheduled_for TEXT,               -- set only while status = 'scheduled'
            sent_at       TEXT,               -- set once, on publication
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_notes_owner
            ON notes(owner_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_notes_sent
            ON notes(owner_id, sent_at) WHERE sent_at IS NOT NULL;",
    )?;
    Ok(())
}

/// Fixed-width UTC rendering so stored timestamps sort lexicographically.
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
