use rusqlite::Connection;

use crate::error::Result;

/// Initialise the extension key table. Safe to call on every startup.
///
/// Rows are never deleted; rotation only flips `is_active`. The partial
/// unique index keeps at most one active row per owner even if two
/// rotations race past the application.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS extension_keys (
            id         TEXT PRIMARY KEY NOT NULL,
            owner_id   TEXT NOT NULL,
            author_id  TEXT NOT NULL,
            token      TEXT NOT NULL,
            issued_at  TEXT NOT NULL,
            is_active  INTEGER NOT NULL DEFAULT 1
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_extension_keys_active
            ON extension_keys(owner_id) WHERE is_active = 1;
        CREATE INDEX IF NOT EXISTS idx_extension_keys_owner
            ON extension_keys(owner_id, issued_at);",
    )?;
    Ok(())
}
