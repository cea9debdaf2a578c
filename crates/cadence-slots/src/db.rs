use rusqlite::{Connection, Result};

/// Initialise the slots table. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    // UNIQUE(owner_id, hour, minute, meridiem) is the upsert key: seeding
    // twice updates rows in place instead of duplicating them.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS recurring_slots (
            id          TEXT PRIMARY KEY NOT NULL,
            owner_id    TEXT NOT NULL,
            hour        INTEGER NOT NULL,
            minute      INTEGER NOT NULL,
            meridiem    TEXT NOT NULL,
            monday      INTEGER NOT NULL DEFAULT 1,
            tuesday     INTEGER NOT NULL DEFAULT 1,
            wednesday   INTEGER NOT NULL DEFAULT 1,
            thursday    INTEGER NOT NULL DEFAULT 1,
            friday      INTEGER NOT NULL DEFAULT 1,
            saturday    INTEGER NOT NULL DEFAULT 1,
            sunday      INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE(owner_id, hour, minute, meridiem)
        );
        CREATE INDEX IF NOT EXISTS idx_slots_owner
            ON recurring_slots(owner_id);",
    )
}
