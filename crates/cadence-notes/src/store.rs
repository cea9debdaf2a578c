use std::sync::Mutex;

use chrono::{Datelike, NaiveDate, SubsecRound, Utc};
use rusqlite::{params, Connection};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::db::{fmt_ts, init_db, parse_ts};
use crate::error::{NoteError, Result};
use crate::streak::StreakSample;
use crate::types::{Note, NoteStatus, StatusChange};

/// Persistence seam for notes.
///
/// The schedule engine only talks to this trait, so it runs unchanged
/// against SQLite in production and [`MemoryNoteStore`](crate::MemoryNoteStore)
/// in tests.
pub trait NoteStore: Send + Sync {
    /// Insert a note in one of the initial statuses.
    fn create(&self, owner_id: &str, body: &str, status: NoteStatus) -> Result<Note>;

    fn get(&self, id: &str) -> Result<Option<Note>>;

    /// All notes of an owner, oldest first.
    fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Note>>;

    /// Apply `change` only if the note's status is still `change.expected`.
    ///
    /// Returns `Ok(false)` when the note exists but has moved on, and
    /// `NotFound` when it does not exist.
    fn apply(&self, id: &str, change: &StatusChange) -> Result<bool>;

    /// Published notes per UTC calendar day, for the streak calculator.
    fn daily_counts(&self, owner_id: &str) -> Result<Vec<StreakSample>>;
}

/// Validate the inputs shared by every `create` implementation.
pub(crate) fn new_note(owner_id: &str, body: &str, status: NoteStatus) -> Result<Note> {
    if body.trim().is_empty() {
        return Err(NoteError::EmptyBody);
    }
    if !status.is_initial() {
        return Err(NoteError::InvalidStatus(format!(
            "notes cannot be created as {status}"
        )));
    }
    // Microsecond precision matches what the SQLite store persists.
    let now = Utc::now().trunc_subsecs(6);
    Ok(Note {
        id: Uuid::now_v7().to_string(),
        owner_id: owner_id.to_string(),
        body: body.to_string(),
        status,
        scheduled_for: None,
        sent_at: None,
        created_at: now,
        updated_at: now,
    })
}

/// SQLite-backed note store. One connection behind a `Mutex`.
pub struct SqliteNoteStore {
    db: Mutex<Connection>,
}

impl SqliteNoteStore {
    /// Wrap a connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }
}

const NOTE_COLUMNS: &str =
    "id, owner_id, body, status, scheduled_for, sent_at, created_at, updated_at";

impl NoteStore for SqliteNoteStore {
    #[instrument(skip(self, body))]
    fn create(&self, owner_id: &str, body: &str, status: NoteStatus) -> Result<Note> {
        let note = new_note(owner_id, body, status)?;
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO notes
             (id, owner_id, body, status, scheduled_for, sent_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, NULL, NULL, ?5, ?5)",
            params![
                note.id,
                note.owner_id,
                note.body,
                note.status.to_string(),
                fmt_ts(&note.created_at)
            ],
        )?;
        info!(note_id = %note.id, "note created");
        Ok(note)
    }

    #[instrument(skip(self))]
    fn get(&self, id: &str) -> Result<Option<Note>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
            params![id],
            row_to_note,
        ) {
            Ok(n) => Ok(Some(n)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(NoteError::Database(e)),
        }
    }

    #[instrument(skip(self))]
    fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Note>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE owner_id = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt
            .query_map(params![owner_id], row_to_note)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    #[instrument(skip(self, change), fields(from = %change.expected, to = %change.next))]
    fn apply(&self, id: &str, change: &StatusChange) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let now = fmt_ts(&Utc::now());
        // sent_at is write-once: COALESCE keeps an existing value.
        let rows = db.execute(
            "UPDATE notes
             SET status = ?3,
                 scheduled_for = ?4,
                 sent_at = COALESCE(sent_at, ?5),
                 updated_at = ?6
             WHERE id = ?1 AND status = ?2",
            params![
                id,
                change.expected.to_string(),
                change.next.to_string(),
                change.scheduled_for.as_ref().map(fmt_ts),
                change.sent_at.as_ref().map(fmt_ts),
                now
            ],
        )?;
        if rows == 1 {
            return Ok(true);
        }

        let exists: bool = db.query_row(
            "SELECT EXISTS(SELECT 1 FROM notes WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if exists {
            debug!("status changed underneath; compare-and-set lost");
            Ok(false)
        } else {
            Err(NoteError::NotFound { id: id.to_string() })
        }
    }

    #[instrument(skip(self))]
    fn daily_counts(&self, owner_id: &str) -> Result<Vec<StreakSample>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT substr(sent_at, 1, 10) AS day, COUNT(*)
             FROM notes
             WHERE owner_id = ?1 AND sent_at IS NOT NULL
             GROUP BY day
             ORDER BY day",
        )?;
        let days = stmt
            .query_map(params![owner_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(days
            .into_iter()
            .filter_map(|(day, count)| match NaiveDate::parse_from_str(&day, "%Y-%m-%d") {
                Ok(date) => Some(StreakSample::new(date.year(), date.month(), date.day(), count)),
                Err(e) => {
                    warn!(owner_id, day = %day, error = %e, "skipping unparseable sent_at day");
                    None
                }
            })
            .collect())
    }
}

/// Map a SQLite row (column order from NOTE_COLUMNS) to a `Note`.
fn row_to_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
    let status_str: String = row.get(3)?;
    let status = status_str.parse().map_err(|e: NoteError| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let scheduled_for = row
        .get::<_, Option<String>>(4)?
        .map(|s| parse_ts(4, &s))
        .transpose()?;
    let sent_at = row
        .get::<_, Option<String>>(5)?
        .map(|s| parse_ts(5, &s))
        .transpose()?;
    Ok(Note {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        body: row.get(2)?,
        status,
        scheduled_for,
        sent_at,
        created_at: parse_ts(6, &row.get::<_, String>(6)?)?,
        updated_at: parse_ts(7, &row.get::<_, String>(7)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteNoteStore {
        SqliteNoteStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn create_and_get() {
        let store = store();
        let note = store.create("u-1", "hello world", NoteStatus::Draft).unwrap();
        let loaded = store.get(&note.id).unwrap().unwrap();
        assert_eq!(loaded, note);
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn create_rejects_non_initial_status_and_empty_body() {
        let store = store();
        assert!(matches!(
            store.create("u-1", "x", NoteStatus::Sent),
            Err(NoteError::InvalidStatus(_))
        ));
        assert!(matches!(
            store.create("u-1", "   ", NoteStatus::Draft),
            Err(NoteError::EmptyBody)
        ));
    }

    #[test]
    fn apply_is_compare_and_set() {
        let store = store();
        let note = store.create("u-1", "body", NoteStatus::Draft).unwrap();
        let at = Utc::now() + chrono::Duration::hours(1);

        let change = StatusChange::schedule(NoteStatus::Draft, at).unwrap();
        assert!(store.apply(&note.id, &change).unwrap());
        // Second attempt expects Draft but the note is Scheduled now.
        assert!(!store.apply(&note.id, &change).unwrap());

        let loaded = store.get(&note.id).unwrap().unwrap();
        assert_eq!(loaded.status, NoteStatus::Scheduled);
        assert!(loaded.scheduled_for.is_some());

        assert!(matches!(
            store.apply("missing", &change),
            Err(NoteError::NotFound { .. })
        ));
    }

    #[test]
    fn publish_clears_schedule_and_sets_sent_at() {
        let store = store();
        let note = store.create("u-1", "body", NoteStatus::Queued).unwrap();
        let at = Utc::now() + chrono::Duration::hours(1);
        store
            .apply(&note.id, &StatusChange::schedule(NoteStatus::Queued, at).unwrap())
            .unwrap();
        assert!(store.apply(&note.id, &StatusChange::publish(Utc::now())).unwrap());

        let loaded = store.get(&note.id).unwrap().unwrap();
        assert_eq!(loaded.status, NoteStatus::Sent);
        assert!(loaded.scheduled_for.is_none());
        assert!(loaded.sent_at.is_some());
    }

    #[test]
    fn daily_counts_groups_sent_notes() {
        let store = store();
        for _ in 0..2 {
            let note = store.create("u-1", "body", NoteStatus::Draft).unwrap();
            let at = Utc::now() + chrono::Duration::hours(1);
            store
                .apply(&note.id, &StatusChange::schedule(NoteStatus::Draft, at).unwrap())
                .unwrap();
            store.apply(&note.id, &StatusChange::publish(Utc::now())).unwrap();
        }
        store.create("u-1", "unsent", NoteStatus::Draft).unwrap();

        let samples = store.daily_counts("u-1").unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].note_count, 2);
        assert!(store.daily_counts("u-2").unwrap().is_empty());
    }

    #[test]
    fn daily_counts_surfaces_row_errors() {
        let store = store();
        let note = store.create("u-1", "body", NoteStatus::Draft).unwrap();
        // A BLOB sent_at makes substr() yield a BLOB, which cannot be read as text.
        store
            .db
            .lock()
            .unwrap()
            .execute(
                "UPDATE notes SET sent_at = x'323032362d30312d3031' WHERE id = ?1",
                params![note.id],
            )
            .unwrap();

        assert!(matches!(
            store.daily_counts("u-1"),
            Err(NoteError::Database(_))
        ));
    }
}
