use std::sync::Mutex;

use chrono::{SubsecRound, Utc};
use rusqlite::{params, Connection};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::db::{fmt_ts, init_db, parse_ts};
use crate::error::{Result, SchedulerError};
use crate::types::{NewTrigger, ScheduledTrigger, TriggerDirective};

/// Persistence seam for scheduled triggers.
pub trait TriggerStore: Send + Sync {
    /// Insert the item's trigger, or supersede the existing one in place.
    ///
    /// Superseding keeps the row id and bumps `version`.
    fn upsert(&self, trigger: &NewTrigger) -> Result<ScheduledTrigger>;

    fn latest_for_item(&self, item_id: &str) -> Result<Option<ScheduledTrigger>>;

    /// Most recently written trigger carrying `name`.
    fn latest_by_name(&self, name: &str) -> Result<Option<ScheduledTrigger>>;

    /// Triggers of an owner, earliest target first.
    fn list_for_owner(&self, owner_id: &str) -> Result<Vec<ScheduledTrigger>>;

    fn count_for_owner(&self, owner_id: &str) -> Result<usize>;

    /// Delete the row only if it is still at `expected_version`.
    ///
    /// Returns `false` when the row is gone or was superseded meanwhile.
    fn delete(&self, id: &str, expected_version: i64) -> Result<bool>;
}

pub struct SqliteTriggerStore {
    db: Mutex<Connection>,
}

impl SqliteTriggerStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }
}

const TRIGGER_SELECT_SQL: &str =
    "SELECT id, item_id, owner_id, name, directive, target_at, external_id, version,
            created_at, updated_at
     FROM scheduled_triggers";

impl TriggerStore for SqliteTriggerStore {
    #[instrument(skip(self, trigger), fields(item_id = %trigger.item_id))]
    fn upsert(&self, trigger: &NewTrigger) -> Result<ScheduledTrigger> {
        let directive = serde_json::to_string(&trigger.directive)
            .map_err(|e| SchedulerError::UnsupportedDirective(e.to_string()))?;
        let now = fmt_ts(&Utc::now());
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO scheduled_triggers
                (id, item_id, owner_id, name, directive, target_at, external_id,
                 version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)
             ON CONFLICT(item_id) DO UPDATE SET
                owner_id    = excluded.owner_id,
                name        = excluded.name,
                directive   = excluded.directive,
                target_at   = excluded.target_at,
                external_id = excluded.external_id,
                version     = scheduled_triggers.version + 1,
                updated_at  = excluded.updated_at",
            params![
                Uuid::now_v7().to_string(),
                trigger.item_id,
                trigger.owner_id,
                trigger.name,
                directive,
                fmt_ts(&trigger.target_at),
                trigger.external_id,
                now,
            ],
        )?;

        let stored = db.query_row(
            &format!("{TRIGGER_SELECT_SQL} WHERE item_id = ?1"),
            params![trigger.item_id],
            row_to_trigger,
        )?;
        info!(trigger_id = %stored.id, version = stored.version, "trigger stored");
        Ok(stored)
    }

    fn latest_for_item(&self, item_id: &str) -> Result<Option<ScheduledTrigger>> {
        let db = self.db.lock().unwrap();
        optional(db.query_row(
            &format!("{TRIGGER_SELECT_SQL} WHERE item_id = ?1"),
            params![item_id],
            row_to_trigger,
        ))
    }

    fn latest_by_name(&self, name: &str) -> Result<Option<ScheduledTrigger>> {
        let db = self.db.lock().unwrap();
        optional(db.query_row(
            &format!("{TRIGGER_SELECT_SQL} WHERE name = ?1 ORDER BY updated_at DESC LIMIT 1"),
            params![name],
            row_to_trigger,
        ))
    }

    #[instrument(skip(self))]
    fn list_for_owner(&self, owner_id: &str) -> Result<Vec<ScheduledTrigger>> {
        let db = self.db.lock().unwrap();
        let mut stmt =
            db.prepare(&format!("{TRIGGER_SELECT_SQL} WHERE owner_id = ?1 ORDER BY target_at"))?;
        let rows = stmt
            .query_map(params![owner_id], row_to_trigger)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count_for_owner(&self, owner_id: &str) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM scheduled_triggers WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    #[instrument(skip(self))]
    fn delete(&self, id: &str, expected_version: i64) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "DELETE FROM scheduled_triggers WHERE id = ?1 AND version = ?2",
            params![id, expected_version],
        )?;
        if rows == 0 {
            debug!("trigger missing or superseded; nothing deleted");
        }
        Ok(rows == 1)
    }
}

fn optional(
    res: rusqlite::Result<ScheduledTrigger>,
) -> Result<Option<ScheduledTrigger>> {
    match res {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(SchedulerError::Storage(e)),
    }
}

/// Map a SELECT row (column order from TRIGGER_SELECT_SQL) to a trigger.
fn row_to_trigger(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledTrigger> {
    let directive_json: String = row.get(4)?;
    let directive: TriggerDirective = serde_json::from_str(&directive_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ScheduledTrigger {
        id: row.get(0)?,
        item_id: row.get(1)?,
        owner_id: row.get(2)?,
        name: row.get(3)?,
        directive,
        target_at: parse_ts(5, &row.get::<_, String>(5)?)?,
        external_id: row.get(6)?,
        version: row.get(7)?,
        created_at: parse_ts(8, &row.get::<_, String>(8)?)?,
        updated_at: parse_ts(9, &row.get::<_, String>(9)?)?,
    })
}

/// Build the stored form of a trigger without touching a database.
pub(crate) fn materialize(
    trigger: &NewTrigger,
    previous: Option<&ScheduledTrigger>,
) -> ScheduledTrigger {
    let now = Utc::now().trunc_subsecs(6);
    ScheduledTrigger {
        id: previous
            .map(|p| p.id.clone())
            .unwrap_or_else(|| Uuid::now_v7().to_string()),
        item_id: trigger.item_id.clone(),
        owner_id: trigger.owner_id.clone(),
        name: trigger.name.clone(),
        directive: trigger.directive.clone(),
        target_at: trigger.target_at,
        external_id: trigger.external_id.clone(),
        version: previous.map(|p| p.version + 1).unwrap_or(1),
        created_at: previous.map(|p| p.created_at).unwrap_or(now),
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate;
    use chrono::{Duration, TimeZone};

    fn store() -> SqliteTriggerStore {
        SqliteTriggerStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn new_trigger(item_id: &str, owner_id: &str, hour: u32) -> NewTrigger {
        let at = Utc.with_ymd_and_hms(2030, 5, 1, hour, 0, 0).unwrap();
        NewTrigger {
            item_id: item_id.to_string(),
            owner_id: owner_id.to_string(),
            name: translate::trigger_name(item_id),
            directive: translate::once(at),
            target_at: at,
            external_id: format!("ext-{item_id}-{hour}"),
        }
    }

    #[test]
    fn upsert_supersedes_in_place() {
        let store = store();
        let first = store.upsert(&new_trigger("n-1", "u-1", 9)).unwrap();
        assert_eq!(first.version, 1);

        let second = store.upsert(&new_trigger("n-1", "u-1", 17)).unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.version, 2);
        assert_eq!(second.external_id, "ext-n-1-17");
        assert_eq!(store.count_for_owner("u-1").unwrap(), 1);

        let loaded = store.latest_for_item("n-1").unwrap().unwrap();
        assert_eq!(loaded, second);
        assert_eq!(loaded.directive.fire_at(), Some(loaded.target_at));
    }

    #[test]
    fn delete_checks_version() {
        let store = store();
        let first = store.upsert(&new_trigger("n-1", "u-1", 9)).unwrap();
        store.upsert(&new_trigger("n-1", "u-1", 10)).unwrap();

        // Stale version: the row was superseded meanwhile.
        assert!(!store.delete(&first.id, first.version).unwrap());
        assert!(store.delete(&first.id, first.version + 1).unwrap());
        assert!(store.latest_for_item("n-1").unwrap().is_none());
        assert!(!store.delete(&first.id, first.version + 1).unwrap());
    }

    #[test]
    fn lookups_by_name_and_owner() {
        let store = store();
        store.upsert(&new_trigger("n-2", "u-1", 15)).unwrap();
        store.upsert(&new_trigger("n-1", "u-1", 9)).unwrap();
        store.upsert(&new_trigger("n-3", "u-2", 9)).unwrap();

        let by_name = store.latest_by_name("note-n-2").unwrap().unwrap();
        assert_eq!(by_name.item_id, "n-2");
        assert!(store.latest_by_name("note-missing").unwrap().is_none());

        let items: Vec<String> = store
            .list_for_owner("u-1")
            .unwrap()
            .into_iter()
            .map(|t| t.item_id)
            .collect();
        assert_eq!(items, vec!["n-1", "n-2"]);
        assert_eq!(store.count_for_owner("u-2").unwrap(), 1);
    }

    #[test]
    fn materialize_mirrors_upsert_versioning() {
        let t = new_trigger("n-1", "u-1", 9);
        let first = materialize(&t, None);
        let second = materialize(&t, Some(&first));
        assert_eq!(second.id, first.id);
        assert_eq!(second.version, 2);
        assert!(second.updated_at >= first.updated_at - Duration::seconds(1));
    }
}
