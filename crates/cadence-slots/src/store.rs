use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{Result, SlotError};
use crate::types::{Meridiem, RecurringSlot, SlotInput};

/// Slots every new owner starts with, each enabled on all seven days.
pub const DEFAULT_SLOTS: [SlotInput; 3] = [
    SlotInput::every_day(9, 0, Meridiem::Am),
    SlotInput::every_day(12, 30, Meridiem::Pm),
    SlotInput::every_day(5, 0, Meridiem::Pm),
];

/// Persistence seam for recurring slots.
pub trait SlotStore: Send + Sync {
    /// Insert or update the slot keyed by (owner, hour, minute, meridiem).
    fn upsert_slot(&self, owner_id: &str, slot: &SlotInput) -> Result<RecurringSlot>;

    /// All slots of an owner in time-of-day order.
    fn list_slots(&self, owner_id: &str) -> Result<Vec<RecurringSlot>>;

    /// Upsert [`DEFAULT_SLOTS`]. Running it again changes no row count.
    fn seed_defaults(&self, owner_id: &str) -> Result<Vec<RecurringSlot>> {
        let seeded = DEFAULT_SLOTS
            .iter()
            .map(|slot| self.upsert_slot(owner_id, slot))
            .collect::<Result<Vec<_>>>()?;
        info!(owner_id, count = seeded.len(), "default slots seeded");
        Ok(seeded)
    }
}

pub(crate) fn check(owner_id: &str, slot: &SlotInput) -> Result<()> {
    if owner_id.trim().is_empty() {
        return Err(SlotError::InvalidSlot("owner id is empty".to_string()));
    }
    slot.validate()
}

pub(crate) fn sort_slots(slots: &mut [RecurringSlot]) {
    slots.sort_by_key(|s| (s.hour_24(), s.minute));
}

pub struct SqliteSlotStore {
    db: Mutex<Connection>,
}

impl SqliteSlotStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }
}

const SLOT_SELECT_SQL: &str =
    "SELECT id, owner_id, hour, minute, meridiem,
            monday, tuesday, wednesday, thursday, friday, saturday, sunday,
            created_at, updated_at
     FROM recurring_slots";

impl SlotStore for SqliteSlotStore {
    fn upsert_slot(&self, owner_id: &str, slot: &SlotInput) -> Result<RecurringSlot> {
        check(owner_id, slot)?;
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let d = slot.days.map(i32::from);
        db.execute(
            "INSERT INTO recurring_slots
                (id, owner_id, hour, minute, meridiem,
                 monday, tuesday, wednesday, thursday, friday, saturday, sunday,
                 created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?13)
             ON CONFLICT(owner_id, hour, minute, meridiem) DO UPDATE SET
                monday=excluded.monday, tuesday=excluded.tuesday,
                wednesday=excluded.wednesday, thursday=excluded.thursday,
                friday=excluded.friday, saturday=excluded.saturday,
                sunday=excluded.sunday, updated_at=excluded.updated_at",
            params![
                Uuid::now_v7().to_string(),
                owner_id,
                slot.hour,
                slot.minute,
                slot.meridiem.to_string(),
                d[0],
                d[1],
                d[2],
                d[3],
                d[4],
                d[5],
                d[6],
                now,
            ],
        )?;

        // Read back so the caller gets the surviving id on conflict.
        let stored = db.query_row(
            &format!(
                "{SLOT_SELECT_SQL}
                 WHERE owner_id = ?1 AND hour = ?2 AND minute = ?3 AND meridiem = ?4"
            ),
            params![owner_id, slot.hour, slot.minute, slot.meridiem.to_string()],
            row_to_slot,
        )?;
        debug!(owner_id, slot_id = %stored.id, "slot upserted");
        Ok(stored)
    }

    fn list_slots(&self, owner_id: &str) -> Result<Vec<RecurringSlot>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!("{SLOT_SELECT_SQL} WHERE owner_id = ?1"))?;
        let mut slots = stmt
            .query_map(params![owner_id], row_to_slot)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        sort_slots(&mut slots);
        Ok(slots)
    }
}

/// Map a SELECT row (column order from SLOT_SELECT_SQL) to a RecurringSlot.
fn row_to_slot(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecurringSlot> {
    let meridiem_str: String = row.get(4)?;
    let meridiem = meridiem_str.parse::<Meridiem>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let mut days = [false; 7];
    for (i, day) in days.iter_mut().enumerate() {
        *day = row.get::<_, i32>(5 + i)? != 0;
    }
    Ok(RecurringSlot {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        hour: row.get(2)?,
        minute: row.get(3)?,
        meridiem,
        days,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}
