use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::store::{check, sort_slots, SlotStore};
use crate::types::{Meridiem, RecurringSlot, SlotInput};

type SlotKey = (String, u8, u8, Meridiem);

/// In-process slot store keyed the same way as the SQLite unique index.
#[derive(Default)]
pub struct MemorySlotStore {
    slots: Mutex<HashMap<SlotKey, RecurringSlot>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlotStore for MemorySlotStore {
    fn upsert_slot(&self, owner_id: &str, slot: &SlotInput) -> Result<RecurringSlot> {
        check(owner_id, slot)?;
        let now = Utc::now().to_rfc3339();
        let key = (owner_id.to_string(), slot.hour, slot.minute, slot.meridiem);
        let mut slots = self.slots.lock().unwrap();
        let stored = slots
            .entry(key)
            .and_modify(|existing| {
                existing.days = slot.days;
                existing.updated_at = now.clone();
            })
            .or_insert_with(|| RecurringSlot {
                id: Uuid::now_v7().to_string(),
                owner_id: owner_id.to_string(),
                hour: slot.hour,
                minute: slot.minute,
                meridiem: slot.meridiem,
                days: slot.days,
                created_at: now.clone(),
                updated_at: now.clone(),
            });
        Ok(stored.clone())
    }

    fn list_slots(&self, owner_id: &str) -> Result<Vec<RecurringSlot>> {
        let mut out: Vec<RecurringSlot> = self
            .slots
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        sort_slots(&mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DEFAULT_SLOTS;

    #[test]
    fn seeding_twice_keeps_count() {
        let store = MemorySlotStore::new();
        store.seed_defaults("u-1").unwrap();
        store.seed_defaults("u-1").unwrap();
        assert_eq!(store.list_slots("u-1").unwrap().len(), DEFAULT_SLOTS.len());
    }
}
