use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::store::{materialize, TriggerStore};
use crate::types::{NewTrigger, ScheduledTrigger};

/// In-process trigger store keyed by item id.
#[derive(Default)]
pub struct MemoryTriggerStore {
    triggers: Mutex<HashMap<String, ScheduledTrigger>>,
}

impl MemoryTriggerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.triggers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TriggerStore for MemoryTriggerStore {
    fn upsert(&self, trigger: &NewTrigger) -> Result<ScheduledTrigger> {
        let mut triggers = self.triggers.lock().unwrap();
        let stored = materialize(trigger, triggers.get(&trigger.item_id));
        triggers.insert(trigger.item_id.clone(), stored.clone());
        Ok(stored)
    }

    fn latest_for_item(&self, item_id: &str) -> Result<Option<ScheduledTrigger>> {
        Ok(self.triggers.lock().unwrap().get(item_id).cloned())
    }

    fn latest_by_name(&self, name: &str) -> Result<Option<ScheduledTrigger>> {
        Ok(self
            .triggers
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.name == name)
            .max_by_key(|t| t.updated_at)
            .cloned())
    }

    fn list_for_owner(&self, owner_id: &str) -> Result<Vec<ScheduledTrigger>> {
        let mut out: Vec<ScheduledTrigger> = self
            .triggers
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        out.sort_by_key(|t| t.target_at);
        Ok(out)
    }

    fn count_for_owner(&self, owner_id: &str) -> Result<usize> {
        Ok(self
            .triggers
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.owner_id == owner_id)
            .count())
    }

    fn delete(&self, id: &str, expected_version: i64) -> Result<bool> {
        let mut triggers = self.triggers.lock().unwrap();
        let key = triggers
            .iter()
            .find(|(_, t)| t.id == id && t.version == expected_version)
            .map(|(k, _)| k.clone());
        Ok(match key {
            Some(k) => triggers.remove(&k).is_some(),
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate;
    use chrono::{Duration, Utc};

    #[test]
    fn supersede_then_stale_delete() {
        let store = MemoryTriggerStore::new();
        let at = Utc::now() + Duration::hours(2);
        let t = NewTrigger {
            item_id: "n-1".into(),
            owner_id: "u-1".into(),
            name: translate::trigger_name("n-1"),
            directive: translate::once(at),
            target_at: at,
            external_id: "ext-1".into(),
        };
        let first = store.upsert(&t).unwrap();
        let second = store.upsert(&t).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(second.version, first.version + 1);

        assert!(!store.delete(&first.id, first.version).unwrap());
        assert!(store.delete(&second.id, second.version).unwrap());
        assert!(store.is_empty());
    }
}
