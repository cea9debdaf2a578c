use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::{Datelike, NaiveDate, Utc};

use crate::error::{NoteError, Result};
use crate::store::{new_note, NoteStore};
use crate::streak::StreakSample;
use crate::types::{Note, NoteStatus, StatusChange};

/// In-process note store for tests and single-shot tools.
#[derive(Default)]
pub struct MemoryNoteStore {
    notes: Mutex<HashMap<String, Note>>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed note, bypassing the initial-status check.
    pub fn insert(&self, note: Note) {
        self.notes.lock().unwrap().insert(note.id.clone(), note);
    }
}

impl NoteStore for MemoryNoteStore {
    fn create(&self, owner_id: &str, body: &str, status: NoteStatus) -> Result<Note> {
        let note = new_note(owner_id, body, status)?;
        self.insert(note.clone());
        Ok(note)
    }

    fn get(&self, id: &str) -> Result<Option<Note>> {
        Ok(self.notes.lock().unwrap().get(id).cloned())
    }

    fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Note>> {
        let mut notes: Vec<Note> = self
            .notes
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.owner_id == owner_id)
            .cloned()
            .collect();
        notes.sort_by_key(|n| n.created_at);
        Ok(notes)
    }

    fn apply(&self, id: &str, change: &StatusChange) -> Result<bool> {
        let mut notes = self.notes.lock().unwrap();
        let note = notes
            .get_mut(id)
            .ok_or_else(|| NoteError::NotFound { id: id.to_string() })?;
        if note.status != change.expected {
            return Ok(false);
        }
        note.status = change.next;
        note.scheduled_for = change.scheduled_for;
        if note.sent_at.is_none() {
            note.sent_at = change.sent_at;
        }
        note.updated_at = Utc::now();
        Ok(true)
    }

    fn daily_counts(&self, owner_id: &str) -> Result<Vec<StreakSample>> {
        let mut days: BTreeMap<NaiveDate, u32> = BTreeMap::new();
        for note in self.notes.lock().unwrap().values() {
            if note.owner_id != owner_id {
                continue;
            }
            if let Some(sent_at) = note.sent_at {
                *days.entry(sent_at.date_naive()).or_default() += 1;
            }
        }
        Ok(days
            .into_iter()
            .map(|(d, count)| StreakSample::new(d.year(), d.month(), d.day(), count))
            .collect())
    }
}
