use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per item id.
///
/// Create, cancel and fire for the same item run one at a time; different
/// items never block each other. Entries are dropped again once nobody
/// holds or waits on them.
#[derive(Default)]
pub struct ItemLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

pub struct ItemGuard<'a> {
    owner: &'a ItemLocks,
    item_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, item_id: &str) -> ItemGuard<'_> {
        let lock = self
            .locks
            .entry(item_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        ItemGuard {
            owner: self,
            item_id: item_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of items with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for ItemGuard<'_> {
    fn drop(&mut self) {
        // Release first so the map holds the last reference when idle.
        self.guard.take();
        self.owner
            .locks
            .remove_if(&self.item_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
