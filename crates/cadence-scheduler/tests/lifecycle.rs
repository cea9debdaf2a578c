// End-to-end lifecycle over the SQLite stores with a fake trigger service.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cadence_core::config::LimitsConfig;
use cadence_core::{Actor, Plan};
use cadence_notes::{NoteStatus, NoteStore, SqliteNoteStore};
use cadence_scheduler::{
    DeleteOutcome, FirePayload, GatewayError, LogPublisher, PublishOutcome, RegisterTrigger,
    ScheduleManager, ScheduleSettings, SchedulerError, SchedulerGateway, SqliteTriggerStore,
    TriggerStore,
};
use chrono::{Duration, Utc};
use rusqlite::Connection;

#[derive(Default)]
struct FakeTriggers {
    live: Mutex<BTreeSet<String>>,
}

#[async_trait]
impl SchedulerGateway for FakeTriggers {
    fn name(&self) -> &str {
        "fake"
    }

    async fn register_once_trigger(&self, req: &RegisterTrigger) -> Result<String, GatewayError> {
        self.live.lock().unwrap().insert(req.name.clone());
        Ok(format!("ext-{}", req.name))
    }

    async fn delete_trigger(&self, name: &str) -> Result<DeleteOutcome, GatewayError> {
        Ok(if self.live.lock().unwrap().remove(name) {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }
}

struct Setup {
    notes: Arc<SqliteNoteStore>,
    triggers: Arc<SqliteTriggerStore>,
    gateway: Arc<FakeTriggers>,
    manager: Arc<ScheduleManager>,
}

fn setup(supersede_existing: bool) -> Setup {
    let notes = Arc::new(SqliteNoteStore::new(Connection::open_in_memory().unwrap()).unwrap());
    let triggers =
        Arc::new(SqliteTriggerStore::new(Connection::open_in_memory().unwrap()).unwrap());
    let gateway = Arc::new(FakeTriggers::default());
    let settings = ScheduleSettings {
        callback_url: "http://cadence.test/webhooks/publish".into(),
        webhook_secret: "hook-secret".into(),
        supersede_existing,
        min_lead: Duration::seconds(60),
        limits: LimitsConfig {
            free_max_scheduled: Some(10),
            pro_max_scheduled: None,
        },
    };
    let manager = Arc::new(ScheduleManager::new(
        notes.clone(),
        triggers.clone(),
        gateway.clone(),
        Arc::new(LogPublisher),
        settings,
    ));
    Setup {
        notes,
        triggers,
        gateway,
        manager,
    }
}

fn owner() -> Actor {
    Actor::new("owner-1", Plan::Free).unwrap()
}

#[tokio::test]
async fn create_then_cancel_leaves_no_trigger() {
    let s = setup(true);
    let note = s.notes.create("owner-1", "launch post", NoteStatus::Draft).unwrap();

    let trigger = s
        .manager
        .create_schedule_for_item(&owner(), &note.id, Utc::now() + Duration::hours(3))
        .await
        .unwrap();
    assert_eq!(s.triggers.count_for_owner("owner-1").unwrap(), 1);
    assert!(s.manager.should_publish_now(&note.id).unwrap());

    let note = s.manager.cancel_schedule(&owner(), &trigger.name).await.unwrap();
    assert_eq!(note.status, NoteStatus::Draft);
    assert!(note.scheduled_for.is_none());
    assert_eq!(s.triggers.count_for_owner("owner-1").unwrap(), 0);
    assert!(s.gateway.live.lock().unwrap().is_empty());
    assert!(!s.manager.should_publish_now(&note.id).unwrap());

    let err = s.manager.cancel_schedule(&owner(), &trigger.name).await.unwrap_err();
    assert!(matches!(err, SchedulerError::NotFound { .. }));
}

#[tokio::test]
async fn duplicate_callback_publishes_once() {
    let s = setup(true);
    let note = s.notes.create("owner-1", "thread", NoteStatus::Inspiration).unwrap();
    s.manager
        .create_schedule_for_item(&owner(), &note.id, Utc::now() + Duration::minutes(5))
        .await
        .unwrap();

    let payload = FirePayload {
        item_id: note.id.clone(),
        owner_id: "owner-1".into(),
    };
    let first = s.manager.handle_fire(&payload).await.unwrap();
    let second = s.manager.handle_fire(&payload).await.unwrap();

    let PublishOutcome::Published { sent_at } = first else {
        panic!("first delivery should publish, got {first:?}");
    };
    assert_eq!(
        second,
        PublishOutcome::Skipped {
            status: NoteStatus::Sent
        }
    );

    let stored = s.notes.get(&note.id).unwrap().unwrap();
    assert_eq!(stored.status, NoteStatus::Sent);
    assert_eq!(stored.sent_at, Some(sent_at));
    assert!(!s.manager.should_publish_now(&note.id).unwrap());
    assert_eq!(s.triggers.count_for_owner("owner-1").unwrap(), 0);
}

#[tokio::test]
async fn second_create_supersedes() {
    let s = setup(true);
    let note = s.notes.create("owner-1", "update", NoteStatus::Queued).unwrap();
    let first = s
        .manager
        .create_schedule_for_item(&owner(), &note.id, Utc::now() + Duration::hours(1))
        .await
        .unwrap();
    let target = Utc::now() + Duration::hours(6);
    let second = s
        .manager
        .create_schedule_for_item(&owner(), &note.id, target)
        .await
        .unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.version, first.version + 1);
    assert_eq!(s.triggers.count_for_owner("owner-1").unwrap(), 1);
    assert_eq!(s.gateway.live.lock().unwrap().len(), 1);

    let stored = s.notes.get(&note.id).unwrap().unwrap();
    assert_eq!(stored.status, NoteStatus::Scheduled);
    assert_eq!(stored.scheduled_for, Some(second.target_at));
}

#[tokio::test]
async fn second_create_fails_when_superseding_is_disabled() {
    let s = setup(false);
    let note = s.notes.create("owner-1", "update", NoteStatus::Draft).unwrap();
    let first = s
        .manager
        .create_schedule_for_item(&owner(), &note.id, Utc::now() + Duration::hours(1))
        .await
        .unwrap();

    let err = s
        .manager
        .create_schedule_for_item(&owner(), &note.id, Utc::now() + Duration::hours(2))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ALREADY_SCHEDULED");

    let kept = s.triggers.latest_for_item(&note.id).unwrap().unwrap();
    assert_eq!(kept, first);
}

#[tokio::test]
async fn concurrent_creates_leave_one_trigger() {
    let s = setup(true);
    let note = s.notes.create("owner-1", "race", NoteStatus::Draft).unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let manager = Arc::clone(&s.manager);
        let item_id = note.id.clone();
        handles.push(tokio::spawn(async move {
            manager
                .create_schedule_for_item(&owner(), &item_id, Utc::now() + Duration::hours(1 + i))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let trigger = s.triggers.latest_for_item(&note.id).unwrap().unwrap();
    assert_eq!(trigger.version, 8);
    assert_eq!(s.triggers.count_for_owner("owner-1").unwrap(), 1);
    let stored = s.notes.get(&note.id).unwrap().unwrap();
    assert_eq!(stored.scheduled_for, Some(trigger.target_at));
}
