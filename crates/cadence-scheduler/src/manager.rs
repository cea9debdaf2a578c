use std::collections::BTreeMap;
use std::sync::Arc;

use cadence_core::config::{LimitsConfig, WEBHOOK_SECRET_HEADER};
use cadence_core::{Actor, CadenceConfig};
use cadence_notes::{Note, NoteStatus, NoteStore, StatusChange};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use tracing::{info, instrument, warn};

use crate::error::{Result, SchedulerError};
use crate::gateway::{DeleteOutcome, GatewayError, RegisterTrigger, SchedulerGateway};
use crate::locks::ItemLocks;
use crate::publish::Publisher;
use crate::store::TriggerStore;
use crate::translate;
use crate::types::{FirePayload, NewTrigger, PublishOutcome, ScheduledTrigger, TriggerDirective};

/// Engine knobs derived from [`CadenceConfig`].
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    /// Where the trigger service should call back.
    pub callback_url: String,
    pub webhook_secret: String,
    pub supersede_existing: bool,
    pub min_lead: Duration,
    pub limits: LimitsConfig,
}

impl ScheduleSettings {
    pub fn from_config(config: &CadenceConfig) -> Self {
        Self {
            callback_url: config.scheduler.callback_url.clone(),
            webhook_secret: config.scheduler.webhook_secret.clone(),
            supersede_existing: config.scheduler.supersede_existing,
            min_lead: Duration::seconds(config.scheduler.min_lead_secs as i64),
            limits: config.limits.clone(),
        }
    }
}

/// Drives notes through `scheduled` and keeps the external trigger, the
/// local trigger row and the note status in agreement.
///
/// Every mutation for one item runs under that item's lock. Within it the
/// note status is changed with compare-and-set and trigger rows are deleted
/// against their `version`, so a caller that bypasses the lock still cannot
/// clobber a newer state.
pub struct ScheduleManager {
    notes: Arc<dyn NoteStore>,
    triggers: Arc<dyn TriggerStore>,
    gateway: Arc<dyn SchedulerGateway>,
    publisher: Arc<dyn Publisher>,
    settings: ScheduleSettings,
    locks: ItemLocks,
    /// Taken after an item lock, only while adding a new outstanding schedule.
    owner_locks: ItemLocks,
}

impl ScheduleManager {
    pub fn new(
        notes: Arc<dyn NoteStore>,
        triggers: Arc<dyn TriggerStore>,
        gateway: Arc<dyn SchedulerGateway>,
        publisher: Arc<dyn Publisher>,
        settings: ScheduleSettings,
    ) -> Self {
        Self {
            notes,
            triggers,
            gateway,
            publisher,
            settings,
            locks: ItemLocks::new(),
            owner_locks: ItemLocks::new(),
        }
    }

    /// Schedule `item_id` to publish at `target_at`.
    ///
    /// Registers a one-shot external trigger, stores it and moves the note
    /// to `scheduled`. An item that is already scheduled is superseded, or
    /// rejected with `AlreadyScheduled` when superseding is disabled. Either
    /// every side changes or none does.
    #[instrument(skip(self), fields(owner_id = %actor.owner_id, op = "create_schedule"))]
    pub async fn create_schedule_for_item(
        &self,
        actor: &Actor,
        item_id: &str,
        target_at: DateTime<Utc>,
    ) -> Result<ScheduledTrigger> {
        self.create_inner(actor, item_id, target_at)
            .await
            .inspect_err(|e| log_failure("create_schedule", actor, item_id, e))
    }

    async fn create_inner(
        &self,
        actor: &Actor,
        item_id: &str,
        target_at: DateTime<Utc>,
    ) -> Result<ScheduledTrigger> {
        translate::ensure_future(target_at, Utc::now(), self.settings.min_lead)?;
        let _guard = self.locks.acquire(item_id).await;

        let note = self.load_owned(actor, item_id, "schedule this note")?;
        let previous = self.triggers.latest_for_item(item_id)?;

        let already = note.status == NoteStatus::Scheduled || previous.is_some();
        if already && !self.settings.supersede_existing {
            return Err(SchedulerError::AlreadyScheduled {
                item_id: item_id.to_string(),
            });
        }

        let directive = translate::once(target_at);
        let Some(fire_at) = directive.fire_at() else {
            return Err(SchedulerError::UnsupportedDirective(directive.kind().into()));
        };
        let change = if note.status == NoteStatus::Scheduled {
            StatusChange::retime(fire_at)
        } else {
            StatusChange::schedule(note.status, fire_at)?
        };

        // Superseding does not add an outstanding schedule. A new one holds
        // the owner's lock from the count until its row is written.
        let limit = match &previous {
            None => self.settings.limits.max_scheduled(actor.plan),
            Some(_) => None,
        };
        let _owner_guard = match limit {
            Some(limit) => {
                let guard = self.owner_locks.acquire(&actor.owner_id).await;
                if self.triggers.count_for_owner(&actor.owner_id)? >= limit {
                    return Err(SchedulerError::QuotaExceeded {
                        owner_id: actor.owner_id.clone(),
                        limit,
                    });
                }
                Some(guard)
            }
            None => None,
        };

        let name = translate::trigger_name(item_id);
        let payload = FirePayload {
            item_id: item_id.to_string(),
            owner_id: note.owner_id.clone(),
        };
        let external_id = self
            .gateway
            .register_once_trigger(&self.register_request(&name, directive.clone(), &payload))
            .await
            .map_err(gateway_error)?;

        let new = NewTrigger {
            item_id: item_id.to_string(),
            owner_id: note.owner_id.clone(),
            name: name.clone(),
            directive,
            target_at: fire_at,
            external_id,
        };
        let stored = match self.triggers.upsert(&new) {
            Ok(stored) => stored,
            Err(e) => {
                self.restore_external(&name, previous.as_ref(), &payload).await;
                return Err(e);
            }
        };

        let applied = self.notes.apply(item_id, &change);
        if !matches!(applied, Ok(true)) {
            self.restore_local(&stored, previous.as_ref());
            self.restore_external(&name, previous.as_ref(), &payload).await;
            return match applied {
                Err(e) => Err(e.into()),
                _ => Err(SchedulerError::Conflict(format!(
                    "note {item_id} left {} while being scheduled",
                    change.expected
                ))),
            };
        }

        info!(
            item_id,
            trigger = %stored.name,
            target_at = %stored.target_at,
            version = stored.version,
            "note scheduled"
        );
        Ok(stored)
    }

    /// Cancel the trigger called `trigger_name` and return its note to
    /// `draft`.
    #[instrument(skip(self), fields(owner_id = %actor.owner_id, op = "cancel_schedule"))]
    pub async fn cancel_schedule(&self, actor: &Actor, trigger_name: &str) -> Result<Note> {
        self.cancel_inner(actor, trigger_name)
            .await
            .inspect_err(|e| log_failure("cancel_schedule", actor, trigger_name, e))
    }

    async fn cancel_inner(&self, actor: &Actor, trigger_name: &str) -> Result<Note> {
        let trigger = self
            .triggers
            .latest_by_name(trigger_name)?
            .ok_or_else(|| SchedulerError::NotFound {
                what: "trigger",
                id: trigger_name.to_string(),
            })?;
        if !actor.owns(&trigger.owner_id) {
            return Err(unauthorized(actor, "cancel this schedule"));
        }
        self.unschedule(actor, &trigger.item_id, NoteStatus::Draft).await
    }

    /// Drop the item's trigger and put the note back in the queue.
    #[instrument(skip(self), fields(owner_id = %actor.owner_id, op = "reschedule_to_queue"))]
    pub async fn reschedule_to_queue(&self, actor: &Actor, item_id: &str) -> Result<Note> {
        self.unschedule(actor, item_id, NoteStatus::Queued)
            .await
            .inspect_err(|e| log_failure("reschedule_to_queue", actor, item_id, e))
    }

    async fn unschedule(&self, actor: &Actor, item_id: &str, to: NoteStatus) -> Result<Note> {
        let change = StatusChange::unschedule(to)?;
        let _guard = self.locks.acquire(item_id).await;

        let note = self.load_owned(actor, item_id, "unschedule this note")?;
        let trigger = self.triggers.latest_for_item(item_id)?;
        if trigger.is_none() && note.status != NoteStatus::Scheduled {
            return Err(SchedulerError::NotFound {
                what: "trigger",
                id: translate::trigger_name(item_id),
            });
        }

        if let Some(trigger) = &trigger {
            match self.gateway.delete_trigger(&trigger.name).await.map_err(gateway_error)? {
                DeleteOutcome::Deleted => {}
                DeleteOutcome::NotFound => {
                    warn!(item_id, trigger = %trigger.name, "external trigger already gone")
                }
            }
            if !self.triggers.delete(&trigger.id, trigger.version)? {
                return Err(SchedulerError::Conflict(format!(
                    "trigger {} changed while being cancelled",
                    trigger.name
                )));
            }
        }

        if note.status == NoteStatus::Scheduled && !self.notes.apply(item_id, &change)? {
            return Err(SchedulerError::Conflict(format!(
                "note {item_id} left scheduled while being cancelled"
            )));
        }

        info!(item_id, status = %to, "schedule removed");
        self.notes
            .get(item_id)?
            .ok_or_else(|| SchedulerError::NotFound {
                what: "note",
                id: item_id.to_string(),
            })
    }

    /// True only while the note is exactly `scheduled`. Missing notes are
    /// never publishable.
    pub fn should_publish_now(&self, item_id: &str) -> Result<bool> {
        Ok(self
            .notes
            .get(item_id)?
            .is_some_and(|n| n.status == NoteStatus::Scheduled))
    }

    /// [`should_publish_now`](Self::should_publish_now) for an
    /// authenticated caller, who must own the note.
    pub fn should_publish_for(&self, actor: &Actor, item_id: &str) -> Result<bool> {
        let note = self.load_owned(actor, item_id, "read this note")?;
        Ok(note.status == NoteStatus::Scheduled)
    }

    /// Handle a callback from the trigger service.
    ///
    /// Safe under at-least-once delivery: only a `scheduled` note is
    /// published, and only once. A publisher failure leaves the note
    /// `scheduled` so a retried callback can publish it.
    #[instrument(skip(self, payload), fields(item_id = %payload.item_id, owner_id = %payload.owner_id, op = "publish"))]
    pub async fn handle_fire(&self, payload: &FirePayload) -> Result<PublishOutcome> {
        let result = self.fire_inner(payload).await;
        if let Err(e) = &result {
            warn!(
                op = "publish",
                owner_id = %payload.owner_id,
                item_id = %payload.item_id,
                code = e.code(),
                error = %e,
                "operation failed"
            );
        }
        result
    }

    async fn fire_inner(&self, payload: &FirePayload) -> Result<PublishOutcome> {
        let _guard = self.locks.acquire(&payload.item_id).await;

        let note = self
            .notes
            .get(&payload.item_id)?
            .ok_or_else(|| SchedulerError::NotFound {
                what: "note",
                id: payload.item_id.clone(),
            })?;
        if note.owner_id != payload.owner_id {
            return Err(SchedulerError::Unauthorized {
                owner_id: payload.owner_id.clone(),
                reason: "publish a note of another owner".into(),
            });
        }
        if note.status != NoteStatus::Scheduled {
            info!(status = %note.status, "note not scheduled; duplicate or stale callback");
            return Ok(PublishOutcome::Skipped {
                status: note.status,
            });
        }

        self.publisher.publish(&note).await?;

        let sent_at = Utc::now().trunc_subsecs(6);
        if !self.notes.apply(&note.id, &StatusChange::publish(sent_at))? {
            let status = self
                .notes
                .get(&note.id)?
                .map(|n| n.status)
                .unwrap_or(NoteStatus::Sent);
            return Ok(PublishOutcome::Skipped { status });
        }

        if let Some(trigger) = self.triggers.latest_for_item(&note.id)? {
            self.triggers.delete(&trigger.id, trigger.version)?;
            // The trigger has fired; removing it keeps cron-style services
            // from matching the same date a year later.
            if let Err(e) = self.gateway.delete_trigger(&trigger.name).await {
                warn!(trigger = %trigger.name, error = %e, "could not remove fired trigger");
            }
        }

        info!(%sent_at, "note sent");
        Ok(PublishOutcome::Published { sent_at })
    }

    /// The item's current trigger, if any.
    pub fn latest_trigger_for_item(
        &self,
        actor: &Actor,
        item_id: &str,
    ) -> Result<Option<ScheduledTrigger>> {
        match self.triggers.latest_for_item(item_id)? {
            Some(t) if !actor.owns(&t.owner_id) => Err(unauthorized(actor, "read this schedule")),
            other => Ok(other),
        }
    }

    pub fn list_triggers(&self, actor: &Actor) -> Result<Vec<ScheduledTrigger>> {
        self.triggers.list_for_owner(&actor.owner_id)
    }

    /// Live schedules of an owner, for callers already authenticated by a
    /// capability token.
    pub fn active_schedules(&self, owner_id: &str) -> Result<Vec<ScheduledTrigger>> {
        self.triggers.list_for_owner(owner_id)
    }

    fn load_owned(&self, actor: &Actor, item_id: &str, reason: &str) -> Result<Note> {
        let note = self
            .notes
            .get(item_id)?
            .ok_or_else(|| SchedulerError::NotFound {
                what: "note",
                id: item_id.to_string(),
            })?;
        if !actor.owns(&note.owner_id) {
            return Err(unauthorized(actor, reason));
        }
        Ok(note)
    }

    fn register_request(
        &self,
        name: &str,
        directive: TriggerDirective,
        payload: &FirePayload,
    ) -> RegisterTrigger {
        let mut headers = BTreeMap::new();
        headers.insert(
            WEBHOOK_SECRET_HEADER.to_string(),
            self.settings.webhook_secret.clone(),
        );
        RegisterTrigger {
            name: name.to_string(),
            directive,
            endpoint: self.settings.callback_url.clone(),
            method: "POST".to_string(),
            headers,
            body: payload.clone(),
        }
    }

    /// Put the external side back how it was: re-register the superseded
    /// trigger, or delete the one just created.
    async fn restore_external(
        &self,
        name: &str,
        previous: Option<&ScheduledTrigger>,
        payload: &FirePayload,
    ) {
        let outcome = match previous {
            Some(prev) => self
                .gateway
                .register_once_trigger(&self.register_request(name, prev.directive.clone(), payload))
                .await
                .map(|_| ()),
            None => self.gateway.delete_trigger(name).await.map(|_| ()),
        };
        if let Err(e) = outcome {
            warn!(trigger = name, error = %e, "rollback of external trigger failed");
        }
    }

    fn restore_local(&self, stored: &ScheduledTrigger, previous: Option<&ScheduledTrigger>) {
        let outcome = match previous {
            Some(prev) => self
                .triggers
                .upsert(&NewTrigger {
                    item_id: prev.item_id.clone(),
                    owner_id: prev.owner_id.clone(),
                    name: prev.name.clone(),
                    directive: prev.directive.clone(),
                    target_at: prev.target_at,
                    external_id: prev.external_id.clone(),
                })
                .map(|_| ()),
            None => self.triggers.delete(&stored.id, stored.version).map(|_| ()),
        };
        if let Err(e) = outcome {
            warn!(trigger = %stored.name, error = %e, "rollback of trigger row failed");
        }
    }
}

fn gateway_error(e: GatewayError) -> SchedulerError {
    match e {
        GatewayError::UnsupportedDirective { .. } => SchedulerError::UnsupportedDirective(e.to_string()),
        other => SchedulerError::Gateway(other),
    }
}

fn unauthorized(actor: &Actor, reason: &str) -> SchedulerError {
    SchedulerError::Unauthorized {
        owner_id: actor.owner_id.clone(),
        reason: reason.to_string(),
    }
}

fn log_failure(op: &str, actor: &Actor, subject: &str, e: &SchedulerError) {
    warn!(op, owner_id = %actor.owner_id, subject, code = e.code(), error = %e, "operation failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTriggerStore;
    use crate::publish::PublishError;
    use async_trait::async_trait;
    use cadence_core::Plan;
    use cadence_notes::MemoryNoteStore;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records calls and keeps the set of live external triggers by name.
    #[derive(Default)]
    struct FakeGateway {
        live: Mutex<BTreeMap<String, RegisterTrigger>>,
        registrations: AtomicUsize,
        fail_register: AtomicBool,
        register_delay_ms: AtomicU64,
    }

    #[async_trait]
    impl SchedulerGateway for FakeGateway {
        fn name(&self) -> &str {
            "fake"
        }

        async fn register_once_trigger(&self, req: &RegisterTrigger) -> std::result::Result<String, GatewayError> {
            let delay = self.register_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
            if self.fail_register.load(Ordering::SeqCst) {
                return Err(GatewayError::Unavailable("fake outage".into()));
            }
            let n = self.registrations.fetch_add(1, Ordering::SeqCst);
            self.live.lock().unwrap().insert(req.name.clone(), req.clone());
            Ok(format!("ext-{n}"))
        }

        async fn delete_trigger(&self, name: &str) -> std::result::Result<DeleteOutcome, GatewayError> {
            Ok(match self.live.lock().unwrap().remove(name) {
                Some(_) => DeleteOutcome::Deleted,
                None => DeleteOutcome::NotFound,
            })
        }
    }

    /// Memory store whose `upsert` can be made to fail.
    #[derive(Default)]
    struct FlakyTriggers {
        inner: MemoryTriggerStore,
        fail_upsert: AtomicBool,
    }

    impl TriggerStore for FlakyTriggers {
        fn upsert(&self, trigger: &NewTrigger) -> Result<ScheduledTrigger> {
            if self.fail_upsert.load(Ordering::SeqCst) {
                return Err(SchedulerError::Storage(rusqlite::Error::InvalidQuery));
            }
            self.inner.upsert(trigger)
        }

        fn latest_for_item(&self, item_id: &str) -> Result<Option<ScheduledTrigger>> {
            self.inner.latest_for_item(item_id)
        }

        fn latest_by_name(&self, name: &str) -> Result<Option<ScheduledTrigger>> {
            self.inner.latest_by_name(name)
        }

        fn list_for_owner(&self, owner_id: &str) -> Result<Vec<ScheduledTrigger>> {
            self.inner.list_for_owner(owner_id)
        }

        fn count_for_owner(&self, owner_id: &str) -> Result<usize> {
            self.inner.count_for_owner(owner_id)
        }

        fn delete(&self, id: &str, expected_version: i64) -> Result<bool> {
            self.inner.delete(id, expected_version)
        }
    }

    #[derive(Default)]
    struct CountingPublisher {
        published: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Publisher for CountingPublisher {
        fn name(&self) -> &str {
            "counting"
        }

        async fn publish(&self, _note: &Note) -> std::result::Result<(), PublishError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PublishError::Rejected {
                    status: 503,
                    message: "down".into(),
                });
            }
            self.published.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        notes: Arc<MemoryNoteStore>,
        triggers: Arc<MemoryTriggerStore>,
        gateway: Arc<FakeGateway>,
        publisher: Arc<CountingPublisher>,
        manager: ScheduleManager,
    }

    fn settings() -> ScheduleSettings {
        ScheduleSettings {
            callback_url: "http://cadence.local/webhooks/publish".into(),
            webhook_secret: "s3cret".into(),
            supersede_existing: true,
            min_lead: Duration::seconds(60),
            limits: LimitsConfig {
                free_max_scheduled: Some(2),
                pro_max_scheduled: None,
            },
        }
    }

    fn harness_with(settings: ScheduleSettings) -> Harness {
        let notes = Arc::new(MemoryNoteStore::new());
        let triggers = Arc::new(MemoryTriggerStore::new());
        let gateway = Arc::new(FakeGateway::default());
        let publisher = Arc::new(CountingPublisher::default());
        let manager = ScheduleManager::new(
            notes.clone(),
            triggers.clone(),
            gateway.clone(),
            publisher.clone(),
            settings,
        );
        Harness {
            notes,
            triggers,
            gateway,
            publisher,
            manager,
        }
    }

    fn actor(owner: &str) -> Actor {
        Actor::new(owner, Plan::Free).unwrap()
    }

    fn later(hours: i64) -> DateTime<Utc> {
        Utc::now() + Duration::hours(hours)
    }

    #[tokio::test]
    async fn create_registers_callback_with_secret() {
        let h = harness_with(settings());
        let note = h.notes.create("u-1", "hello", NoteStatus::Draft).unwrap();

        let trigger = h
            .manager
            .create_schedule_for_item(&actor("u-1"), &note.id, later(2))
            .await
            .unwrap();

        assert_eq!(trigger.name, format!("note-{}", note.id));
        let live = h.gateway.live.lock().unwrap();
        let req = live.get(&trigger.name).unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.endpoint, "http://cadence.local/webhooks/publish");
        assert_eq!(req.headers.get(WEBHOOK_SECRET_HEADER).unwrap(), "s3cret");
        assert_eq!(req.body.item_id, note.id);

        let loaded = h.notes.get(&note.id).unwrap().unwrap();
        assert_eq!(loaded.status, NoteStatus::Scheduled);
        assert_eq!(loaded.scheduled_for, Some(trigger.target_at));
    }

    #[tokio::test]
    async fn past_target_is_rejected_before_any_side_effect() {
        let h = harness_with(settings());
        let note = h.notes.create("u-1", "hello", NoteStatus::Draft).unwrap();

        let err = h
            .manager
            .create_schedule_for_item(&actor("u-1"), &note.id, Utc::now() + Duration::seconds(5))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SCHEDULE_IN_PAST");
        assert_eq!(h.gateway.registrations.load(Ordering::SeqCst), 0);
        assert!(h.triggers.is_empty());
    }

    #[tokio::test]
    async fn other_owner_is_unauthorized() {
        let h = harness_with(settings());
        let note = h.notes.create("u-1", "hello", NoteStatus::Draft).unwrap();
        let err = h
            .manager
            .create_schedule_for_item(&actor("u-2"), &note.id, later(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Unauthorized { .. }));

        let err = h
            .manager
            .create_schedule_for_item(&actor("u-1"), "missing", later(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound { what: "note", .. }));
    }

    #[tokio::test]
    async fn sent_note_cannot_be_scheduled() {
        let h = harness_with(settings());
        let note = h.notes.create("u-1", "hello", NoteStatus::Draft).unwrap();
        h.manager
            .create_schedule_for_item(&actor("u-1"), &note.id, later(1))
            .await
            .unwrap();
        h.manager
            .handle_fire(&FirePayload {
                item_id: note.id.clone(),
                owner_id: "u-1".into(),
            })
            .await
            .unwrap();

        let err = h
            .manager
            .create_schedule_for_item(&actor("u-1"), &note.id, later(3))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
        assert!(h.gateway.live.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn quota_counts_outstanding_triggers_only() {
        let h = harness_with(settings());
        let a = actor("u-1");
        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(h.notes.create("u-1", &format!("n{i}"), NoteStatus::Queued).unwrap().id);
        }
        h.manager.create_schedule_for_item(&a, &ids[0], later(1)).await.unwrap();
        h.manager.create_schedule_for_item(&a, &ids[1], later(2)).await.unwrap();

        let err = h
            .manager
            .create_schedule_for_item(&a, &ids[2], later(3))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::QuotaExceeded { limit: 2, .. }));

        // Superseding an existing schedule is still allowed at the limit.
        h.manager.create_schedule_for_item(&a, &ids[0], later(4)).await.unwrap();

        let pro = Actor::new("u-1", Plan::Pro).unwrap();
        h.manager.create_schedule_for_item(&pro, &ids[2], later(3)).await.unwrap();
    }

    #[tokio::test]
    async fn gateway_failure_leaves_note_untouched() {
        let h = harness_with(settings());
        let note = h.notes.create("u-1", "hello", NoteStatus::Draft).unwrap();
        h.gateway.fail_register.store(true, Ordering::SeqCst);

        let err = h
            .manager
            .create_schedule_for_item(&actor("u-1"), &note.id, later(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "GATEWAY_ERROR");
        assert_eq!(h.notes.get(&note.id).unwrap().unwrap().status, NoteStatus::Draft);
        assert!(h.triggers.is_empty());
    }

    #[tokio::test]
    async fn concurrent_creates_respect_quota() {
        let h = harness_with(settings());
        h.gateway.register_delay_ms.store(50, Ordering::SeqCst);
        let a = actor("u-1");
        let ids: Vec<String> = (0..5)
            .map(|i| h.notes.create("u-1", &format!("n{i}"), NoteStatus::Draft).unwrap().id)
            .collect();

        let (r0, r1, r2, r3, r4) = tokio::join!(
            h.manager.create_schedule_for_item(&a, &ids[0], later(1)),
            h.manager.create_schedule_for_item(&a, &ids[1], later(2)),
            h.manager.create_schedule_for_item(&a, &ids[2], later(3)),
            h.manager.create_schedule_for_item(&a, &ids[3], later(4)),
            h.manager.create_schedule_for_item(&a, &ids[4], later(5)),
        );
        let results = [r0, r1, r2, r3, r4];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, SchedulerError::QuotaExceeded { limit: 2, .. })));
        assert_eq!(h.triggers.len(), 2);
        assert_eq!(h.gateway.live.lock().unwrap().len(), 2);
    }

    fn flaky_harness() -> (Arc<MemoryNoteStore>, Arc<FlakyTriggers>, Arc<FakeGateway>, ScheduleManager) {
        let notes = Arc::new(MemoryNoteStore::new());
        let triggers = Arc::new(FlakyTriggers::default());
        let gateway = Arc::new(FakeGateway::default());
        let manager = ScheduleManager::new(
            notes.clone(),
            triggers.clone(),
            gateway.clone(),
            Arc::new(CountingPublisher::default()),
            settings(),
        );
        (notes, triggers, gateway, manager)
    }

    #[tokio::test]
    async fn failed_row_write_removes_new_external_trigger() {
        let (notes, triggers, gateway, manager) = flaky_harness();
        let note = notes.create("u-1", "hello", NoteStatus::Draft).unwrap();
        triggers.fail_upsert.store(true, Ordering::SeqCst);

        let err = manager
            .create_schedule_for_item(&actor("u-1"), &note.id, later(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STORAGE_ERROR");
        assert_eq!(gateway.registrations.load(Ordering::SeqCst), 1);
        assert!(gateway.live.lock().unwrap().is_empty());
        assert!(triggers.inner.is_empty());

        let loaded = notes.get(&note.id).unwrap().unwrap();
        assert_eq!(loaded.status, NoteStatus::Draft);
        assert!(loaded.scheduled_for.is_none());
    }

    #[tokio::test]
    async fn failed_supersede_restores_previous_directive() {
        let (notes, triggers, gateway, manager) = flaky_harness();
        let note = notes.create("u-1", "hello", NoteStatus::Draft).unwrap();
        let previous = manager
            .create_schedule_for_item(&actor("u-1"), &note.id, later(1))
            .await
            .unwrap();

        triggers.fail_upsert.store(true, Ordering::SeqCst);
        let err = manager
            .create_schedule_for_item(&actor("u-1"), &note.id, later(5))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STORAGE_ERROR");

        let live = gateway.live.lock().unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[&previous.name].directive, previous.directive);

        let row = triggers.inner.latest_for_item(&note.id).unwrap().unwrap();
        assert_eq!(row.target_at, previous.target_at);
        assert_eq!(row.version, previous.version);

        let loaded = notes.get(&note.id).unwrap().unwrap();
        assert_eq!(loaded.status, NoteStatus::Scheduled);
        assert_eq!(loaded.scheduled_for, Some(previous.target_at));
    }

    #[tokio::test]
    async fn reschedule_to_queue_clears_trigger() {
        let h = harness_with(settings());
        let note = h.notes.create("u-1", "hello", NoteStatus::Queued).unwrap();
        h.manager
            .create_schedule_for_item(&actor("u-1"), &note.id, later(1))
            .await
            .unwrap();

        let back = h.manager.reschedule_to_queue(&actor("u-1"), &note.id).await.unwrap();
        assert_eq!(back.status, NoteStatus::Queued);
        assert!(back.scheduled_for.is_none());
        assert!(h.triggers.is_empty());
        assert!(h.gateway.live.lock().unwrap().is_empty());

        let err = h.manager.reschedule_to_queue(&actor("u-1"), &note.id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound { what: "trigger", .. }));
    }

    #[tokio::test]
    async fn cancel_by_foreign_owner_is_rejected() {
        let h = harness_with(settings());
        let note = h.notes.create("u-1", "hello", NoteStatus::Draft).unwrap();
        let trigger = h
            .manager
            .create_schedule_for_item(&actor("u-1"), &note.id, later(1))
            .await
            .unwrap();

        let err = h.manager.cancel_schedule(&actor("u-2"), &trigger.name).await.unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
        assert_eq!(h.triggers.len(), 1);
    }

    #[tokio::test]
    async fn publisher_failure_keeps_note_scheduled_for_retry() {
        let h = harness_with(settings());
        let note = h.notes.create("u-1", "hello", NoteStatus::Draft).unwrap();
        h.manager
            .create_schedule_for_item(&actor("u-1"), &note.id, later(1))
            .await
            .unwrap();
        let payload = FirePayload {
            item_id: note.id.clone(),
            owner_id: "u-1".into(),
        };

        h.publisher.fail.store(true, Ordering::SeqCst);
        let err = h.manager.handle_fire(&payload).await.unwrap_err();
        assert_eq!(err.code(), "PUBLISH_ERROR");
        assert!(h.manager.should_publish_now(&note.id).unwrap());

        h.publisher.fail.store(false, Ordering::SeqCst);
        let outcome = h.manager.handle_fire(&payload).await.unwrap();
        assert!(matches!(outcome, PublishOutcome::Published { .. }));
        assert_eq!(h.publisher.published.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fire_with_wrong_owner_is_rejected() {
        let h = harness_with(settings());
        let note = h.notes.create("u-1", "hello", NoteStatus::Draft).unwrap();
        h.manager
            .create_schedule_for_item(&actor("u-1"), &note.id, later(1))
            .await
            .unwrap();

        let err = h
            .manager
            .handle_fire(&FirePayload {
                item_id: note.id.clone(),
                owner_id: "u-2".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Unauthorized { .. }));
        assert_eq!(h.publisher.published.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn latest_trigger_is_owner_scoped() {
        let h = harness_with(settings());
        let note = h.notes.create("u-1", "hello", NoteStatus::Draft).unwrap();
        h.manager
            .create_schedule_for_item(&actor("u-1"), &note.id, later(1))
            .await
            .unwrap();

        assert!(h.manager.latest_trigger_for_item(&actor("u-1"), &note.id).unwrap().is_some());
        assert!(h.manager.latest_trigger_for_item(&actor("u-2"), &note.id).is_err());
        assert!(h.manager.latest_trigger_for_item(&actor("u-1"), "other").unwrap().is_none());
        assert_eq!(h.manager.list_triggers(&actor("u-2")).unwrap().len(), 0);
        assert_eq!(h.manager.active_schedules("u-1").unwrap().len(), 1);
    }
}
