//! Offline action queue
//!
//! Gameplay actions are applied optimistically by the caller and handed to the
//! queue together with the predicted outcome. A sync pass later submits every
//! Pending action, in enqueue order, over plain HTTP and reconciles the
//! server's verdict against the prediction.
//!
//! ```text
//! Pending ──submit──► Syncing ──clean match──────────► Synced   (terminal)
//!    ▲                   │    ──differs──────────────► Adjusted (terminal)
//!    │                   │    ──explicit reject──────► Rejected (terminal)
//!    └──transient, attempts < cap / auth failure─┘
//!                        └───transient, attempts ≥ cap──► Rejected (terminal)
//! ```
//!
//! The queue is written through to storage after every change, so a crash
//! loses at most the verdict of the action that was in flight.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use racketeer_shared::{GameAction, SubmitActionRequest, SubmitActionResponse};

use super::reconcile::{classify, Verdict};
use crate::application::dto::{
    ActionId, QueueEvent, QueuedAction, ReconciliationEvent, SyncReport, SyncStatus,
};
use crate::application::error::{QueueError, QueueResult};
use crate::infrastructure::messaging::EventBus;
use crate::infrastructure::scheduler::ScheduledTask;
use crate::ports::outbound::{
    storage_keys, ActionApiPort, ClockPort, StorageProvider, SubmitError,
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETENTION_SECS: i64 = 24 * 60 * 60;
pub const DEFAULT_GRACE_MS: u64 = 5_000;

/// Queue tunables.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Submissions per action before a transient failure becomes terminal
    pub max_attempts: u32,
    /// Actions older than this are dropped on load, whatever their status
    pub retention: chrono::Duration,
    /// How long terminal actions stay visible after a pass
    pub grace: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retention: chrono::Duration::seconds(DEFAULT_RETENTION_SECS),
            grace: Duration::from_millis(DEFAULT_GRACE_MS),
        }
    }
}

struct Inner {
    config: QueueConfig,
    storage: Arc<dyn StorageProvider>,
    api: Arc<dyn ActionApiPort>,
    clock: Arc<dyn ClockPort>,
    actions: Mutex<Vec<QueuedAction>>,
    syncing: AtomicBool,
    online: AtomicBool,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    events: EventBus<QueueEvent>,
    sweep: Mutex<Option<ScheduledTask>>,
}

/// Releases the single-flight flag however the pass ends.
struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

enum Prepared {
    Submit(GameAction, SubmitActionRequest),
    /// Cancelled or already handled since the pass started
    Gone,
    Unencodable,
}

enum Step {
    Done(SyncStatus),
    Retry,
    Abort,
    Gone,
}

/// Durable, retryable log of predicted actions. Cloning shares the queue.
#[derive(Clone)]
pub struct ActionQueue {
    inner: Arc<Inner>,
}

impl ActionQueue {
    /// Restore the queue from storage.
    ///
    /// Stale actions are dropped, undecodable entries are skipped with a
    /// warning, actions interrupted mid-submission go back to Pending, and
    /// terminal actions whose grace window has passed are purged.
    pub fn load(
        storage: Arc<dyn StorageProvider>,
        api: Arc<dyn ActionApiPort>,
        clock: Arc<dyn ClockPort>,
        config: QueueConfig,
    ) -> QueueResult<Self> {
        let now = clock.now();
        let (actions, changed) = match storage.load(storage_keys::ACTION_QUEUE)? {
            Some(text) => restore(&text, now, &config),
            None => (Vec::new(), false),
        };
        let last_sync = storage
            .load(storage_keys::LAST_SYNC)?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|at| at.with_timezone(&Utc));

        tracing::info!(restored = actions.len(), "Action queue loaded");

        let queue = Self {
            inner: Arc::new(Inner {
                config,
                storage,
                api,
                clock,
                actions: Mutex::new(actions),
                syncing: AtomicBool::new(false),
                online: AtomicBool::new(true),
                last_sync: Mutex::new(last_sync),
                events: EventBus::new(),
                sweep: Mutex::new(None),
            }),
        };

        if changed {
            let actions = queue.lock();
            queue.persist_logged(&actions);
        }
        Ok(queue)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<QueuedAction>> {
        self.inner
            .actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, actions: &[QueuedAction]) -> QueueResult<()> {
        let json = serde_json::to_string(actions)?;
        self.inner.storage.save(storage_keys::ACTION_QUEUE, &json)?;
        Ok(())
    }

    /// Persist mid-pass; the pass carries on if the store is unavailable.
    fn persist_logged(&self, actions: &[QueuedAction]) {
        if let Err(e) = self.persist(actions) {
            tracing::error!(error = %e, "Failed to persist action queue");
        }
    }

    fn emit(&self, event: QueueEvent) {
        self.inner.events.emit(&event);
    }

    /// Queue a predicted action. Persisted before this returns.
    pub fn enqueue(&self, action: GameAction, local_result: Value) -> QueueResult<ActionId> {
        let queued = QueuedAction::new(action, local_result, self.inner.clock.now());
        let id = queued.id;
        let action_type = queued.action_type();

        let len = {
            let mut actions = self.lock();
            actions.push(queued);
            if let Err(e) = self.persist(&actions) {
                actions.pop();
                tracing::error!(action_id = %id, error = %e, "Enqueue not persisted; rolled back");
                return Err(e);
            }
            actions.len()
        };

        tracing::debug!(action_id = %id, %action_type, queued = len, "Action enqueued");
        self.emit(QueueEvent::LengthChanged(len));
        Ok(id)
    }

    /// Run one sync pass over the actions Pending right now.
    ///
    /// Returns a skipped report, without submitting anything, when another
    /// pass is in flight or the host is known to be offline.
    pub async fn sync_all(&self) -> SyncReport {
        if !self.is_online() {
            tracing::debug!("Offline; skipping sync pass");
            return SyncReport::skipped();
        }
        if self
            .inner
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Sync pass already running");
            return SyncReport::skipped();
        }
        let _guard = SyncGuard(&self.inner.syncing);

        let batch: Vec<ActionId> = self
            .lock()
            .iter()
            .filter(|a| a.status == SyncStatus::Pending)
            .map(|a| a.id)
            .collect();
        if !batch.is_empty() {
            tracing::info!(count = batch.len(), "Starting sync pass");
        }

        let mut report = SyncReport::default();
        for id in batch {
            let (action, request) = match self.begin_attempt(id) {
                Prepared::Submit(action, request) => (action, request),
                Prepared::Gone => continue,
                Prepared::Unencodable => {
                    report.rejected += 1;
                    continue;
                }
            };
            report.submitted += 1;

            let outcome = self.inner.api.submit(&action, &request).await;

            match self.finish_attempt(id, outcome) {
                Step::Done(SyncStatus::Synced) => report.synced += 1,
                Step::Done(SyncStatus::Adjusted) => report.adjusted += 1,
                Step::Done(_) => report.rejected += 1,
                Step::Retry => report.retrying += 1,
                Step::Gone => {}
                Step::Abort => {
                    report.aborted = true;
                    break;
                }
            }
        }

        if report.confirmed() > 0 {
            self.record_sync_time();
        }
        self.schedule_sweep();

        tracing::info!(
            submitted = report.submitted,
            synced = report.synced,
            adjusted = report.adjusted,
            rejected = report.rejected,
            retrying = report.retrying,
            aborted = report.aborted,
            "Sync pass finished"
        );
        self.emit(QueueEvent::SyncCompleted(report));
        report
    }

    /// Pending → Syncing, counting the attempt.
    fn begin_attempt(&self, id: ActionId) -> Prepared {
        let mut actions = self.lock();
        let Some(action) = actions
            .iter_mut()
            .find(|a| a.id == id && a.status == SyncStatus::Pending)
        else {
            return Prepared::Gone;
        };

        let request = SubmitActionRequest::new(
            &action.action,
            action.enqueued_at.timestamp_millis(),
            action.local_result.clone(),
        );
        let (prepared, status) = match request {
            Ok(request) => {
                action.status = SyncStatus::Syncing;
                action.attempts += 1;
                tracing::debug!(action_id = %id, attempt = action.attempts, "Submitting action");
                (
                    Prepared::Submit(action.action.clone(), request),
                    SyncStatus::Syncing,
                )
            }
            Err(e) => {
                tracing::error!(action_id = %id, error = %e, "Cannot encode action; rejecting");
                action.status = SyncStatus::Rejected;
                action.last_error = Some(format!("unencodable payload: {e}"));
                action.completed_at = Some(self.inner.clock.now());
                (Prepared::Unencodable, SyncStatus::Rejected)
            }
        };

        self.persist_logged(&actions);
        drop(actions);
        self.emit(QueueEvent::StatusChanged { id, status });
        prepared
    }

    /// Apply the server's answer (or the failure) to one Syncing action.
    fn finish_attempt(
        &self,
        id: ActionId,
        outcome: Result<SubmitActionResponse, SubmitError>,
    ) -> Step {
        let now = self.inner.clock.now();
        let max_attempts = self.inner.config.max_attempts;
        let mut reconciled = None;
        let mut auth_reason = None;

        let (step, status) = {
            let mut actions = self.lock();
            let Some(action) = actions.iter_mut().find(|a| a.id == id) else {
                return Step::Gone;
            };

            let step = match outcome {
                Ok(response) => match classify(&action.local_result, response) {
                    Verdict::Rejected { reason, result } => {
                        tracing::info!(action_id = %id, %reason, "Action rejected by server");
                        action.server_result = result;
                        action.last_error = Some(reason);
                        finish(action, SyncStatus::Rejected, now)
                    }
                    Verdict::Synced { result } => {
                        tracing::debug!(action_id = %id, "Action confirmed");
                        action.server_result = result;
                        action.last_error = None;
                        finish(action, SyncStatus::Synced, now)
                    }
                    Verdict::Adjusted {
                        result,
                        adjustments,
                    } => {
                        tracing::info!(action_id = %id, "Server adjusted action outcome");
                        reconciled = Some(ReconciliationEvent {
                            action_id: id,
                            action_type: action.action_type(),
                            local_result: action.local_result.clone(),
                            server_result: result.clone(),
                            adjustments: adjustments.clone(),
                        });
                        action.server_result = Some(result);
                        action.reconciliation = Some(adjustments);
                        action.last_error = None;
                        finish(action, SyncStatus::Adjusted, now)
                    }
                },
                Err(SubmitError::Authentication(reason)) => {
                    tracing::warn!(action_id = %id, %reason, "Credential refused; aborting pass");
                    action.status = SyncStatus::Pending;
                    action.attempts = action.attempts.saturating_sub(1);
                    action.last_error = Some(reason.clone());
                    auth_reason = Some(reason);
                    Step::Abort
                }
                Err(e) if e.is_retryable() && action.attempts < max_attempts => {
                    tracing::warn!(
                        action_id = %id,
                        attempt = action.attempts,
                        max_attempts,
                        error = %e,
                        "Submission failed; will retry"
                    );
                    action.status = SyncStatus::Pending;
                    action.last_error = Some(e.to_string());
                    Step::Retry
                }
                Err(e) => {
                    tracing::warn!(
                        action_id = %id,
                        attempt = action.attempts,
                        error = %e,
                        "Submission failed for good"
                    );
                    action.last_error = Some(e.to_string());
                    finish(action, SyncStatus::Rejected, now)
                }
            };

            let status = action.status;
            self.persist_logged(&actions);
            (step, status)
        };

        self.emit(QueueEvent::StatusChanged { id, status });
        if let Some(event) = reconciled {
            self.emit(QueueEvent::Reconciled(event));
        }
        if let Some(reason) = auth_reason {
            self.emit(QueueEvent::AuthenticationRequired { reason });
        }
        step
    }

    fn record_sync_time(&self) {
        let now = self.inner.clock.now();
        *self
            .inner
            .last_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(now);
        if let Err(e) = self
            .inner
            .storage
            .save(storage_keys::LAST_SYNC, &now.to_rfc3339())
        {
            tracing::warn!(error = %e, "Failed to persist last sync time");
        }
    }

    /// Purge the actions that are terminal now, once the grace window passes.
    ///
    /// Replaces any earlier sweep; the new set is a superset of the old one.
    fn schedule_sweep(&self) {
        let terminal: HashSet<ActionId> = self
            .lock()
            .iter()
            .filter(|a| a.status.is_terminal())
            .map(|a| a.id)
            .collect();
        if terminal.is_empty() {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let task = ScheduledTask::after(self.inner.config.grace, move || {
            if let Some(inner) = weak.upgrade() {
                let queue = ActionQueue { inner };
                let removed =
                    queue.remove_where(|a| a.status.is_terminal() && terminal.contains(&a.id));
                tracing::debug!(removed, "Grace sweep finished");
            }
        });
        *self
            .inner
            .sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    fn remove_where(&self, mut predicate: impl FnMut(&QueuedAction) -> bool) -> usize {
        let (removed, len) = {
            let mut actions = self.lock();
            let before = actions.len();
            actions.retain(|a| !predicate(a));
            let removed = before - actions.len();
            if removed > 0 {
                self.persist_logged(&actions);
            }
            (removed, actions.len())
        };
        if removed > 0 {
            self.emit(QueueEvent::LengthChanged(len));
        }
        removed
    }

    /// Remove every terminal action now, without waiting for the sweep.
    pub fn purge_completed(&self) -> usize {
        self.remove_where(|a| a.status.is_terminal())
    }

    /// Remove a Pending action.
    pub fn cancel(&self, id: ActionId) -> QueueResult<QueuedAction> {
        let (removed, len) = {
            let mut actions = self.lock();
            let index = actions
                .iter()
                .position(|a| a.id == id)
                .ok_or(QueueError::NotFound(id))?;
            let status = actions[index].status;
            if status != SyncStatus::Pending {
                return Err(QueueError::NotCancellable { id, status });
            }
            let removed = actions.remove(index);
            if let Err(e) = self.persist(&actions) {
                actions.insert(index, removed);
                return Err(e);
            }
            (removed, actions.len())
        };

        tracing::info!(action_id = %id, "Action cancelled");
        self.emit(QueueEvent::LengthChanged(len));
        Ok(removed)
    }

    /// Feed the host's connectivity signal.
    ///
    /// Going from offline to online starts a sync pass and returns its
    /// handle. Going offline never flushes anything.
    pub fn set_online(&self, online: bool) -> Option<JoinHandle<SyncReport>> {
        let was_online = self.inner.online.swap(online, Ordering::SeqCst);
        match (was_online, online) {
            (false, true) => {
                tracing::info!("Back online; starting sync pass");
                let queue = self.clone();
                Some(tokio::spawn(async move { queue.sync_all().await }))
            }
            (true, false) => {
                tracing::info!("Offline; queued actions will wait");
                None
            }
            _ => None,
        }
    }

    /// Follow a connectivity signal until its sender is dropped.
    pub fn spawn_connectivity_hook(&self, mut signal: watch::Receiver<bool>) -> JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move {
            let initial = *signal.borrow_and_update();
            let _ = queue.set_online(initial);
            while signal.changed().await.is_ok() {
                let online = *signal.borrow_and_update();
                let _ = queue.set_online(online);
            }
        })
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &EventBus<QueueEvent> {
        &self.inner.events
    }

    pub fn get(&self, id: ActionId) -> Option<QueuedAction> {
        self.lock().iter().find(|a| a.id == id).cloned()
    }

    /// Snapshot in enqueue order.
    pub fn actions(&self) -> Vec<QueuedAction> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|a| a.status == SyncStatus::Pending)
            .count()
    }

    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self
            .inner
            .last_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn finish(action: &mut QueuedAction, status: SyncStatus, now: DateTime<Utc>) -> Step {
    action.status = status;
    action.completed_at = Some(now);
    Step::Done(status)
}

/// Decode the stored queue and apply the load-time rules.
///
/// Returns the surviving actions and whether anything changed.
fn restore(text: &str, now: DateTime<Utc>, config: &QueueConfig) -> (Vec<QueuedAction>, bool) {
    let entries: Vec<Value> = match serde_json::from_str(text) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(error = %e, "Stored action queue is unreadable; starting empty");
            return (Vec::new(), true);
        }
    };

    let horizon = now - config.retention;
    let grace =
        chrono::Duration::from_std(config.grace).unwrap_or_else(|_| chrono::Duration::zero());
    let mut changed = false;
    let mut actions = Vec::with_capacity(entries.len());

    for entry in entries {
        let mut action: QueuedAction = match serde_json::from_value(entry) {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable queue entry");
                changed = true;
                continue;
            }
        };

        if action.enqueued_at < horizon {
            tracing::debug!(action_id = %action.id, "Dropping stale action");
            changed = true;
            continue;
        }

        if action.status == SyncStatus::Syncing {
            changed = true;
            if action.attempts >= config.max_attempts {
                tracing::warn!(
                    action_id = %action.id,
                    attempts = action.attempts,
                    "Final attempt was interrupted; rejecting"
                );
                action.status = SyncStatus::Rejected;
                action.last_error = Some("retries exhausted".to_string());
                action.completed_at = Some(now);
            } else {
                tracing::debug!(action_id = %action.id, "Restoring interrupted action to pending");
                action.status = SyncStatus::Pending;
            }
        }

        if action.status.is_terminal() {
            let expired = action.completed_at.map_or(true, |at| at + grace <= now);
            if expired {
                changed = true;
                continue;
            }
        }

        actions.push(action);
    }

    (actions, changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use mockall::Sequence;
    use racketeer_shared::{ActionType, PropertyOperation};
    use serde_json::json;
    use tokio::sync::Notify;

    use crate::infrastructure::platform::MemoryStorageProvider;
    use crate::infrastructure::testing::ManualClock;
    use crate::ports::outbound::{MockActionApiPort, MockClockPort};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0)
            .single()
            .expect("date")
    }

    fn queue(api: impl ActionApiPort + 'static, storage: &MemoryStorageProvider) -> ActionQueue {
        ActionQueue::load(
            Arc::new(storage.clone()),
            Arc::new(api),
            Arc::new(ManualClock::new(start())),
            QueueConfig::default(),
        )
        .expect("load queue")
    }

    fn echo_local(
        _: &GameAction,
        request: &SubmitActionRequest,
    ) -> Result<SubmitActionResponse, SubmitError> {
        Ok(SubmitActionResponse {
            result: request.local_result.clone(),
            ..SubmitActionResponse::default()
        })
    }

    fn record(queue: &ActionQueue) -> Arc<Mutex<Vec<QueueEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let _ = queue
            .events()
            .subscribe(move |e| sink.lock().expect("lock").push(e.clone()));
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_actions_sync_when_back_online_then_get_swept() {
        let mut api = MockActionApiPort::new();
        api.expect_submit().times(3).returning(echo_local);
        let storage = MemoryStorageProvider::new();
        let queue = queue(api, &storage);

        assert!(queue.set_online(false).is_none());
        queue
            .enqueue(GameAction::crime("mugging"), json!({"cash": 20}))
            .expect("enqueue");
        queue
            .enqueue(GameAction::heist("bank", vec!["vinnie".into()]), json!({"cash": 900}))
            .expect("enqueue");
        queue
            .enqueue(
                GameAction::property("bar", PropertyOperation::Collect),
                json!({"cash": 55}),
            )
            .expect("enqueue");

        assert!(queue.sync_all().await.skipped);
        assert_eq!(queue.pending_count(), 3);

        let report = queue
            .set_online(true)
            .expect("sync pass started")
            .await
            .expect("pass");

        assert_eq!(report.submitted, 3);
        assert_eq!(report.synced, 3);
        assert!(queue
            .actions()
            .iter()
            .all(|a| a.status == SyncStatus::Synced && a.attempts == 1));
        assert_eq!(queue.last_sync_time(), Some(start()));

        tokio::time::sleep(QueueConfig::default().grace + Duration::from_millis(1)).await;
        assert!(queue.is_empty());
        assert_eq!(storage.get(storage_keys::ACTION_QUEUE).as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_explicit_rejection_is_terminal_on_first_attempt() {
        let mut api = MockActionApiPort::new();
        api.expect_submit().times(1).returning(|_, _| {
            Ok(SubmitActionResponse {
                rejected: true,
                reason: Some("target already robbed".into()),
                ..SubmitActionResponse::default()
            })
        });
        let queue = queue(api, &MemoryStorageProvider::new());
        let id = queue
            .enqueue(GameAction::crime("mugging"), json!({"cash": 20}))
            .expect("enqueue");

        let report = queue.sync_all().await;

        let action = queue.get(id).expect("still visible during grace");
        assert_eq!(report.rejected, 1);
        assert_eq!(action.status, SyncStatus::Rejected);
        assert_eq!(action.attempts, 1);
        assert_eq!(action.last_error.as_deref(), Some("target already robbed"));

        // A later pass leaves it alone
        let report = queue.sync_all().await;
        assert_eq!(report.submitted, 0);
    }

    #[tokio::test]
    async fn test_transient_failures_retry_until_success() {
        let mut api = MockActionApiPort::new();
        let mut seq = Sequence::new();
        api.expect_submit()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(SubmitError::Transient("connection refused".into())));
        api.expect_submit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(echo_local);
        let queue = queue(api, &MemoryStorageProvider::new());
        let id = queue
            .enqueue(GameAction::crime("mugging"), json!({"cash": 20}))
            .expect("enqueue");

        let mut seen = Vec::new();
        for _ in 0..3 {
            queue.sync_all().await;
            let action = queue.get(id).expect("action");
            seen.push((action.status, action.attempts));
        }

        assert_eq!(
            seen,
            vec![
                (SyncStatus::Pending, 1),
                (SyncStatus::Pending, 2),
                (SyncStatus::Synced, 3),
            ]
        );
    }

    #[tokio::test]
    async fn test_transient_failure_at_cap_becomes_rejected_with_reason() {
        let mut api = MockActionApiPort::new();
        api.expect_submit()
            .times(3)
            .returning(|_, _| Err(SubmitError::Transient("gateway timeout".into())));
        let queue = queue(api, &MemoryStorageProvider::new());
        let id = queue
            .enqueue(GameAction::crime("mugging"), json!({}))
            .expect("enqueue");

        for _ in 0..4 {
            queue.sync_all().await;
        }

        let action = queue.get(id).expect("action");
        assert_eq!(action.status, SyncStatus::Rejected);
        assert_eq!(action.attempts, 3);
        assert!(action
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("gateway timeout")));
    }

    #[tokio::test]
    async fn test_differing_result_is_adjusted_with_one_reconciliation_event() {
        let mut api = MockActionApiPort::new();
        api.expect_submit().times(1).returning(|_, _| {
            Ok(SubmitActionResponse {
                result: json!({"cash": 100}),
                ..SubmitActionResponse::default()
            })
        });
        let queue = queue(api, &MemoryStorageProvider::new());
        let events = record(&queue);
        let id = queue
            .enqueue(GameAction::heist("bank", vec![]), json!({"cash": 150}))
            .expect("enqueue");

        let report = queue.sync_all().await;

        assert_eq!(report.adjusted, 1);
        let action = queue.get(id).expect("action");
        assert_eq!(action.status, SyncStatus::Adjusted);
        assert_eq!(action.server_result, Some(json!({"cash": 100})));

        let reconciliations: Vec<ReconciliationEvent> = events
            .lock()
            .expect("lock")
            .iter()
            .filter_map(|e| match e {
                QueueEvent::Reconciled(r) => Some(r.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            reconciliations,
            vec![ReconciliationEvent {
                action_id: id,
                action_type: ActionType::Heist,
                local_result: json!({"cash": 150}),
                server_result: json!({"cash": 100}),
                adjustments: json!({"cash": {"local": 150, "server": 100, "delta": -50}}),
            }]
        );
    }

    #[tokio::test]
    async fn test_authentication_failure_aborts_pass_without_counting_attempt() {
        let mut api = MockActionApiPort::new();
        api.expect_submit()
            .times(1)
            .returning(|_, _| Err(SubmitError::Authentication("token expired".into())));
        let queue = queue(api, &MemoryStorageProvider::new());
        let events = record(&queue);
        let first = queue
            .enqueue(GameAction::crime("a"), json!({}))
            .expect("enqueue");
        let second = queue
            .enqueue(GameAction::crime("b"), json!({}))
            .expect("enqueue");

        let report = queue.sync_all().await;

        assert!(report.aborted);
        assert_eq!(report.submitted, 1);
        for id in [first, second] {
            let action = queue.get(id).expect("action");
            assert_eq!(action.status, SyncStatus::Pending);
            assert_eq!(action.attempts, 0);
        }
        assert!(events.lock().expect("lock").contains(&QueueEvent::AuthenticationRequired {
            reason: "token expired".into()
        }));
    }

    /// Submissions park until released, to hold a pass open.
    struct GatedApi {
        calls: AtomicUsize,
        gate: Notify,
    }

    #[async_trait]
    impl ActionApiPort for Arc<GatedApi> {
        async fn submit(
            &self,
            _action: &GameAction,
            request: &SubmitActionRequest,
        ) -> Result<SubmitActionResponse, SubmitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(SubmitActionResponse {
                result: request.local_result.clone(),
                ..SubmitActionResponse::default()
            })
        }
    }

    #[tokio::test]
    async fn test_single_flight_and_no_mid_pass_interleaving() {
        let api = Arc::new(GatedApi {
            calls: AtomicUsize::new(0),
            gate: Notify::new(),
        });
        let queue = queue(Arc::clone(&api), &MemoryStorageProvider::new());
        let first = queue
            .enqueue(GameAction::crime("a"), json!({}))
            .expect("enqueue");

        let running = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.sync_all().await })
        };
        while api.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(queue.is_syncing());

        let late = queue
            .enqueue(GameAction::crime("b"), json!({}))
            .expect("enqueue");
        let second_pass = queue.sync_all().await;
        assert!(second_pass.skipped);
        assert_eq!(second_pass.submitted, 0);

        api.gate.notify_one();
        let report = running.await.expect("pass");

        assert_eq!(report.submitted, 1);
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert!(!queue.is_syncing());
        assert_eq!(queue.get(first).expect("first").status, SyncStatus::Synced);
        assert_eq!(queue.get(late).expect("late").status, SyncStatus::Pending);
    }

    #[tokio::test]
    async fn test_storage_is_written_after_every_action_in_a_pass() {
        let api = Arc::new(GatedApi {
            calls: AtomicUsize::new(0),
            gate: Notify::new(),
        });
        let storage = MemoryStorageProvider::new();
        let live = queue(Arc::clone(&api), &storage);
        let first = live
            .enqueue(GameAction::crime("a"), json!({"cash": 1}))
            .expect("enqueue");
        let second = live
            .enqueue(GameAction::crime("b"), json!({"cash": 2}))
            .expect("enqueue");

        let running = {
            let live = live.clone();
            tokio::spawn(async move { live.sync_all().await })
        };
        while api.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        api.gate.notify_one();
        while api.calls.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }

        // Second submission is parked; storage already holds the first result
        let snapshot = storage.get(storage_keys::ACTION_QUEUE).expect("stored");
        let stored: Vec<QueuedAction> = serde_json::from_str(&snapshot).expect("decode");
        let status_of = |id: ActionId| {
            stored
                .iter()
                .find(|a| a.id == id)
                .map(|a| (a.status, a.attempts))
        };
        assert_eq!(status_of(first), Some((SyncStatus::Synced, 1)));
        assert_eq!(status_of(second), Some((SyncStatus::Syncing, 1)));

        // A crash here resumes the second action on the next load
        let crashed = MemoryStorageProvider::new();
        crashed.insert(storage_keys::ACTION_QUEUE, &snapshot);
        let resumed = queue(MockActionApiPort::new(), &crashed);
        assert_eq!(resumed.get(first).map(|a| a.status), Some(SyncStatus::Synced));
        let pending = resumed.get(second).expect("second");
        assert_eq!(pending.status, SyncStatus::Pending);
        assert_eq!(pending.attempts, 1);

        api.gate.notify_one();
        let report = running.await.expect("pass");
        assert_eq!(report.synced, 2);
    }

    #[tokio::test]
    async fn test_reload_keeps_fresh_actions_and_drops_stale_ones() {
        let storage = MemoryStorageProvider::new();
        let original = queue(MockActionApiPort::new(), &storage);
        let id = original
            .enqueue(
                GameAction::property("laundromat", PropertyOperation::Buy),
                json!({"cash": -500}),
            )
            .expect("enqueue");

        let reload_at = |at: DateTime<Utc>| {
            let mut clock = MockClockPort::new();
            clock.expect_now().return_const(at);
            ActionQueue::load(
                Arc::new(storage.clone()),
                Arc::new(MockActionApiPort::new()),
                Arc::new(clock),
                QueueConfig::default(),
            )
            .expect("reload")
        };

        let fresh = reload_at(start() + chrono::Duration::hours(1));
        let restored = fresh.get(id).expect("restored");
        assert_eq!(restored.action_type(), ActionType::Property);
        assert_eq!(
            restored.action,
            GameAction::property("laundromat", PropertyOperation::Buy)
        );
        assert_eq!(restored.local_result, json!({"cash": -500}));

        let stale = reload_at(start() + chrono::Duration::hours(25));
        assert!(stale.is_empty());
        assert_eq!(storage.get(storage_keys::ACTION_QUEUE).as_deref(), Some("[]"));
    }

    #[test]
    fn test_load_skips_bad_entries_and_restores_interrupted_actions() {
        let storage = MemoryStorageProvider::new();
        let mut interrupted =
            QueuedAction::new(GameAction::crime("a"), json!({}), start());
        interrupted.status = SyncStatus::Syncing;
        interrupted.attempts = 1;
        let mut finished = QueuedAction::new(GameAction::crime("b"), json!({}), start());
        finished.status = SyncStatus::Synced;
        finished.completed_at = Some(start() - chrono::Duration::minutes(5));

        let stored = json!([&interrupted, {"id": "not-a-uuid", "action": 7}, &finished]);
        storage.insert(storage_keys::ACTION_QUEUE, &stored.to_string());

        let queue = queue(MockActionApiPort::new(), &storage);

        let actions = queue.actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].id, interrupted.id);
        assert_eq!(actions[0].status, SyncStatus::Pending);
        assert_eq!(actions[0].attempts, 1);
    }

    #[test]
    fn test_interrupted_final_attempt_is_rejected_on_load() {
        let storage = MemoryStorageProvider::new();
        let mut resumable = QueuedAction::new(GameAction::crime("a"), json!({}), start());
        resumable.status = SyncStatus::Syncing;
        resumable.attempts = 2;
        let mut exhausted = QueuedAction::new(GameAction::crime("b"), json!({}), start());
        exhausted.status = SyncStatus::Syncing;
        exhausted.attempts = 3;
        storage.insert(
            storage_keys::ACTION_QUEUE,
            &json!([&resumable, &exhausted]).to_string(),
        );

        let queue = queue(MockActionApiPort::new(), &storage);

        let resumed = queue.get(resumable.id).expect("resumable");
        assert_eq!(resumed.status, SyncStatus::Pending);
        assert_eq!(resumed.attempts, 2);

        let rejected = queue.get(exhausted.id).expect("kept during grace");
        assert_eq!(rejected.status, SyncStatus::Rejected);
        assert_eq!(rejected.attempts, 3);
        assert_eq!(rejected.last_error.as_deref(), Some("retries exhausted"));
        assert_eq!(rejected.completed_at, Some(start()));
        assert_eq!(queue.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_finished_actions_survive_reload_only_within_grace() {
        let mut api = MockActionApiPort::new();
        api.expect_submit().times(1).returning(echo_local);
        let storage = MemoryStorageProvider::new();
        let clock = ManualClock::new(start());
        let load = |api: MockActionApiPort| {
            ActionQueue::load(
                Arc::new(storage.clone()),
                Arc::new(api),
                Arc::new(clock.clone()),
                QueueConfig::default(),
            )
            .expect("load queue")
        };

        let original = load(api);
        let id = original
            .enqueue(GameAction::crime("a"), json!({}))
            .expect("enqueue");
        original.sync_all().await;

        clock.advance(chrono::Duration::seconds(4));
        let within = load(MockActionApiPort::new());
        assert_eq!(within.get(id).map(|a| a.status), Some(SyncStatus::Synced));

        clock.advance(chrono::Duration::seconds(2));
        let after = load(MockActionApiPort::new());
        assert!(after.is_empty());
        assert_eq!(storage.get(storage_keys::ACTION_QUEUE).as_deref(), Some("[]"));
    }

    #[test]
    fn test_unreadable_store_starts_empty() {
        let storage = MemoryStorageProvider::new();
        storage.insert(storage_keys::ACTION_QUEUE, "{{ definitely not json");

        let queue = queue(MockActionApiPort::new(), &storage);

        assert!(queue.is_empty());
    }

    #[test]
    fn test_enqueue_rolls_back_when_storage_fails() {
        let storage = MemoryStorageProvider::new();
        let queue = queue(MockActionApiPort::new(), &storage);
        storage.set_fail_writes(true);

        let result = queue.enqueue(GameAction::crime("a"), json!({}));

        assert!(matches!(result, Err(QueueError::Storage(_))));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_only_pending_actions() {
        let mut api = MockActionApiPort::new();
        api.expect_submit().times(1).returning(echo_local);
        let storage = MemoryStorageProvider::new();
        let queue = queue(api, &storage);
        let events = record(&queue);

        let keep = queue
            .enqueue(GameAction::crime("a"), json!({}))
            .expect("enqueue");
        let drop_me = queue
            .enqueue(GameAction::crime("b"), json!({}))
            .expect("enqueue");

        let removed = queue.cancel(drop_me).expect("cancel");
        assert_eq!(removed.id, drop_me);
        assert_eq!(queue.len(), 1);
        assert!(events
            .lock()
            .expect("lock")
            .contains(&QueueEvent::LengthChanged(1)));
        assert!(matches!(
            queue.cancel(drop_me),
            Err(QueueError::NotFound(id)) if id == drop_me
        ));

        queue.sync_all().await;
        assert!(matches!(
            queue.cancel(keep),
            Err(QueueError::NotCancellable { status: SyncStatus::Synced, .. })
        ));
        assert_eq!(queue.purge_completed(), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_hook_syncs_on_offline_to_online_only() {
        let mut api = MockActionApiPort::new();
        api.expect_submit().times(1).returning(echo_local);
        let queue = queue(api, &MemoryStorageProvider::new());
        let (online, signal) = watch::channel(false);
        let _hook = queue.spawn_connectivity_hook(signal);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!queue.is_online());

        let id = queue
            .enqueue(GameAction::crime("a"), json!({}))
            .expect("enqueue");
        online.send(true).expect("send");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.get(id).expect("action").status, SyncStatus::Synced);

        // Going offline flushes nothing; a second enqueue stays pending
        online.send(false).expect("send");
        let later = queue
            .enqueue(GameAction::crime("b"), json!({}))
            .expect("enqueue");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.get(later).expect("action").status, SyncStatus::Pending);
    }
}
