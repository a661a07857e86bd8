//! Autosave: debounced and periodic snapshots of in-progress data
//!
//! The manager never touches the working data. It is handed a
//! [`SnapshotBody`] read from the step controller whenever a save runs.

use crate::{
    application::collaborators::AutoSaveHandler,
    config::AutoSaveConfig,
    domain::events::{AutoSaveStatus, FormEvent, FormEventKind},
    domain::repository::SnapshotStore,
    domain::snapshot::{PersistedSnapshot, SnapshotBody},
    domain::timer::{TimerEvent, TimerId, TimerKind, TimerService},
    types::SessionId,
    CoreError,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Result of a save attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Snapshot written and/or callback invoked successfully
    Saved,

    /// Payload identical to the last successful save, or nowhere to save to
    Skipped,

    /// At least one sub-step failed; messages in attempt order
    Failed(Vec<String>),
}

/// Where a snapshot goes
struct SnapshotTarget {
    key: String,
    store: Arc<dyn SnapshotStore>,
}

/// Debounced and periodic autosave for one session
pub struct PersistenceManager {
    session_id: SessionId,
    target: Option<SnapshotTarget>,
    handler: Option<Arc<dyn AutoSaveHandler>>,
    timers: Arc<dyn TimerService>,
    config: AutoSaveConfig,
    max_age: Option<chrono::Duration>,
    status: AutoSaveStatus,
    last_saved_payload: Option<String>,
    dirty: bool,
    debounce_timer: Option<TimerId>,
    periodic_timer: Option<TimerId>,
    status_timer: Option<TimerId>,
    closed: bool,
    events: Vec<FormEvent>,
}

impl PersistenceManager {
    /// Create a manager.
    ///
    /// Without `storage` nothing is written durably; without `handler` no
    /// callback is invoked. With neither, saves are no-ops.
    pub fn new(
        session_id: SessionId,
        storage: Option<(String, Arc<dyn SnapshotStore>)>,
        handler: Option<Arc<dyn AutoSaveHandler>>,
        timers: Arc<dyn TimerService>,
        config: AutoSaveConfig,
        max_age: Option<chrono::Duration>,
    ) -> Self {
        Self {
            session_id,
            target: storage.map(|(key, store)| SnapshotTarget { key, store }),
            handler,
            timers,
            config,
            max_age,
            status: AutoSaveStatus::Idle,
            last_saved_payload: None,
            dirty: false,
            debounce_timer: None,
            periodic_timer: None,
            status_timer: None,
            closed: false,
            events: Vec::new(),
        }
    }

    /// Current autosave status
    #[inline]
    pub fn status(&self) -> AutoSaveStatus {
        self.status
    }

    /// True once any field changed since the session started
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Payload of the last successful save
    pub fn last_saved_payload(&self) -> Option<&str> {
        self.last_saved_payload.as_deref()
    }

    /// Storage key, if snapshots are persisted
    pub fn storage_key(&self) -> Option<&str> {
        self.target.as_ref().map(|target| target.key.as_str())
    }

    /// Drain recorded events
    pub fn take_events(&mut self) -> Vec<FormEvent> {
        std::mem::take(&mut self.events)
    }

    /// Load the snapshot stored under the key.
    ///
    /// Unreadable, unparsable and expired records are treated as absent;
    /// the last two are deleted so they are not retried next time.
    pub async fn load(&mut self) -> Option<SnapshotBody> {
        let target = self.target.as_ref()?;

        let raw = match target.store.get(&target.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(storage_key = %target.key, "No snapshot to resume");
                return None;
            }
            Err(e) => {
                warn!(storage_key = %target.key, error = %e, "Failed to read snapshot, starting fresh");
                return None;
            }
        };

        let snapshot = match PersistedSnapshot::from_json(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(storage_key = %target.key, error = %e, "Discarding unparsable snapshot");
                self.discard().await;
                return None;
            }
        };

        if let Some(max_age) = self.max_age {
            if snapshot.is_expired(max_age, Utc::now()) {
                info!(
                    storage_key = %target.key,
                    saved_at = %snapshot.timestamp,
                    "Discarding expired snapshot"
                );
                self.discard().await;
                return None;
            }
        }

        info!(
            session_id = %self.session_id,
            storage_key = %target.key,
            current_step_index = snapshot.body.current_step_index,
            "Resuming from snapshot"
        );
        Some(snapshot.body)
    }

    /// Start the periodic timer
    pub async fn start(&mut self) -> Result<(), CoreError> {
        if !self.config.enabled || self.periodic_timer.is_some() {
            return Ok(());
        }
        let timer_id = self
            .timers
            .schedule_repeating(&self.session_id, TimerKind::Periodic, self.config.interval())
            .await?;
        debug!(session_id = %self.session_id, timer_id = %timer_id.0, "Periodic autosave started");
        self.periodic_timer = Some(timer_id);
        Ok(())
    }

    /// Record a data mutation and restart the debounce timer
    pub async fn notify_mutation(&mut self) {
        if self.closed {
            return;
        }
        self.dirty = true;
        if !self.config.enabled {
            return;
        }

        if let Some(previous) = self.debounce_timer.take() {
            self.cancel_timer(&previous).await;
        }
        match self
            .timers
            .schedule(&self.session_id, TimerKind::Debounce, self.config.delay())
            .await
        {
            Ok(timer_id) => {
                trace!(session_id = %self.session_id, timer_id = %timer_id.0, "Debounce restarted");
                self.debounce_timer = Some(timer_id);
            }
            Err(e) => warn!(session_id = %self.session_id, error = %e, "Failed to schedule debounced save"),
        }
    }

    /// True if the event is for one of this manager's live timers
    pub fn owns(&self, event: &TimerEvent) -> bool {
        if self.closed || event.session_id != self.session_id {
            return false;
        }
        let id = Some(&event.timer_id);
        match event.kind {
            TimerKind::Debounce => self.debounce_timer.as_ref() == id,
            TimerKind::Periodic => self.periodic_timer.as_ref() == id,
            TimerKind::StatusReset => self.status_timer.as_ref() == id,
        }
    }

    /// React to a fired timer. Events for timers this manager no longer
    /// tracks are ignored. Returns the save outcome when a save ran.
    pub async fn handle_timer(&mut self, event: &TimerEvent, body: &SnapshotBody) -> Option<SaveOutcome> {
        if !self.owns(event) {
            trace!(
                session_id = %self.session_id,
                timer_id = %event.timer_id.0,
                "Ignoring stale timer event"
            );
            return None;
        }

        match event.kind {
            TimerKind::Debounce => {
                self.debounce_timer = None;
                debug!(session_id = %self.session_id, "Debounced save due");
                Some(self.save(body).await)
            }
            TimerKind::Periodic => {
                if !self.dirty {
                    trace!(session_id = %self.session_id, "Periodic save skipped, nothing changed");
                    return None;
                }
                Some(self.save(body).await)
            }
            TimerKind::StatusReset => {
                self.status_timer = None;
                self.set_status(AutoSaveStatus::Idle);
                None
            }
        }
    }

    /// Save now: write the snapshot and invoke the callback.
    ///
    /// Both sub-steps are attempted even if the first fails. A payload equal
    /// to the last successful save is not written again.
    pub async fn save(&mut self, body: &SnapshotBody) -> SaveOutcome {
        if self.closed || (self.target.is_none() && self.handler.is_none()) {
            return SaveOutcome::Skipped;
        }

        let payload = match body.payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!(session_id = %self.session_id, error = %e, "Failed to serialize snapshot");
                return self.finish_failed(vec![e.to_string()]).await;
            }
        };
        if self.last_saved_payload.as_deref() == Some(payload.as_str()) {
            trace!(session_id = %self.session_id, "Save skipped, payload unchanged");
            self.dirty = false;
            return SaveOutcome::Skipped;
        }

        self.set_status(AutoSaveStatus::Saving);
        let mut failures = Vec::new();

        if let Some(target) = &self.target {
            let written = match PersistedSnapshot::new(body.clone()).to_json() {
                Ok(record) => target.store.set(&target.key, record).await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                warn!(storage_key = %target.key, error = %e, "Snapshot write failed");
                failures.push(e.to_string());
            }
        }

        if let Some(handler) = &self.handler {
            if let Err(e) = handler.on_auto_save(body.data.to_value()).await {
                warn!(session_id = %self.session_id, error = %e, "Autosave callback failed");
                failures.push(format!("Autosave callback failed: {}", e));
            }
        }

        if failures.is_empty() {
            debug!(session_id = %self.session_id, bytes = payload.len(), "Autosave complete");
            self.last_saved_payload = Some(payload);
            self.dirty = false;
            self.set_status(AutoSaveStatus::Saved);
            self.schedule_status_reset(self.config.saved_display()).await;
            SaveOutcome::Saved
        } else {
            self.finish_failed(failures).await
        }
    }

    /// Delete the snapshot under the key
    pub async fn clear(&mut self) -> Result<(), CoreError> {
        self.last_saved_payload = None;
        let Some(target) = &self.target else {
            return Ok(());
        };
        target.store.remove(&target.key).await?;
        info!(session_id = %self.session_id, storage_key = %target.key, "Snapshot cleared");
        self.record(FormEventKind::SnapshotCleared);
        Ok(())
    }

    /// Forget that anything changed, e.g. after a reset
    pub async fn reset(&mut self) {
        self.dirty = false;
        if let Some(debounce) = self.debounce_timer.take() {
            self.cancel_timer(&debounce).await;
        }
    }

    /// Cancel every timer this manager scheduled
    pub async fn cancel_timers(&mut self) {
        let timers = [
            self.debounce_timer.take(),
            self.periodic_timer.take(),
            self.status_timer.take(),
        ];
        for timer_id in timers.into_iter().flatten() {
            self.cancel_timer(&timer_id).await;
        }
    }

    /// Stop for good after a successful submission: timers are cancelled and
    /// every later save is skipped, so a cleared snapshot stays cleared
    pub async fn retire(&mut self) {
        self.cancel_timers().await;
        self.closed = true;
        self.dirty = false;
        debug!(session_id = %self.session_id, "Persistence retired after submission");
    }

    /// Cancel all timers; later timer events and saves are ignored
    pub async fn teardown(&mut self) {
        self.cancel_timers().await;
        self.closed = true;
        debug!(session_id = %self.session_id, "Persistence torn down");
    }

    async fn discard(&self) {
        if let Some(target) = &self.target {
            if let Err(e) = target.store.remove(&target.key).await {
                warn!(storage_key = %target.key, error = %e, "Failed to delete snapshot");
            }
        }
    }

    async fn finish_failed(&mut self, failures: Vec<String>) -> SaveOutcome {
        for failure in &failures {
            self.record(FormEventKind::AutoSaveFailed {
                error: failure.clone(),
            });
        }
        self.set_status(AutoSaveStatus::Error);
        self.schedule_status_reset(self.config.error_display()).await;
        SaveOutcome::Failed(failures)
    }

    async fn schedule_status_reset(&mut self, after: Duration) {
        if let Some(previous) = self.status_timer.take() {
            self.cancel_timer(&previous).await;
        }
        match self
            .timers
            .schedule(&self.session_id, TimerKind::StatusReset, after)
            .await
        {
            Ok(timer_id) => self.status_timer = Some(timer_id),
            Err(e) => warn!(session_id = %self.session_id, error = %e, "Failed to schedule status reset"),
        }
    }

    async fn cancel_timer(&self, timer_id: &TimerId) {
        if let Err(e) = self.timers.cancel(timer_id).await {
            warn!(session_id = %self.session_id, timer_id = %timer_id.0, error = %e, "Failed to cancel timer");
        }
    }

    fn set_status(&mut self, status: AutoSaveStatus) {
        if self.status != status {
            self.status = status;
            self.record(FormEventKind::AutoSaveStatusChanged { status });
        }
    }

    fn record(&mut self, kind: FormEventKind) {
        self.events.push(FormEvent::new(self.session_id.clone(), kind));
    }
}
