//! Timer scheduling for autosave
//!
//! Timers are explicit scheduled tasks identified by a [`TimerId`]. Firing a
//! timer produces a [`TimerEvent`] which the owning session handles; a session
//! ignores events for timers it no longer tracks, so a cancelled timer that
//! already fired is harmless.

use crate::{types::SessionId, CoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::trace;

/// Represents a timer identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TimerId(pub String);

impl TimerId {
    /// Generate a unique timer ID
    pub fn generate() -> Self {
        Self(format!("timer-{}", uuid::Uuid::new_v4()))
    }
}

/// What a timer is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    /// Quiet-period save after the last mutation
    Debounce,

    /// Interval save while the data is dirty
    Periodic,

    /// Return the autosave status to idle
    StatusReset,
}

/// A fired timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEvent {
    /// Timer that fired
    pub timer_id: TimerId,

    /// Session that scheduled it
    pub session_id: SessionId,

    /// Purpose of the timer
    pub kind: TimerKind,
}

/// Schedules one-shot and repeating timers
#[async_trait]
pub trait TimerService: Send + Sync {
    /// Fire once after `delay`
    async fn schedule(
        &self,
        session_id: &SessionId,
        kind: TimerKind,
        delay: Duration,
    ) -> Result<TimerId, CoreError>;

    /// Fire every `period` until cancelled
    async fn schedule_repeating(
        &self,
        session_id: &SessionId,
        kind: TimerKind,
        period: Duration,
    ) -> Result<TimerId, CoreError>;

    /// Cancel a timer; returns false if it was unknown or already fired
    async fn cancel(&self, timer_id: &TimerId) -> Result<bool, CoreError>;
}

/// Timer service backed by tokio tasks.
///
/// Fired timers are delivered on the receiver returned from [`TokioTimerService::new`].
pub struct TokioTimerService {
    tasks: Arc<DashMap<String, JoinHandle<()>>>,
    tx: mpsc::UnboundedSender<TimerEvent>,
}

impl TokioTimerService {
    /// Create the service and the channel fired timers arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Self {
            tasks: Arc::new(DashMap::with_capacity(8)),
            tx,
        };
        (service, rx)
    }

    /// Number of timers still scheduled
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }
}

#[async_trait]
impl TimerService for TokioTimerService {
    async fn schedule(
        &self,
        session_id: &SessionId,
        kind: TimerKind,
        delay: Duration,
    ) -> Result<TimerId, CoreError> {
        let timer_id = TimerId::generate();
        let event = TimerEvent {
            timer_id: timer_id.clone(),
            session_id: session_id.clone(),
            kind,
        };
        let tasks = self.tasks.clone();
        let tx = self.tx.clone();
        let key = timer_id.0.clone();
        // The task waits until its handle is registered, so its own removal
        // can never run before the insert.
        let (registered_tx, registered_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let _ = registered_rx.await;
            tokio::time::sleep(delay).await;
            tasks.remove(&key);
            if tx.send(event).is_err() {
                trace!("Timer receiver dropped");
            }
        });
        self.tasks.insert(timer_id.0.clone(), handle);
        let _ = registered_tx.send(());

        Ok(timer_id)
    }

    async fn schedule_repeating(
        &self,
        session_id: &SessionId,
        kind: TimerKind,
        period: Duration,
    ) -> Result<TimerId, CoreError> {
        if period.is_zero() {
            return Err(CoreError::TimerError(
                "Repeating timer period must be positive".to_string(),
            ));
        }

        let timer_id = TimerId::generate();
        let event = TimerEvent {
            timer_id: timer_id.clone(),
            session_id: session_id.clone(),
            kind,
        };
        let tx = self.tx.clone();

        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(event.clone()).is_err() {
                    trace!("Timer receiver dropped");
                    break;
                }
            }
        });
        self.tasks.insert(timer_id.0.clone(), handle);

        Ok(timer_id)
    }

    async fn cancel(&self, timer_id: &TimerId) -> Result<bool, CoreError> {
        match self.tasks.remove(&timer_id.0) {
            Some((_, handle)) => {
                handle.abort();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Drop for TokioTimerService {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
    }
}

/// Memory implementations for testing
#[cfg(feature = "testing")]
pub mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct ScheduledTimer {
        id: TimerId,
        session_id: SessionId,
        kind: TimerKind,
        period: Option<Duration>,
    }

    #[derive(Default)]
    struct ManualClock {
        now: Duration,
        seq: u64,
        queue: BTreeMap<(Duration, u64), ScheduledTimer>,
    }

    impl ManualClock {
        fn push(&mut self, due: Duration, timer: ScheduledTimer) {
            self.seq += 1;
            self.queue.insert((due, self.seq), timer);
        }
    }

    /// Timer service on a virtual clock; nothing fires until time is advanced
    #[derive(Default)]
    pub struct ManualTimerService {
        clock: Mutex<ManualClock>,
    }

    impl ManualTimerService {
        /// Create a service with the clock at zero
        pub fn new() -> Self {
            Self::default()
        }

        fn clock(&self) -> std::sync::MutexGuard<'_, ManualClock> {
            self.clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        /// Virtual time elapsed since creation
        pub fn now(&self) -> Duration {
            self.clock().now
        }

        /// Virtual time at which the next timer fires
        pub fn next_due(&self) -> Option<Duration> {
            self.clock().queue.keys().next().map(|(due, _)| *due)
        }

        /// Number of scheduled timers
        pub fn pending(&self) -> usize {
            self.clock().queue.len()
        }

        /// Number of scheduled timers of a kind
        pub fn pending_of(&self, kind: TimerKind) -> usize {
            self.clock().queue.values().filter(|timer| timer.kind == kind).count()
        }

        /// True if the timer is still scheduled
        pub fn is_scheduled(&self, timer_id: &TimerId) -> bool {
            self.clock().queue.values().any(|timer| &timer.id == timer_id)
        }

        /// Move the clock forward by `by`, firing everything due on the way
        pub fn advance(&self, by: Duration) -> Vec<TimerEvent> {
            let deadline = self.now() + by;
            self.advance_to(deadline)
        }

        /// Move the clock to `deadline`, firing everything due up to and
        /// including it, in due order. Repeating timers are rescheduled.
        pub fn advance_to(&self, deadline: Duration) -> Vec<TimerEvent> {
            let mut clock = self.clock();
            let mut fired = Vec::new();

            loop {
                let next = match clock.queue.keys().next() {
                    Some(key) if key.0 <= deadline => *key,
                    _ => break,
                };
                let Some(timer) = clock.queue.remove(&next) else {
                    break;
                };
                clock.now = clock.now.max(next.0);
                fired.push(TimerEvent {
                    timer_id: timer.id.clone(),
                    session_id: timer.session_id.clone(),
                    kind: timer.kind,
                });
                if let Some(period) = timer.period {
                    clock.push(next.0 + period, timer);
                }
            }

            clock.now = clock.now.max(deadline);
            fired
        }
    }

    #[async_trait]
    impl TimerService for ManualTimerService {
        async fn schedule(
            &self,
            session_id: &SessionId,
            kind: TimerKind,
            delay: Duration,
        ) -> Result<TimerId, CoreError> {
            let id = TimerId::generate();
            let mut clock = self.clock();
            let due = clock.now + delay;
            clock.push(
                due,
                ScheduledTimer {
                    id: id.clone(),
                    session_id: session_id.clone(),
                    kind,
                    period: None,
                },
            );
            Ok(id)
        }

        async fn schedule_repeating(
            &self,
            session_id: &SessionId,
            kind: TimerKind,
            period: Duration,
        ) -> Result<TimerId, CoreError> {
            if period.is_zero() {
                return Err(CoreError::TimerError(
                    "Repeating timer period must be positive".to_string(),
                ));
            }
            let id = TimerId::generate();
            let mut clock = self.clock();
            let due = clock.now + period;
            clock.push(
                due,
                ScheduledTimer {
                    id: id.clone(),
                    session_id: session_id.clone(),
                    kind,
                    period: Some(period),
                },
            );
            Ok(id)
        }

        async fn cancel(&self, timer_id: &TimerId) -> Result<bool, CoreError> {
            let mut clock = self.clock();
            let key = clock
                .queue
                .iter()
                .find(|(_, timer)| &timer.id == timer_id)
                .map(|(key, _)| *key);
            Ok(key.and_then(|key| clock.queue.remove(&key)).is_some())
        }
    }
}
