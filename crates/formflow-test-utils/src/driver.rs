//! Deterministic timer driver.
//!
//! Moves a [`ManualTimerService`] clock forward one due instant at a time and
//! delivers every fired timer to the session before looking at the next
//! instant, so timers scheduled while handling an event (status resets after
//! a save) fire within the same advance if they fall due.

use formflow_core::application::persistence_manager::SaveOutcome;
use formflow_core::domain::timer::memory::ManualTimerService;
use formflow_core::{FormSession, TimerEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Drives a manual clock against one session
#[derive(Clone)]
pub struct TimerDriver {
    timers: Arc<ManualTimerService>,
}

/// What happened during an advance
#[derive(Debug, Default, Clone)]
pub struct DriveReport {
    /// Every timer that fired, in firing order
    pub fired: Vec<TimerEvent>,
    /// Outcomes of the saves those timers triggered
    pub saves: Vec<SaveOutcome>,
}

impl DriveReport {
    /// Number of saves that actually wrote
    pub fn saved(&self) -> usize {
        self.saves
            .iter()
            .filter(|outcome| **outcome == SaveOutcome::Saved)
            .count()
    }
}

impl TimerDriver {
    /// Wrap a manual timer service
    pub fn new(timers: Arc<ManualTimerService>) -> Self {
        Self { timers }
    }

    /// The underlying timer service
    pub fn timers(&self) -> &Arc<ManualTimerService> {
        &self.timers
    }

    /// Advance the clock by `by`, delivering timers to `session`
    pub async fn advance(&self, session: &FormSession, by: Duration) -> DriveReport {
        let deadline = self.timers.now() + by;
        self.advance_to(session, deadline).await
    }

    /// Advance the clock to `deadline`, delivering timers to `session`
    pub async fn advance_to(&self, session: &FormSession, deadline: Duration) -> DriveReport {
        let mut report = DriveReport::default();

        while let Some(due) = self.timers.next_due() {
            if due > deadline {
                break;
            }
            for event in self.timers.advance_to(due) {
                trace!(timer_id = %event.timer_id.0, kind = ?event.kind, "Delivering timer");
                report.fired.push(event.clone());
                if let Some(outcome) = session.handle_timer_event(event).await {
                    report.saves.push(outcome);
                }
            }
        }

        self.timers.advance_to(deadline);
        report
    }
}
