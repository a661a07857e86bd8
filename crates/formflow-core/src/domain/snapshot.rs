use crate::{
    types::{StepId, WorkingData},
    CoreError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The part of the session state that is persisted. Its serialized form is
/// what the skip-if-unchanged check compares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotBody {
    /// In-progress data
    pub data: WorkingData,

    /// Index of the current visible step
    pub current_step_index: usize,

    /// Steps marked completed
    pub completed_steps: BTreeSet<StepId>,
}

impl SnapshotBody {
    /// Canonical serialized form
    pub fn payload(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Durable record written under the caller's storage key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    /// Persisted session state
    #[serde(flatten)]
    pub body: SnapshotBody,

    /// When the snapshot was written
    pub timestamp: DateTime<Utc>,
}

impl PersistedSnapshot {
    /// Stamp a body now
    pub fn new(body: SnapshotBody) -> Self {
        Self {
            body,
            timestamp: Utc::now(),
        }
    }

    /// Serialize to the stored JSON text
    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse stored JSON text
    pub fn from_json(raw: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// True if older than `max_age` at `now`
    pub fn is_expired(&self, max_age: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.timestamp > max_age
    }
}
