//! The persisted saga state machine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// ```text
/// pending → running → completed
///               ↓
///            (step fails)
///               ↓
///        compensating → compensated
///               ↓
///           (compensation fails)
///               ↓
///            failed   (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Compensating,
    Compensated,
}

impl SagaStatus {
    /// `true` for the three states the orchestrator will never mutate
    /// further: `completed`, `failed`, `compensated`.
    pub fn is_terminal(self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::Failed | SagaStatus::Compensated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SagaStatus::Pending => "pending",
            SagaStatus::Running => "running",
            SagaStatus::Completed => "completed",
            SagaStatus::Failed => "failed",
            SagaStatus::Compensating => "compensating",
            SagaStatus::Compensated => "compensated",
        }
    }
}

/// Persisted execution state for one saga run, mutated at every step
/// boundary and round-tripped through a [`crate::SagaStateStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaState {
    pub saga_id: String,
    pub saga_type: String,
    pub current_step: usize,
    pub status: SagaStatus,
    pub completed_steps: Vec<String>,
    pub failed_step: Option<String>,
    pub error: Option<String>,
    pub data: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SagaState {
    pub fn new(saga_id: impl Into<String>, saga_type: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            saga_id: saga_id.into(),
            saga_type: saga_type.into(),
            current_step: 0,
            status: SagaStatus::Running,
            completed_steps: Vec::new(),
            failed_step: None,
            error: None,
            data: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
