//! The saga state persistence contract and an in-process reference store.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{SagaError, SagaErrorKind};
use crate::state::{SagaState, SagaStatus};

/// Persistence for saga execution state. Implementations must tolerate
/// concurrent access across different saga ids; the orchestrator assumes
/// serializable access per id, not across ids.
pub trait SagaStateStore: Send + Sync {
    /// Returns [`SagaErrorKind::NotFound`] if `saga_id` has no recorded
    /// state.
    fn load(&self, saga_id: &str) -> Result<SagaState, SagaError>;

    /// Idempotent upsert. Must not regress an already-terminal state back
    /// to a non-terminal one.
    fn save(&self, state: &SagaState) -> Result<(), SagaError>;

    /// Like `save`, but requires a prior record to exist.
    fn update(&self, state: &SagaState) -> Result<(), SagaError>;

    fn delete(&self, saga_id: &str) -> Result<(), SagaError>;

    fn list(&self, status_filter: Option<SagaStatus>) -> Result<Vec<SagaState>, SagaError>;
}

fn status_rank(status: SagaStatus) -> u8 {
    match status {
        SagaStatus::Pending => 0,
        SagaStatus::Running => 1,
        SagaStatus::Compensating => 2,
        SagaStatus::Completed | SagaStatus::Failed | SagaStatus::Compensated => 3,
    }
}

/// A process-local, `RwLock<HashMap<..>>`-backed [`SagaStateStore`].
/// Suitable for tests and single-process deployments; state does not
/// survive a process restart.
#[derive(Default)]
pub struct InMemorySagaStateStore {
    states: RwLock<HashMap<String, SagaState>>,
}

impl InMemorySagaStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SagaStateStore for InMemorySagaStateStore {
    fn load(&self, saga_id: &str) -> Result<SagaState, SagaError> {
        self.states
            .read()
            .expect("saga state map poisoned")
            .get(saga_id)
            .cloned()
            .ok_or_else(|| SagaError::new(SagaErrorKind::NotFound, format!("saga {saga_id} not found")).with_saga_id(saga_id))
    }

    fn save(&self, state: &SagaState) -> Result<(), SagaError> {
        let mut states = self.states.write().expect("saga state map poisoned");
        if let Some(existing) = states.get(&state.saga_id) {
            if status_rank(existing.status) > status_rank(state.status) {
                return Ok(());
            }
        }
        states.insert(state.saga_id.clone(), state.clone());
        Ok(())
    }

    fn update(&self, state: &SagaState) -> Result<(), SagaError> {
        let mut states = self.states.write().expect("saga state map poisoned");
        if !states.contains_key(&state.saga_id) {
            return Err(SagaError::new(SagaErrorKind::NotFound, format!("saga {} not found", state.saga_id))
                .with_saga_id(state.saga_id.clone()));
        }
        states.insert(state.saga_id.clone(), state.clone());
        Ok(())
    }

    fn delete(&self, saga_id: &str) -> Result<(), SagaError> {
        self.states.write().expect("saga state map poisoned").remove(saga_id);
        Ok(())
    }

    fn list(&self, status_filter: Option<SagaStatus>) -> Result<Vec<SagaState>, SagaError> {
        let states = self.states.read().expect("saga state map poisoned");
        Ok(states
            .values()
            .filter(|s| status_filter.is_none_or(|wanted| s.status == wanted))
            .cloned()
            .collect())
    }
}
