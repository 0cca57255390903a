//! Runs a [`Saga`]'s steps against a [`CommandBus`], compensating in
//! reverse order on failure and persisting every transition through a
//! [`SagaStateStore`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use corebus_command::{metadata_keys, CommandBus, CommandError};
use corebus_core::Context;
use corebus_messaging::Message;
use serde::Serialize;
use tracing::warn;

use crate::error::{SagaError, SagaErrorKind};
use crate::event_bus::EventBus;
use crate::saga::Saga;
use crate::state::{SagaState, SagaStatus};
use crate::store::{InMemorySagaStateStore, SagaStateStore};

const SAGA_AGGREGATE_TYPE: &str = "Saga";

#[derive(Debug, Clone, Serialize)]
struct SagaEventPayload {
    saga_id: String,
    step: Option<String>,
    status: &'static str,
    error: Option<String>,
    timestamp: chrono::DateTime<Utc>,
    extra: HashMap<String, serde_json::Value>,
}

/// Orchestrates one [`Saga`] execution at a time per saga id. Not safe for
/// concurrent `execute`/`resume` calls against the *same* id — different
/// ids may run concurrently; callers needing per-id exclusion should
/// serialize externally (e.g. a distributed lock).
pub struct Orchestrator {
    command_bus: Arc<CommandBus>,
    event_bus: Option<Arc<dyn EventBus>>,
    store: Arc<dyn SagaStateStore>,
}

impl Orchestrator {
    pub fn new(command_bus: Arc<CommandBus>, event_bus: Option<Arc<dyn EventBus>>, store: Option<Arc<dyn SagaStateStore>>) -> Self {
        Self {
            command_bus,
            event_bus,
            store: store.unwrap_or_else(|| Arc::new(InMemorySagaStateStore::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn SagaStateStore> {
        &self.store
    }

    /// Build the initial `running` state, persist it, then run every step
    /// from the beginning.
    pub fn execute(&self, ctx: &Context, saga: &Saga) -> Result<(), SagaError> {
        if saga.steps().is_empty() {
            return Err(SagaError::new(SagaErrorKind::NoSteps, "saga has no steps").with_saga_id(saga.id()));
        }

        let mut state = SagaState::new(saga.id(), saga.saga_type(), Utc::now());
        self.persist(&state, true);
        self.publish_event(ctx, "SagaStarted", &state, None, None);

        self.run_from(ctx, saga, &mut state, 0)
    }

    /// Continue a previously persisted, non-terminal saga from
    /// `state.current_step`.
    pub fn resume(&self, ctx: &Context, saga: &Saga, state: SagaState) -> Result<(), SagaError> {
        match state.status {
            SagaStatus::Completed => {
                return Err(SagaError::new(SagaErrorKind::AlreadyCompleted, "saga already completed").with_saga_id(state.saga_id))
            }
            SagaStatus::Failed => return Err(SagaError::new(SagaErrorKind::AlreadyFailed, "saga already failed").with_saga_id(state.saga_id)),
            SagaStatus::Compensated => {
                return Err(SagaError::new(SagaErrorKind::InvalidState, "saga already compensated").with_saga_id(state.saga_id))
            }
            SagaStatus::Pending | SagaStatus::Running | SagaStatus::Compensating => {}
        }

        let mut state = state;
        let start = state.current_step;
        self.run_from(ctx, saga, &mut state, start)
    }

    fn run_from(&self, ctx: &Context, saga: &Saga, state: &mut SagaState, start: usize) -> Result<(), SagaError> {
        for index in start..saga.steps().len() {
            let step = &saga.steps()[index];
            let command = step.resolve_forward(ctx);

            match self.command_bus.dispatch(ctx, command) {
                Ok(()) => {
                    state.completed_steps.push(step.name().to_string());
                    state.current_step = index + 1;
                    state.updated_at = Utc::now();
                    self.persist(state, false);
                    self.publish_event(ctx, "SagaStepCompleted", state, Some(step.name()), None);
                    step.notify_success(ctx);
                }
                Err(command_error) => {
                    state.failed_step = Some(step.name().to_string());
                    state.error = Some(command_error.to_string());
                    state.updated_at = Utc::now();
                    self.persist(state, false);
                    self.publish_event(ctx, "SagaStepFailed", state, Some(step.name()), Some(&command_error.to_string()));
                    step.notify_failure(ctx, &command_error);

                    let outcome = self.compensate(ctx, saga, state, index, &command_error);
                    let error = match outcome {
                        Ok(()) => SagaError::step_failed(state.saga_id.clone(), step.name(), command_error),
                        Err(compensation_error) => compensation_error,
                    };
                    saga.notify_failed(ctx, &error);
                    return Err(error);
                }
            }
        }

        state.status = SagaStatus::Completed;
        state.updated_at = Utc::now();
        self.persist(state, false);
        self.publish_event(ctx, "SagaCompleted", state, None, None);
        saga.notify_complete(ctx);
        Ok(())
    }

    /// Run compensations for steps `0..failed_index` in reverse order.
    /// `original_error` is the forward-step failure that triggered this
    /// compensation, carried through so a compensation failure can be
    /// reported joined with it.
    fn compensate(
        &self,
        ctx: &Context,
        saga: &Saga,
        state: &mut SagaState,
        failed_index: usize,
        original_error: &CommandError,
    ) -> Result<(), SagaError> {
        state.status = SagaStatus::Compensating;
        state.updated_at = Utc::now();
        self.persist(state, false);
        self.publish_event(ctx, "SagaCompensationStarted", state, None, None);

        for i in (0..failed_index).rev() {
            let step = &saga.steps()[i];
            let Some(command) = step.resolve_compensation(ctx) else {
                continue;
            };
            if let Err(compensation_error) = self.command_bus.dispatch(ctx, command) {
                state.status = SagaStatus::Failed;
                state.error = Some(format!(
                    "step '{}' failed ({original_error}); compensation for step '{}' also failed ({compensation_error})",
                    state.failed_step.as_deref().unwrap_or_default(),
                    step.name()
                ));
                state.updated_at = Utc::now();
                self.persist(state, false);
                self.publish_event(ctx, "SagaCompensationStepFailed", state, Some(step.name()), Some(&compensation_error.to_string()));
                self.publish_event(ctx, "SagaFailed", state, Some(step.name()), Some(&compensation_error.to_string()));
                return Err(SagaError::compensation_failed(
                    state.saga_id.clone(),
                    step.name(),
                    CommandError::new(original_error.kind, original_error.message.clone()),
                    compensation_error,
                ));
            }
        }

        state.status = SagaStatus::Compensated;
        state.updated_at = Utc::now();
        self.persist(state, false);
        self.publish_event(ctx, "SagaCompensationCompleted", state, None, None);
        Ok(())
    }

    fn persist(&self, state: &SagaState, is_initial: bool) {
        let result = if is_initial { self.store.save(state) } else { self.store.update(state) };
        if let Err(error) = result {
            warn!(saga_id = %state.saga_id, %error, "failed to persist saga state; execution continues");
        }
    }

    fn publish_event(&self, ctx: &Context, event_type: &str, state: &SagaState, step: Option<&str>, error: Option<&str>) {
        let Some(event_bus) = &self.event_bus else {
            return;
        };

        let payload = SagaEventPayload {
            saga_id: state.saga_id.clone(),
            step: step.map(str::to_string),
            status: state.status.as_str(),
            error: error.map(str::to_string),
            timestamp: Utc::now(),
            extra: state.data.clone(),
        };

        let mut message = Message::new(event_type, payload)
            .with_metadata(metadata_keys::SAGA_ID, state.saga_id.clone())
            .with_metadata(metadata_keys::STATUS, state.status.as_str())
            .with_metadata(metadata_keys::AGGREGATE_TYPE, SAGA_AGGREGATE_TYPE);
        if let Some(step) = step {
            message.set_metadata(metadata_keys::STEP, step.to_string());
        }

        if let Err(error) = event_bus.publish(ctx, message) {
            warn!(saga_id = %state.saga_id, event_type, %error, "failed to publish saga lifecycle event");
        }
    }
}
