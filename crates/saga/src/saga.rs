//! `Saga` and `SagaStep`: the static, pure-data description of a
//! compensable workflow. Resolving a step's forward or compensating
//! command is deferred to execution time (`ctx → Command`) so the same
//! step definition can be reused across runs with different inputs.

use corebus_command::{Command, CommandError};
use corebus_core::Context;

type ForwardFn = Box<dyn Fn(&Context) -> Command + Send + Sync>;
type CompensationFn = Box<dyn Fn(&Context) -> Command + Send + Sync>;
type SuccessFn = Box<dyn Fn(&Context) + Send + Sync>;
type FailureFn = Box<dyn Fn(&Context, &CommandError) + Send + Sync>;

/// One step of a [`Saga`]: a forward command, an optional compensating
/// command, and optional success/failure callbacks invoked by the
/// orchestrator at the corresponding step boundary.
pub struct SagaStep {
    name: String,
    forward_fn: ForwardFn,
    compensation_fn: Option<CompensationFn>,
    on_success: Option<SuccessFn>,
    on_failure: Option<FailureFn>,
}

impl SagaStep {
    pub fn new(name: impl Into<String>, forward: impl Fn(&Context) -> Command + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            forward_fn: Box::new(forward),
            compensation_fn: None,
            on_success: None,
            on_failure: None,
        }
    }

    pub fn with_compensation(mut self, compensation: impl Fn(&Context) -> Command + Send + Sync + 'static) -> Self {
        self.compensation_fn = Some(Box::new(compensation));
        self
    }

    pub fn with_on_success(mut self, on_success: impl Fn(&Context) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(on_success));
        self
    }

    pub fn with_on_failure(mut self, on_failure: impl Fn(&Context, &CommandError) + Send + Sync + 'static) -> Self {
        self.on_failure = Some(Box::new(on_failure));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_compensation(&self) -> bool {
        self.compensation_fn.is_some()
    }

    pub(crate) fn resolve_forward(&self, ctx: &Context) -> Command {
        (self.forward_fn)(ctx)
    }

    pub(crate) fn resolve_compensation(&self, ctx: &Context) -> Option<Command> {
        self.compensation_fn.as_ref().map(|f| f(ctx))
    }

    pub(crate) fn notify_success(&self, ctx: &Context) {
        if let Some(f) = &self.on_success {
            f(ctx);
        }
    }

    pub(crate) fn notify_failure(&self, ctx: &Context, error: &CommandError) {
        if let Some(f) = &self.on_failure {
            f(ctx, error);
        }
    }
}

/// An ordered, compensable workflow. One execution per id; the
/// orchestrator assumes serial access per id (see [`crate::Orchestrator`]).
pub struct Saga {
    id: String,
    saga_type: String,
    steps: Vec<SagaStep>,
    on_complete: Option<Box<dyn Fn(&Context) + Send + Sync>>,
    on_failed: Option<Box<dyn Fn(&Context, &crate::SagaError) + Send + Sync>>,
}

impl Saga {
    pub fn new(id: impl Into<String>, saga_type: impl Into<String>, steps: Vec<SagaStep>) -> Self {
        Self {
            id: id.into(),
            saga_type: saga_type.into(),
            steps,
            on_complete: None,
            on_failed: None,
        }
    }

    pub fn with_on_complete(mut self, f: impl Fn(&Context) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn with_on_failed(mut self, f: impl Fn(&Context, &crate::SagaError) + Send + Sync + 'static) -> Self {
        self.on_failed = Some(Box::new(f));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    pub fn steps(&self) -> &[SagaStep] {
        &self.steps
    }

    pub(crate) fn notify_complete(&self, ctx: &Context) {
        if let Some(f) = &self.on_complete {
            f(ctx);
        }
    }

    pub(crate) fn notify_failed(&self, ctx: &Context, error: &crate::SagaError) {
        if let Some(f) = &self.on_failed {
            f(ctx, error);
        }
    }
}
