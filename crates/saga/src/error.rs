//! Coded, matchable saga-level errors.

use std::error::Error as StdError;
use std::fmt;

use corebus_command::CommandError;
use corebus_core::BoxError;
use thiserror::Error;

/// A saga-level error code. Two [`SagaError`]s are equal iff their kinds
/// match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SagaErrorKind {
    #[error("saga not found")]
    NotFound,
    #[error("invalid saga state")]
    InvalidState,
    #[error("saga step failed")]
    StepFailed,
    #[error("saga compensation failed")]
    CompensationFailed,
    #[error("saga already completed")]
    AlreadyCompleted,
    #[error("saga already failed")]
    AlreadyFailed,
    #[error("saga has no steps")]
    NoSteps,
    #[error("invalid saga step")]
    InvalidStep,
    #[error("saga state store operation failed")]
    StoreFailed,
}

/// Wraps a step's business failure together with the failure of the
/// compensation that ran in response to it, so callers can inspect both
/// via `source()`.
#[derive(Debug)]
struct CompensationFailure {
    step_error: BoxError,
    compensation_error: BoxError,
}

impl fmt::Display for CompensationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step failed ({}), and its compensation also failed ({})",
            self.step_error, self.compensation_error
        )
    }
}

impl StdError for CompensationFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.step_error.as_ref())
    }
}

#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct SagaError {
    pub kind: SagaErrorKind,
    pub message: String,
    pub saga_id: Option<String>,
    pub step_name: Option<String>,
    #[source]
    pub cause: Option<BoxError>,
}

impl PartialEq for SagaError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl SagaError {
    pub fn new(kind: SagaErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            saga_id: None,
            step_name: None,
            cause: None,
        }
    }

    pub fn with_saga_id(mut self, saga_id: impl Into<String>) -> Self {
        self.saga_id = Some(saga_id.into());
        self
    }

    pub fn with_step_name(mut self, step_name: impl Into<String>) -> Self {
        self.step_name = Some(step_name.into());
        self
    }

    pub fn with_cause(mut self, cause: BoxError) -> Self {
        self.cause = Some(cause);
        self
    }

    /// A step's forward command failed and no compensation was required to
    /// run (e.g. it was the first step).
    pub fn step_failed(saga_id: impl Into<String>, step_name: impl Into<String>, cause: CommandError) -> Self {
        SagaError::new(SagaErrorKind::StepFailed, cause.to_string())
            .with_saga_id(saga_id)
            .with_step_name(step_name)
            .with_cause(Box::new(cause))
    }

    /// A step failed and the compensation that ran for a prior step also
    /// failed; both causes are preserved.
    pub fn compensation_failed(
        saga_id: impl Into<String>,
        step_name: impl Into<String>,
        step_error: CommandError,
        compensation_error: CommandError,
    ) -> Self {
        let joined = CompensationFailure {
            step_error: Box::new(step_error),
            compensation_error: Box::new(compensation_error),
        };
        SagaError::new(SagaErrorKind::CompensationFailed, joined.to_string())
            .with_saga_id(saga_id)
            .with_step_name(step_name)
            .with_cause(Box::new(joined))
    }
}
