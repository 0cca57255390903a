//! Coded, matchable command-level errors.

use corebus_core::BoxError;
use corebus_messaging::BusError;
use thiserror::Error;

/// A command-level error code. Two [`CommandError`]s are equal iff their
/// kinds match — the message and cause are diagnostic, not part of
/// identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandErrorKind {
    #[error("invalid command")]
    InvalidCommand,
    #[error("handler not found")]
    HandlerNotFound,
    #[error("handler already registered")]
    HandlerAlreadyRegistered,
    #[error("invalid command type")]
    InvalidCommandType,
    #[error("execution failed")]
    ExecutionFailed,
    #[error("aggregate not found")]
    AggregateNotFound,
    #[error("concurrency conflict")]
    ConcurrencyConflict,
}

/// A coded command error carrying an optional command-type tag and cause.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct CommandError {
    pub kind: CommandErrorKind,
    pub message: String,
    pub command_type: Option<String>,
    #[source]
    pub cause: Option<BoxError>,
}

impl PartialEq for CommandError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl CommandError {
    pub fn new(kind: CommandErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            command_type: None,
            cause: None,
        }
    }

    pub fn with_command_type(mut self, command_type: impl Into<String>) -> Self {
        self.command_type = Some(command_type.into());
        self
    }

    pub fn with_cause(mut self, cause: BoxError) -> Self {
        self.cause = Some(cause);
        self
    }
}

impl From<BusError> for CommandError {
    fn from(error: BusError) -> Self {
        CommandError::new(CommandErrorKind::ExecutionFailed, error.to_string()).with_cause(Box::new(error))
    }
}
