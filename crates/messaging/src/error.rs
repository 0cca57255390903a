//! Transport- and bus-level error kinds.

use corebus_core::BoxError;
use thiserror::Error;

/// A single handler's failure, attributed to the handler's `type_name()` so
/// a joined error can name which handler(s) failed.
#[derive(Debug)]
pub struct HandlerFailure {
    pub handler_type: String,
    pub error: BoxError,
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.handler_type, self.error)
    }
}

/// Errors surfaced by a [`crate::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not running")]
    NotRunning,

    #[error("transport is already running")]
    AlreadyStarted,

    #[error("transport was never started")]
    NotStarted,

    #[error("queue full")]
    QueueFull,

    #[error("context deadline exceeded before the message could be admitted")]
    Cancelled,

    #[error("no handler registered for this subscription")]
    UnknownHandler,

    #[error("{count} handler(s) failed: {}", .failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Handlers {
        count: usize,
        failures: Vec<HandlerFailure>,
    },

    #[error("close timed out with {pending} message(s) still queued")]
    DrainTimeout { pending: usize },
}

impl TransportError {
    pub fn handlers(failures: Vec<HandlerFailure>) -> Self {
        TransportError::Handlers {
            count: failures.len(),
            failures,
        }
    }
}

/// Errors surfaced by [`crate::MessageBus`].
#[derive(Debug, Error)]
pub enum BusError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("middleware rejected message {message_id}: {source}")]
    Middleware {
        message_id: String,
        #[source]
        source: BoxError,
    },

    #[error("publish_batch failed on message {message_id}: {source}")]
    Batch {
        message_id: String,
        #[source]
        source: Box<BusError>,
    },
}

impl BusError {
    pub fn middleware(message_id: impl Into<String>, source: BoxError) -> Self {
        BusError::Middleware {
            message_id: message_id.into(),
            source,
        }
    }
}
