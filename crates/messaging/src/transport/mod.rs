//! Lifecycle-managed dispatchers that own the subscription table and
//! perform publish-to-handler fan-out.

pub mod memory;
mod subscription;
pub mod sync;

use std::sync::Arc;

use corebus_core::Context;

use crate::error::TransportError;
use crate::handler::Handler;
use crate::message::Message;

/// Which reference transport an instance is, used by the Command Bus's
/// constructor-time capability probe to flag synchronous-dispatch mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Sync,
    Memory,
    Other,
}

/// An observability snapshot of a transport's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportStats {
    pub running: bool,
    pub handler_count: usize,
    pub message_types: usize,
    pub queue_size: usize,
    pub queue_depth: usize,
    pub worker_count: usize,
}

/// The transport contract: publish/subscribe plus lifecycle and
/// observability. `publish`/`publish_batch` returning `Ok` means only that
/// the transport accepted the message(s) — for `Sync` that also means every
/// handler ran; for `Memory` it means the message was admitted to the
/// queue.
pub trait Transport: Send + Sync {
    fn publish(&self, ctx: &Context, message: Message) -> Result<(), TransportError>;

    fn publish_batch(&self, ctx: &Context, messages: Vec<Message>) -> Result<(), TransportError> {
        for message in messages {
            self.publish(ctx, message)?;
        }
        Ok(())
    }

    fn subscribe(&self, message_type: &str, handler: Arc<dyn Handler>) -> Result<(), TransportError>;

    fn unsubscribe(&self, message_type: &str, handler: &Arc<dyn Handler>) -> Result<(), TransportError>;

    fn start(&self, ctx: &Context) -> Result<(), TransportError>;

    fn close(&self) -> Result<(), TransportError>;

    fn stats(&self) -> TransportStats;

    fn kind(&self) -> TransportKind {
        TransportKind::Other
    }
}
