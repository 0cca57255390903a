//! The facet the orchestrator publishes lifecycle events through. Kept
//! separate from [`corebus_command::CommandBus`] so a saga's events can be
//! routed to a different bus (or none at all) than its commands.

use corebus_core::Context;
use corebus_messaging::{BusError, Message, MessageBus};

pub trait EventBus: Send + Sync {
    fn publish(&self, ctx: &Context, message: Message) -> Result<(), BusError>;
}

impl EventBus for MessageBus {
    fn publish(&self, ctx: &Context, message: Message) -> Result<(), BusError> {
        MessageBus::publish(self, ctx, message)
    }
}
