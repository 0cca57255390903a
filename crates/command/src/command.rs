//! The `Command` envelope: a `Message` of type `"command"` carrying an
//! aggregate identity and a command-type tag.

use std::any::Any;
use std::ops::{Deref, DerefMut};

use corebus_core::MetadataValue;
use corebus_messaging::Message;

/// Unified transport subscription key every command-type handler is
/// registered under (see [`crate::CommandBus::register_handler`]).
pub const COMMAND_MESSAGE_TYPE: &str = "command";

/// Reserved, wire-format-stable metadata keys.
pub mod metadata_keys {
    pub const COMMAND_TYPE: &str = "command_type";
    pub const AGGREGATE_ID: &str = "aggregate_id";
    pub const AGGREGATE_TYPE: &str = "aggregate_type";
    pub const USER_ID: &str = "user_id";
    pub const REQUEST_ID: &str = "request_id";
    pub const CORRELATION_ID: &str = "correlation_id";
    pub const CAUSATION_ID: &str = "causation_id";
    pub const TRACE_ID: &str = "trace_id";
    pub const TENANT_ID: &str = "tenant_id";
    pub const SAGA_ID: &str = "saga_id";
    pub const STEP: &str = "step";
    pub const STATUS: &str = "status";
}

/// A message that mutates state, carrying an aggregate identity and a
/// `command_type` tag used for routing by [`crate::CommandBus`].
///
/// `Command` wraps a plain [`Message`] rather than duplicating its fields;
/// `Deref`/`DerefMut` expose the envelope's id, timestamp and metadata
/// directly so code that only needs those doesn't have to unwrap first.
#[derive(Clone, Debug)]
pub struct Command(Message);

impl Command {
    /// Build a command with a freshly generated id, stamping
    /// `command_type`/`aggregate_id`/`aggregate_type` into metadata.
    pub fn new(
        command_type: impl Into<String>,
        aggregate_id: i64,
        aggregate_type: impl Into<String>,
        payload: impl Any + Send + Sync,
    ) -> Self {
        let message = Message::new(COMMAND_MESSAGE_TYPE, payload)
            .with_metadata(metadata_keys::COMMAND_TYPE, command_type.into())
            .with_metadata(metadata_keys::AGGREGATE_ID, aggregate_id)
            .with_metadata(metadata_keys::AGGREGATE_TYPE, aggregate_type.into());
        Self(message)
    }

    /// Build a command with an explicit id, for deterministic tests and
    /// for saga steps resolving a compensation command that must echo the
    /// original command's identity.
    pub fn with_id(
        id: impl Into<String>,
        command_type: impl Into<String>,
        aggregate_id: i64,
        aggregate_type: impl Into<String>,
        payload: impl Any + Send + Sync,
    ) -> Self {
        let message = Message::with_id(id, COMMAND_MESSAGE_TYPE, payload)
            .with_metadata(metadata_keys::COMMAND_TYPE, command_type.into())
            .with_metadata(metadata_keys::AGGREGATE_ID, aggregate_id)
            .with_metadata(metadata_keys::AGGREGATE_TYPE, aggregate_type.into());
        Self(message)
    }

    /// Wrap an already-built command-shaped message, as done when a
    /// routing handler receives one off the transport.
    pub(crate) fn from_message(message: Message) -> Self {
        Self(message)
    }

    pub fn into_message(self) -> Message {
        self.0
    }

    pub fn message(&self) -> &Message {
        &self.0
    }

    pub fn command_type(&self) -> &str {
        self.get_metadata(metadata_keys::COMMAND_TYPE)
            .and_then(MetadataValue::as_str)
            .unwrap_or_default()
    }

    pub fn aggregate_id(&self) -> i64 {
        self.get_metadata(metadata_keys::AGGREGATE_ID)
            .and_then(MetadataValue::as_i64)
            .unwrap_or_default()
    }

    pub fn aggregate_type(&self) -> &str {
        self.get_metadata(metadata_keys::AGGREGATE_TYPE)
            .and_then(MetadataValue::as_str)
            .unwrap_or_default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.0.set_metadata(metadata_keys::USER_ID, user_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.0.set_metadata(metadata_keys::REQUEST_ID, request_id.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.0.set_metadata(metadata_keys::CORRELATION_ID, correlation_id.into());
        self
    }

    pub fn with_causation_id(mut self, causation_id: impl Into<String>) -> Self {
        self.0.set_metadata(metadata_keys::CAUSATION_ID, causation_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.0.set_metadata(key, value);
        self
    }
}

impl Deref for Command {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.0
    }
}

impl DerefMut for Command {
    fn deref_mut(&mut self) -> &mut Message {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_stamps_reserved_metadata() {
        let cmd = Command::new("order.create", 42, "Order", ());
        assert_eq!(cmd.message_type(), COMMAND_MESSAGE_TYPE);
        assert_eq!(cmd.command_type(), "order.create");
        assert_eq!(cmd.aggregate_id(), 42);
        assert_eq!(cmd.aggregate_type(), "Order");
    }

    #[test]
    fn builder_methods_add_optional_metadata() {
        let cmd = Command::new("order.create", 1, "Order", ())
            .with_user_id("u-1")
            .with_correlation_id("c-1");
        assert_eq!(
            cmd.get_metadata(metadata_keys::USER_ID).and_then(MetadataValue::as_str),
            Some("u-1")
        );
        assert_eq!(
            cmd.get_metadata(metadata_keys::CORRELATION_ID).and_then(MetadataValue::as_str),
            Some("c-1")
        );
    }
}
