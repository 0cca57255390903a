//! The message envelope.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use corebus_core::{new_id, Metadata, MetadataValue};

/// An immutable envelope carrying an id, a type tag, a timestamp, an opaque
/// payload and a mutable metadata mapping.
///
/// `Message` is the unit every producer publishes and every [`Handler`]
/// (see [`crate::Handler`]) consumes. The payload is type-erased
/// (`Arc<dyn Any + Send + Sync>`) because the bus itself is payload-agnostic
/// — commands, events and anything else share this one envelope shape.
/// Handlers that know the concrete payload type downcast it; see
/// [`Message::payload_as`].
#[derive(Clone)]
pub struct Message {
    id: String,
    message_type: String,
    timestamp: DateTime<Utc>,
    payload: Arc<dyn Any + Send + Sync>,
    metadata: Metadata,
}

impl Message {
    /// Build a message with a freshly generated id and the current time.
    pub fn new(message_type: impl Into<String>, payload: impl Any + Send + Sync) -> Self {
        Self {
            id: new_id(),
            message_type: message_type.into(),
            timestamp: Utc::now(),
            payload: Arc::new(payload),
            metadata: Metadata::new(),
        }
    }

    /// Build a message with an explicit id, useful for deterministic tests
    /// and for commands/events that must carry a caller-supplied identity.
    pub fn with_id(
        id: impl Into<String>,
        message_type: impl Into<String>,
        payload: impl Any + Send + Sync,
    ) -> Self {
        Self {
            id: id.into(),
            message_type: message_type.into(),
            timestamp: Utc::now(),
            payload: Arc::new(payload),
            metadata: Metadata::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload_as<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn get_metadata(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(key)
    }

    /// Stamp a metadata key, returning `self` for fluent construction.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.metadata.insert(key.into(), value.into());
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("message_type", &self.message_type)
            .field("timestamp", &self.timestamp)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcasts_payload() {
        let msg = Message::new("test", 42i32);
        assert_eq!(msg.payload_as::<i32>(), Some(&42));
        assert_eq!(msg.payload_as::<String>(), None);
    }

    #[test]
    fn fluent_metadata() {
        let msg = Message::new("test", ()).with_metadata("user_id", "u-1");
        assert_eq!(
            msg.get_metadata("user_id").and_then(|v| v.as_str()),
            Some("u-1")
        );
    }
}
