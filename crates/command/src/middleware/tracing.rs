//! Propagates `correlation_id`/`causation_id`/`trace_id` through message
//! metadata and the caller's [`Context`], so downstream events inherit the
//! identifiers a root command established.
//!
//! The context keys are private, zero-sized marker types — never plain
//! strings — so nothing outside this module can read or clobber them by
//! accident (see [`corebus_core::ContextKey`]).

use corebus_core::{Context, ContextKey, MetadataValue};
use corebus_messaging::{BusError, ChainFn, Message, Middleware};

use crate::command::{metadata_keys, COMMAND_MESSAGE_TYPE};

struct CorrelationIdKey;
impl ContextKey for CorrelationIdKey {
    type Value = String;
}

struct CausationIdKey;
impl ContextKey for CausationIdKey {
    type Value = String;
}

struct TraceIdKey;
impl ContextKey for TraceIdKey {
    type Value = String;
}

/// Read the correlation id stamped on `ctx` by a prior [`TracingMiddleware`]
/// pass, if any.
pub fn correlation_id(ctx: &Context) -> Option<String> {
    ctx.get::<CorrelationIdKey>()
}

pub fn causation_id(ctx: &Context) -> Option<String> {
    ctx.get::<CausationIdKey>()
}

pub fn trace_id(ctx: &Context) -> Option<String> {
    ctx.get::<TraceIdKey>()
}

fn metadata_string(message: &Message, key: &str) -> Option<String> {
    message.get_metadata(key).and_then(MetadataValue::as_str).map(str::to_string)
}

/// Stamps correlation/causation/trace identifiers onto every command and
/// event that passes through it.
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn handle(&self, ctx: &Context, message: &mut Message, next: &ChainFn<'_>) -> Result<(), BusError> {
        let id = message.id().to_string();
        let correlation = metadata_string(message, metadata_keys::CORRELATION_ID);
        let causation = metadata_string(message, metadata_keys::CAUSATION_ID);
        let trace = metadata_string(message, metadata_keys::TRACE_ID);

        let (correlation, causation, trace) = if message.message_type() == COMMAND_MESSAGE_TYPE {
            // Root command: any identifier missing from metadata defaults
            // to the command's own id (it is its own cause).
            (
                correlation.unwrap_or_else(|| id.clone()),
                causation.unwrap_or_else(|| id.clone()),
                trace.unwrap_or_else(|| id.clone()),
            )
        } else {
            // Event: inherit from the context the originating command
            // stamped, falling back to the event's own id only if the
            // context has nothing either.
            (
                correlation.or_else(|| ctx.get::<CorrelationIdKey>()).unwrap_or_else(|| id.clone()),
                causation.or_else(|| ctx.get::<CausationIdKey>()).unwrap_or_else(|| id.clone()),
                trace.or_else(|| ctx.get::<TraceIdKey>()).unwrap_or_else(|| id.clone()),
            )
        };

        message.set_metadata(metadata_keys::CORRELATION_ID, correlation.clone());
        message.set_metadata(metadata_keys::CAUSATION_ID, causation.clone());
        message.set_metadata(metadata_keys::TRACE_ID, trace.clone());

        if message.message_type() == COMMAND_MESSAGE_TYPE {
            ctx.insert::<CorrelationIdKey>(correlation);
            ctx.insert::<CausationIdKey>(causation);
            ctx.insert::<TraceIdKey>(trace);
        }

        next(ctx, message)
    }
}
