//! Command routing on top of a [`MessageBus`]: every command-type handler
//! subscribes under the single unified `"command"` key, and a routing
//! wrapper filters by `command_type` before invoking the user handler.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use corebus_core::Context;
use corebus_messaging::{Handler, HandlerError, Message, MessageBus, Middleware, TransportKind};
use tracing::warn;

use crate::command::{metadata_keys, Command, COMMAND_MESSAGE_TYPE};
use crate::error::{CommandError, CommandErrorKind};

/// Filters dispatched commands by `command_type` before invoking the user
/// handler; commands tagged for a different type return immediately
/// without error (they're not this handler's concern).
struct RoutingHandler<F> {
    command_type: String,
    f: F,
}

impl<F> Handler for RoutingHandler<F>
where
    F: Fn(&Context, &Command) -> Result<(), CommandError> + Send + Sync,
{
    fn handle(&self, ctx: &Context, message: &Message) -> Result<(), HandlerError> {
        let tag = message
            .get_metadata(metadata_keys::COMMAND_TYPE)
            .and_then(corebus_core::MetadataValue::as_str)
            .unwrap_or_default();
        if tag != self.command_type {
            return Ok(());
        }
        let command = Command::from_message(message.clone());
        (self.f)(ctx, &command).map_err(|error| Box::new(error) as HandlerError)
    }
}

/// Adapts a closure into a [`RoutingHandler`] bound to `command_type`,
/// type-erased behind `Arc<dyn Handler>` so [`CommandBus`] can hold a
/// homogeneous handler registry.
fn routing_handler<F>(command_type: String, f: F) -> Arc<dyn Handler>
where
    F: Fn(&Context, &Command) -> Result<(), CommandError> + Send + Sync + 'static,
{
    Arc::new(RoutingHandler { command_type, f })
}

/// Routes commands by `command_type` over a shared [`MessageBus`].
pub struct CommandBus {
    bus: Arc<MessageBus>,
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
    synchronous: bool,
}

impl CommandBus {
    /// Probes the bus's transport kind at construction: `Sync` flags the
    /// bus "synchronous-dispatch" (the Saga orchestrator uses this to know
    /// whether `dispatch` errors reflect business failures or just
    /// transport-admission); anything else — including an unclassifiable
    /// third-party transport — is treated as asynchronous, with a one-shot
    /// warning in the unclassifiable case.
    pub fn new(bus: Arc<MessageBus>) -> Self {
        let kind = bus.transport_kind();
        let synchronous = kind == TransportKind::Sync;
        if kind == TransportKind::Other {
            warn!("command bus could not classify its transport; assuming asynchronous dispatch semantics, so dispatch errors reflect transport-layer admission only");
        }
        Self {
            bus,
            handlers: RwLock::new(HashMap::new()),
            synchronous,
        }
    }

    /// `true` iff the underlying transport is the `Sync` reference
    /// implementation, meaning `dispatch` surfaces the handler's own
    /// business error rather than only transport-admission errors.
    pub fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    /// Register `f` for `command_type`. Re-registering the same
    /// `command_type` unsubscribes the previous routing wrapper first, so
    /// the transport's handler-count for `"command"` never grows across
    /// replacements.
    pub fn register_handler<F>(&self, command_type: impl Into<String>, f: F) -> Result<(), CommandError>
    where
        F: Fn(&Context, &Command) -> Result<(), CommandError> + Send + Sync + 'static,
    {
        let command_type = command_type.into();
        let wrapper = routing_handler(command_type.clone(), f);

        let mut handlers = self.handlers.write().expect("command handler registry poisoned");
        if let Some(previous) = handlers.remove(&command_type) {
            self.bus
                .unsubscribe(COMMAND_MESSAGE_TYPE, &previous)
                .map_err(|error| CommandError::new(CommandErrorKind::ExecutionFailed, error.to_string()).with_command_type(&command_type))?;
        }
        self.bus
            .subscribe(COMMAND_MESSAGE_TYPE, Arc::clone(&wrapper))
            .map_err(|error| CommandError::new(CommandErrorKind::ExecutionFailed, error.to_string()).with_command_type(&command_type))?;
        handlers.insert(command_type, wrapper);
        Ok(())
    }

    /// Register a handler whose payload is statically typed as `T`. Fails
    /// at invocation time with [`CommandErrorKind::InvalidCommandType`] if
    /// the command's actual payload doesn't downcast to `T`.
    pub fn register_typed_handler<T, F>(&self, command_type: impl Into<String>, f: F) -> Result<(), CommandError>
    where
        T: 'static,
        F: Fn(&Context, &Command, &T) -> Result<(), CommandError> + Send + Sync + 'static,
    {
        let command_type = command_type.into();
        let tag_for_error = command_type.clone();
        self.register_handler(command_type, move |ctx, command| match command.payload_as::<T>() {
            Some(payload) => f(ctx, command, payload),
            None => Err(CommandError::new(CommandErrorKind::InvalidCommandType, "invalid payload type")
                .with_command_type(&tag_for_error)),
        })
    }

    pub fn has_handler(&self, command_type: &str) -> bool {
        self.handlers.read().expect("command handler registry poisoned").contains_key(command_type)
    }

    pub fn get_handler(&self, command_type: &str) -> Option<Arc<dyn Handler>> {
        self.handlers
            .read()
            .expect("command handler registry poisoned")
            .get(command_type)
            .cloned()
    }

    /// Publish `command` through the underlying bus. With a `Sync`
    /// transport the handler's own error propagates; with `Memory`, only
    /// queue-admission errors do.
    pub fn dispatch(&self, ctx: &Context, command: Command) -> Result<(), CommandError> {
        self.bus.publish(ctx, command.into_message()).map_err(CommandError::from)
    }

    pub fn r#use(&self, middleware: Arc<dyn Middleware>) {
        self.bus.r#use(middleware);
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }
}
