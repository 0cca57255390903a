//! The handler contract.

use corebus_core::{BoxError, Context};

use crate::message::Message;

/// Error returned by a handler's own business logic.
pub type HandlerError = BoxError;

/// An entity bound to a message type: consumes a message within a
/// caller-supplied [`Context`], producing success or an error.
///
/// Handlers are registered against `(message_type, handler-instance)` on a
/// [`crate::Transport`]; the same trait object is used whether the handler
/// runs inline (`Sync` transport) or on a worker thread (`Memory`
/// transport).
pub trait Handler: Send + Sync {
    fn handle(&self, ctx: &Context, message: &Message) -> Result<(), HandlerError>;

    /// A stable name for this handler, used for diagnostics and as part of
    /// the wrapped-handler identity key (see the bus's subscribe/unsubscribe
    /// implementation).
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Adapts a plain closure into a [`Handler`], for callers who don't want to
/// define a dedicated type for a one-off subscription.
pub struct FnHandler<F> {
    name: &'static str,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Context, &Message) -> Result<(), HandlerError> + Send + Sync,
{
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Context, &Message) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, ctx: &Context, message: &Message) -> Result<(), HandlerError> {
        (self.f)(ctx, message)
    }

    fn type_name(&self) -> &'static str {
        self.name
    }
}
