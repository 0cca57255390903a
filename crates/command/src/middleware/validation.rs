//! Applies an injected [`Validator`] to a command's payload before it
//! reaches the handler.

use corebus_core::{BoxError, Context};
use corebus_messaging::{BusError, ChainFn, Message, Middleware};

use crate::command::{Command, COMMAND_MESSAGE_TYPE};

/// A capability that inspects a command's payload and either accepts it or
/// returns the reason it was rejected.
pub trait Validator: Send + Sync {
    fn validate(&self, command: &Command) -> Result<(), BoxError>;
}

/// A unit payload (`Command::new(.., ())`) stands in for "nil" — there's
/// nothing to validate, so it's skipped.
pub struct ValidationMiddleware {
    validator: std::sync::Arc<dyn Validator>,
}

impl ValidationMiddleware {
    pub fn new(validator: std::sync::Arc<dyn Validator>) -> Self {
        Self { validator }
    }
}

impl Middleware for ValidationMiddleware {
    fn handle(&self, ctx: &Context, message: &mut Message, next: &ChainFn<'_>) -> Result<(), BusError> {
        if message.message_type() != COMMAND_MESSAGE_TYPE {
            return next(ctx, message);
        }
        if message.payload_as::<()>().is_some() {
            return next(ctx, message);
        }

        let command = Command::from_message(message.clone());
        if let Err(error) = self.validator.validate(&command) {
            return Err(BusError::middleware(
                message.id().to_string(),
                format!("validation failed for command type \"{}\": {error}", command.command_type()).into(),
            ));
        }
        next(ctx, message)
    }
}
