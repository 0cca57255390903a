//! Command routing and dispatch on top of `corebus-messaging`, plus the
//! reference middlewares (aggregate lock, idempotency, validation,
//! tracing) that a CQRS write path typically needs in front of its
//! handlers.

mod bus;
mod command;
mod error;
pub mod middleware;

pub use bus::CommandBus;
pub use command::{metadata_keys, Command, COMMAND_MESSAGE_TYPE};
pub use error::{CommandError, CommandErrorKind};
