//! The message bus: a publish/subscribe facade over a pluggable
//! [`Transport`], with an ordered middleware chain in front of every
//! publish.
//!
//! This crate owns four things, leaves first: the [`Message`] envelope and
//! [`Handler`] trait, the [`Middleware`] chain, the [`Transport`] contract
//! plus its `Sync` and `Memory` reference implementations, and the
//! [`MessageBus`] facade that ties them together.

mod bus;
mod error;
mod handler;
mod message;
mod middleware;
mod transport;

pub use bus::MessageBus;
pub use error::{BusError, HandlerFailure, TransportError};
pub use handler::{FnHandler, Handler, HandlerError};
pub use message::Message;
pub use middleware::{ChainFn, Middleware};
pub use transport::memory::MemoryConfig;
pub use transport::memory::MemoryTransport;
pub use transport::sync::SyncTransport;
pub use transport::{Transport, TransportKind, TransportStats};

/// Wildcard subscription key: handlers registered under this key receive
/// every dispatched message in addition to exact-type subscribers.
pub const WILDCARD: &str = "*";
