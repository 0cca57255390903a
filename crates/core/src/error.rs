//! Shared error plumbing.

use std::error::Error as StdError;

/// A type-erased, thread-safe error, used as the `source` of the coded
/// error enums in `corebus-messaging`, `corebus-command` and `corebus-saga`
/// so a causal chain can be inspected with `std::error::Error::source`
/// without every crate re-deriving its own boxed-error alias.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;
