//! Shared identifiers, metadata values, context and error plumbing used by
//! every other `corebus` crate.
//!
//! Nothing in this crate is transport-, command-, or saga-specific; it is
//! the vocabulary the rest of the workspace is built from.

mod context;
mod error;
mod id;
mod metadata;

pub use context::{Context, ContextKey};
pub use error::BoxError;
pub use id::new_id;
pub use metadata::{Metadata, MetadataValue};
