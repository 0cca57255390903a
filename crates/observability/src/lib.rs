//! Process-wide tracing setup, shared by every `corebus` binary, example
//! and integration test so log shape is consistent regardless of which
//! crate emits it.

mod tracing_init;

pub use tracing_init::{init, init_with_filter};
