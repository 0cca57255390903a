//! The four reference command middlewares: aggregate lock, idempotency,
//! validation and tracing. Each only intercepts messages of type
//! `"command"`; everything else passes straight through to `next`.

mod aggregate_lock;
mod idempotency;
mod tracing;
mod validation;

pub use aggregate_lock::{AggregateLockMiddleware, AggregateLockStats, LockGranularity};
pub use idempotency::{IdempotencyConfig, IdempotencyMiddleware};
pub use tracing::{causation_id, correlation_id, trace_id, TracingMiddleware};
pub use validation::{ValidationMiddleware, Validator};
