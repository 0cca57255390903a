//! Sequential-step saga orchestration on top of `corebus-command`: runs a
//! `Saga`'s steps in order against a `CommandBus`, compensating completed
//! steps in reverse order on failure, and persisting every transition
//! through a `SagaStateStore` so execution can resume after a crash.

mod error;
mod event_bus;
mod orchestrator;
mod saga;
mod state;
mod store;

pub use error::{SagaError, SagaErrorKind};
pub use event_bus::EventBus;
pub use orchestrator::Orchestrator;
pub use saga::{Saga, SagaStep};
pub use state::{SagaState, SagaStatus};
pub use store::{InMemorySagaStateStore, SagaStateStore};
