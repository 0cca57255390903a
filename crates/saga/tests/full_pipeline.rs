//! Exercises a saga end to end against the real `CommandBus` stack: a
//! `SyncTransport` so step dispatch completes before `execute` returns,
//! a success path, a failing-step-triggers-compensation path, and a
//! doubly-failing compensation path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use corebus_command::{Command, CommandBus, CommandError, CommandErrorKind};
use corebus_core::Context;
use corebus_messaging::{MessageBus, SyncTransport};
use corebus_saga::{
    InMemorySagaStateStore, Orchestrator, Saga, SagaState, SagaStateStore, SagaStatus, SagaStep,
};

fn command_bus() -> Arc<CommandBus> {
    let bus = Arc::new(MessageBus::new(Arc::new(SyncTransport::new())));
    bus.start(&Context::new()).unwrap();
    Arc::new(CommandBus::new(bus))
}

#[test]
fn all_steps_succeed_end_to_end_through_a_real_command_bus() {
    let command_bus = command_bus();
    let reserved = Arc::new(AtomicUsize::new(0));
    let charged = Arc::new(AtomicUsize::new(0));

    let r = reserved.clone();
    command_bus
        .register_handler("inventory.reserve", move |_ctx, _cmd| {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    let c = charged.clone();
    command_bus
        .register_handler("payment.charge", move |_ctx, _cmd| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    let store = Arc::new(InMemorySagaStateStore::new());
    let orchestrator = Orchestrator::new(command_bus, None, Some(store.clone()));

    let saga = Saga::new(
        "order-1",
        "order-fulfillment",
        vec![
            SagaStep::new("reserve-inventory", |_ctx| Command::new("inventory.reserve", 1, "Order", ())),
            SagaStep::new("charge-payment", |_ctx| Command::new("payment.charge", 1, "Order", ())),
        ],
    );

    orchestrator.execute(&Context::new(), &saga).unwrap();

    assert_eq!(reserved.load(Ordering::SeqCst), 1);
    assert_eq!(charged.load(Ordering::SeqCst), 1);

    let state = store.load("order-1").unwrap();
    assert_eq!(state.status, SagaStatus::Completed);
    assert_eq!(state.completed_steps, vec!["reserve-inventory", "charge-payment"]);
}

#[test]
fn a_failing_step_compensates_already_completed_steps_in_reverse_order() {
    let command_bus = command_bus();
    let compensation_order = Arc::new(Mutex::new(Vec::new()));

    command_bus.register_handler("inventory.reserve", |_ctx, _cmd| Ok(())).unwrap();
    command_bus.register_handler("payment.charge", |_ctx, _cmd| Ok(())).unwrap();
    command_bus
        .register_handler("shipping.schedule", |_ctx, _cmd| {
            Err(CommandError::new(CommandErrorKind::ExecutionFailed, "carrier unavailable"))
        })
        .unwrap();

    let o1 = compensation_order.clone();
    command_bus
        .register_handler("payment.refund", move |_ctx, _cmd| {
            o1.lock().unwrap().push("refund-payment");
            Ok(())
        })
        .unwrap();
    let o2 = compensation_order.clone();
    command_bus
        .register_handler("inventory.release", move |_ctx, _cmd| {
            o2.lock().unwrap().push("release-inventory");
            Ok(())
        })
        .unwrap();

    let store = Arc::new(InMemorySagaStateStore::new());
    let orchestrator = Orchestrator::new(command_bus, None, Some(store.clone()));

    let saga = Saga::new(
        "order-2",
        "order-fulfillment",
        vec![
            SagaStep::new("reserve-inventory", |_ctx| Command::new("inventory.reserve", 2, "Order", ()))
                .with_compensation(|_ctx| Command::new("inventory.release", 2, "Order", ())),
            SagaStep::new("charge-payment", |_ctx| Command::new("payment.charge", 2, "Order", ()))
                .with_compensation(|_ctx| Command::new("payment.refund", 2, "Order", ())),
            SagaStep::new("schedule-shipping", |_ctx| Command::new("shipping.schedule", 2, "Order", ())),
        ],
    );

    let err = orchestrator.execute(&Context::new(), &saga).unwrap_err();
    assert_eq!(err.kind, corebus_saga::SagaErrorKind::StepFailed);

    // Compensation runs in reverse order: the payment step (index 1) was
    // completed most recently, so it's undone before inventory (index 0).
    assert_eq!(*compensation_order.lock().unwrap(), vec!["refund-payment", "release-inventory"]);

    let state = store.load("order-2").unwrap();
    assert_eq!(state.status, SagaStatus::Compensated);
    assert_eq!(state.failed_step.as_deref(), Some("schedule-shipping"));
}

#[test]
fn a_failing_compensation_leaves_the_saga_failed_and_both_causes_inspectable() {
    let command_bus = command_bus();

    command_bus.register_handler("inventory.reserve", |_ctx, _cmd| Ok(())).unwrap();
    command_bus
        .register_handler("payment.charge", |_ctx, _cmd| Err(CommandError::new(CommandErrorKind::ExecutionFailed, "card declined")))
        .unwrap();
    command_bus
        .register_handler("inventory.release", |_ctx, _cmd| {
            Err(CommandError::new(CommandErrorKind::ExecutionFailed, "warehouse offline"))
        })
        .unwrap();

    let orchestrator = Orchestrator::new(command_bus, None, None);
    let saga = Saga::new(
        "order-3",
        "order-fulfillment",
        vec![
            SagaStep::new("reserve-inventory", |_ctx| Command::new("inventory.reserve", 3, "Order", ()))
                .with_compensation(|_ctx| Command::new("inventory.release", 3, "Order", ())),
            SagaStep::new("charge-payment", |_ctx| Command::new("payment.charge", 3, "Order", ())),
        ],
    );

    let err = orchestrator.execute(&Context::new(), &saga).unwrap_err();
    assert_eq!(err.kind, corebus_saga::SagaErrorKind::CompensationFailed);

    let message = err.to_string();
    assert!(message.contains("card declined"));
    assert!(message.contains("warehouse offline"));
}

#[test]
fn resuming_a_persisted_saga_continues_from_its_current_step() {
    let command_bus = command_bus();
    let second_step_ran = Arc::new(AtomicUsize::new(0));

    command_bus.register_handler("step.one", |_ctx, _cmd| Ok(())).unwrap();
    let ran = second_step_ran.clone();
    command_bus
        .register_handler("step.two", move |_ctx, _cmd| {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    let store = Arc::new(InMemorySagaStateStore::new());
    let orchestrator = Orchestrator::new(command_bus, None, Some(store.clone()));

    let saga = Saga::new(
        "order-4",
        "two-step",
        vec![
            SagaStep::new("one", |_ctx| Command::new("step.one", 4, "Order", ())),
            SagaStep::new("two", |_ctx| Command::new("step.two", 4, "Order", ())),
        ],
    );

    // Simulate a crash after step one by hand-crafting a persisted state
    // that already completed it, then resuming.
    let mut state = SagaState::new("order-4", "two-step", chrono::Utc::now());
    state.current_step = 1;
    state.completed_steps.push("one".to_string());
    store.save(&state).unwrap();

    orchestrator.resume(&Context::new(), &saga, state).unwrap();

    assert_eq!(second_step_ran.load(Ordering::SeqCst), 1);
    let final_state = store.load("order-4").unwrap();
    assert_eq!(final_state.status, SagaStatus::Completed);
}
