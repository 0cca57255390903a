//! End-to-end coverage of `MessageBus` layered over the worker-pool
//! `MemoryTransport`: middleware ordering, handler fan-out, and a bounded
//! close/drain under real cross-thread delivery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use corebus_messaging::{BusError, ChainFn, FnHandler, MemoryConfig, MemoryTransport, Message, MessageBus, Middleware};
use corebus_core::Context;

struct Tagging {
    tag: &'static str,
    order: Arc<Mutex<Vec<&'static str>>>,
}

impl Middleware for Tagging {
    fn handle(&self, ctx: &Context, message: &mut Message, next: &ChainFn<'_>) -> Result<(), BusError> {
        self.order.lock().unwrap().push(self.tag);
        next(ctx, message)
    }
}

#[test]
fn middlewares_run_in_registration_order_before_the_handler_sees_the_message() {
    let transport = Arc::new(MemoryTransport::with_config(MemoryConfig::default().with_worker_count(1)));
    let bus = MessageBus::new(transport);
    let ctx = Context::new();
    bus.start(&ctx).unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    bus.r#use(Arc::new(Tagging { tag: "first", order: order.clone() }));
    bus.r#use(Arc::new(Tagging { tag: "second", order: order.clone() }));

    let received = Arc::new(AtomicUsize::new(0));
    let r = received.clone();
    bus.subscribe(
        "order.created",
        Arc::new(FnHandler::new("counter", move |_ctx, _msg| {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })),
    )
    .unwrap();

    bus.publish(&ctx, Message::new("order.created", 7_i32)).unwrap();

    for _ in 0..200 {
        if received.load(Ordering::SeqCst) == 1 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(received.load(Ordering::SeqCst), 1);
    assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);

    bus.close().unwrap();
}

#[test]
fn a_middleware_registered_after_publish_does_not_run_for_the_already_in_flight_message() {
    let transport = Arc::new(MemoryTransport::with_config(MemoryConfig::default().with_worker_count(1)));
    let bus = Arc::new(MessageBus::new(transport));
    let ctx = Context::new();
    bus.start(&ctx).unwrap();

    let handled = Arc::new(AtomicUsize::new(0));
    let h = handled.clone();
    bus.subscribe("ping", Arc::new(FnHandler::new("ping-handler", move |_ctx, _msg| {
        h.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })))
    .unwrap();

    bus.publish(&ctx, Message::new("ping", ())).unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    bus.r#use(Arc::new(Tagging { tag: "late", order: order.clone() }));

    for _ in 0..200 {
        if handled.load(Ordering::SeqCst) == 1 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    bus.close().unwrap();

    assert_eq!(handled.load(Ordering::SeqCst), 1);
    assert!(order.lock().unwrap().is_empty(), "the snapshot taken before registration must not see the late middleware");
}

#[test]
fn publish_batch_rejects_with_the_failing_messages_id_without_touching_the_transport() {
    struct RejectSecond;

    impl Middleware for RejectSecond {
        fn handle(&self, ctx: &Context, message: &mut Message, next: &ChainFn<'_>) -> Result<(), BusError> {
            if message.payload_as::<i32>() == Some(&2) {
                return Err(BusError::middleware(message.id().to_string(), "rejected the second message".into()));
            }
            next(ctx, message)
        }
    }

    let transport = Arc::new(MemoryTransport::with_config(MemoryConfig::default().with_worker_count(1)));
    let bus = MessageBus::new(transport);
    let ctx = Context::new();
    bus.start(&ctx).unwrap();
    bus.r#use(Arc::new(RejectSecond));

    let rejected = Message::new("seq", 2_i32);
    let rejected_id = rejected.id().to_string();
    let messages = vec![Message::new("seq", 1_i32), rejected, Message::new("seq", 3_i32)];

    let err = bus.publish_batch(&ctx, messages).unwrap_err();
    match err {
        BusError::Batch { message_id, .. } => assert_eq!(message_id, rejected_id),
        other => panic!("expected BusError::Batch, got {other:?}"),
    }

    bus.close().unwrap();
}

#[test]
fn close_on_a_slow_handler_times_out_without_losing_the_queued_message() {
    let transport = Arc::new(MemoryTransport::with_config(
        MemoryConfig::default().with_worker_count(1).with_drain_timeout(Duration::from_millis(1)),
    ));
    let bus = MessageBus::new(transport);
    let ctx = Context::new();
    bus.start(&ctx).unwrap();

    let handled = Arc::new(AtomicUsize::new(0));
    let h = handled.clone();
    bus.subscribe(
        "slow",
        Arc::new(FnHandler::new("slow-handler", move |_ctx, _msg| {
            std::thread::sleep(Duration::from_millis(200));
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })),
    )
    .unwrap();

    bus.publish(&ctx, Message::new("slow", ())).unwrap();

    // The handler sleeps far longer than the 1ms drain timeout, so close
    // must report it couldn't fully drain rather than blocking forever.
    assert!(bus.close().is_err());

    for _ in 0..50 {
        if handled.load(Ordering::SeqCst) == 1 {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(handled.load(Ordering::SeqCst), 1);
}
