//! The publish/subscribe facade tying the middleware chain to a transport.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use corebus_core::Context;

use crate::error::BusError;
use crate::handler::{Handler, HandlerError};
use crate::message::Message;
use crate::middleware::{build_chain, ChainFn, Middleware};
use crate::transport::{Transport, TransportKind, TransportStats};

type ErrorHook = Arc<dyn Fn(&str, &str, &HandlerError) + Send + Sync>;

/// Wraps a subscriber so every failure it produces is reported to the bus's
/// handler-error hook, regardless of which transport ends up running it.
struct HookedHandler {
    inner: Arc<dyn Handler>,
    hook: Arc<RwLock<Option<ErrorHook>>>,
}

impl Handler for HookedHandler {
    fn handle(&self, ctx: &Context, message: &Message) -> Result<(), HandlerError> {
        match self.inner.handle(ctx, message) {
            Ok(()) => Ok(()),
            Err(error) => {
                if let Some(hook) = self.hook.read().expect("handler error hook poisoned").as_ref() {
                    hook(message.message_type(), self.inner.type_name(), &error);
                }
                Err(error)
            }
        }
    }

    fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }
}

/// `message_type` plus the original handler's instance identity and type
/// name. Trait objects aren't `Hash`/`Eq`, so identity is recovered from the
/// data pointer of the `Arc<dyn Handler>` fat pointer — this is what lets
/// `unsubscribe` look up the exact wrapped instance `subscribe` registered
/// with the transport, given only the caller's original, unwrapped handler.
fn composite_key(message_type: &str, handler: &Arc<dyn Handler>) -> String {
    let identity = Arc::as_ptr(handler) as *const () as usize;
    format!("{message_type}|{identity}|{}", handler.type_name())
}

/// Publish/subscribe facade: an ordered [`Middleware`] chain in front of a
/// pluggable [`Transport`].
///
/// Middlewares are snapshotted at the instant of each `publish` call, so a
/// concurrent `use` registration never changes the chain an in-flight
/// publish is running through.
pub struct MessageBus {
    transport: Arc<dyn Transport>,
    middlewares: RwLock<Vec<Arc<dyn Middleware>>>,
    wrapped: RwLock<HashMap<String, Arc<dyn Handler>>>,
    error_hook: Arc<RwLock<Option<ErrorHook>>>,
}

impl MessageBus {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            middlewares: RwLock::new(Vec::new()),
            wrapped: RwLock::new(HashMap::new()),
            error_hook: Arc::new(RwLock::new(None)),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Append `middleware` to the end of the chain.
    pub fn r#use(&self, middleware: Arc<dyn Middleware>) {
        self.middlewares
            .write()
            .expect("middleware list poisoned")
            .push(middleware);
    }

    /// Install a callback invoked whenever any subscribed handler returns an
    /// error, regardless of which transport ran it. Replaces any previously
    /// set hook.
    pub fn set_handler_error_hook(
        &self,
        hook: impl Fn(&str, &str, &HandlerError) + Send + Sync + 'static,
    ) {
        *self.error_hook.write().expect("handler error hook poisoned") = Some(Arc::new(hook));
    }

    pub fn subscribe(&self, message_type: &str, handler: Arc<dyn Handler>) -> Result<(), BusError> {
        let key = composite_key(message_type, &handler);
        let wrapped: Arc<dyn Handler> = Arc::new(HookedHandler {
            inner: Arc::clone(&handler),
            hook: Arc::clone(&self.error_hook),
        });
        self.transport.subscribe(message_type, Arc::clone(&wrapped))?;
        self.wrapped.write().expect("wrapped handler map poisoned").insert(key, wrapped);
        Ok(())
    }

    /// Looks up the wrapper registered for `handler` and unsubscribes it.
    /// If no wrapper is found — e.g. `handler` was subscribed straight onto
    /// the transport, bypassing the bus — falls back to unsubscribing the
    /// raw handler.
    pub fn unsubscribe(&self, message_type: &str, handler: &Arc<dyn Handler>) -> Result<(), BusError> {
        let key = composite_key(message_type, handler);
        let target = self
            .wrapped
            .write()
            .expect("wrapped handler map poisoned")
            .remove(&key);
        match target {
            Some(wrapped) => self.transport.unsubscribe(message_type, &wrapped)?,
            None => self.transport.unsubscribe(message_type, handler)?,
        }
        Ok(())
    }

    /// Run `message` through the current middleware snapshot and hand it to
    /// the transport.
    pub fn publish(&self, ctx: &Context, mut message: Message) -> Result<(), BusError> {
        let snapshot = self
            .middlewares
            .read()
            .expect("middleware list poisoned")
            .clone();
        let transport = Arc::clone(&self.transport);
        let tail: Box<ChainFn> = Box::new(move |ctx, msg| {
            transport.publish(ctx, msg.clone()).map_err(BusError::from)
        });
        let chain = build_chain(&snapshot, tail);
        chain(ctx, &mut message)
    }

    /// Run every message through the middleware chain, accumulating the
    /// ones that survive, then drain the whole batch into the transport
    /// with a single `publish_batch` call. If any message's chain fails,
    /// the batch fails immediately with the underlying error wrapped to
    /// identify the offending message id; messages already accumulated are
    /// never handed to the transport.
    pub fn publish_batch(&self, ctx: &Context, messages: Vec<Message>) -> Result<(), BusError> {
        let snapshot = self
            .middlewares
            .read()
            .expect("middleware list poisoned")
            .clone();

        let mut accepted = Vec::with_capacity(messages.len());
        for mut message in messages {
            let message_id = message.id().to_string();
            let tail: Box<ChainFn> = Box::new(|_ctx, _msg| Ok(()));
            let chain = build_chain(&snapshot, tail);
            chain(ctx, &mut message).map_err(|source| BusError::Batch {
                message_id,
                source: Box::new(source),
            })?;
            accepted.push(message);
        }

        self.transport.publish_batch(ctx, accepted).map_err(Into::into)
    }

    pub fn start(&self, ctx: &Context) -> Result<(), BusError> {
        self.transport.start(ctx).map_err(Into::into)
    }

    pub fn close(&self) -> Result<(), BusError> {
        self.transport.close().map_err(Into::into)
    }

    pub fn stats(&self) -> TransportStats {
        self.transport.stats()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::handler::FnHandler;
    use crate::transport::sync::SyncTransport;

    fn started_bus() -> MessageBus {
        let bus = MessageBus::new(Arc::new(SyncTransport::new()));
        bus.start(&Context::new()).unwrap();
        bus
    }

    #[test]
    fn publish_runs_middleware_before_reaching_the_transport() {
        let bus = started_bus();
        let order = Arc::new(Mutex::new(Vec::new()));

        struct Recording {
            label: &'static str,
            order: Arc<Mutex<Vec<&'static str>>>,
        }
        impl Middleware for Recording {
            fn handle(&self, ctx: &Context, msg: &mut Message, next: &ChainFn<'_>) -> Result<(), BusError> {
                self.order.lock().unwrap().push(self.label);
                next(ctx, msg)
            }
        }
        bus.r#use(Arc::new(Recording { label: "mw", order: order.clone() }));

        let o = order.clone();
        bus.subscribe(
            "test",
            Arc::new(FnHandler::new("handler", move |_ctx, _msg| {
                o.lock().unwrap().push("handler");
                Ok(())
            })),
        )
        .unwrap();

        bus.publish(&Context::new(), Message::new("test", ())).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["mw", "handler"]);
    }

    #[test]
    fn unsubscribe_stops_the_original_handler_from_receiving_messages() {
        let bus = started_bus();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handler: Arc<dyn Handler> = Arc::new(FnHandler::new("counter", move |_ctx, _msg| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        bus.subscribe("test", Arc::clone(&handler)).unwrap();
        bus.publish(&Context::new(), Message::new("test", ())).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        bus.unsubscribe("test", &handler).unwrap();
        bus.publish(&Context::new(), Message::new("test", ())).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribing_twice_fails_the_second_time() {
        let bus = started_bus();
        let handler: Arc<dyn Handler> = Arc::new(FnHandler::new("noop", |_ctx, _msg| Ok(())));
        bus.subscribe("test", Arc::clone(&handler)).unwrap();
        bus.unsubscribe("test", &handler).unwrap();
        assert!(bus.unsubscribe("test", &handler).is_err());
    }

    #[test]
    fn handler_error_hook_observes_failures_regardless_of_handler_errors_propagating() {
        let bus = started_bus();
        let observed = Arc::new(Mutex::new(None));
        let o = observed.clone();
        bus.set_handler_error_hook(move |message_type, handler_type, error| {
            *o.lock().unwrap() = Some((message_type.to_string(), handler_type.to_string(), error.to_string()));
        });

        bus.subscribe(
            "test",
            Arc::new(FnHandler::new("failing", |_ctx, _msg| Err("boom".into()))),
        )
        .unwrap();

        assert!(bus.publish(&Context::new(), Message::new("test", ())).is_err());
        let (message_type, handler_type, error) = observed.lock().unwrap().clone().unwrap();
        assert_eq!(message_type, "test");
        assert_eq!(handler_type, "failing");
        assert_eq!(error, "boom");
    }

    #[test]
    fn publish_batch_wraps_the_message_id_a_middleware_rejected() {
        let bus = started_bus();

        struct RejectById {
            reject: &'static str,
        }
        impl Middleware for RejectById {
            fn handle(&self, ctx: &Context, msg: &mut Message, next: &ChainFn<'_>) -> Result<(), BusError> {
                if msg.id() == self.reject {
                    Err(BusError::middleware(msg.id().to_string(), "rejected".into()))
                } else {
                    next(ctx, msg)
                }
            }
        }
        bus.r#use(Arc::new(RejectById { reject: "msg-2" }));

        let messages = vec![Message::with_id("msg-1", "other", ()), Message::with_id("msg-2", "other", ())];
        let err = bus.publish_batch(&Context::new(), messages).unwrap_err();
        match err {
            BusError::Batch { message_id, .. } => assert_eq!(message_id, "msg-2"),
            other => panic!("expected Batch error, got {other:?}"),
        }
    }

    #[test]
    fn publish_batch_drains_accepted_messages_through_a_single_transport_call() {
        let bus = started_bus();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe(
            "test",
            Arc::new(FnHandler::new("counter", move |_ctx, _msg| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
        )
        .unwrap();

        let messages = vec![Message::new("test", ()), Message::new("test", ()), Message::new("test", ())];
        bus.publish_batch(&Context::new(), messages).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
