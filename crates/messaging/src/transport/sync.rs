//! The synchronous, in-caller transport.
//!
//! `publish` takes a read-lock snapshot of the handlers for the message's
//! type, releases the lock, invokes each handler in sequence on the
//! caller's thread, and returns a joined error of every handler failure (or
//! `Ok` if none failed). There is no queue and no worker pool: this is the
//! right choice for command pipelines where the caller must observe the
//! handler's own business error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use corebus_core::Context;
use tracing::instrument;

use crate::error::{HandlerFailure, TransportError};
use crate::handler::Handler;
use crate::message::Message;

use super::subscription::SubscriptionTable;
use super::{Transport, TransportKind, TransportStats};

/// Same-thread transport: handlers run inline, in registration order, on
/// the publisher's own thread.
#[derive(Default)]
pub struct SyncTransport {
    table: SubscriptionTable,
    running: AtomicBool,
}

impl SyncTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn dispatch_one(&self, ctx: &Context, message: &Message) -> Result<(), TransportError> {
        let handlers = self.table.handlers_for(message.message_type());
        let mut failures = Vec::new();
        for handler in handlers {
            if let Err(error) = handler.handle(ctx, message) {
                failures.push(HandlerFailure {
                    handler_type: handler.type_name().to_string(),
                    error,
                });
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(TransportError::handlers(failures))
        }
    }
}

impl Transport for SyncTransport {
    #[instrument(skip_all, fields(message_id = message.id(), message_type = message.message_type()))]
    fn publish(&self, ctx: &Context, message: Message) -> Result<(), TransportError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(TransportError::NotRunning);
        }
        self.dispatch_one(ctx, &message)
    }

    fn publish_batch(&self, ctx: &Context, messages: Vec<Message>) -> Result<(), TransportError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(TransportError::NotRunning);
        }
        for message in &messages {
            self.dispatch_one(ctx, message)?;
        }
        Ok(())
    }

    fn subscribe(&self, message_type: &str, handler: Arc<dyn Handler>) -> Result<(), TransportError> {
        self.table.subscribe(message_type, handler);
        Ok(())
    }

    fn unsubscribe(&self, message_type: &str, handler: &Arc<dyn Handler>) -> Result<(), TransportError> {
        if self.table.unsubscribe(message_type, handler) {
            Ok(())
        } else {
            Err(TransportError::UnknownHandler)
        }
    }

    fn start(&self, _ctx: &Context) -> Result<(), TransportError> {
        if self.running.swap(true, Ordering::SeqCst) {
            Err(TransportError::AlreadyStarted)
        } else {
            Ok(())
        }
    }

    fn close(&self) -> Result<(), TransportError> {
        if self.running.swap(false, Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::NotStarted)
        }
    }

    fn stats(&self) -> TransportStats {
        TransportStats {
            running: self.running.load(Ordering::SeqCst),
            handler_count: self.table.handler_count(),
            message_types: self.table.message_type_count(),
            queue_size: 0,
            queue_depth: 0,
            worker_count: 0,
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Sync
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::handler::FnHandler;

    fn started() -> SyncTransport {
        let t = SyncTransport::new();
        t.start(&Context::new()).unwrap();
        t
    }

    #[test]
    fn fans_out_to_handlers_in_registration_order() {
        let transport = started();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let order = order.clone();
            transport
                .subscribe(
                    "test",
                    Arc::new(FnHandler::new(label, move |_ctx, _msg| {
                        order.lock().unwrap().push(label);
                        Ok(())
                    })),
                )
                .unwrap();
        }

        transport.publish(&Context::new(), Message::new("test", ())).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn n_publishes_invoke_handler_n_times_in_order() {
        let transport = started();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        transport
            .subscribe(
                "test",
                Arc::new(FnHandler::new("counter", move |_ctx, _msg| {
                    seen2.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })),
            )
            .unwrap();

        for _ in 0..5 {
            transport.publish(&Context::new(), Message::new("test", ())).unwrap();
        }
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn joins_handler_errors() {
        let transport = started();
        transport
            .subscribe(
                "test",
                Arc::new(FnHandler::new("failing", |_ctx, _msg| Err("boom".into()))),
            )
            .unwrap();

        let err = transport.publish(&Context::new(), Message::new("test", ())).unwrap_err();
        assert!(matches!(err, TransportError::Handlers { count: 1, .. }));
    }

    #[test]
    fn publish_before_start_is_rejected() {
        let transport = SyncTransport::new();
        let err = transport.publish(&Context::new(), Message::new("test", ())).unwrap_err();
        assert!(matches!(err, TransportError::NotRunning));
    }

    #[test]
    fn double_start_and_unstarted_close_are_errors() {
        let transport = started();
        assert!(matches!(
            transport.start(&Context::new()),
            Err(TransportError::AlreadyStarted)
        ));
        transport.close().unwrap();
        assert!(matches!(transport.close(), Err(TransportError::NotStarted)));
    }

    #[test]
    fn wildcard_subscribers_see_every_message_once() {
        let transport = started();
        let exact_count = Arc::new(AtomicUsize::new(0));
        let wild_count = Arc::new(AtomicUsize::new(0));

        let e = exact_count.clone();
        transport
            .subscribe(
                "order.created",
                Arc::new(FnHandler::new("exact", move |_ctx, _msg| {
                    e.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })),
            )
            .unwrap();

        let w = wild_count.clone();
        transport
            .subscribe(
                crate::WILDCARD,
                Arc::new(FnHandler::new("wild", move |_ctx, _msg| {
                    w.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })),
            )
            .unwrap();

        transport
            .publish(&Context::new(), Message::new("order.created", ()))
            .unwrap();

        assert_eq!(exact_count.load(Ordering::SeqCst), 1);
        assert_eq!(wild_count.load(Ordering::SeqCst), 1);
    }
}
