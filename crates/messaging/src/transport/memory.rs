//! The bounded-queue, worker-pool transport.
//!
//! `publish` admits a message to a bounded FIFO iff the transport is
//! running and the queue has room; otherwise it returns `QueueFull`
//! immediately rather than blocking. A fixed pool of worker threads drains
//! the queue, each popping one `(Context, Message)` pair at a time and
//! fanning it out to the handlers registered for its type plus the
//! wildcard handlers, exactly as `SyncTransport` does, just off the
//! publisher's thread. Handler errors are logged, never surfaced through
//! `publish`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use corebus_core::Context;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::warn;

use crate::error::TransportError;
use crate::handler::Handler;
use crate::message::Message;

use super::subscription::SubscriptionTable;
use super::{Transport, TransportKind, TransportStats};

const DEFAULT_QUEUE_SIZE: usize = 1000;
const DEFAULT_WORKER_COUNT: usize = 4;
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(50);
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Queue capacity and worker-pool sizing, defaulting to a 1000-item queue
/// drained by 4 workers.
#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    pub queue_size: usize,
    pub worker_count: usize,
    pub drain_timeout: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            worker_count: DEFAULT_WORKER_COUNT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl MemoryConfig {
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }
}

type QueueItem = (Context, Message);

/// Bounded-queue transport backed by a fixed worker-thread pool.
pub struct MemoryTransport {
    table: Arc<SubscriptionTable>,
    sender: Sender<QueueItem>,
    receiver: Receiver<QueueItem>,
    running: Arc<AtomicBool>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    active_workers: Arc<AtomicUsize>,
    config: MemoryConfig,
}

impl MemoryTransport {
    /// Construct with the default sizing (queue=1000, workers=4).
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    /// Construct with explicit sizing. Panics if `worker_count` is zero;
    /// production use must have at least one worker draining the queue. Use
    /// [`MemoryTransport::new_for_test`] to validate drain behavior with no
    /// workers running.
    pub fn with_config(config: MemoryConfig) -> Self {
        assert!(
            config.worker_count >= 1,
            "MemoryTransport requires at least one worker; use new_for_test for a 0-worker instance"
        );
        Self::build(config)
    }

    /// Construct a transport with however many workers `config` specifies,
    /// including zero — intended for exercising `close`'s bounded-drain
    /// failure mode, where nothing is ever draining the queue.
    pub fn new_for_test(config: MemoryConfig) -> Self {
        Self::build(config)
    }

    fn build(config: MemoryConfig) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(config.queue_size);
        Self {
            table: Arc::new(SubscriptionTable::default()),
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            workers: std::sync::Mutex::new(Vec::new()),
            active_workers: Arc::new(AtomicUsize::new(0)),
            config,
        }
    }

    /// Bounded drain with an explicit timeout, overriding the configured
    /// default. See the module docs for the drain strategy.
    pub fn close_with_timeout(&self, timeout: Duration) -> Result<(), TransportError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(TransportError::NotStarted);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let drained = self.receiver.is_empty() && self.active_workers.load(Ordering::SeqCst) == 0;
            if drained || Instant::now() >= deadline {
                break;
            }
            thread::sleep(DRAIN_POLL_INTERVAL);
        }

        let mut workers = self.workers.lock().expect("worker handle list poisoned");
        let pending = self.receiver.len();
        if pending == 0 && self.active_workers.load(Ordering::SeqCst) == 0 {
            for handle in workers.drain(..) {
                let _ = handle.join();
            }
            Ok(())
        } else {
            // Workers may still be draining in the background; we don't
            // block the caller any further than the requested deadline.
            Err(TransportError::DrainTimeout { pending })
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn dispatch(table: &SubscriptionTable, ctx: &Context, message: &Message) {
    for handler in table.handlers_for(message.message_type()) {
        if let Err(error) = handler.handle(ctx, message) {
            warn!(
                handler = handler.type_name(),
                message_id = message.id(),
                message_type = message.message_type(),
                error = %error,
                "memory transport handler failed"
            );
        }
    }
}

fn worker_loop(
    table: Arc<SubscriptionTable>,
    receiver: Receiver<QueueItem>,
    running: Arc<AtomicBool>,
    active_workers: Arc<AtomicUsize>,
) {
    loop {
        match receiver.recv_timeout(WORKER_POLL_INTERVAL) {
            Ok((ctx, message)) => dispatch(&table, &ctx, &message),
            Err(RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::SeqCst) && receiver.is_empty() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    active_workers.fetch_sub(1, Ordering::SeqCst);
}

impl Transport for MemoryTransport {
    fn publish(&self, ctx: &Context, message: Message) -> Result<(), TransportError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(TransportError::NotRunning);
        }
        if ctx.is_expired() {
            return Err(TransportError::Cancelled);
        }
        match self.sender.try_send((ctx.clone(), message)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TransportError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(TransportError::NotRunning),
        }
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
            return Err(TransportError::AlreadyStarted);
        }

        let mut workers = self.workers.lock().expect("worker handle list poisoned");
        self.active_workers.store(self.config.worker_count, Ordering::SeqCst);
        for i in 0..self.config.worker_count {
            let table = Arc::clone(&self.table);
            let receiver = self.receiver.clone();
            let running = Arc::clone(&self.running);
            let active_workers = Arc::clone(&self.active_workers);
            let handle = thread::Builder::new()
                .name(format!("corebus-memory-worker-{i}"))
                .spawn(move || worker_loop(table, receiver, running, active_workers))
                .expect("failed to spawn memory transport worker");
            workers.push(handle);
        }
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        self.close_with_timeout(self.config.drain_timeout)
    }

    fn stats(&self) -> TransportStats {
        TransportStats {
            running: self.running.load(Ordering::SeqCst),
            handler_count: self.table.handler_count(),
            message_types: self.table.message_type_count(),
            queue_size: self.config.queue_size,
            queue_depth: self.receiver.len(),
            worker_count: self.config.worker_count,
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Memory
    }
}
