//! Suppresses duplicate command executions keyed by `command_id`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use corebus_core::Context;
use corebus_messaging::{BusError, ChainFn, Message, Middleware};

use crate::command::COMMAND_MESSAGE_TYPE;

const DEFAULT_TTL: Duration = Duration::from_secs(3600);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(600);
const SWEEPER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// TTL and sweep-interval sizing for [`IdempotencyMiddleware`], defaulting
/// to a 1h TTL swept every 10min.
#[derive(Debug, Clone, Copy)]
pub struct IdempotencyConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl IdempotencyConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }
}

/// Records `(command_id → first_execution_timestamp)` for successful
/// executions, with a TTL-bounded background sweeper and a per-command-id
/// lock so concurrent publishes of the same id serialize instead of both
/// running the handler.
pub struct IdempotencyMiddleware {
    ttl: Duration,
    sweep_interval: Duration,
    seen: Arc<RwLock<HashMap<String, Instant>>>,
    per_id_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    stopped: Arc<AtomicBool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl IdempotencyMiddleware {
    /// Defaults: 1h TTL, 10min sweep interval.
    pub fn new() -> Arc<Self> {
        Self::with_config(IdempotencyConfig::default())
    }

    pub fn with_config(config: IdempotencyConfig) -> Arc<Self> {
        let middleware = Arc::new(Self {
            ttl: config.ttl,
            sweep_interval: config.sweep_interval,
            seen: Arc::new(RwLock::new(HashMap::new())),
            per_id_locks: RwLock::new(HashMap::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            sweeper: Mutex::new(None),
        });
        middleware.spawn_sweeper();
        middleware
    }

    fn spawn_sweeper(self: &Arc<Self>) {
        let seen = Arc::clone(&self.seen);
        let stopped = Arc::clone(&self.stopped);
        let ttl = self.ttl;
        let sweep_interval = self.sweep_interval;
        let handle = thread::Builder::new()
            .name("corebus-idempotency-sweeper".to_string())
            .spawn(move || {
                let mut elapsed = Duration::ZERO;
                while !stopped.load(Ordering::SeqCst) {
                    thread::sleep(SWEEPER_POLL_INTERVAL);
                    elapsed += SWEEPER_POLL_INTERVAL;
                    if elapsed < sweep_interval {
                        continue;
                    }
                    elapsed = Duration::ZERO;
                    let now = Instant::now();
                    seen.write()
                        .expect("idempotency map poisoned")
                        .retain(|_, recorded_at| now.duration_since(*recorded_at) < ttl);
                }
            })
            .expect("failed to spawn idempotency sweeper");
        *self.sweeper.lock().expect("sweeper handle poisoned") = Some(handle);
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        if let Some(existing) = self.per_id_locks.read().expect("per-id lock map poisoned").get(id) {
            return Arc::clone(existing);
        }
        let mut locks = self.per_id_locks.write().expect("per-id lock map poisoned");
        Arc::clone(locks.entry(id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    /// Signal the sweeper to exit and wait for it. Idempotent: a second
    /// call is a no-op.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.sweeper.lock().expect("sweeper handle poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for IdempotencyMiddleware {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Middleware for IdempotencyMiddleware {
    fn handle(&self, ctx: &Context, message: &mut Message, next: &ChainFn<'_>) -> Result<(), BusError> {
        if message.message_type() != COMMAND_MESSAGE_TYPE {
            return next(ctx, message);
        }
        let id = message.id().to_string();
        if id.is_empty() {
            return next(ctx, message);
        }

        let lock = self.lock_for(&id);
        let _guard = lock.lock().expect("per-command idempotency lock poisoned");

        if self.seen.read().expect("idempotency map poisoned").contains_key(&id) {
            return Ok(());
        }

        let result = next(ctx, message);
        if result.is_ok() {
            self.seen.write().expect("idempotency map poisoned").insert(id, Instant::now());
        }
        result
    }
}
