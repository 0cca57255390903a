//! Serializes command execution per aggregate (or per aggregate-type) to
//! prevent concurrent-write races on the same domain entity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use corebus_core::{Context, MetadataValue};
use corebus_messaging::{BusError, ChainFn, Message, Middleware};

use crate::command::{metadata_keys, COMMAND_MESSAGE_TYPE};

/// Locking granularity: one lock per aggregate instance, or one lock
/// shared by every instance of an aggregate type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockGranularity {
    Aggregate,
    Type,
}

/// An observability snapshot of [`AggregateLockMiddleware`]'s current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AggregateLockStats {
    pub held_locks: usize,
}

/// Commands with `aggregate_id == 0` (under [`LockGranularity::Aggregate`])
/// or an empty `aggregate_type` (under [`LockGranularity::Type`]) pass
/// through unlocked — there's no domain entity to serialize against.
pub struct AggregateLockMiddleware {
    granularity: LockGranularity,
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    held: AtomicUsize,
}

impl AggregateLockMiddleware {
    pub fn new(granularity: LockGranularity) -> Self {
        Self {
            granularity,
            locks: RwLock::new(HashMap::new()),
            held: AtomicUsize::new(0),
        }
    }

    /// Reset the lock map. Callers must ensure no commands are in flight;
    /// this does not wait for or cancel anything holding a lock.
    pub fn clear(&self) {
        self.locks.write().expect("aggregate lock map poisoned").clear();
    }

    /// The number of aggregate (or aggregate-type) locks currently held by
    /// an in-flight command, mirroring `ExecutorStats::current_running`.
    pub fn stats(&self) -> AggregateLockStats {
        AggregateLockStats {
            held_locks: self.held.load(Ordering::SeqCst),
        }
    }

    fn lock_key(&self, message: &Message) -> Option<String> {
        match self.granularity {
            LockGranularity::Aggregate => {
                let id = message
                    .get_metadata(metadata_keys::AGGREGATE_ID)
                    .and_then(MetadataValue::as_i64)
                    .unwrap_or(0);
                (id != 0).then(|| id.to_string())
            }
            LockGranularity::Type => {
                let ty = message
                    .get_metadata(metadata_keys::AGGREGATE_TYPE)
                    .and_then(MetadataValue::as_str)
                    .unwrap_or("");
                (!ty.is_empty()).then(|| ty.to_string())
            }
        }
    }

    /// Read-lock lookup first, then a double-checked write-lock insertion,
    /// so two racing callers for a brand-new key never each create and use
    /// a distinct lock.
    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        if let Some(existing) = self.locks.read().expect("aggregate lock map poisoned").get(key) {
            return Arc::clone(existing);
        }
        let mut locks = self.locks.write().expect("aggregate lock map poisoned");
        Arc::clone(locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))))
    }
}

impl Middleware for AggregateLockMiddleware {
    fn handle(&self, ctx: &Context, message: &mut Message, next: &ChainFn<'_>) -> Result<(), BusError> {
        if message.message_type() != COMMAND_MESSAGE_TYPE {
            return next(ctx, message);
        }
        let Some(key) = self.lock_key(message) else {
            return next(ctx, message);
        };
        let lock = self.lock_for(&key);
        let _guard = lock.lock().expect("aggregate lock poisoned");
        self.held.fetch_add(1, Ordering::SeqCst);
        let result = next(ctx, message);
        self.held.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
