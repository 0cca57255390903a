//! The subscription table shared by both reference transports.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::handler::Handler;
use crate::WILDCARD;

/// `message_type -> ordered handlers`, including the wildcard key.
///
/// Mutated under a read/write lock; every dispatch reads a cloned snapshot
/// so the table is never observed mid-mutation, and a concurrent
/// subscribe/unsubscribe never races a dispatch in progress.
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    table: RwLock<HashMap<String, Vec<Arc<dyn Handler>>>>,
}

fn identity(handler: &Arc<dyn Handler>) -> usize {
    Arc::as_ptr(handler) as *const () as usize
}

impl SubscriptionTable {
    pub(crate) fn subscribe(&self, message_type: &str, handler: Arc<dyn Handler>) {
        let mut table = self.table.write().expect("subscription table poisoned");
        table.entry(message_type.to_string()).or_default().push(handler);
    }

    /// Remove the handler matching `handler`'s instance identity from
    /// `message_type`. Returns `true` if a matching subscription was found.
    pub(crate) fn unsubscribe(&self, message_type: &str, handler: &Arc<dyn Handler>) -> bool {
        let mut table = self.table.write().expect("subscription table poisoned");
        let Some(handlers) = table.get_mut(message_type) else {
            return false;
        };
        let target = identity(handler);
        let before = handlers.len();
        handlers.retain(|h| identity(h) != target);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            table.remove(message_type);
        }
        removed
    }

    /// Snapshot of handlers registered for `message_type`'s exact key plus
    /// every handler registered under the wildcard key, exact matches first.
    pub(crate) fn handlers_for(&self, message_type: &str) -> Vec<Arc<dyn Handler>> {
        let table = self.table.read().expect("subscription table poisoned");
        let mut out = Vec::new();
        if let Some(exact) = table.get(message_type) {
            out.extend(exact.iter().cloned());
        }
        if message_type != WILDCARD {
            if let Some(wildcard) = table.get(WILDCARD) {
                out.extend(wildcard.iter().cloned());
            }
        }
        out
    }

    pub(crate) fn handler_count(&self) -> usize {
        let table = self.table.read().expect("subscription table poisoned");
        table.values().map(Vec::len).sum()
    }

    pub(crate) fn message_type_count(&self) -> usize {
        self.table.read().expect("subscription table poisoned").len()
    }
}
