//! The call-scoped context threaded through every bus/command/saga entry
//! point.
//!
//! `Context` carries an optional deadline (used by the Memory transport's
//! non-blocking publish and bounded drain) and a small typed extension map.
//! The extension map exists so the Tracing middleware (see
//! `corebus-command::middleware::tracing`) can stamp `correlation_id`,
//! `causation_id` and `trace_id` onto the context without using string keys:
//! a plain `&str` key invites accidental collisions with anything else a
//! caller might stash on the context, so extension keys are required to be
//! private, zero-sized marker types that implement [`ContextKey`].
//!
//! `Context` is cheaply `Clone` (an `Arc`-backed extension map under the
//! hood) so the Memory transport can hand a worker thread its own owned
//! copy that still shares the same underlying extensions as the publishing
//! call's context, rather than forcing every signature in the workspace to
//! thread `Arc<Context>` explicitly.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// A private extension-map key.
///
/// Implementors are expected to be zero-sized marker types that are never
/// exported outside the module that owns them, which is what keeps the key
/// private: nobody outside that module can construct the key, so nobody
/// outside it can read or clobber the value.
pub trait ContextKey: 'static {
    type Value: Clone + Send + Sync + 'static;
}

type ExtensionMap = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

/// Call-scoped context passed to every publish, dispatch and handler
/// invocation.
#[derive(Clone)]
pub struct Context {
    deadline: Option<Instant>,
    extensions: Arc<RwLock<ExtensionMap>>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            deadline: None,
            extensions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::default()
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Store a value under a private key type, overwriting any prior value.
    pub fn insert<K: ContextKey>(&self, value: K::Value) {
        self.extensions
            .write()
            .expect("context extension lock poisoned")
            .insert(TypeId::of::<K>(), Box::new(value));
    }

    /// Read a value stored under a private key type.
    pub fn get<K: ContextKey>(&self) -> Option<K::Value> {
        self.extensions
            .read()
            .expect("context extension lock poisoned")
            .get(&TypeId::of::<K>())
            .and_then(|boxed| boxed.downcast_ref::<K::Value>())
            .cloned()
    }

    /// A fresh context carrying no deadline and no extensions, detached from
    /// any caller's context. Used where a subsystem cannot meaningfully
    /// forward an inherited context (e.g. a background sweeper thread).
    pub fn detached() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestKey;
    impl ContextKey for TestKey {
        type Value = String;
    }

    struct OtherKey;
    impl ContextKey for OtherKey {
        type Value = u32;
    }

    #[test]
    fn stores_and_retrieves_by_private_key() {
        let ctx = Context::new();
        assert!(ctx.get::<TestKey>().is_none());

        ctx.insert::<TestKey>("hello".to_string());
        assert_eq!(ctx.get::<TestKey>(), Some("hello".to_string()));

        ctx.insert::<OtherKey>(42);
        assert_eq!(ctx.get::<OtherKey>(), Some(42));
        // Distinct key types never collide even with the same value type.
        assert_eq!(ctx.get::<TestKey>(), Some("hello".to_string()));
    }

    #[test]
    fn clone_shares_extensions() {
        let ctx = Context::new();
        ctx.insert::<TestKey>("shared".to_string());

        let cloned = ctx.clone();
        assert_eq!(cloned.get::<TestKey>(), Some("shared".to_string()));

        cloned.insert::<OtherKey>(7);
        assert_eq!(ctx.get::<OtherKey>(), Some(7));
    }

    #[test]
    fn deadline_expiry() {
        let ctx = Context::with_deadline(Instant::now() - std::time::Duration::from_secs(1));
        assert!(ctx.is_expired());

        let ctx = Context::with_deadline(Instant::now() + std::time::Duration::from_secs(60));
        assert!(!ctx.is_expired());
    }
}
