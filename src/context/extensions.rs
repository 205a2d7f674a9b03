//! Open key/value map for user-defined pass-through data.
//!
//! The map is shared by reference: cloning an [`Extensions`] handle yields the
//! same underlying map, [`Extensions::fork`] yields a new map holding the same
//! value references.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Type-erased extension value.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Shared, string-keyed map of type-erased values.
///
/// Each call takes the lock for its own duration only; sequences of calls
/// from concurrently running tasks are not atomic with respect to each other.
#[derive(Clone, Default)]
pub struct Extensions {
    inner: Arc<RwLock<HashMap<String, Payload>>>,
}

impl Extensions {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, returning the previous value if any.
    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> Option<Payload> {
        self.insert_shared(key, Arc::new(value))
    }

    /// Stores an already shared value under `key`.
    pub fn insert_shared(&self, key: impl Into<String>, value: Payload) -> Option<Payload> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value)
    }

    /// Returns the value under `key` if it exists and has type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get_shared(key)?.downcast::<T>().ok()
    }

    /// Returns the type-erased value under `key`.
    pub fn get_shared(&self, key: &str) -> Option<Payload> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Removes and returns the value under `key`.
    pub fn remove(&self, key: &str) -> Option<Payload> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Snapshot of the current keys (unordered).
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies every entry into a new, independent map.
    ///
    /// Values are not deep-copied: both maps reference the same objects.
    #[must_use]
    pub fn fork(&self) -> Self {
        let copy = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Self {
            inner: Arc::new(RwLock::new(copy)),
        }
    }

    /// True when both handles point at the same underlying map.
    pub fn same_map(&self, other: &Extensions) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_get_checks_type() {
        let ext = Extensions::new();
        ext.insert("order-id", 42u64);
        assert_eq!(ext.get::<u64>("order-id").as_deref(), Some(&42));
        assert!(ext.get::<String>("order-id").is_none());
        assert!(ext.get::<u64>("missing").is_none());
    }

    #[test]
    fn test_fork_is_independent_but_shallow() {
        let ext = Extensions::new();
        ext.insert("rows", vec![1, 2, 3]);
        let forked = ext.fork();
        assert!(!forked.same_map(&ext));

        let a = ext.get_shared("rows").unwrap();
        let b = forked.get_shared("rows").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        forked.insert("only-in-fork", true);
        assert!(!ext.contains("only-in-fork"));
        forked.remove("rows");
        assert!(ext.contains("rows"));
    }

    #[test]
    fn test_clone_shares_map() {
        let ext = Extensions::new();
        let handle = ext.clone();
        handle.insert("k", "v".to_string());
        assert!(ext.same_map(&handle));
        assert_eq!(ext.len(), 1);
    }
}
