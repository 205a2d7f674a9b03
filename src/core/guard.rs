//! Duplicate-invoke guard keyed by UI source id.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Set of UI sources whose invocation is still running.
#[derive(Default)]
pub(crate) struct DuplicateGuard {
    active: Arc<Mutex<HashSet<Arc<str>>>>,
}

/// Held by a running invocation; releases its source on drop.
pub(crate) struct GuardTicket {
    active: Arc<Mutex<HashSet<Arc<str>>>>,
    source: Arc<str>,
}

impl DuplicateGuard {
    /// Marks `source` busy, or returns `None` if it already is.
    pub(crate) fn try_acquire(&self, source: &Arc<str>) -> Option<GuardTicket> {
        let inserted = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Arc::clone(source));
        inserted.then(|| GuardTicket {
            active: Arc::clone(&self.active),
            source: Arc::clone(source),
        })
    }

    pub(crate) fn is_busy(&self, source: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(source)
    }
}

impl Drop for GuardTicket {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let guard = DuplicateGuard::default();
        let src: Arc<str> = Arc::from("save-button");
        let ticket = guard.try_acquire(&src).unwrap();
        assert!(guard.try_acquire(&src).is_none());
        assert!(guard.is_busy("save-button"));
        assert!(guard.try_acquire(&Arc::from("other")).is_some());
        drop(ticket);
        assert!(!guard.is_busy("save-button"));
        assert!(guard.try_acquire(&src).is_some());
    }
}
