//! The typed [`Context`] and its completion counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::binding::{ListenerKind, UiEvent};
use crate::context::Extensions;
use crate::tasks::TaskKind;

/// Per-invocation propagation context.
///
/// ## Counters
/// `finished_count` only grows, from 0 up to `reserved_count`. The call to
/// [`Context::mark_finished`] that makes them equal returns `true` and resets
/// `finished_count` to 0, so the aggregate completion is observed exactly once.
#[derive(Debug)]
pub struct Context {
    event: Option<Arc<UiEvent>>,
    target: Option<Arc<str>>,
    listener_kind: Option<ListenerKind>,
    event_type: Option<Arc<str>>,
    action: Option<Arc<str>>,
    invocation: AtomicU64,
    reserved: Vec<TaskKind>,
    reserved_count: AtomicUsize,
    finished_count: AtomicUsize,
    sequential_wait: bool,
    tolerate_interrupt_on_sync_wait: bool,
    extensions: Extensions,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            event: None,
            target: None,
            listener_kind: None,
            event_type: None,
            action: None,
            invocation: AtomicU64::new(0),
            reserved: Vec::new(),
            reserved_count: AtomicUsize::new(0),
            finished_count: AtomicUsize::new(0),
            sequential_wait: true,
            tolerate_interrupt_on_sync_wait: false,
            extensions: Extensions::new(),
        }
    }
}

impl Context {
    /// Creates an empty context (no triggering event).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context for a triggering UI event.
    ///
    /// Target, listener kind and event type are taken from the event.
    #[must_use]
    pub fn from_event(event: UiEvent) -> Self {
        let mut ctx = Self::new();
        ctx.target = Some(Arc::clone(&event.target));
        ctx.listener_kind = Some(event.kind);
        ctx.event_type = Some(Arc::clone(&event.event_type));
        ctx.event = Some(Arc::new(event));
        ctx
    }

    /// Sets the resolved target identity.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<Arc<str>>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Sets the execution mode (see [`Context::sequential_wait`]).
    #[must_use]
    pub fn with_sequential_wait(mut self, wait: bool) -> Self {
        self.sequential_wait = wait;
        self
    }

    /// Sets whether interrupted synchronous waits are tolerated.
    #[must_use]
    pub fn with_tolerate_interrupt(mut self, tolerate: bool) -> Self {
        self.tolerate_interrupt_on_sync_wait = tolerate;
        self
    }

    /// Triggering event, if the invocation came from the UI.
    pub fn event(&self) -> Option<&UiEvent> {
        self.event.as_deref()
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn listener_kind(&self) -> Option<ListenerKind> {
        self.listener_kind
    }

    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    /// Name of the action currently owning this context.
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// Id of the invocation currently owning this context (0 before invoke).
    pub fn invocation(&self) -> u64 {
        self.invocation.load(Ordering::Relaxed)
    }

    /// Task kinds reserved by the owning action, in declared order.
    pub fn reserved(&self) -> &[TaskKind] {
        &self.reserved
    }

    pub fn reserved_count(&self) -> usize {
        self.reserved_count.load(Ordering::Acquire)
    }

    pub fn finished_count(&self) -> usize {
        self.finished_count.load(Ordering::Acquire)
    }

    /// `true` (default): sequential mode. `false`: no-wait mode.
    pub fn sequential_wait(&self) -> bool {
        self.sequential_wait
    }

    pub fn set_sequential_wait(&mut self, wait: bool) {
        self.sequential_wait = wait;
    }

    /// Whether a cancelled synchronous wait is swallowed instead of reported.
    pub fn tolerate_interrupt_on_sync_wait(&self) -> bool {
        self.tolerate_interrupt_on_sync_wait
    }

    pub fn set_tolerate_interrupt_on_sync_wait(&mut self, tolerate: bool) {
        self.tolerate_interrupt_on_sync_wait = tolerate;
    }

    /// Open pass-through map shared with every task of the invocation.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Clones the context for re-invoking another action.
    ///
    /// The fork keeps the triggering event, target, flags and a shallow copy
    /// of the extension map. The owning action, reservation and counters are
    /// cleared so callbacks of the new invocation never route to the original.
    #[must_use]
    pub fn fork(&self) -> Self {
        Self {
            event: self.event.clone(),
            target: self.target.clone(),
            listener_kind: self.listener_kind,
            event_type: self.event_type.clone(),
            action: None,
            invocation: AtomicU64::new(0),
            reserved: Vec::new(),
            reserved_count: AtomicUsize::new(0),
            finished_count: AtomicUsize::new(0),
            sequential_wait: self.sequential_wait,
            tolerate_interrupt_on_sync_wait: self.tolerate_interrupt_on_sync_wait,
            extensions: self.extensions.fork(),
        }
    }

    pub(crate) fn bind_invocation(&mut self, id: u64, action: Arc<str>) {
        self.invocation.store(id, Ordering::Relaxed);
        self.action = Some(action);
    }

    /// Records the reservation and resets the counters.
    pub(crate) fn reserve(&mut self, kinds: Vec<TaskKind>) {
        self.reserved_count.store(kinds.len(), Ordering::Release);
        self.finished_count.store(0, Ordering::Release);
        self.reserved = kinds;
    }

    /// Counts one Finished signal; `true` exactly when the reservation completes.
    pub(crate) fn mark_finished(&self) -> bool {
        let reserved = self.reserved_count.load(Ordering::Acquire);
        let finished = self.finished_count.fetch_add(1, Ordering::AcqRel) + 1;
        if finished != reserved {
            return false;
        }
        self.finished_count
            .compare_exchange(reserved, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::NoopTask;

    #[test]
    fn test_defaults() {
        let ctx = Context::new();
        assert!(ctx.sequential_wait());
        assert!(!ctx.tolerate_interrupt_on_sync_wait());
        assert_eq!(ctx.reserved_count(), 0);
        assert!(ctx.action().is_none());
    }

    #[test]
    fn test_from_event_copies_identity() {
        let ev = UiEvent::new("save-button", ListenerKind::Action, "actionPerformed");
        let ctx = Context::from_event(ev);
        assert_eq!(ctx.target(), Some("save-button"));
        assert_eq!(ctx.listener_kind(), Some(ListenerKind::Action));
        assert_eq!(ctx.event_type(), Some("actionPerformed"));
        assert!(ctx.event().is_some());
    }

    #[test]
    fn test_mark_finished_fires_once_and_resets() {
        let mut ctx = Context::new();
        ctx.reserve(vec![TaskKind::of::<NoopTask>(); 3]);
        assert!(!ctx.mark_finished());
        assert!(!ctx.mark_finished());
        assert_eq!(ctx.finished_count(), 2);
        assert!(ctx.mark_finished());
        assert_eq!(ctx.finished_count(), 0);
    }

    #[test]
    fn test_fork_resets_counters_and_keeps_extension_refs() {
        let mut ctx = Context::new().with_tolerate_interrupt(true);
        ctx.bind_invocation(9, Arc::from("outer"));
        ctx.reserve(vec![TaskKind::of::<NoopTask>(); 2]);
        ctx.mark_finished();
        ctx.extensions().insert("customer", String::from("ACME"));

        let forked = ctx.fork();
        assert_eq!(forked.reserved_count(), 0);
        assert_eq!(forked.finished_count(), 0);
        assert_eq!(forked.invocation(), 0);
        assert!(forked.action().is_none());
        assert!(forked.reserved().is_empty());
        assert!(forked.tolerate_interrupt_on_sync_wait());

        let a = ctx.extensions().get::<String>("customer").unwrap();
        let b = forked.extensions().get::<String>("customer").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!forked.extensions().same_map(ctx.extensions()));
    }
}
