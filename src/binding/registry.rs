//! Three-level lookup from UI targets to action kinds.

use std::collections::{BTreeSet, HashMap};

use crate::actions::ActionKind;
use crate::binding::ListenerKind;

type EventTypes = HashMap<String, ActionKind>;
type Kinds = HashMap<ListenerKind, EventTypes>;

/// Registry of `(target, listener kind, event type) → ActionKind` bindings.
///
/// At most one action per exact triple; the last registration wins.
/// Removing something that is not bound is a no-op. Empty inner maps are
/// pruned so [`BindingRegistry::is_bound`] stays accurate.
#[derive(Default)]
pub struct BindingRegistry {
    targets: HashMap<String, Kinds>,
}

impl BindingRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds an action to the triple, returning the action it replaced.
    pub fn bind(
        &mut self,
        target: impl Into<String>,
        kind: ListenerKind,
        event_type: impl Into<String>,
        action: ActionKind,
    ) -> Option<ActionKind> {
        self.targets
            .entry(target.into())
            .or_default()
            .entry(kind)
            .or_default()
            .insert(event_type.into(), action)
    }

    /// Looks up the action bound to the triple.
    pub fn resolve(&self, target: &str, kind: ListenerKind, event_type: &str) -> Option<&ActionKind> {
        self.targets.get(target)?.get(&kind)?.get(event_type)
    }

    /// Listener kinds that have at least one binding on `target`.
    pub fn listener_kinds_for(&self, target: &str) -> BTreeSet<ListenerKind> {
        self.targets
            .get(target)
            .map(|kinds| kinds.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Event types bound for `(target, kind)`.
    pub fn event_types_for(&self, target: &str, kind: ListenerKind) -> BTreeSet<String> {
        self.targets
            .get(target)
            .and_then(|kinds| kinds.get(&kind))
            .map(|types| types.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Removes every binding of `target`.
    pub fn unbind_target(&mut self, target: &str) {
        self.targets.remove(target);
    }

    /// Removes every binding of `(target, kind)`.
    pub fn unbind_kind(&mut self, target: &str, kind: ListenerKind) {
        if let Some(kinds) = self.targets.get_mut(target) {
            kinds.remove(&kind);
            if kinds.is_empty() {
                self.targets.remove(target);
            }
        }
    }

    /// Removes the binding of the exact triple, returning it.
    pub fn unbind(&mut self, target: &str, kind: ListenerKind, event_type: &str) -> Option<ActionKind> {
        let kinds = self.targets.get_mut(target)?;
        let types = kinds.get_mut(&kind)?;
        let removed = types.remove(event_type);
        if types.is_empty() {
            kinds.remove(&kind);
        }
        if kinds.is_empty() {
            self.targets.remove(target);
        }
        removed
    }

    /// True if anything is bound to `target`.
    pub fn is_bound(&self, target: &str) -> bool {
        self.targets.contains_key(target)
    }

    /// Names of all bound targets (unordered).
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Total number of bound triples.
    pub fn len(&self) -> usize {
        self.targets
            .values()
            .flat_map(|kinds| kinds.values())
            .map(HashMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
