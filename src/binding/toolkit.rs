//! Capabilities the UI layer injects into the dispatcher.

use crate::binding::{ListenerAdapter, ListenerKind};
use crate::context::Payload;

/// Window/target registry of the UI toolkit.
///
/// The dispatcher never walks widget trees itself; it asks the toolkit.
pub trait Toolkit: Send + Sync + 'static {
    /// Finds a live target by name.
    fn find_target(&self, name: &str) -> Option<Payload>;

    /// Attaches the adapter to the named target.
    ///
    /// Returns `false` if the target does not exist (yet).
    fn attach(&self, adapter: ListenerAdapter) -> bool;

    /// Detaches every adapter of `kind` from the named target.
    fn detach(&self, target: &str, kind: ListenerKind);
}

/// "Get the current value of target X" capability.
///
/// Multi-valued widgets (lists, tables) return one entry per selected value.
pub trait ValueSource: Send + Sync + 'static {
    /// Current values of the named target, `None` if it is unknown.
    fn values(&self, target: &str) -> Option<Vec<String>>;
}
