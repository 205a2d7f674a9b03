//! Supported UI event kinds and the adapter that forwards them.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::context::Payload;
use crate::core::WeakDispatcher;

/// Closed set of listener kinds a toolkit can attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ListenerKind {
    /// Button presses, menu selections, text field commits.
    Action,
    Mouse,
    MouseMotion,
    Key,
    Focus,
    /// Selection changes on lists, combos and check boxes.
    Item,
    /// Value changes on sliders, spinners, tabs.
    Change,
    /// Text document edits.
    Document,
    Window,
    Container,
}

impl ListenerKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ListenerKind::Action => "action",
            ListenerKind::Mouse => "mouse",
            ListenerKind::MouseMotion => "mouse_motion",
            ListenerKind::Key => "key",
            ListenerKind::Focus => "focus",
            ListenerKind::Item => "item",
            ListenerKind::Change => "change",
            ListenerKind::Document => "document",
            ListenerKind::Window => "window",
            ListenerKind::Container => "container",
        }
    }
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// A raw UI event as delivered by the toolkit.
///
/// `source_id` identifies the concrete widget instance; it defaults to the
/// target name and keys the duplicate-invoke guard.
#[derive(Clone)]
pub struct UiEvent {
    pub target: Arc<str>,
    pub source_id: Arc<str>,
    pub kind: ListenerKind,
    pub event_type: Arc<str>,
    pub payload: Option<Payload>,
}

impl UiEvent {
    pub fn new(target: impl Into<Arc<str>>, kind: ListenerKind, event_type: impl Into<Arc<str>>) -> Self {
        let target = target.into();
        Self {
            source_id: Arc::clone(&target),
            target,
            kind,
            event_type: event_type.into(),
            payload: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source_id: impl Into<Arc<str>>) -> Self {
        self.source_id = source_id.into();
        self
    }

    /// Attaches toolkit-specific event data (coordinates, key codes, ...).
    #[must_use]
    pub fn with_payload<T: std::any::Any + Send + Sync>(mut self, payload: T) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    /// Returns the payload if it has type `T`.
    pub fn payload<T: std::any::Any + Send + Sync>(&self) -> Option<&T> {
        self.payload.as_deref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for UiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiEvent")
            .field("target", &self.target)
            .field("source_id", &self.source_id)
            .field("kind", &self.kind)
            .field("event_type", &self.event_type)
            .field("payload", &self.payload.is_some())
            .finish()
    }
}

/// Callback a toolkit attaches to one widget for one listener kind.
///
/// Only the event types it was created with are forwarded; everything else
/// fired at it is ignored. It holds the dispatcher weakly, so a widget that
/// outlives the dispatcher fires into nothing.
#[derive(Clone)]
pub struct ListenerAdapter {
    dispatcher: WeakDispatcher,
    target: Arc<str>,
    kind: ListenerKind,
    event_types: Arc<BTreeSet<String>>,
}

impl ListenerAdapter {
    pub(crate) fn new(
        dispatcher: WeakDispatcher,
        target: Arc<str>,
        kind: ListenerKind,
        event_types: BTreeSet<String>,
    ) -> Self {
        Self {
            dispatcher,
            target,
            kind,
            event_types: Arc::new(event_types),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.event_types.iter().map(String::as_str)
    }

    pub fn handles(&self, event_type: &str) -> bool {
        self.event_types.contains(event_type)
    }

    /// Forwards one event fired by the widget.
    ///
    /// Returns `false` if the event type is not handled or the dispatcher is gone.
    pub fn fire(&self, event_type: &str) -> bool {
        self.fire_event(UiEvent::new(Arc::clone(&self.target), self.kind, event_type))
    }

    /// Forwards a fully built event (custom source id or payload).
    pub fn fire_event(&self, mut event: UiEvent) -> bool {
        if !self.handles(&event.event_type) {
            return false;
        }
        let Some(dispatcher) = self.dispatcher.upgrade() else {
            return false;
        };
        event.kind = self.kind;
        let _ = dispatcher.handle_event(event);
        true
    }
}

impl fmt::Debug for ListenerAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerAdapter")
            .field("target", &self.target)
            .field("kind", &self.kind)
            .field("event_types", &self.event_types)
            .finish()
    }
}
