//! # UI event bindings.
//!
//! - [`BindingRegistry`]: `(target, listener kind, event type) → ActionKind`
//! - [`ListenerKind`] / [`UiEvent`]: the closed set of supported UI events
//! - [`ListenerAdapter`]: the per-(target, kind) callback a toolkit attaches
//! - [`Toolkit`] / [`ValueSource`]: capabilities injected by the UI layer
//!
//! ```text
//! toolkit widget ──fire──► ListenerAdapter ──UiEvent──► Dispatcher::handle_event
//!                                                          │ resolve
//!                                                          ▼
//!                                                   BindingRegistry
//! ```

mod listener;
mod registry;
mod toolkit;

pub use listener::{ListenerAdapter, ListenerKind, UiEvent};
pub use registry::BindingRegistry;
pub use toolkit::{Toolkit, ValueSource};
