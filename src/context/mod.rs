//! # Per-invocation propagation context.
//!
//! A [`Context`] is created once per triggering UI event and threaded through
//! the action handler and every task unit it reserves. Well-known fields are
//! typed; user pass-through data lives in the open [`Extensions`] map.
//!
//! ```text
//! UiEvent ──► Context::from_event ──► Dispatcher::invoke
//!                                       │ hooks 1-4: &mut Context
//!                                       ▼
//!                                  Arc<Context> ──► TaskContext (per task)
//! ```

mod extensions;
mod propagation;

pub use extensions::{Extensions, Payload};
pub use propagation::Context;
