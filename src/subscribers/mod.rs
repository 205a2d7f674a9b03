//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the internal `SubscriberSet` fan-out
//! and (behind the `logging` feature) the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Invocation ── publish(Event) ──► Bus ──► Dispatcher listener ──► SubscriberSet::emit
//!                                                                    │
//!                                                     ┌──────────────┼──────────────┐
//!                                                     ▼              ▼              ▼
//!                                                 LogWriter       Metrics        Custom
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use actionvisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct FailureCounter;
//!
//! #[async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::TaskFailed {
//!             // increment failure counter
//!         }
//!     }
//!     fn name(&self) -> &'static str { "failure-counter" }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub(crate) use set::SubscriberSet;
pub use subscribe::Subscribe;
