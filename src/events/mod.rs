//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the dispatcher, invocation
//! drivers, task workers, timers and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`EventScope`], [`Event`] event classification and payload metadata
//! - [`Bus`] the dispatcher-wide broadcast channel, and the per-invocation
//!   publisher that stamps invocation id and action name
//!
//! ## Quick reference
//! - **Publishers**: `Dispatcher` (facade, trapped errors), invocation drivers,
//!   `TimerRegistry`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the dispatcher's subscriber listener, which fans out to `SubscriberSet`.

mod bus;
mod event;

pub(crate) use bus::InvocationBus;
pub use bus::Bus;
pub use event::{Event, EventKind, EventScope};
