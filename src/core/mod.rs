//! # Core orchestration: dispatcher, invocation driver and strategies.
//!
//! - [`Dispatcher`] / [`DispatcherBuilder`]: public facade and its construction
//! - [`InvocationHandle`] / [`InvocationReport`]: result of one action invocation
//! - [`ErrorSink`] / [`LogSink`]: destination of every unhandled error
//!
//! The invocation driver and the sequential / no-wait strategies are internal.

mod builder;
mod dispatcher;
mod guard;
mod invocation;
mod no_wait;
mod sequential;
mod sink;

#[cfg(test)]
mod tests;

pub use builder::DispatcherBuilder;
pub use dispatcher::{Dispatcher, WeakDispatcher};
pub use invocation::{InvocationHandle, InvocationOutcome, InvocationReport};
pub use sink::{ErrorSink, LogSink};
