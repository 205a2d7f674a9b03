//! # Task units, signals and their lifecycle runner.
//!
//! - [`TaskUnit`]: one asynchronous unit of work with a fixed lifecycle
//! - [`TaskKind`]: named factory, reserved by actions
//! - [`PendingTask`]: an instance the action can configure before it starts
//! - [`CompletionSignal`] / [`SignalEmitter`]: Success, Failure, Finished
//! - [`NoopTask`], [`TimerTask`]: built-in units

mod noop;
pub(crate) mod runner;
mod signal;
mod task;
mod timer;

pub use noop::NoopTask;
pub use signal::{CompletionSignal, SignalEmitter, SignalKind, TaskInfo};
pub use task::{AsAny, PendingTask, TaskContext, TaskKind, TaskUnit};
pub(crate) use task::short_type_name;
pub use timer::{TimerCommand, TimerRegistry, TimerTask};
