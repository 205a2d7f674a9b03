//! # actionvisor
//!
//! **Actionvisor** is an event-to-action-to-task orchestration engine for
//! desktop controllers.
//!
//! UI events (a button press, a focus change, a document edit) are bound to
//! *actions*. An action reserves a list of *tasks*, runs them sequentially or
//! concurrently on a tokio runtime, reacts to their completion signals and
//! reports a single aggregate completion. The crate is a building block for
//! controller layers that sit between a UI toolkit and the application logic.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   toolkit widget ──► ListenerAdapter ──► Dispatcher::handle_event(UiEvent)
//!                                              │
//! ┌────────────────────────────────────────────▼──────────────────────┐
//! │  Dispatcher (facade)                                              │
//! │  - BindingRegistry (target, kind, event type) → ActionKind        │
//! │  - duplicate guard (one running invocation per UI source)         │
//! │  - Bus (broadcast events) + SubscriberSet                         │
//! │  - TimerRegistry, ErrorSink, worker semaphore                     │
//! └──────┬────────────────────────────────────────────────────────────┘
//!        ▼
//! ┌──────────────────────┐   spawn    ┌──────────────┐ ┌──────────────┐
//! │  invocation driver   │ ─────────► │ task worker  │ │ task worker  │
//! │  (action hooks,      │            │ (lifecycle)  │ │ (lifecycle)  │
//! │   strategy, pump)    │ ◄───────── └──────────────┘ └──────────────┘
//! └──────────────────────┘  CompletionSignal (Success / Failure / Finished)
//! ```
//!
//! ### Invocation lifecycle
//! ```text
//! prepare ─► validators ─► reserve_tasks ─► sequential_wait
//!   │
//!   ├─ sequential: before_task(i, prev, next) ─► start ─► wait first outcome ─► i+1
//!   └─ no-wait:    before_task(i, None, next) ─► start ─► i+1
//!   │
//!   ├─ Success  ─► on_task_success
//!   ├─ Failure  ─► on_task_failure ─► (forwarded) ErrorSink
//!   └─ Finished ─► counter; the last one ─► on_all_tasks_done ─► on_invocation_done
//! ```
//!
//! ## Features
//! | Area              | Description                                                      | Key types / traits                                   |
//! |-------------------|------------------------------------------------------------------|------------------------------------------------------|
//! | **Bindings**      | Route UI events to actions.                                      | [`BindingRegistry`], [`ListenerAdapter`], [`Toolkit`] |
//! | **Actions**       | Hook-based controller logic, with two simplified variants.       | [`ActionHandler`], [`FlexibleAction`], [`DispatchAction`] |
//! | **Tasks**         | Units of work with a fixed lifecycle and completion signals.     | [`TaskUnit`], [`TaskKind`], [`SignalEmitter`]        |
//! | **Validation**    | Declarative checks on UI target values.                          | [`Validator`], [`Required`], [`Pattern`]             |
//! | **Context**       | Per-invocation state and shared stores.                          | [`Context`], [`Extensions`]                          |
//! | **Timers**        | Periodic tasks keyed by timer id.                                | [`TimerTask`], [`TimerRegistry`]                     |
//! | **Subscriber API**| Hook into runtime events (logging, metrics, custom subscribers). | [`Subscribe`]                                        |
//! | **Errors**        | Typed errors and a global sink.                                  | [`TaskError`], [`ActionError`], [`ErrorSink`]        |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use actionvisor::{
//!     ActionError, ActionHandler, ActionKind, Context, Dispatcher, DispatcherConfig,
//!     InvocationOutcome, NoopTask, TaskKind,
//! };
//!
//! #[derive(Default)]
//! struct Save;
//!
//! impl ActionHandler for Save {
//!     fn reserve_tasks(&mut self, _ctx: &mut Context) -> Result<Vec<TaskKind>, ActionError> {
//!         Ok(vec![TaskKind::of::<NoopTask>(), TaskKind::of::<NoopTask>()])
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dispatcher = Dispatcher::builder(DispatcherConfig::default()).build()?;
//!
//!     let report = dispatcher.invoke(&ActionKind::of::<Save>(), Context::new()).await;
//!     assert_eq!(report.outcome, InvocationOutcome::Completed);
//!     assert_eq!(report.reserved, 2);
//!
//!     dispatcher.shutdown().await;
//!     Ok(())
//! }
//! ```
mod actions;
mod binding;
mod config;
mod context;
mod core;
mod error;
mod events;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use actions::{
    ActionHandler, ActionKind, ByteLength, CallbackMapping, CharLength, DispatchAction,
    FlexibleAction, OnFailure, OnSuccess, Pattern, Required, ValidationError, ValidationErrors,
    Validator, run_validators,
};
pub use binding::{BindingRegistry, ListenerAdapter, ListenerKind, Toolkit, UiEvent, ValueSource};
pub use config::DispatcherConfig;
pub use context::{Context, Extensions, Payload};
pub use core::{
    Dispatcher, DispatcherBuilder, ErrorSink, InvocationHandle, InvocationOutcome,
    InvocationReport, LogSink, WeakDispatcher,
};
pub use error::{ActionError, DispatchError, TaskError};
pub use events::{Bus, Event, EventKind, EventScope};
pub use subscribers::Subscribe;
pub use tasks::{
    AsAny, CompletionSignal, NoopTask, PendingTask, SignalEmitter, SignalKind, TaskContext,
    TaskInfo, TaskKind, TaskUnit, TimerCommand, TimerRegistry, TimerTask,
};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
