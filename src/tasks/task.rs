//! # Task units and their factories.
//!
//! A [`TaskUnit`] is one asynchronous unit of work (an HTTP call, a query, a
//! timer) with a fixed lifecycle:
//!
//! ```text
//! factory() ─► init() ─► [before_task hook] ─► worker:
//!     preproc() ──false──────────────────────────────► Finished
//!        │ true
//!        ▼
//!     mainproc() ─► postproc()  (default: Success(result) + Finished)
//!        │ Err / panic
//!        ▼
//!     trap(err) ──Some(e)──► Failure(e) ─► Finished
//!              └─None──────────────────► Finished
//!     finalproc()  (always)
//! ... aggregate completion of the invocation ... ─► done()
//! ```
//!
//! Units are created per run from a [`TaskKind`] and reported through the
//! [`TaskContext`] they receive.
//!
//! # Example
//! ```
//! use actionvisor::{TaskContext, TaskError, TaskKind, TaskUnit, Payload};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Lookup {
//!     rows: Vec<String>,
//! }
//!
//! #[async_trait]
//! impl TaskUnit for Lookup {
//!     async fn mainproc(&mut self, cx: &TaskContext) -> Result<(), TaskError> {
//!         if cx.is_cancelled() {
//!             return Err(TaskError::Canceled);
//!         }
//!         self.rows.push("ACME".into());
//!         Ok(())
//!     }
//!
//!     fn result(&self) -> Option<Payload> {
//!         Some(Arc::new(self.rows.clone()))
//!     }
//! }
//!
//! let kind = TaskKind::of::<Lookup>();
//! assert_eq!(kind.name(), "Lookup");
//! ```

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::{Context, Extensions, Payload};
use crate::core::Dispatcher;
use crate::error::TaskError;
use crate::tasks::signal::{SignalEmitter, TaskInfo};

/// Access to the concrete type behind a `dyn TaskUnit`.
///
/// Implemented for every `'static` type; call it through a trait object
/// (`AsAny::as_any_mut(unit.as_mut())`) so the vtable of the unit is used.
pub trait AsAny: Any + Send {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Send> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// # One asynchronous unit of work.
///
/// Only [`mainproc`](TaskUnit::mainproc) is required. Hooks run on the task's
/// own worker, in the order shown in the module docs.
#[async_trait]
pub trait TaskUnit: AsAny {
    /// Called right after construction, before the owning action sees the unit.
    fn init(&mut self, _ctx: &Context) {}

    /// Whether the dispatcher proceeds without waiting for this unit.
    ///
    /// `None` follows the dispatch mode: waited for in sequential mode, not
    /// waited for in no-wait mode. `before_task` can still override it.
    fn runs_async(&self) -> Option<bool> {
        None
    }

    /// Returning `false` skips `mainproc`/`postproc`; only `Finished` is emitted.
    async fn preproc(&mut self, _cx: &TaskContext) -> Result<bool, TaskError> {
        Ok(true)
    }

    /// The concrete work.
    async fn mainproc(&mut self, cx: &TaskContext) -> Result<(), TaskError>;

    /// Reports the outcome.
    ///
    /// Override to defer `Finished` (keep a clone of [`TaskContext::emitter`])
    /// or to emit `Success` several times.
    async fn postproc(&mut self, cx: &TaskContext) -> Result<(), TaskError> {
        cx.success(self.result());
        cx.finished();
        Ok(())
    }

    /// Maps an error raised by the lifecycle; `None` suppresses the `Failure` signal.
    fn trap(&mut self, err: TaskError) -> Option<TaskError> {
        Some(err)
    }

    /// Always runs last on the worker.
    async fn finalproc(&mut self, _cx: &TaskContext) {}

    /// Called by the dispatcher once the whole invocation completed.
    fn done(&mut self) {}

    /// Result carried by the default `Success`.
    fn result(&self) -> Option<Payload> {
        None
    }
}

type TaskFactory = dyn Fn() -> Box<dyn TaskUnit> + Send + Sync;

/// Named factory producing a fresh [`TaskUnit`] per run.
#[derive(Clone)]
pub struct TaskKind {
    name: Cow<'static, str>,
    factory: Arc<TaskFactory>,
}

impl TaskKind {
    /// Kind backed by `T::default()`, named after the type.
    pub fn of<T: TaskUnit + Default>() -> Self {
        Self::new(short_type_name::<T>(), T::default)
    }

    /// Kind backed by an arbitrary factory.
    pub fn new<F, T>(name: impl Into<Cow<'static, str>>, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: TaskUnit,
    {
        Self {
            name: name.into(),
            factory: Arc::new(move || Box::new(factory()) as Box<dyn TaskUnit>),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn instantiate(&self) -> Box<dyn TaskUnit> {
        (self.factory)()
    }
}

impl fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskKind").field(&self.name).finish()
    }
}

/// Type name without its module path or generic arguments.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// A task instance that was created but not started yet.
///
/// Handed to `ActionHandler::before_task`, which may configure the unit,
/// skip it or change whether the dispatcher waits for it.
pub struct PendingTask {
    pub(crate) info: TaskInfo,
    pub(crate) unit: Box<dyn TaskUnit>,
    skip: bool,
    run_async: bool,
}

impl PendingTask {
    /// Creates and initializes the unit; `mode_async` applies when the unit has no preference.
    pub(crate) fn new(kind: &TaskKind, index: usize, ctx: &Context, mode_async: bool) -> Self {
        let mut unit = kind.instantiate();
        unit.init(ctx);
        let run_async = unit.runs_async().unwrap_or(mode_async);
        Self {
            info: TaskInfo {
                name: Arc::from(kind.name()),
                index,
            },
            unit,
            skip: false,
            run_async,
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn index(&self) -> usize {
        self.info.index
    }

    /// Skip this run; the task is marked finished without Success or Failure.
    pub fn set_skip(&mut self, skip: bool) {
        self.skip = skip;
    }

    pub fn is_skip(&self) -> bool {
        self.skip
    }

    /// Whether the dispatcher proceeds without waiting for this task.
    pub fn set_async(&mut self, run_async: bool) {
        self.run_async = run_async;
    }

    pub fn is_async(&self) -> bool {
        self.run_async
    }

    /// The concrete unit, if it has type `T`.
    pub fn unit<T: TaskUnit>(&self) -> Option<&T> {
        AsAny::as_any(self.unit.as_ref()).downcast_ref::<T>()
    }

    /// The concrete unit, mutably, if it has type `T`.
    pub fn unit_mut<T: TaskUnit>(&mut self) -> Option<&mut T> {
        AsAny::as_any_mut(self.unit.as_mut()).downcast_mut::<T>()
    }
}

impl fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTask")
            .field("info", &self.info)
            .field("skip", &self.skip)
            .field("async", &self.run_async)
            .finish()
    }
}

/// Everything a running task unit can reach.
pub struct TaskContext {
    info: TaskInfo,
    ctx: Arc<Context>,
    emitter: SignalEmitter,
    token: CancellationToken,
    dispatcher: Dispatcher,
}

impl TaskContext {
    pub(crate) fn new(
        info: TaskInfo,
        ctx: Arc<Context>,
        emitter: SignalEmitter,
        token: CancellationToken,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            info,
            ctx,
            emitter,
            token,
            dispatcher,
        }
    }

    pub fn info(&self) -> &TaskInfo {
        &self.info
    }

    pub fn index(&self) -> usize {
        self.info.index
    }

    /// Propagation context of the owning invocation.
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub fn extensions(&self) -> &Extensions {
        self.ctx.extensions()
    }

    /// Child token of the invocation; cancelled on invocation cancel or shutdown.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The dispatcher running this task (for timers, re-invocation, target lookup).
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle for reporting outside the lifecycle (deferred completion).
    pub fn emitter(&self) -> SignalEmitter {
        self.emitter.clone()
    }

    pub fn success(&self, result: Option<Payload>) -> bool {
        self.emitter.success(result)
    }

    pub fn failure(&self, error: TaskError) -> bool {
        self.emitter.failure(error)
    }

    pub fn finished(&self) -> bool {
        self.emitter.finished()
    }
}
