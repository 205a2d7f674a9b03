//! # The action handler template.
//!
//! Hooks, in calling order per invocation:
//!
//! ```text
//! 1 prepare ─false─► abort
//! 2 validators ─► run ─errors─► on_validation_fault ─► abort
//! 3 reserve_tasks            (empty ⇒ one NoopTask)
//! 4 sequential_wait
//! 5 before_task(i, prev, next)      per task, before it starts
//! 6 on_task_success(i, signal)      per Success
//! 7 on_task_failure(i, task, err)   per Failure, None suppresses
//! 8 on_all_tasks_done ─► on_invocation_done
//! ```
//!
//! Errors from hooks 1-4 pass through [`ActionHandler::trap`] and abort the
//! invocation; errors from hooks 5-8 go to the error sink while started tasks
//! keep running. Hooks are synchronous and run on the invocation driver, never
//! concurrently with each other.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::actions::validate::{ValidationErrors, Validator};
use crate::context::Context;
use crate::core::Dispatcher;
use crate::error::{ActionError, TaskError};
use crate::tasks::{CompletionSignal, PendingTask, TaskInfo, TaskKind, short_type_name};

/// User-supplied strategy invoked per UI event.
///
/// # Example
/// ```
/// use actionvisor::{ActionError, ActionHandler, ActionKind, Context, NoopTask, TaskKind};
///
/// #[derive(Default)]
/// struct Refresh;
///
/// impl ActionHandler for Refresh {
///     fn reserve_tasks(&mut self, _ctx: &mut Context) -> Result<Vec<TaskKind>, ActionError> {
///         Ok(vec![TaskKind::of::<NoopTask>()])
///     }
/// }
///
/// let kind = ActionKind::of::<Refresh>();
/// assert_eq!(kind.name(), "Refresh");
/// ```
pub trait ActionHandler: Send + 'static {
    /// Cheap synchronous preparation; `false` aborts the invocation.
    fn prepare(&mut self, _ctx: &mut Context) -> Result<bool, ActionError> {
        Ok(true)
    }

    /// Validators to run against the current target values.
    fn validators(&mut self, _ctx: &Context) -> Vec<Box<dyn Validator>> {
        Vec::new()
    }

    /// Called when at least one validator failed; the invocation then aborts.
    fn on_validation_fault(&mut self, _ctx: &Context, _errors: &ValidationErrors) -> Result<(), ActionError> {
        Ok(())
    }

    /// Declares the ordered task kinds to run.
    fn reserve_tasks(&mut self, _ctx: &mut Context) -> Result<Vec<TaskKind>, ActionError> {
        Ok(Vec::new())
    }

    /// `true`: sequential mode, `false`: no-wait mode.
    fn sequential_wait(&mut self, ctx: &Context) -> Result<bool, ActionError> {
        Ok(ctx.sequential_wait())
    }

    /// Called before task `index` starts; `false` cancels just that run.
    ///
    /// `next` is `None` for the end-of-reservation marker (`index == reserved count`).
    fn before_task(
        &mut self,
        _ctx: &Context,
        _index: usize,
        _prev: Option<&CompletionSignal>,
        _next: Option<&mut PendingTask>,
    ) -> Result<bool, ActionError> {
        Ok(true)
    }

    /// Called for every `Success` signal.
    fn on_task_success(&mut self, _ctx: &Context, _index: usize, _signal: &CompletionSignal) -> Result<(), ActionError> {
        Ok(())
    }

    /// Called for every `Failure` signal; `None` keeps the error away from the sink.
    fn on_task_failure(
        &mut self,
        _ctx: &Context,
        _index: usize,
        _task: &TaskInfo,
        error: TaskError,
    ) -> Option<TaskError> {
        Some(error)
    }

    /// All reserved tasks finished.
    fn on_all_tasks_done(&mut self, _ctx: &Context) -> Result<(), ActionError> {
        Ok(())
    }

    /// The invocation is done, whatever the success/failure mix.
    fn on_invocation_done(&mut self, _ctx: &Context) -> Result<(), ActionError> {
        Ok(())
    }

    /// Maps an error raised by hooks 1-4; `None` swallows it.
    fn trap(&mut self, err: ActionError) -> Option<ActionError> {
        Some(err)
    }
}

type ActionFactory = dyn Fn(&Dispatcher) -> Box<dyn ActionHandler> + Send + Sync;

/// Named factory producing a fresh [`ActionHandler`] per invocation.
#[derive(Clone)]
pub struct ActionKind {
    name: Cow<'static, str>,
    factory: Arc<ActionFactory>,
}

impl ActionKind {
    /// Kind backed by `T::default()`, named after the type.
    pub fn of<T: ActionHandler + Default>() -> Self {
        Self::new(short_type_name::<T>(), |_| T::default())
    }

    /// Kind backed by a factory that may capture the dispatcher.
    pub fn new<F, T>(name: impl Into<Cow<'static, str>>, factory: F) -> Self
    where
        F: Fn(&Dispatcher) -> T + Send + Sync + 'static,
        T: ActionHandler,
    {
        Self {
            name: name.into(),
            factory: Arc::new(move |d| Box::new(factory(d)) as Box<dyn ActionHandler>),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn instantiate(&self, dispatcher: &Dispatcher) -> Box<dyn ActionHandler> {
        (self.factory)(dispatcher)
    }
}

impl fmt::Debug for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActionKind").field(&self.name).finish()
    }
}
