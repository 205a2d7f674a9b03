//! # Actions with per-task typed callbacks.
//!
//! A [`DispatchAction`] reserves its tasks through a [`CallbackMapping`]:
//! each entry pairs a task kind with optional success/failure callbacks,
//! which are plain method references of the action itself.
//!
//! ```
//! use actionvisor::{
//!     ActionError, ActionKind, CallbackMapping, CompletionSignal, Context,
//!     DispatchAction, NoopTask, TaskError, TaskInfo, TaskKind,
//! };
//!
//! #[derive(Default)]
//! struct LoadCustomer {
//!     loaded: bool,
//! }
//!
//! impl LoadCustomer {
//!     fn customer_loaded(&mut self, _ctx: &Context, _s: &CompletionSignal) -> Result<(), ActionError> {
//!         self.loaded = true;
//!         Ok(())
//!     }
//!
//!     fn customer_missing(&mut self, _ctx: &Context, _t: &TaskInfo, err: TaskError) -> Option<TaskError> {
//!         Some(err)
//!     }
//! }
//!
//! impl DispatchAction for LoadCustomer {
//!     fn reserve(&mut self, _ctx: &mut Context, mapping: &mut CallbackMapping<Self>) -> Result<(), ActionError> {
//!         mapping.add(
//!             TaskKind::of::<NoopTask>(),
//!             Some(Self::customer_loaded),
//!             Some(Self::customer_missing),
//!         );
//!         Ok(())
//!     }
//! }
//!
//! let kind = ActionKind::dispatch("load-customer", LoadCustomer::default);
//! assert_eq!(kind.name(), "load-customer");
//! ```

use crate::actions::validate::{ValidationErrors, Validator};
use crate::actions::{ActionHandler, ActionKind};
use crate::context::Context;
use crate::error::{ActionError, TaskError};
use crate::tasks::{CompletionSignal, PendingTask, TaskInfo, TaskKind};

/// Success callback of a [`CallbackMapping`] entry.
pub type OnSuccess<A> = fn(&mut A, &Context, &CompletionSignal) -> Result<(), ActionError>;

/// Failure callback of a [`CallbackMapping`] entry; `None` suppresses the error.
pub type OnFailure<A> = fn(&mut A, &Context, &TaskInfo, TaskError) -> Option<TaskError>;

struct CallbackEntry<A> {
    kind: TaskKind,
    on_success: Option<OnSuccess<A>>,
    on_failure: Option<OnFailure<A>>,
}

/// Ordered task kinds with their callbacks.
pub struct CallbackMapping<A> {
    entries: Vec<CallbackEntry<A>>,
}

impl<A> Default for CallbackMapping<A> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<A> CallbackMapping<A> {
    /// Appends a task kind; its index is the current length.
    pub fn add(&mut self, kind: TaskKind, on_success: Option<OnSuccess<A>>, on_failure: Option<OnFailure<A>>) {
        self.entries.push(CallbackEntry {
            kind,
            on_success,
            on_failure,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn kinds(&self) -> Vec<TaskKind> {
        self.entries.iter().map(|e| e.kind.clone()).collect()
    }

    fn success_at(&self, index: usize) -> Option<OnSuccess<A>> {
        self.entries.get(index)?.on_success
    }

    fn failure_at(&self, index: usize) -> Option<OnFailure<A>> {
        self.entries.get(index)?.on_failure
    }
}

/// Action whose reservation carries per-task callbacks.
///
/// A task without a failure callback forwards its error to the sink.
pub trait DispatchAction: Send + Sized + 'static {
    fn prepare(&mut self, _ctx: &mut Context) -> Result<bool, ActionError> {
        Ok(true)
    }

    fn validators(&mut self, _ctx: &Context) -> Vec<Box<dyn Validator>> {
        Vec::new()
    }

    fn on_validation_fault(&mut self, _ctx: &Context, _errors: &ValidationErrors) -> Result<(), ActionError> {
        Ok(())
    }

    /// Declares tasks and callbacks.
    fn reserve(&mut self, ctx: &mut Context, mapping: &mut CallbackMapping<Self>) -> Result<(), ActionError>;

    fn sequential_wait(&mut self, ctx: &Context) -> Result<bool, ActionError> {
        Ok(ctx.sequential_wait())
    }

    fn before_task(
        &mut self,
        _ctx: &Context,
        _index: usize,
        _prev: Option<&CompletionSignal>,
        _next: Option<&mut PendingTask>,
    ) -> Result<bool, ActionError> {
        Ok(true)
    }

    fn on_all_tasks_done(&mut self, _ctx: &Context) -> Result<(), ActionError> {
        Ok(())
    }

    fn on_invocation_done(&mut self, _ctx: &Context) -> Result<(), ActionError> {
        Ok(())
    }

    fn trap(&mut self, err: ActionError) -> Option<ActionError> {
        Some(err)
    }
}

struct Dispatching<A> {
    action: A,
    mapping: CallbackMapping<A>,
}

impl<A: DispatchAction> ActionHandler for Dispatching<A> {
    fn prepare(&mut self, ctx: &mut Context) -> Result<bool, ActionError> {
        self.action.prepare(ctx)
    }

    fn validators(&mut self, ctx: &Context) -> Vec<Box<dyn Validator>> {
        self.action.validators(ctx)
    }

    fn on_validation_fault(&mut self, ctx: &Context, errors: &ValidationErrors) -> Result<(), ActionError> {
        self.action.on_validation_fault(ctx, errors)
    }

    fn reserve_tasks(&mut self, ctx: &mut Context) -> Result<Vec<TaskKind>, ActionError> {
        let mut mapping = CallbackMapping::default();
        self.action.reserve(ctx, &mut mapping)?;
        let kinds = mapping.kinds();
        self.mapping = mapping;
        Ok(kinds)
    }

    fn sequential_wait(&mut self, ctx: &Context) -> Result<bool, ActionError> {
        self.action.sequential_wait(ctx)
    }

    fn before_task(
        &mut self,
        ctx: &Context,
        index: usize,
        prev: Option<&CompletionSignal>,
        next: Option<&mut PendingTask>,
    ) -> Result<bool, ActionError> {
        self.action.before_task(ctx, index, prev, next)
    }

    fn on_task_success(&mut self, ctx: &Context, index: usize, signal: &CompletionSignal) -> Result<(), ActionError> {
        match self.mapping.success_at(index) {
            Some(callback) => callback(&mut self.action, ctx, signal),
            None => Ok(()),
        }
    }

    fn on_task_failure(&mut self, ctx: &Context, index: usize, task: &TaskInfo, error: TaskError) -> Option<TaskError> {
        match self.mapping.failure_at(index) {
            Some(callback) => callback(&mut self.action, ctx, task, error),
            None => Some(error),
        }
    }

    fn on_all_tasks_done(&mut self, ctx: &Context) -> Result<(), ActionError> {
        self.action.on_all_tasks_done(ctx)
    }

    fn on_invocation_done(&mut self, ctx: &Context) -> Result<(), ActionError> {
        self.action.on_invocation_done(ctx)
    }

    fn trap(&mut self, err: ActionError) -> Option<ActionError> {
        self.action.trap(err)
    }
}

impl ActionKind {
    /// Kind backed by a [`DispatchAction`] factory.
    pub fn dispatch<F, A>(name: &'static str, factory: F) -> Self
    where
        F: Fn() -> A + Send + Sync + 'static,
        A: DispatchAction,
    {
        ActionKind::new(name, move |_| Dispatching {
            action: factory(),
            mapping: CallbackMapping::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{NoopTask, SignalKind};
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        hits: Vec<&'static str>,
    }

    impl Recorder {
        fn first_ok(&mut self, _ctx: &Context, _s: &CompletionSignal) -> Result<(), ActionError> {
            self.hits.push("first-ok");
            Ok(())
        }

        fn second_failed(&mut self, _ctx: &Context, _t: &TaskInfo, _e: TaskError) -> Option<TaskError> {
            self.hits.push("second-failed");
            None
        }
    }

    impl DispatchAction for Recorder {
        fn reserve(&mut self, _ctx: &mut Context, mapping: &mut CallbackMapping<Self>) -> Result<(), ActionError> {
            mapping.add(TaskKind::of::<NoopTask>(), Some(Self::first_ok), None);
            mapping.add(TaskKind::of::<NoopTask>(), None, Some(Self::second_failed));
            mapping.add(TaskKind::of::<NoopTask>(), None, None);
            Ok(())
        }
    }

    fn signal(index: usize) -> CompletionSignal {
        CompletionSignal {
            task: TaskInfo {
                name: Arc::from("NoopTask"),
                index,
            },
            kind: SignalKind::Success,
            result: None,
            error: None,
            success_count: 1,
        }
    }

    #[test]
    fn test_callbacks_route_by_index() {
        let mut handler = Dispatching {
            action: Recorder::default(),
            mapping: CallbackMapping::default(),
        };
        let mut ctx = Context::new();
        let kinds = handler.reserve_tasks(&mut ctx).unwrap();
        assert_eq!(kinds.len(), 3);

        handler.on_task_success(&ctx, 0, &signal(0)).unwrap();
        handler.on_task_success(&ctx, 2, &signal(2)).unwrap();

        let info = signal(1).task;
        assert!(handler.on_task_failure(&ctx, 1, &info, TaskError::Canceled).is_none());
        let forwarded = handler.on_task_failure(&ctx, 2, &info, TaskError::Canceled);
        assert_eq!(forwarded, Some(TaskError::Canceled));

        assert_eq!(handler.action.hits, vec!["first-ok", "second-failed"]);
    }
}
