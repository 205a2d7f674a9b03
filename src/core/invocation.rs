//! # Invocation driver: runs one action invocation end to end.
//!
//! ```text
//! instantiate ─► InvocationStarted
//!   1 prepare ─► 2 validators ─► 3 reserve_tasks ─► 4 sequential_wait
//!       └─ abort ─► InvocationAborted ─────────────────────────────┐
//!   strategy (sequential | no-wait): before_task, start workers    │
//!   pump signals ─► on_task_success / on_task_failure              │
//!   Nth Finished ─► on_all_tasks_done ─► on_invocation_done        │
//!               ─► InvocationCompleted ─► done() on every unit     │
//! InvocationFinalized ◄────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - Hooks run on the driver only, one at a time.
//! - Signals of all tasks are pumped in arrival order; the aggregate fires on
//!   the Finished that makes `finished_count == reserved_count`.
//! - An orchestration error is trapped once; no further task is started, the
//!   driver keeps pumping until every started task released its emitter.
//! - `InvocationFinalized` is always published and the finalizer always runs,
//!   also when an action, a task factory or a task `init` panics.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actions::{ActionHandler, ActionKind, run_validators};
use crate::context::Context;
use crate::core::{Dispatcher, no_wait, sequential};
use crate::error::{ActionError, DispatchError, panic_info};
use crate::events::{Event, EventKind, InvocationBus};
use crate::tasks::runner::run_lifecycle;
use crate::tasks::{
    CompletionSignal, NoopTask, PendingTask, SignalEmitter, SignalKind, TaskContext, TaskKind,
    TaskUnit,
};

/// How an invocation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// Every reserved task finished and the completion hooks ran.
    Completed,
    /// `prepare` returned false, validation failed or the action swallowed a hook error.
    Aborted,
    /// Hooks 1-4 failed or the action could not be created.
    Failed,
    /// Tasks were reserved but the aggregate completion never happened.
    Incomplete,
}

impl InvocationOutcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            InvocationOutcome::Completed => "completed",
            InvocationOutcome::Aborted => "aborted",
            InvocationOutcome::Failed => "failed",
            InvocationOutcome::Incomplete => "incomplete",
        }
    }
}

/// Summary of one finished invocation.
#[derive(Clone, Debug)]
pub struct InvocationReport {
    pub id: u64,
    pub action: Arc<str>,
    pub outcome: InvocationOutcome,
    /// Number of reserved tasks (after no-op substitution).
    pub reserved: usize,
    /// Number of errors handed to the sink.
    pub trapped: usize,
}

/// Handle of a detached invocation.
#[derive(Debug)]
pub struct InvocationHandle {
    id: u64,
    join: JoinHandle<InvocationReport>,
    cancel: CancellationToken,
}

impl InvocationHandle {
    pub(crate) fn new(id: u64, join: JoinHandle<InvocationReport>, cancel: CancellationToken) -> Self {
        Self { id, join, cancel }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancels the invocation token: interrupts synchronous waits and tells tasks to stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Waits for the report; `None` if the driver task was aborted.
    pub async fn join(self) -> Option<InvocationReport> {
        self.join.await.ok()
    }
}

enum HookError {
    Action(ActionError),
    Panicked(String),
}

/// Runs a synchronous hook, catching panics.
fn call_hook<T>(f: impl FnOnce() -> Result<T, ActionError>) -> Result<T, HookError> {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(HookError::Action(e)),
        Err(payload) => Err(HookError::Panicked(panic_info(&*payload))),
    }
}

pub(crate) struct Invocation {
    dispatcher: Dispatcher,
    id: u64,
    action: ActionKind,
    name: Arc<str>,
    token: CancellationToken,
    events: InvocationBus,
}

impl Invocation {
    pub(crate) fn new(dispatcher: Dispatcher, id: u64, action: &ActionKind, token: CancellationToken) -> Self {
        let name: Arc<str> = Arc::from(action.name());
        Self {
            events: dispatcher.bus().for_invocation(id, Arc::clone(&name)),
            dispatcher,
            id,
            name,
            action: action.clone(),
            token,
        }
    }

    pub(crate) async fn run(self, mut ctx: Context) -> InvocationReport {
        let mut report = InvocationReport {
            id: self.id,
            action: Arc::clone(&self.name),
            outcome: InvocationOutcome::Failed,
            reserved: 0,
            trapped: 0,
        };
        ctx.bind_invocation(self.id, Arc::clone(&self.name));
        self.events.publish(Event::new(EventKind::InvocationStarted));

        let dispatcher = self.dispatcher.clone();
        let handler = match std::panic::catch_unwind(AssertUnwindSafe(|| self.action.instantiate(&dispatcher))) {
            Ok(handler) => handler,
            Err(payload) => {
                self.trap_into(&mut report.trapped, DispatchError::Panicked {
                    action: self.name.to_string(),
                    hook: "instantiate",
                    info: panic_info(&*payload),
                });
                return self.finalize(report);
            }
        };

        let mut run = Run::new(self, handler);
        match run.prepare(&mut ctx) {
            Ok(Some(kinds)) => {
                report.reserved = kinds.len();
                ctx.reserve(kinds);
                run.execute(Arc::new(ctx)).await;
                report.outcome = if run.completed {
                    InvocationOutcome::Completed
                } else {
                    InvocationOutcome::Incomplete
                };
            }
            Ok(None) => report.outcome = InvocationOutcome::Aborted,
            Err(()) => report.outcome = InvocationOutcome::Failed,
        }
        report.trapped = run.trapped;
        run.inv.finalize(report)
    }

    fn trap_into(&self, counter: &mut usize, error: DispatchError) {
        *counter += 1;
        self.dispatcher.trap(error, Some(self.id), Some(&self.name));
    }

    fn finalize(&self, report: InvocationReport) -> InvocationReport {
        tracing::debug!(
            invocation = report.id,
            action = %report.action,
            outcome = report.outcome.as_label(),
            "invocation finalized"
        );
        self.events.publish(Event::new(EventKind::InvocationFinalized).with_reason(report.outcome.as_label()));
        if let Some(finalizer) = &self.dispatcher.inner().finalizer {
            if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| finalizer(&report))) {
                tracing::warn!(info = %panic_info(&*payload), "invocation finalizer panicked");
            }
        }
        report
    }
}

/// Mutable state of an invocation past instantiation.
pub(crate) struct Run {
    inv: Invocation,
    handler: Box<dyn ActionHandler>,
    ctx: Arc<Context>,
    tx: Option<mpsc::UnboundedSender<CompletionSignal>>,
    rx: mpsc::UnboundedReceiver<CompletionSignal>,
    workers: Vec<JoinHandle<Box<dyn TaskUnit>>>,
    idle: Vec<Box<dyn TaskUnit>>,
    /// Indexes that already produced their advancing signal.
    advanced: HashSet<usize>,
    completed: bool,
    trapped: usize,
}

impl Run {
    fn new(inv: Invocation, handler: Box<dyn ActionHandler>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inv,
            handler,
            ctx: Arc::new(Context::new()),
            tx: Some(tx),
            rx,
            workers: Vec::new(),
            idle: Vec::new(),
            advanced: HashSet::new(),
            completed: false,
            trapped: 0,
        }
    }

    fn trap(&mut self, error: DispatchError) {
        self.inv.trap_into(&mut self.trapped, error);
    }

    fn hook_error(&self, hook: &'static str, err: HookError) -> DispatchError {
        match err {
            HookError::Action(source) => DispatchError::Action {
                action: self.inv.name.to_string(),
                hook,
                source,
            },
            HookError::Panicked(info) => DispatchError::Panicked {
                action: self.inv.name.to_string(),
                hook,
                info,
            },
        }
    }

    /// Hook errors of the preparation phase go through the action's own `trap`.
    fn prepare_failed(&mut self, hook: &'static str, err: HookError) -> Result<Option<Vec<TaskKind>>, ()> {
        let err = match err {
            HookError::Action(e) => match call_hook(|| Ok(self.handler.trap(e))) {
                Ok(Some(e)) => HookError::Action(e),
                Ok(None) => {
                    self.abort(hook, "error swallowed by trap");
                    return Ok(None);
                }
                Err(panicked) => panicked,
            },
            panicked => panicked,
        };
        let error = self.hook_error(hook, err);
        self.trap(error);
        Err(())
    }

    fn abort(&self, hook: &'static str, why: &str) {
        self.inv
            .events
            .publish(Event::new(EventKind::InvocationAborted).with_reason(format!("{hook}: {why}")));
    }

    /// Hooks 1-4. `Ok(None)` when the invocation aborted, `Err` when it failed.
    fn prepare(&mut self, ctx: &mut Context) -> Result<Option<Vec<TaskKind>>, ()> {
        let handler = &mut self.handler;
        match call_hook(|| handler.prepare(ctx)) {
            Ok(true) => {}
            Ok(false) => {
                self.abort("prepare", "returned false");
                return Ok(None);
            }
            Err(e) => return self.prepare_failed("prepare", e),
        }

        let handler = &mut self.handler;
        let validators = match call_hook(|| Ok(handler.validators(ctx))) {
            Ok(v) => v,
            Err(e) => return self.prepare_failed("validators", e),
        };
        let errors = run_validators(&validators, self.inv.dispatcher.value_source());
        if errors.has_error() {
            let handler = &mut self.handler;
            if let Err(e) = call_hook(|| handler.on_validation_fault(ctx, &errors)) {
                return self.prepare_failed("on_validation_fault", e);
            }
            self.abort("validation", &errors.to_string());
            return Ok(None);
        }

        let handler = &mut self.handler;
        let mut kinds = match call_hook(|| handler.reserve_tasks(ctx)) {
            Ok(kinds) => kinds,
            Err(e) => return self.prepare_failed("reserve_tasks", e),
        };
        if kinds.is_empty() {
            kinds.push(TaskKind::of::<NoopTask>());
        }

        let handler = &mut self.handler;
        match call_hook(|| handler.sequential_wait(ctx)) {
            Ok(wait) => ctx.set_sequential_wait(wait),
            Err(e) => return self.prepare_failed("sequential_wait", e),
        }
        Ok(Some(kinds))
    }

    async fn execute(&mut self, ctx: Arc<Context>) {
        self.ctx = ctx;
        let res = if self.ctx.sequential_wait() {
            sequential::run(self).await
        } else {
            no_wait::run(self).await
        };
        if let Err(error) = res {
            self.trap(error);
        }
        self.tx = None;
        while !self.completed {
            let Some(signal) = self.rx.recv().await else {
                break;
            };
            self.dispatch_signal(signal);
        }
        if self.completed {
            self.done_units().await;
        }
    }

    pub(super) fn kinds(&self) -> Vec<TaskKind> {
        self.ctx.reserved().to_vec()
    }

    /// Creates the task unit and runs its `init`. A panic stops the strategy.
    pub(super) fn instantiate(&self, kind: &TaskKind, index: usize) -> Result<PendingTask, DispatchError> {
        let mode_async = !self.ctx.sequential_wait();
        std::panic::catch_unwind(AssertUnwindSafe(|| PendingTask::new(kind, index, &self.ctx, mode_async))).map_err(
            |payload| DispatchError::Panicked {
                action: self.inv.name.to_string(),
                hook: "task_init",
                info: panic_info(&*payload),
            },
        )
    }

    /// Hook 5. An error here stops the strategy.
    pub(super) fn before_task(
        &mut self,
        index: usize,
        prev: Option<&CompletionSignal>,
        next: Option<&mut PendingTask>,
    ) -> Result<bool, DispatchError> {
        let handler = &mut self.handler;
        let ctx = &self.ctx;
        call_hook(|| handler.before_task(ctx, index, prev, next)).map_err(|e| self.hook_error("before_task", e))
    }

    /// Marks a task finished without starting it.
    pub(super) fn cancel_before_start(&mut self, pending: PendingTask, why: &'static str) {
        self.inv
            .events
            .publish(Event::for_task(EventKind::TaskSkipped, &pending.info).with_reason(why));
        if let Some(tx) = &self.tx {
            SignalEmitter::new(pending.info.clone(), tx.clone()).finished();
        }
        self.advanced.insert(pending.info.index);
        self.idle.push(pending.unit);
    }

    /// Spawns the task worker.
    pub(super) fn start(&mut self, pending: PendingTask) {
        let Some(tx) = &self.tx else {
            self.idle.push(pending.unit);
            return;
        };
        let PendingTask { info, unit, .. } = pending;
        let emitter = SignalEmitter::new(info.clone(), tx.clone());
        let inner = self.inv.dispatcher.inner();
        let cx = TaskContext::new(
            info.clone(),
            Arc::clone(&self.ctx),
            emitter,
            self.inv.token.child_token(),
            self.inv.dispatcher.clone(),
        );
        self.inv.events.publish(Event::for_task(EventKind::TaskStarting, &info));
        let worker = inner.handle.spawn(run_lifecycle(unit, cx, inner.semaphore.clone()));
        self.workers.push(worker);
    }

    /// Pumps signals until task `index` produced its first Success, Failure or Finished.
    ///
    /// With `interruptible`, cancellation of the invocation ends the wait:
    /// tolerated when the context says so (the wait continues like an
    /// asynchronous one), otherwise reported as `Interrupted`.
    pub(super) async fn wait_first_outcome(
        &mut self,
        index: usize,
        interruptible: bool,
    ) -> Result<Option<CompletionSignal>, DispatchError> {
        let mut interruptible = interruptible;
        loop {
            let signal = tokio::select! {
                biased;
                signal = self.rx.recv() => signal,
                _ = self.inv.token.cancelled(), if interruptible => {
                    if !self.ctx.tolerate_interrupt_on_sync_wait() {
                        return Err(DispatchError::Interrupted {
                            action: self.inv.name.to_string(),
                            task: self
                                .ctx
                                .reserved()
                                .get(index)
                                .map(|k| k.name().to_string())
                                .unwrap_or_default(),
                        });
                    }
                    tracing::debug!(invocation = self.inv.id, index, "sync wait interrupted, tolerated");
                    interruptible = false;
                    continue;
                }
            };
            let Some(signal) = signal else {
                return Ok(None);
            };
            let advances = signal.task.index == index && !self.advanced.contains(&index) && advances_on(&signal);
            if advances {
                self.advanced.insert(index);
            }
            self.dispatch_signal(signal.clone());
            if advances {
                return Ok(Some(signal));
            }
        }
    }

    /// Hooks 6-8 for one signal.
    fn dispatch_signal(&mut self, signal: CompletionSignal) {
        let index = signal.task.index;
        match signal.kind {
            SignalKind::Success => {
                self.inv
                    .events
                    .publish(Event::for_task(EventKind::TaskSucceeded, &signal.task));
                let handler = &mut self.handler;
                let ctx = &self.ctx;
                if let Err(e) = call_hook(|| handler.on_task_success(ctx, index, &signal)) {
                    let error = self.hook_error("on_task_success", e);
                    self.trap(error);
                }
            }
            SignalKind::Failure => {
                let Some(error) = signal.error.clone() else {
                    return;
                };
                self.inv.events.publish(
                    Event::for_task(EventKind::TaskFailed, &signal.task).with_reason(error.to_string()),
                );
                let handler = &mut self.handler;
                let ctx = &self.ctx;
                let task = &signal.task;
                match call_hook(|| Ok(handler.on_task_failure(ctx, index, task, error))) {
                    Ok(Some(forward)) => self.trap(DispatchError::Task {
                        action: self.inv.name.to_string(),
                        task: signal.task.name.to_string(),
                        index,
                        source: forward,
                    }),
                    Ok(None) => {}
                    Err(e) => {
                        let error = self.hook_error("on_task_failure", e);
                        self.trap(error);
                    }
                }
            }
            SignalKind::Finished => {
                self.inv
                    .events
                    .publish(Event::for_task(EventKind::TaskFinished, &signal.task));
                if self.ctx.mark_finished() {
                    self.complete();
                }
            }
        }
    }

    /// Hook 8: aggregate completion.
    fn complete(&mut self) {
        self.completed = true;
        let (handler, ctx) = (&mut self.handler, &self.ctx);
        if let Err(e) = call_hook(|| handler.on_all_tasks_done(ctx)) {
            let error = self.hook_error("on_all_tasks_done", e);
            self.trap(error);
        }
        let (handler, ctx) = (&mut self.handler, &self.ctx);
        if let Err(e) = call_hook(|| handler.on_invocation_done(ctx)) {
            let error = self.hook_error("on_invocation_done", e);
            self.trap(error);
        }
        self.inv.events.publish(Event::new(EventKind::InvocationCompleted));
    }

    /// Calls `done()` on every unit, waiting up to the grace period for workers.
    async fn done_units(&mut self) {
        let mut units = std::mem::take(&mut self.idle);
        let workers = std::mem::take(&mut self.workers);
        let grace = self.inv.dispatcher.config().grace_period();

        let mut pending = Vec::new();
        for worker in workers {
            if worker.is_finished() || grace.is_some() {
                pending.push(worker);
            } else {
                tracing::debug!(invocation = self.inv.id, "worker still running, done() skipped");
            }
        }
        let collect = async {
            let mut out = Vec::with_capacity(pending.len());
            for worker in pending {
                if let Ok(unit) = worker.await {
                    out.push(unit);
                }
            }
            out
        };
        match tokio::time::timeout(grace.unwrap_or(Duration::ZERO), collect).await {
            Ok(returned) => units.extend(returned),
            Err(_) => tracing::warn!(
                invocation = self.inv.id,
                ?grace,
                "task workers exceeded grace period, done() skipped"
            ),
        }

        for unit in &mut units {
            if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| unit.done())) {
                tracing::warn!(info = %panic_info(&*payload), "task done() panicked");
            }
        }
    }
}

/// Whether a signal lets the sequential chain move on from its task.
fn advances_on(signal: &CompletionSignal) -> bool {
    match signal.kind {
        SignalKind::Success => signal.is_first_success(),
        SignalKind::Failure | SignalKind::Finished => true,
    }
}
