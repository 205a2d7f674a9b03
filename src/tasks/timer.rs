//! # Periodic timers.
//!
//! [`TimerTask`] is a task unit that starts or stops a periodic timer in the
//! dispatcher-owned [`TimerRegistry`].
//!
//! ```text
//! TimerTask(Start) ─► registry.start(id) ─► loop every `period`:
//!                                             ├─ no interval action: Success (repeated)
//!                                             └─ interval action: invoke(action, fork(ctx), tolerate)
//! TimerTask(Stop)            ─► stop after the running tick ─┐
//! TimerTask(StopImmediately) ─► cancel the running tick ─────┴─► Finished of the Start task
//! ```
//!
//! A `Start` for an id that is already running fails with
//! [`TaskError::Rejected`] (Failure + Finished).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::actions::ActionKind;
use crate::context::Context;
use crate::core::WeakDispatcher;
use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{SignalEmitter, TaskContext, TaskUnit};

/// What a [`TimerTask`] run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerCommand {
    #[default]
    Start,
    /// Stop after the tick in progress completes.
    Stop,
    /// Stop now, cancelling an in-flight interval invocation.
    StopImmediately,
}

/// Periodic timer task, configured by the action in `before_task`.
pub struct TimerTask {
    pub timer_id: String,
    pub command: TimerCommand,
    pub initial_delay: Duration,
    pub period: Duration,
    /// Stop automatically after this long.
    pub stop_after: Option<Duration>,
    /// Action invoked on every tick instead of emitting `Success`.
    pub interval_action: Option<ActionKind>,
}

impl Default for TimerTask {
    fn default() -> Self {
        Self {
            timer_id: String::new(),
            command: TimerCommand::Start,
            initial_delay: Duration::from_secs(1),
            period: Duration::from_secs(3),
            stop_after: None,
            interval_action: None,
        }
    }
}

#[async_trait]
impl TaskUnit for TimerTask {
    async fn mainproc(&mut self, cx: &TaskContext) -> Result<(), TaskError> {
        let timers = cx.dispatcher().timers();
        match self.command {
            TimerCommand::Start => {
                let spec = TimerSpec {
                    id: self.timer_id.clone(),
                    initial_delay: self.initial_delay,
                    period: self.period,
                    stop_after: self.stop_after,
                    interval_action: self.interval_action.clone(),
                };
                timers.start(spec, Arc::clone(cx.context()), cx.emitter(), cx.dispatcher().downgrade())
            }
            TimerCommand::Stop => {
                timers.stop(&self.timer_id);
                Ok(())
            }
            TimerCommand::StopImmediately => {
                timers.stop_immediately(&self.timer_id);
                Ok(())
            }
        }
    }

    async fn postproc(&mut self, cx: &TaskContext) -> Result<(), TaskError> {
        // A started timer reports through the registry until it stops.
        if self.command != TimerCommand::Start {
            cx.success(None);
            cx.finished();
        }
        Ok(())
    }
}

/// Parameters of one running timer.
#[derive(Clone)]
pub(crate) struct TimerSpec {
    pub id: String,
    pub initial_delay: Duration,
    pub period: Duration,
    pub stop_after: Option<Duration>,
    pub interval_action: Option<ActionKind>,
}

struct TimerHandle {
    generation: u64,
    graceful: CancellationToken,
    hard: CancellationToken,
}

/// Registry of running timers, keyed by id.
pub struct TimerRegistry {
    timers: Arc<Mutex<HashMap<String, TimerHandle>>>,
    next_generation: Mutex<u64>,
    bus: Bus,
    runtime: CancellationToken,
}

impl TimerRegistry {
    pub(crate) fn new(bus: Bus, runtime: CancellationToken) -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Mutex::new(0),
            bus,
            runtime,
        }
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Ids of running timers (unordered).
    pub fn running(&self) -> Vec<String> {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Stops the timer after its current tick. Returns `false` if it is not running.
    pub fn stop(&self, id: &str) -> bool {
        match self.timers.lock().unwrap_or_else(PoisonError::into_inner).get(id) {
            Some(handle) => {
                handle.graceful.cancel();
                true
            }
            None => false,
        }
    }

    /// Stops the timer and cancels an in-flight interval invocation.
    pub fn stop_immediately(&self, id: &str) -> bool {
        match self.timers.lock().unwrap_or_else(PoisonError::into_inner).get(id) {
            Some(handle) => {
                handle.hard.cancel();
                true
            }
            None => false,
        }
    }

    /// Stops every timer immediately.
    pub fn stop_all(&self) {
        for handle in self.timers.lock().unwrap_or_else(PoisonError::into_inner).values() {
            handle.hard.cancel();
        }
    }

    pub(crate) fn start(
        &self,
        spec: TimerSpec,
        base: Arc<Context>,
        emitter: SignalEmitter,
        dispatcher: WeakDispatcher,
    ) -> Result<(), TaskError> {
        let generation = {
            let mut next = self.next_generation.lock().unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            *next
        };
        let graceful = CancellationToken::new();
        let hard = self.runtime.child_token();
        {
            let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
            if timers.contains_key(&spec.id) {
                return Err(TaskError::Rejected {
                    reason: format!("timer '{}' is already running", spec.id),
                });
            }
            timers.insert(
                spec.id.clone(),
                TimerHandle {
                    generation,
                    graceful: graceful.clone(),
                    hard: hard.clone(),
                },
            );
        }
        self.bus
            .publish(Event::new(EventKind::TimerStarted).with_task(spec.id.as_str()));

        let timers = Arc::clone(&self.timers);
        let bus = self.bus.clone();
        tokio::spawn(async move {
            tick_loop(&spec, &base, &emitter, &dispatcher, &graceful, &hard).await;

            {
                let mut map = timers.lock().unwrap_or_else(PoisonError::into_inner);
                if map.get(&spec.id).is_some_and(|h| h.generation == generation) {
                    map.remove(&spec.id);
                }
            }
            hard.cancel();
            bus.publish(Event::new(EventKind::TimerStopped).with_task(spec.id.as_str()));
            emitter.finished();
        });
        Ok(())
    }
}

async fn tick_loop(
    spec: &TimerSpec,
    base: &Arc<Context>,
    emitter: &SignalEmitter,
    dispatcher: &WeakDispatcher,
    graceful: &CancellationToken,
    hard: &CancellationToken,
) {
    let start = Instant::now();
    let mut interval = time::interval_at(
        start + spec.initial_delay,
        spec.period.max(Duration::from_millis(1)),
    );
    let deadline = spec.stop_after.map(|after| start + after);

    loop {
        tokio::select! {
            biased;
            _ = hard.cancelled() => return,
            _ = graceful.cancelled() => return,
            _ = sleep_until_opt(deadline) => return,
            _ = interval.tick() => {}
        }

        let Some(action) = &spec.interval_action else {
            emitter.success(None);
            continue;
        };
        let Some(dispatcher) = dispatcher.upgrade() else {
            return;
        };
        let mut ctx = base.fork();
        ctx.set_tolerate_interrupt_on_sync_wait(true);
        let handle = dispatcher.spawn_invoke_under(action, ctx, hard);
        drop(dispatcher);
        tokio::select! {
            _ = hard.cancelled() => return,
            _ = handle.join() => {}
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
