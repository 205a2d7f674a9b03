//! # Runtime events emitted by the dispatcher, invocations and task workers.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Invocation events**: an action invocation starting, aborting, completing
//! - **Task events**: a reserved task starting, being skipped, succeeding, failing, finishing
//! - **Facade events**: duplicate suppression, trapped errors, timers
//! - **Subscriber events**: overflow and panics in subscriber workers
//!
//! The [`Event`] struct carries metadata such as timestamps, invocation id,
//! action/task names and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use actionvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskFailed)
//!     .with_invocation(7)
//!     .with_action("save-order")
//!     .with_task("http-post")
//!     .with_index(1)
//!     .with_reason("connection refused");
//!
//! assert_eq!(ev.kind, EventKind::TaskFailed);
//! assert_eq!(ev.task.as_deref(), Some("http-post"));
//! assert_eq!(ev.index, Some(1));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::tasks::TaskInfo;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Invocation events ===
    /// An action invocation started (hooks are about to run).
    ///
    /// Sets: `invocation`, `action`
    InvocationStarted,

    /// The action aborted before reserving tasks (prepare false, validation fault, hook error).
    ///
    /// Sets: `invocation`, `action`, `reason`
    InvocationAborted,

    /// All reserved tasks finished and the completion hooks ran.
    ///
    /// Sets: `invocation`, `action`
    InvocationCompleted,

    /// The invocation is over, whatever the outcome.
    ///
    /// Sets: `invocation`, `action`, `reason` (outcome label)
    InvocationFinalized,

    // === Task events ===
    /// A reserved task worker was spawned.
    ///
    /// Sets: `invocation`, `action`, `task`, `index`
    TaskStarting,

    /// A reserved task was skipped or cancelled before start.
    ///
    /// Sets: `invocation`, `action`, `task`, `index`, `reason`
    TaskSkipped,

    /// A task emitted a Success signal.
    ///
    /// Sets: `invocation`, `action`, `task`, `index`
    TaskSucceeded,

    /// A task emitted a Failure signal.
    ///
    /// Sets: `invocation`, `action`, `task`, `index`, `reason`
    TaskFailed,

    /// A task emitted its Finished signal.
    ///
    /// Sets: `invocation`, `action`, `task`, `index`
    TaskFinished,

    // === Facade events ===
    /// An error was handed to the global error sink.
    ///
    /// Sets: `reason` (error label + message), optionally `invocation`, `action`
    ErrorTrapped,

    /// A UI event was dropped because its source is still being handled.
    ///
    /// Sets: `action`, `reason` (source id)
    DuplicateSuppressed,

    /// A periodic timer was registered.
    ///
    /// Sets: `task` (timer id)
    TimerStarted,

    /// A periodic timer was stopped.
    ///
    /// Sets: `task` (timer id)
    TimerStopped,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `task` (subscriber name), `reason`
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason`
    SubscriberOverflow,
}

/// Which part of the runtime an [`EventKind`] comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventScope {
    Invocation,
    Task,
    Facade,
    Subscriber,
}

impl EventKind {
    pub fn scope(self) -> EventScope {
        match self {
            EventKind::InvocationStarted
            | EventKind::InvocationAborted
            | EventKind::InvocationCompleted
            | EventKind::InvocationFinalized => EventScope::Invocation,
            EventKind::TaskStarting
            | EventKind::TaskSkipped
            | EventKind::TaskSucceeded
            | EventKind::TaskFailed
            | EventKind::TaskFinished => EventScope::Task,
            EventKind::ErrorTrapped
            | EventKind::DuplicateSuppressed
            | EventKind::TimerStarted
            | EventKind::TimerStopped => EventScope::Facade,
            EventKind::SubscriberPanicked | EventKind::SubscriberOverflow => EventScope::Subscriber,
        }
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Invocation id, if the event belongs to one.
    pub invocation: Option<u64>,
    /// Action name, if applicable.
    pub action: Option<Arc<str>>,
    /// Task (or subscriber / timer) name, if applicable.
    pub task: Option<Arc<str>>,
    /// Position of the task in its reservation.
    pub index: Option<usize>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            invocation: None,
            action: None,
            task: None,
            index: None,
            reason: None,
        }
    }

    /// Attaches an invocation id.
    #[inline]
    pub fn with_invocation(mut self, id: u64) -> Self {
        self.invocation = Some(id);
        self
    }

    /// Attaches an action name.
    #[inline]
    pub fn with_action(mut self, action: impl Into<Arc<str>>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Attaches a task name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches the task position.
    #[inline]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Task event carrying the task's name and position.
    pub fn for_task(kind: EventKind, task: &TaskInfo) -> Self {
        Event::new(kind)
            .with_task(Arc::clone(&task.name))
            .with_index(task.index)
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}
