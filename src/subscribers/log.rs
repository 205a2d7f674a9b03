//! # LogWriter: renders runtime events through `tracing`.
//!
//! A minimal subscriber for demos and debugging. Task and invocation events
//! are logged at `debug`, failures and subscriber trouble at `warn`.
//!
//! ## Example output (fmt layer)
//! ```text
//! DEBUG actionvisor: [invocation-started] invocation=3 action="save-order"
//! DEBUG actionvisor: [task-starting] invocation=3 task="http-post" index=0
//!  WARN actionvisor: [task-failed] invocation=3 task="http-post" index=0 reason="connection refused"
//! DEBUG actionvisor: [invocation-finalized] invocation=3 reason="completed"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn tag(kind: EventKind) -> &'static str {
    match kind {
        EventKind::InvocationStarted => "invocation-started",
        EventKind::InvocationAborted => "invocation-aborted",
        EventKind::InvocationCompleted => "invocation-completed",
        EventKind::InvocationFinalized => "invocation-finalized",
        EventKind::TaskStarting => "task-starting",
        EventKind::TaskSkipped => "task-skipped",
        EventKind::TaskSucceeded => "task-succeeded",
        EventKind::TaskFailed => "task-failed",
        EventKind::TaskFinished => "task-finished",
        EventKind::ErrorTrapped => "error-trapped",
        EventKind::DuplicateSuppressed => "duplicate-suppressed",
        EventKind::TimerStarted => "timer-started",
        EventKind::TimerStopped => "timer-stopped",
        EventKind::SubscriberPanicked => "subscriber-panicked",
        EventKind::SubscriberOverflow => "subscriber-overflow",
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let tag = tag(e.kind);
        let invocation = e.invocation.unwrap_or_default();
        let action = e.action.as_deref().unwrap_or("-");
        let task = e.task.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::TaskFailed
            | EventKind::ErrorTrapped
            | EventKind::SubscriberPanicked
            | EventKind::SubscriberOverflow => {
                tracing::warn!(
                    seq = e.seq,
                    invocation,
                    action,
                    task,
                    index = ?e.index,
                    reason,
                    "[{tag}]"
                );
            }
            _ => {
                tracing::debug!(
                    seq = e.seq,
                    invocation,
                    action,
                    task,
                    index = ?e.index,
                    reason,
                    "[{tag}]"
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
