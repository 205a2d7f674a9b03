//! Error types used by the dispatcher, action handlers and task units.
//!
//! This module defines three error enums:
//!
//! - [`TaskError`] — errors raised while a task unit runs its lifecycle.
//! - [`ActionError`] — errors raised inside action handler hooks.
//! - [`DispatchError`] — everything that reaches the global [`ErrorSink`](crate::ErrorSink).
//!
//! All of them provide `as_label` (stable snake_case label for logs/metrics)
//! and `as_message` (human-readable details).

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by task execution.
///
/// A task unit reports these from `preproc`/`mainproc`/`postproc`; the
/// lifecycle runner hands them to [`TaskUnit::trap`](crate::TaskUnit::trap)
/// and, unless suppressed, emits them as a Failure signal.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Task execution failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// A deadline implemented by the concrete task was exceeded.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Task observed cancellation of its token.
    #[error("context cancelled")]
    Canceled,

    /// Task refused to start (e.g. a timer id that is already running).
    #[error("rejected: {reason}")]
    Rejected {
        /// Why the task refused the work.
        reason: String,
    },

    /// Task lifecycle panicked; the panic was caught by the runner.
    #[error("panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use actionvisor::TaskError;
    /// use std::time::Duration;
    ///
    /// let err = TaskError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "task_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Timeout { .. } => "task_timeout",
            TaskError::Canceled => "task_canceled",
            TaskError::Rejected { .. } => "task_rejected",
            TaskError::Panicked { .. } => "task_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Fail { error } => format!("error: {error}"),
            TaskError::Timeout { timeout } => format!("timeout: {timeout:?}"),
            TaskError::Canceled => "context cancelled".to_string(),
            TaskError::Rejected { reason } => format!("rejected: {reason}"),
            TaskError::Panicked { info } => format!("panic: {info}"),
        }
    }
}

/// # Errors produced by action handler hooks.
///
/// `Logic` is the framework's "expected" failure: it carries a stable id and
/// a message, and says whether the global sink should surface it to the user.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ActionError {
    /// Expected business-logic failure with a stable identifier.
    #[error("[{id}] {message}")]
    Logic {
        /// Stable identifier (e.g. `"EFC0009"`).
        id: String,
        /// Human-readable message.
        message: String,
        /// Whether the global sink should present it to the user.
        notify: bool,
    },

    /// Unexpected hook failure.
    #[error("action failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Any other error raised with `?` inside a hook.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ActionError {
    /// Shorthand for [`ActionError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        ActionError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for a user-visible [`ActionError::Logic`].
    pub fn logic(id: impl Into<String>, message: impl Into<String>) -> Self {
        ActionError::Logic {
            id: id.into(),
            message: message.into(),
            notify: true,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ActionError::Logic { .. } => "action_logic",
            ActionError::Fail { .. } => "action_failed",
            ActionError::Other(_) => "action_other",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ActionError::Logic { id, message, .. } => format!("logic {id}: {message}"),
            ActionError::Fail { error } => format!("error: {error}"),
            ActionError::Other(e) => format!("error: {e:#}"),
        }
    }

    /// Whether this error asks to be presented to the user.
    ///
    /// Only [`ActionError::Logic`] can opt out; unexpected errors always notify.
    pub fn notify_user(&self) -> bool {
        match self {
            ActionError::Logic { notify, .. } => *notify,
            _ => true,
        }
    }
}

/// # Errors forwarded to the global error sink.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// An action handler hook failed.
    #[error("action '{action}' failed in {hook}: {source}")]
    Action {
        /// Action name.
        action: String,
        /// Hook that raised the error.
        hook: &'static str,
        /// Underlying error.
        #[source]
        source: ActionError,
    },

    /// A task failure that the action handler did not suppress.
    #[error("task '{task}' (#{index}) of action '{action}' failed: {source}")]
    Task {
        /// Action name.
        action: String,
        /// Task name.
        task: String,
        /// Position of the task in the reservation.
        index: usize,
        /// Underlying error.
        #[source]
        source: TaskError,
    },

    /// A synchronous wait on a task was interrupted by cancellation.
    #[error("synchronous wait on task '{task}' of action '{action}' interrupted")]
    Interrupted {
        /// Action name.
        action: String,
        /// Task that was being waited on.
        task: String,
    },

    /// A UI event arrived for which no action is bound.
    #[error("no action bound to {target}/{kind}/{event_type}")]
    Unbound {
        /// Target name.
        target: String,
        /// Listener kind label.
        kind: &'static str,
        /// Event type.
        event_type: String,
    },

    /// An action handler hook panicked.
    #[error("action '{action}' panicked in {hook}: {info}")]
    Panicked {
        /// Action name.
        action: String,
        /// Hook that panicked.
        hook: &'static str,
        /// Panic payload rendered as text.
        info: String,
    },

    /// The dispatcher was used outside of a tokio runtime.
    #[error("no tokio runtime available to spawn the invocation")]
    RuntimeUnavailable,
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use actionvisor::DispatchError;
    ///
    /// let err = DispatchError::RuntimeUnavailable;
    /// assert_eq!(err.as_label(), "dispatch_runtime_unavailable");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::Action { .. } => "dispatch_action",
            DispatchError::Task { .. } => "dispatch_task",
            DispatchError::Interrupted { .. } => "dispatch_interrupted",
            DispatchError::Unbound { .. } => "dispatch_unbound",
            DispatchError::Panicked { .. } => "dispatch_panicked",
            DispatchError::RuntimeUnavailable => "dispatch_runtime_unavailable",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            DispatchError::Action { action, hook, source } => {
                format!("action={action} hook={hook} {}", source.as_message())
            }
            DispatchError::Task {
                action,
                task,
                index,
                source,
            } => format!("action={action} task={task} index={index} {}", source.as_message()),
            DispatchError::Interrupted { action, task } => {
                format!("action={action} task={task} sync wait interrupted")
            }
            DispatchError::Unbound {
                target,
                kind,
                event_type,
            } => format!("unbound target={target} kind={kind} event={event_type}"),
            DispatchError::Panicked { action, hook, info } => {
                format!("action={action} hook={hook} panic: {info}")
            }
            DispatchError::RuntimeUnavailable => "no tokio runtime".to_string(),
        }
    }

    /// Whether the sink should present this error to the user.
    pub fn notify_user(&self) -> bool {
        match self {
            DispatchError::Action { source, .. } => source.notify_user(),
            _ => true,
        }
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_info(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
