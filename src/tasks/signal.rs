//! # Completion signals emitted by task units.
//!
//! Each started task gets one [`SignalEmitter`]. It forwards
//! [`CompletionSignal`]s to the owning invocation and enforces the signal
//! protocol per task run:
//!
//! - `Success` may repeat (streams, timers); `successCount` grows by one each time
//! - `Failure` at most once, and never after a `Success`
//! - `Finished` exactly once, always last
//!
//! Dropping the last handle of an emitter that never sent `Finished` sends it,
//! so a task cannot leave its invocation waiting forever by forgetting it.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::context::Payload;
use crate::error::TaskError;

/// Identity of a task within one invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskInfo {
    /// Task kind name.
    pub name: Arc<str>,
    /// Position in the reservation.
    pub index: usize,
}

/// Flavor of a [`CompletionSignal`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalKind {
    Success,
    Failure,
    Finished,
}

/// One signal of one task run.
#[derive(Clone)]
pub struct CompletionSignal {
    pub task: TaskInfo,
    pub kind: SignalKind,
    /// Result carried by a `Success`.
    pub result: Option<Payload>,
    /// Error carried by a `Failure`.
    pub error: Option<TaskError>,
    /// Number of `Success` signals of this run so far (including this one).
    pub success_count: usize,
}

impl CompletionSignal {
    /// Returns the result if it has type `T`.
    pub fn result<T: std::any::Any + Send + Sync>(&self) -> Option<&T> {
        self.result.as_deref()?.downcast_ref::<T>()
    }

    /// True for the first `Success` of a run.
    pub fn is_first_success(&self) -> bool {
        self.kind == SignalKind::Success && self.success_count == 1
    }
}

impl fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("task", &self.task)
            .field("kind", &self.kind)
            .field("has_result", &self.result.is_some())
            .field("error", &self.error)
            .field("success_count", &self.success_count)
            .finish()
    }
}

#[derive(Default)]
struct EmitState {
    success_count: usize,
    failed: bool,
    finished: bool,
}

struct EmitterInner {
    task: TaskInfo,
    tx: mpsc::UnboundedSender<CompletionSignal>,
    state: Mutex<EmitState>,
}

impl EmitterInner {
    fn send(&self, kind: SignalKind, result: Option<Payload>, error: Option<TaskError>, success_count: usize) {
        // The receiver is gone once the invocation gave up on its tasks.
        let _ = self.tx.send(CompletionSignal {
            task: self.task.clone(),
            kind,
            result,
            error,
            success_count,
        });
    }

    fn finish(&self) -> bool {
        let count = {
            let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if st.finished {
                return false;
            }
            st.finished = true;
            st.success_count
        };
        self.send(SignalKind::Finished, None, None, count);
        true
    }
}

impl Drop for EmitterInner {
    fn drop(&mut self) {
        if self.finish() {
            tracing::debug!(task = %self.task.name, index = self.task.index, "finished on emitter drop");
        }
    }
}

/// Cloneable handle a task uses to report its outcome.
#[derive(Clone)]
pub struct SignalEmitter {
    inner: Arc<EmitterInner>,
}

impl SignalEmitter {
    pub(crate) fn new(task: TaskInfo, tx: mpsc::UnboundedSender<CompletionSignal>) -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                task,
                tx,
                state: Mutex::new(EmitState::default()),
            }),
        }
    }

    pub fn task(&self) -> &TaskInfo {
        &self.inner.task
    }

    /// Emits a `Success`. Returns `false` if the run already failed or finished.
    pub fn success(&self, result: Option<Payload>) -> bool {
        let count = {
            let mut st = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            if st.failed || st.finished {
                drop(st);
                tracing::warn!(task = %self.inner.task.name, "success after failure/finish ignored");
                return false;
            }
            st.success_count += 1;
            st.success_count
        };
        self.inner.send(SignalKind::Success, result, None, count);
        true
    }

    /// Emits a `Failure`. Returns `false` if the run already reported an outcome.
    pub fn failure(&self, error: TaskError) -> bool {
        let count = {
            let mut st = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            if st.failed || st.finished || st.success_count > 0 {
                drop(st);
                tracing::warn!(task = %self.inner.task.name, %error, "late failure ignored");
                return false;
            }
            st.failed = true;
            st.success_count
        };
        self.inner.send(SignalKind::Failure, None, Some(error), count);
        true
    }

    /// Emits `Finished`. Returns `false` if it was already sent.
    pub fn finished(&self) -> bool {
        self.inner.finish()
    }

    pub fn is_finished(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finished
    }

    pub fn success_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .success_count
    }
}

impl fmt::Debug for SignalEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalEmitter")
            .field("task", &self.inner.task)
            .finish()
    }
}
