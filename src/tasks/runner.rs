//! # Runs one task unit lifecycle on its own worker.
//!
//! ```text
//! acquire permit ─► preproc ─► mainproc ─► postproc ─► finalproc ─► return unit
//!                      │           │           │
//!                      └── Err / panic ────────┴─► trap ─► Failure? ─► Finished
//! ```
//!
//! ## Rules
//! - `finalproc` always runs, panics inside it are logged and swallowed
//! - an error or panic always ends with `Finished`, whatever `trap` returns
//! - the unit is handed back so the dispatcher can call `done()` later
//! - the concurrency permit is held for the whole lifecycle

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;

use crate::error::{TaskError, panic_info};
use crate::tasks::{TaskContext, TaskUnit};

/// Executes the full lifecycle of `unit` and returns it.
pub(crate) async fn run_lifecycle(
    mut unit: Box<dyn TaskUnit>,
    cx: TaskContext,
    limit: Option<Arc<Semaphore>>,
) -> Box<dyn TaskUnit> {
    let _permit = match limit {
        Some(sem) => match sem.acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_closed) => {
                cx.failure(TaskError::Rejected {
                    reason: "worker pool closed".to_string(),
                });
                cx.finished();
                return unit;
            }
        },
        None => None,
    };

    let res = match AssertUnwindSafe(drive(unit.as_mut(), &cx)).catch_unwind().await {
        Ok(res) => res,
        Err(payload) => Err(TaskError::Panicked {
            info: panic_info(&*payload),
        }),
    };

    if let Err(err) = res {
        tracing::debug!(task = %cx.info().name, index = cx.index(), error = %err, "task lifecycle failed");
        if let Some(err) = unit.trap(err) {
            cx.failure(err);
        }
        cx.finished();
    }

    if let Err(payload) = AssertUnwindSafe(unit.finalproc(&cx)).catch_unwind().await {
        tracing::warn!(
            task = %cx.info().name,
            info = %panic_info(&*payload),
            "finalproc panicked"
        );
    }
    unit
}

async fn drive(unit: &mut dyn TaskUnit, cx: &TaskContext) -> Result<(), TaskError> {
    if !unit.preproc(cx).await? {
        cx.finished();
        return Ok(());
    }
    unit.mainproc(cx).await?;
    unit.postproc(cx).await
}
