//! No-wait strategy: every task is started as soon as `before_task` allows it.
//!
//! Tasks default to asynchronous here unless the unit says otherwise through
//! `TaskUnit::runs_async`. A synchronous task, or one whose flag `before_task`
//! cleared, makes the driver wait (interruptibly) for its first outcome
//! before starting the next one. `prev` is always `None`.

use crate::core::invocation::Run;
use crate::error::DispatchError;

pub(crate) async fn run(run: &mut Run) -> Result<(), DispatchError> {
    let kinds = run.kinds();
    for (index, kind) in kinds.iter().enumerate() {
        let mut pending = run.instantiate(kind, index)?;
        let go = run.before_task(index, None, Some(&mut pending))?;
        if !go || pending.is_skip() {
            run.cancel_before_start(pending, if go { "skipped" } else { "declined by before_task" });
            continue;
        }
        let wait = !pending.is_async();
        run.start(pending);
        if wait {
            run.wait_first_outcome(index, true).await?;
        }
    }
    run.before_task(kinds.len(), None, None)?;
    Ok(())
}
