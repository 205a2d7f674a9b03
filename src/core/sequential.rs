//! Sequential strategy: each task starts after its predecessor's first outcome.
//!
//! `before_task(i, prev, Some(next))` sees the advancing signal of task
//! `i - 1` (`None` for the first task or when the predecessor never started).
//! A task marked asynchronous is still awaited, but the wait cannot be
//! interrupted. After the last task the action gets `before_task(n, prev, None)`.

use crate::core::invocation::Run;
use crate::error::DispatchError;

pub(crate) async fn run(run: &mut Run) -> Result<(), DispatchError> {
    let kinds = run.kinds();
    let mut prev = None;
    for (index, kind) in kinds.iter().enumerate() {
        let mut pending = run.instantiate(kind, index)?;
        let go = run.before_task(index, prev.as_ref(), Some(&mut pending))?;
        if !go || pending.is_skip() {
            run.cancel_before_start(pending, if go { "skipped" } else { "declined by before_task" });
            prev = None;
            continue;
        }
        let interruptible = !pending.is_async();
        run.start(pending);
        prev = run.wait_first_outcome(index, interruptible).await?;
    }
    run.before_task(kinds.len(), prev.as_ref(), None)?;
    Ok(())
}
