//! Task substituted when an action reserves nothing.

use async_trait::async_trait;

use crate::error::TaskError;
use crate::tasks::{TaskContext, TaskUnit};

/// Does nothing; the default `postproc` emits `Success` then `Finished`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTask;

#[async_trait]
impl TaskUnit for NoopTask {
    async fn mainproc(&mut self, _cx: &TaskContext) -> Result<(), TaskError> {
        Ok(())
    }
}
