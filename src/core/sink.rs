//! # Global error sink.
//!
//! Every error that is not handled locally by a task or action hook ends up
//! here as a [`DispatchError`]. Presenting it to the user (a dialog, a status
//! bar) is the sink's business.

use crate::error::DispatchError;

/// Receives every unhandled error of the dispatcher.
pub trait ErrorSink: Send + Sync + 'static {
    /// Handles one error.
    ///
    /// `invocation` is the id of the invocation the error belongs to, if any.
    fn trap(&self, error: &DispatchError, invocation: Option<u64>);
}

/// Default sink: logs through `tracing`.
///
/// Errors that ask to be shown to the user are logged at `error`, the rest at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn trap(&self, error: &DispatchError, invocation: Option<u64>) {
        if error.notify_user() {
            tracing::error!(
                label = error.as_label(),
                invocation = invocation.unwrap_or_default(),
                "{}",
                error.as_message()
            );
        } else {
            tracing::warn!(
                label = error.as_label(),
                invocation = invocation.unwrap_or_default(),
                "{}",
                error.as_message()
            );
        }
    }
}
