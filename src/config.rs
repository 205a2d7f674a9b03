//! # Dispatcher configuration.
//!
//! Provides [`DispatcherConfig`], the centralized settings for the
//! orchestration engine. It is passed to [`Dispatcher::builder`](crate::Dispatcher::builder).
//!
//! ## Sentinel values
//! - `max_concurrent_tasks = 0` → unlimited (no worker semaphore created)
//! - `grace = 0s` → task instances still running at completion are not awaited

use std::time::Duration;

/// Global configuration for the dispatcher.
///
/// ## Field semantics
/// - `max_concurrent_tasks`: Upper bound of task workers running at once (`0` = unlimited)
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `duplicate_invoke`: Allow a UI source to trigger a new invocation while its previous one is still running
/// - `grace`: How long the driver waits for task workers to hand back their instances before calling `done()`
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Maximum number of task workers running concurrently.
    ///
    /// - `0` = unlimited (no semaphore)
    /// - `n > 0` = at most `n` task lifecycles run simultaneously across all invocations
    pub max_concurrent_tasks: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Whether the same UI source may start overlapping invocations.
    ///
    /// When `false`, an event whose source is still being handled is dropped
    /// and reported as `DuplicateSuppressed`.
    pub duplicate_invoke: bool,

    /// Time the driver waits for finished task workers to return.
    pub grace: Duration,
}

impl DispatcherConfig {
    /// Returns the worker limit as an `Option`.
    ///
    /// - `None` → unlimited (no semaphore)
    /// - `Some(n)` → at most `n` concurrent task workers
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent_tasks == 0 {
            None
        } else {
            Some(self.max_concurrent_tasks)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the grace period as an `Option` (`None` when zero).
    #[inline]
    pub fn grace_period(&self) -> Option<Duration> {
        if self.grace == Duration::ZERO {
            None
        } else {
            Some(self.grace)
        }
    }
}

impl Default for DispatcherConfig {
    /// Default configuration:
    ///
    /// - `max_concurrent_tasks = 0` (unlimited)
    /// - `bus_capacity = 1024`
    /// - `duplicate_invoke = false`
    /// - `grace = 5s`
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 0,
            bus_capacity: 1024,
            duplicate_invoke: false,
            grace: Duration::from_secs(5),
        }
    }
}
