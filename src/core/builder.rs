use std::sync::Arc;

use tokio::runtime::Handle;

use crate::binding::{BindingRegistry, Toolkit, ValueSource};
use crate::config::DispatcherConfig;
use crate::core::dispatcher::{Dispatcher, Finalizer};
use crate::core::invocation::InvocationReport;
use crate::core::sink::{ErrorSink, LogSink};
use crate::error::DispatchError;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for constructing a [`Dispatcher`] with its collaborators.
pub struct DispatcherBuilder {
    cfg: DispatcherConfig,
    bindings: BindingRegistry,
    toolkit: Option<Arc<dyn Toolkit>>,
    values: Option<Arc<dyn ValueSource>>,
    sink: Arc<dyn ErrorSink>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    finalizer: Option<Finalizer>,
    runtime: Option<Handle>,
}

impl DispatcherBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: DispatcherConfig) -> Self {
        Self {
            cfg,
            bindings: BindingRegistry::new(),
            toolkit: None,
            values: None,
            sink: Arc::new(LogSink),
            subscribers: Vec::new(),
            finalizer: None,
            runtime: None,
        }
    }

    /// Fills the binding registry before the dispatcher exists.
    pub fn with_bindings(mut self, f: impl FnOnce(&mut BindingRegistry)) -> Self {
        f(&mut self.bindings);
        self
    }

    /// Sets the UI toolkit used to find targets and attach listener adapters.
    pub fn with_toolkit(mut self, toolkit: Arc<dyn Toolkit>) -> Self {
        self.toolkit = Some(toolkit);
        self
    }

    /// Sets the source of target values read by validators.
    pub fn with_value_source(mut self, values: Arc<dyn ValueSource>) -> Self {
        self.values = Some(values);
        self
    }

    /// Replaces the default [`LogSink`].
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (invocations, tasks, trapped errors)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Runs `f` after every invocation, whatever its outcome.
    pub fn with_finalizer<F>(mut self, f: F) -> Self
    where
        F: Fn(&InvocationReport) + Send + Sync + 'static,
    {
        self.finalizer = Some(Arc::new(f));
        self
    }

    /// Spawns invocations, workers and subscribers on `handle`.
    ///
    /// Needed when building outside of a runtime context (e.g. on a UI thread).
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Builds the dispatcher and starts its event listener.
    ///
    /// # Errors
    /// [`DispatchError::RuntimeUnavailable`] when no runtime was given and the
    /// calling thread is not inside one.
    pub fn build(self) -> Result<Dispatcher, DispatchError> {
        let handle = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| DispatchError::RuntimeUnavailable)?,
        };
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = {
            let _guard = handle.enter();
            Arc::new(SubscriberSet::new(self.subscribers, bus.clone()))
        };
        Ok(Dispatcher::from_parts(
            self.cfg,
            self.bindings,
            bus,
            handle,
            self.sink,
            self.toolkit,
            self.values,
            self.finalizer,
            subs,
        ))
    }
}
