//! # Dispatcher: binds UI events to actions and runs their invocations.
//!
//! The [`Dispatcher`] owns the binding registry, the event bus with its
//! `SubscriberSet`, the worker semaphore, the runtime cancellation token and
//! the injected collaborators (toolkit, value source, error sink).
//!
//! ## Architecture
//! ```text
//! ListenerAdapter ─► handle_event(UiEvent)
//!                       ├─ resolve (BindingRegistry)      unbound ─► ErrorSink
//!                       ├─ duplicate guard                busy    ─► DuplicateSuppressed
//!                       └─ spawn_invoke(action, Context)
//!                              └─► invocation driver (hooks, strategy, pump)
//!                                     └─► task workers (bounded by semaphore)
//!
//! Event flow:
//!   driver / timers ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit
//!
//! Shutdown:
//!   timers.stop_all() ─► runtime_token.cancel() ─► drain subscribers
//! ```
//!
//! A `Dispatcher` is a cheap handle (`Arc` inside); clone it into actions and
//! tasks freely. [`ListenerAdapter`]s keep only a [`WeakDispatcher`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actions::ActionKind;
use crate::binding::{BindingRegistry, ListenerAdapter, ListenerKind, Toolkit, UiEvent, ValueSource};
use crate::config::DispatcherConfig;
use crate::context::{Context, Extensions, Payload};
use crate::core::builder::DispatcherBuilder;
use crate::core::guard::{DuplicateGuard, GuardTicket};
use crate::core::invocation::{Invocation, InvocationHandle, InvocationReport};
use crate::core::sink::ErrorSink;
use crate::error::DispatchError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::SubscriberSet;
use crate::tasks::TimerRegistry;

pub(crate) type Finalizer = Arc<dyn Fn(&InvocationReport) + Send + Sync>;

pub(crate) struct Inner {
    pub(crate) cfg: DispatcherConfig,
    pub(crate) registry: RwLock<BindingRegistry>,
    pub(crate) bus: Bus,
    pub(crate) semaphore: Option<Arc<Semaphore>>,
    pub(crate) runtime: CancellationToken,
    pub(crate) handle: Handle,
    pub(crate) sink: Arc<dyn ErrorSink>,
    pub(crate) toolkit: Option<Arc<dyn Toolkit>>,
    pub(crate) values: Option<Arc<dyn ValueSource>>,
    pub(crate) permanent: Extensions,
    pub(crate) timers: TimerRegistry,
    pub(crate) guard: DuplicateGuard,
    pub(crate) finalizer: Option<Finalizer>,
    pub(crate) subs: Mutex<Option<Arc<SubscriberSet>>>,
    pub(crate) listener: Mutex<Option<JoinHandle<()>>>,
    next_invocation: AtomicU64,
}

/// Orchestration engine handle.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

/// Non-owning dispatcher handle.
#[derive(Clone, Default)]
pub struct WeakDispatcher {
    inner: Weak<Inner>,
}

impl WeakDispatcher {
    pub fn upgrade(&self) -> Option<Dispatcher> {
        self.inner.upgrade().map(|inner| Dispatcher { inner })
    }

    /// A handle that never upgrades.
    #[cfg(test)]
    pub(crate) fn dangling() -> Self {
        Self::default()
    }
}

impl Dispatcher {
    /// Starts building a dispatcher with the given configuration.
    pub fn builder(cfg: DispatcherConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(cfg)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        cfg: DispatcherConfig,
        registry: BindingRegistry,
        bus: Bus,
        handle: Handle,
        sink: Arc<dyn ErrorSink>,
        toolkit: Option<Arc<dyn Toolkit>>,
        values: Option<Arc<dyn ValueSource>>,
        finalizer: Option<Finalizer>,
        subs: Arc<SubscriberSet>,
    ) -> Self {
        let runtime = CancellationToken::new();
        let semaphore = cfg.concurrency_limit().map(Semaphore::new).map(Arc::new);
        let timers = TimerRegistry::new(bus.clone(), runtime.clone());
        let dispatcher = Self {
            inner: Arc::new(Inner {
                cfg,
                registry: RwLock::new(registry),
                bus,
                semaphore,
                runtime,
                handle,
                sink,
                toolkit,
                values,
                permanent: Extensions::new(),
                timers,
                guard: DuplicateGuard::default(),
                finalizer,
                subs: Mutex::new(None),
                listener: Mutex::new(None),
                next_invocation: AtomicU64::new(1),
            }),
        };
        dispatcher.subscriber_listener(subs);
        dispatcher
    }

    /// Forwards bus events to the subscriber set until the runtime token is cancelled.
    fn subscriber_listener(&self, subs: Arc<SubscriberSet>) {
        let mut rx = self.inner.bus.subscribe();
        let token = self.inner.runtime.clone();
        let set = Arc::clone(&subs);
        let listener = self.inner.handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    recv = rx.recv() => match recv {
                        Ok(ev) => set.emit(ev),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });
        *self.inner.subs.lock().unwrap_or_else(PoisonError::into_inner) = Some(subs);
        *self.inner.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    pub fn downgrade(&self) -> WeakDispatcher {
        WeakDispatcher {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.cfg
    }

    /// Event bus; subscribe to observe runtime events directly.
    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Store shared by every action for the lifetime of the dispatcher.
    pub fn permanent(&self) -> &Extensions {
        &self.inner.permanent
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.inner.timers
    }

    /// Runs `f` with read access to the registry.
    pub fn with_registry<R>(&self, f: impl FnOnce(&BindingRegistry) -> R) -> R {
        f(&self.inner.registry.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Runs `f` with write access to the registry. Attached adapters are not touched.
    pub fn with_registry_mut<R>(&self, f: impl FnOnce(&mut BindingRegistry) -> R) -> R {
        f(&mut self.inner.registry.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// Finds a live UI target through the toolkit.
    pub fn find_target(&self, name: &str) -> Option<Payload> {
        self.inner.toolkit.as_ref()?.find_target(name)
    }

    /// Current values of a UI target through the value source.
    pub fn values(&self, target: &str) -> Option<Vec<String>> {
        self.inner.values.as_ref()?.values(target)
    }

    pub(crate) fn value_source(&self) -> Option<&dyn ValueSource> {
        self.inner.values.as_deref()
    }

    pub(crate) fn inner(&self) -> &Inner {
        &self.inner
    }

    /// Attaches one adapter per bound listener kind to the named target.
    ///
    /// Returns how many adapters the toolkit accepted.
    pub fn attach_target(&self, target: &str) -> usize {
        let Some(toolkit) = &self.inner.toolkit else {
            return 0;
        };
        let kinds = self.with_registry(|r| {
            r.listener_kinds_for(target)
                .into_iter()
                .map(|kind| (kind, r.event_types_for(target, kind)))
                .collect::<Vec<_>>()
        });
        let target: Arc<str> = Arc::from(target);
        kinds
            .into_iter()
            .filter(|(kind, types)| {
                toolkit.attach(ListenerAdapter::new(
                    self.downgrade(),
                    Arc::clone(&target),
                    *kind,
                    types.clone(),
                ))
            })
            .count()
    }

    /// Binds at runtime and refreshes the target's adapter for `kind`.
    ///
    /// Returns whether the toolkit accepted the adapter.
    pub fn bind_immediately(
        &self,
        target: &str,
        kind: ListenerKind,
        event_type: &str,
        action: ActionKind,
    ) -> bool {
        self.with_registry_mut(|r| r.bind(target, kind, event_type, action));
        self.reattach(target, kind)
    }

    /// Unbinds at runtime and refreshes (or removes) the target's adapter for `kind`.
    pub fn unbind_immediately(&self, target: &str, kind: ListenerKind, event_type: &str) {
        self.with_registry_mut(|r| r.unbind(target, kind, event_type));
        self.reattach(target, kind);
    }

    fn reattach(&self, target: &str, kind: ListenerKind) -> bool {
        let Some(toolkit) = &self.inner.toolkit else {
            return false;
        };
        toolkit.detach(target, kind);
        let types = self.with_registry(|r| r.event_types_for(target, kind));
        if types.is_empty() {
            return false;
        }
        toolkit.attach(ListenerAdapter::new(self.downgrade(), Arc::from(target), kind, types))
    }

    /// Entry point for UI events.
    ///
    /// Resolves the bound action, applies the duplicate guard and spawns the
    /// invocation. Returns `None` when nothing was started.
    pub fn handle_event(&self, event: UiEvent) -> Option<InvocationHandle> {
        let action = self.with_registry(|r| {
            r.resolve(&event.target, event.kind, &event.event_type)
                .cloned()
        });
        let Some(action) = action else {
            self.trap(
                DispatchError::Unbound {
                    target: event.target.to_string(),
                    kind: event.kind.as_label(),
                    event_type: event.event_type.to_string(),
                },
                None,
                None,
            );
            return None;
        };

        let ticket = if self.inner.cfg.duplicate_invoke {
            None
        } else {
            match self.inner.guard.try_acquire(&event.source_id) {
                Some(ticket) => Some(ticket),
                None => {
                    tracing::debug!(source = %event.source_id, action = action.name(), "duplicate invoke suppressed");
                    self.inner.bus.publish(
                        Event::new(EventKind::DuplicateSuppressed)
                            .with_action(action.name())
                            .with_reason(Arc::clone(&event.source_id)),
                    );
                    return None;
                }
            }
        };

        let ctx = Context::from_event(event);
        Some(self.spawn_with(&action, ctx, &self.inner.runtime, ticket))
    }

    /// Whether an invocation started by the UI source `source_id` is still running.
    pub fn is_source_busy(&self, source_id: &str) -> bool {
        self.inner.guard.is_busy(source_id)
    }

    /// Runs an invocation to its end on the current task.
    pub async fn invoke(&self, action: &ActionKind, ctx: Context) -> InvocationReport {
        let token = self.inner.runtime.child_token();
        let id = self.next_id();
        Invocation::new(self.clone(), id, action, token).run(ctx).await
    }

    /// Runs an invocation detached; usable from any thread.
    pub fn spawn_invoke(&self, action: &ActionKind, ctx: Context) -> InvocationHandle {
        self.spawn_with(action, ctx, &self.inner.runtime, None)
    }

    /// Like [`Dispatcher::spawn_invoke`], cancelled together with `parent`.
    pub(crate) fn spawn_invoke_under(
        &self,
        action: &ActionKind,
        ctx: Context,
        parent: &CancellationToken,
    ) -> InvocationHandle {
        self.spawn_with(action, ctx, parent, None)
    }

    fn spawn_with(
        &self,
        action: &ActionKind,
        ctx: Context,
        parent: &CancellationToken,
        ticket: Option<GuardTicket>,
    ) -> InvocationHandle {
        let token = parent.child_token();
        let id = self.next_id();
        let invocation = Invocation::new(self.clone(), id, action, token.clone());
        let join = self.inner.handle.spawn(async move {
            let report = invocation.run(ctx).await;
            drop(ticket);
            report
        });
        InvocationHandle::new(id, join, token)
    }

    fn next_id(&self) -> u64 {
        self.inner.next_invocation.fetch_add(1, Ordering::Relaxed)
    }

    /// Hands an error to the sink and publishes `ErrorTrapped`.
    pub(crate) fn trap(&self, error: DispatchError, invocation: Option<u64>, action: Option<&str>) {
        self.inner.sink.trap(&error, invocation);
        let mut ev = Event::new(EventKind::ErrorTrapped)
            .with_reason(format!("{}: {}", error.as_label(), error.as_message()));
        if let Some(id) = invocation {
            ev = ev.with_invocation(id);
        }
        if let Some(action) = action {
            ev = ev.with_action(action);
        }
        self.inner.bus.publish(ev);
    }

    /// Stops timers, cancels everything still running and drains subscribers.
    pub async fn shutdown(&self) {
        self.inner.timers.stop_all();
        self.inner.runtime.cancel();

        let listener = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            let _ = listener.await;
        }
        let subs = self
            .inner
            .subs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subs) = subs {
            match Arc::try_unwrap(subs) {
                Ok(set) => set.shutdown().await,
                Err(_) => tracing::warn!("subscriber set still shared; workers not drained"),
            }
        }
    }

    /// True once [`Dispatcher::shutdown`] was called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.runtime.is_cancelled()
    }
}
