//! # Broadcast bus for runtime events.
//!
//! ```text
//! InvocationBus(id, action) ──┐
//! TimerRegistry ──────────────┼──► Bus ──┬──► dispatcher listener ──► SubscriberSet
//! Dispatcher facade ──────────┘  (ring)  └──► Bus::subscribe() receivers
//! ```
//!
//! Publishing never blocks and never fails: with no receiver the event is
//! simply gone. A receiver more than `bus_capacity` events behind gets
//! `RecvError::Lagged(n)` and resumes after the `n` oldest events.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel carrying every runtime [`Event`] of one dispatcher.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus keeping up to `capacity` unread events (at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// A receiver observing events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publisher that stamps every event with one invocation's id and action.
    pub(crate) fn for_invocation(&self, id: u64, action: Arc<str>) -> InvocationBus {
        InvocationBus {
            bus: self.clone(),
            id,
            action,
        }
    }
}

/// Publishing side of a single invocation driver.
#[derive(Clone, Debug)]
pub(crate) struct InvocationBus {
    bus: Bus,
    id: u64,
    action: Arc<str>,
}

impl InvocationBus {
    pub(crate) fn publish(&self, ev: Event) {
        self.bus
            .publish(ev.with_invocation(self.id).with_action(Arc::clone(&self.action)));
    }
}
