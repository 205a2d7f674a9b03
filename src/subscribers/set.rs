//! Fan-out of bus events to the registered subscribers.
//!
//! ```text
//! listener ─► emit(ev) ─┬─ accepts? ─► [queue] ─► worker ─► on_event
//!                       │                 └ full/closed ─► SubscriberOverflow
//!                       └─ ...                 panic in on_event ─► SubscriberPanicked
//! ```
//!
//! Order is kept per subscriber only. `emit` never waits: a full queue drops
//! the event for that subscriber.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::error::panic_info;
use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

struct Lane {
    sub: Arc<dyn Subscribe>,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Queues and workers for every subscriber of one dispatcher.
pub(crate) struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber on the current runtime.
    pub(crate) fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut lanes = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());
        for sub in subs {
            let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
            workers.push(tokio::spawn(drive(Arc::clone(&sub), rx, bus.clone())));
            lanes.push(Lane { sub, tx });
        }
        Self {
            lanes,
            workers,
            bus,
        }
    }

    pub(crate) fn emit(&self, event: Event) {
        let event = Arc::new(event);
        for lane in &self.lanes {
            if !lane.sub.accepts(&event) {
                continue;
            }
            let reason = match lane.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            // An overflow report that overflows itself is not reported again.
            if !event.is_subscriber_overflow() {
                self.bus.publish(Event::subscriber_overflow(lane.sub.name(), reason));
            }
        }
    }

    /// Closes every queue and waits until the workers drained them.
    pub(crate) async fn shutdown(self) {
        drop(self.lanes);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn drive(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let handled = std::panic::AssertUnwindSafe(sub.on_event(&ev)).catch_unwind().await;
        if let Err(payload) = handled {
            let info = panic_info(&*payload);
            tracing::warn!(subscriber = sub.name(), %info, "subscriber panicked");
            bus.publish(Event::subscriber_panicked(sub.name(), info));
        }
    }
}
