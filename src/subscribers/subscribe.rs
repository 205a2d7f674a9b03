//! # The subscriber seam.
//!
//! A [`Subscribe`] implementation receives the runtime events of one
//! dispatcher on its own worker. It may be slow; invocation drivers never
//! wait for it. When its queue is full the event is dropped for that
//! subscriber alone and `SubscriberOverflow` is published.
//!
//! ```no_run
//! use actionvisor::{Event, EventScope, Subscribe};
//! use async_trait::async_trait;
//!
//! struct InvocationAudit;
//!
//! #[async_trait]
//! impl Subscribe for InvocationAudit {
//!     async fn on_event(&self, event: &Event) {
//!         println!("{:?} {:?}", event.kind, event.invocation);
//!     }
//!
//!     fn accepts(&self, event: &Event) -> bool {
//!         event.kind.scope() == EventScope::Invocation
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "invocation-audit"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receiver of runtime events, registered through
/// [`DispatcherBuilder::with_subscribers`](crate::DispatcherBuilder::with_subscribers).
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    /// Filter applied before queueing; rejected events never count as overflow.
    fn accepts(&self, _event: &Event) -> bool {
        true
    }

    /// Name used in `SubscriberOverflow` / `SubscriberPanicked` events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn queue_capacity(&self) -> usize {
        1024
    }
}
