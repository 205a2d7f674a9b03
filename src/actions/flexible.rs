//! Actions that only run a body and never reserve tasks.

use crate::actions::{ActionHandler, ActionKind};
use crate::context::Context;
use crate::error::ActionError;

/// Action whose whole work is [`FlexibleAction::execute`].
///
/// The invocation always ends after `execute`: nothing is reserved and no
/// completion hooks run. Useful for pure UI reactions or for forwarding to
/// another action with a forked context.
pub trait FlexibleAction: Send + 'static {
    fn execute(&mut self, ctx: &mut Context) -> Result<(), ActionError>;
}

struct Flexible<A>(A);

impl<A: FlexibleAction> ActionHandler for Flexible<A> {
    fn prepare(&mut self, ctx: &mut Context) -> Result<bool, ActionError> {
        self.0.execute(ctx)?;
        Ok(false)
    }
}

impl ActionKind {
    /// Kind backed by a [`FlexibleAction`] factory.
    pub fn flexible<F, A>(name: &'static str, factory: F) -> Self
    where
        F: Fn() -> A + Send + Sync + 'static,
        A: FlexibleAction,
    {
        ActionKind::new(name, move |_| Flexible(factory()))
    }
}
