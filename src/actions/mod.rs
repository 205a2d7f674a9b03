//! # Action handlers.
//!
//! - [`ActionHandler`]: the template every action implements
//! - [`ActionKind`]: named factory, bound in the registry
//! - [`DispatchAction`]: reservation with typed per-task callbacks
//! - [`FlexibleAction`]: a body without tasks
//! - [`Validator`] and built-ins

mod dispatch;
mod flexible;
mod handler;
mod validate;

pub use dispatch::{CallbackMapping, DispatchAction, OnFailure, OnSuccess};
pub use flexible::FlexibleAction;
pub use handler::{ActionHandler, ActionKind};
pub use validate::{
    ByteLength, CharLength, Pattern, Required, ValidationError, ValidationErrors, Validator,
    run_validators,
};
