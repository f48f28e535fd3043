//! Courier core: outcome/error model and the message, handler, validator and
//! authorizer contracts shared by every participant in a dispatch.

pub mod error;
pub mod handler;
pub mod message;
pub mod outcome;

pub use error::{Error, ErrorKind, STATUS_CODE_KEY};
pub use handler::{AuthorizationResult, Authorizer, Handler, Validator, AUTHORIZATION_DENIED};
pub use message::{BehaviorScope, Command, Message, MessageShape, Query};
pub use outcome::{fail, EmptyFailure, Failure, Outcome, OutcomeExt};

/// Re-exported so implementors of the async traits and callers of the
/// dispatcher agree on one cancellation type.
pub use tokio_util::sync::CancellationToken;
