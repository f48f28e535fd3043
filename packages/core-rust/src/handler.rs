//! Capabilities plugged into the dispatcher: handlers, validators, authorizers.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::message::Message;
use crate::outcome::Outcome;

/// Code used when an authorizer denies access without saying why.
pub const AUTHORIZATION_DENIED: &str = "Authorization.Denied";

/// The single piece of logic that executes messages of type `M`.
///
/// Domain failures (missing entity, conflicting slug) are returned as a failed
/// [`Outcome`]; they travel back through every outer behavior untouched.
/// Long-running handlers should watch `cancel` and return early.
#[async_trait]
pub trait Handler<M: Message>: Send + Sync {
    async fn handle(&self, message: M, cancel: &CancellationToken) -> Outcome<M::Output>;
}

/// A check run by the validation behavior before the handler.
///
/// Returns every problem found; an empty list means the message is valid.
#[async_trait]
pub trait Validator<M: Message>: Send + Sync {
    async fn validate(&self, message: &M, cancel: &CancellationToken) -> Vec<Error>;
}

/// A check run by the authorization behavior before the handler.
#[async_trait]
pub trait Authorizer<M: Message>: Send + Sync {
    async fn authorize(&self, message: &M, cancel: &CancellationToken) -> AuthorizationResult;
}

/// Verdict of one [`Authorizer`].
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationResult {
    authorized: bool,
    errors: Vec<Error>,
}

impl AuthorizationResult {
    #[must_use]
    pub fn allow() -> Self {
        Self {
            authorized: true,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn deny(error: Error) -> Self {
        Self::deny_all([error])
    }

    /// Deny with several reasons. An empty list is replaced with a generic
    /// `Forbidden` error so a denial is never silent.
    #[must_use]
    pub fn deny_all(errors: impl IntoIterator<Item = Error>) -> Self {
        let mut errors: Vec<Error> = errors.into_iter().collect();
        if errors.is_empty() {
            errors.push(Error::forbidden(
                AUTHORIZATION_DENIED,
                "access to this operation was denied",
            ));
        }
        Self {
            authorized: false,
            errors,
        }
    }

    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    #[must_use]
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Errors to report, empty when access was granted.
    #[must_use]
    pub fn into_denials(self) -> Vec<Error> {
        if self.authorized {
            Vec::new()
        } else {
            self.errors
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
