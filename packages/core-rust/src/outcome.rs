//! The success/failure envelope returned by every handler and behavior.
//!
//! [`Outcome<T>`] is a plain `Result<T, Failure>`, so `?` and the usual
//! combinators work unchanged. [`Failure`] cannot be empty: the only ways to
//! build one either take a first error or report the empty case to the caller.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Result of executing a message. `Outcome` (no parameter) is the void form.
pub type Outcome<T = ()> = Result<T, Failure>;

/// Shorthand for `Err(Failure::from(error))`.
///
/// # Errors
///
/// Always returns `Err`; the signature mirrors handler return types.
pub fn fail<T>(error: Error) -> Outcome<T> {
    Err(Failure::from(error))
}

/// Returned when a failure is requested with no errors at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("a failure must carry at least one error")]
pub struct EmptyFailure;

/// A non-empty, insertion-ordered list of [`Error`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Error>", into = "Vec<Error>")]
pub struct Failure {
    errors: Vec<Error>,
}

impl Failure {
    /// A failure holding exactly `error`.
    #[must_use]
    pub fn new(error: Error) -> Self {
        Self {
            errors: vec![error],
        }
    }

    /// Collects `errors` into a failure, or `None` when there are none.
    ///
    /// Behaviors use this to turn aggregated validator output into an outcome:
    /// `None` means "nothing went wrong, continue".
    pub fn from_errors(errors: impl IntoIterator<Item = Error>) -> Option<Self> {
        let errors: Vec<Error> = errors.into_iter().collect();
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    #[must_use]
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// The first error recorded. Always present.
    #[must_use]
    pub fn first(&self) -> &Error {
        &self.errors[0]
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self::new(error)
    }
}

impl TryFrom<Vec<Error>> for Failure {
    type Error = EmptyFailure;

    fn try_from(errors: Vec<Error>) -> Result<Self, Self::Error> {
        Self::from_errors(errors).ok_or(EmptyFailure)
    }
}

impl From<Failure> for Vec<Error> {
    fn from(failure: Failure) -> Self {
        failure.errors
    }
}

impl IntoIterator for Failure {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a> IntoIterator for &'a Failure {
    type Item = &'a Error;
    type IntoIter = std::slice::Iter<'a, Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self.first();
        match self.errors.len() {
            1 => write!(f, "{first}"),
            n => write!(f, "{first} (and {} more)", n - 1),
        }
    }
}

impl std::error::Error for Failure {}

// ---------------------------------------------------------------------------
// OutcomeExt
// ---------------------------------------------------------------------------

/// Read-only views over an [`Outcome`] that match how callers talk about it.
pub trait OutcomeExt {
    fn is_success(&self) -> bool;

    fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Errors carried by the outcome; empty exactly when it succeeded.
    fn errors(&self) -> &[Error];
}

impl<T> OutcomeExt for Outcome<T> {
    fn is_success(&self) -> bool {
        self.is_ok()
    }

    fn errors(&self) -> &[Error] {
        match self {
            Ok(_) => &[],
            Err(failure) => failure.errors(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
