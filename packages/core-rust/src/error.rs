//! Typed, attributable failure reasons.
//!
//! An [`Error`] is immutable once built: constructors fix the kind, code and
//! message, and the `with_*` builders only apply while the value is still
//! owned by its producer. Transport layers read [`ErrorKind`] (and the
//! optional status-code hint) to pick a response; that mapping lives outside
//! this crate.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Metadata key under which a transport status-code override is stored.
pub const STATUS_CODE_KEY: &str = "statusCode";

/// Closed classification of every failure the pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input that could not be interpreted at all.
    BadRequest,
    /// Well-formed input that fails a validation rule.
    Validation,
    /// The addressed entity does not exist.
    NotFound,
    /// The request conflicts with current state (duplicate slug, stale version).
    Conflict,
    /// The caller is not authenticated.
    Unauthorized,
    /// The caller is authenticated but not allowed to do this.
    Forbidden,
    /// An expected, domain-level failure.
    Failure,
    /// Anything the caller could not have anticipated.
    Unexpected,
}

impl ErrorKind {
    /// Stable lowercase label, used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::Failure => "failure",
            Self::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failure reason carried inside a [`Failure`](crate::Failure).
///
/// Fields are private so that an error, once handed to the pipeline, cannot be
/// rewritten by a behavior further up the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("[{kind}] {code}: {message}")]
pub struct Error {
    kind: ErrorKind,
    code: String,
    message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, serde_json::Value>,
}

impl Error {
    /// Create an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, code, message)
    }

    #[must_use]
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, code, message)
    }

    #[must_use]
    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, code, message)
    }

    #[must_use]
    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, code, message)
    }

    #[must_use]
    pub fn unauthorized(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, code, message)
    }

    #[must_use]
    pub fn forbidden(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, code, message)
    }

    #[must_use]
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Failure, code, message)
    }

    #[must_use]
    pub fn unexpected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, code, message)
    }

    /// Attach an out-of-band hint. A later value for the same key replaces
    /// the earlier one.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Ask the transport layer to answer with `status` instead of the
    /// default it derives from [`ErrorKind`].
    #[must_use]
    pub fn with_status_code(self, status: u16) -> Self {
        self.with_metadata(STATUS_CODE_KEY, status)
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    /// The status-code override, if one was attached and fits in a `u16`.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.metadata
            .get(STATUS_CODE_KEY)
            .and_then(serde_json::Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
