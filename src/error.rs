//! Error types for the reconciliation engine.

use crate::fieldpath::SerializeError;
use crate::merge::ApplyError;
use crate::ssa::ChangeSet;
use crate::typed::ParseError;
use std::fmt;
use thiserror::Error;

/// Errors surfaced by the engine and by cluster clients.
///
/// Every variant carries a message so that errors can be cloned into
/// change set entries and compared in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The object lacks the fields needed to identify it.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// The cluster could not be reached. Callers may retry.
    #[error("cluster not reachable: {0}")]
    NotReachable(String),

    /// The cluster refused the object as structurally invalid.
    #[error("validation rejected: {0}")]
    ValidationRejected(String),

    /// Another field manager owns a field the object sets.
    #[error("apply conflict: {0}")]
    Conflict(String),

    #[error("wait timed out: {0}")]
    WaitTimedOut(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// A stage finished with failures and later stages were not attempted.
    #[error("stage failed: {0}")]
    StageFailed(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true for failures a caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NotReachable(_))
    }

    /// Returns true when the caller's context ended the operation.
    pub fn is_context(&self) -> bool {
        matches!(self, Error::Cancelled(_) | Error::DeadlineExceeded(_))
    }
}

impl From<ApplyError> for Error {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::Conflicts(conflicts) => Error::Conflict(conflicts.to_string()),
            ApplyError::Validation(errors) => Error::ValidationRejected(errors.to_string()),
        }
    }
}

impl From<SerializeError> for Error {
    fn from(err: SerializeError) -> Self {
        Error::Serialization(err.message)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::InvalidObject(err.message)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// BatchError is returned by the batch operations when any object failed or
/// the batch was aborted. It keeps the change set of the objects that were
/// processed so callers can inspect partial success.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchError {
    pub changeset: ChangeSet,
    /// Per-object failures, keyed by subject.
    pub failures: Vec<(String, Error)>,
    /// Why the batch stopped early, if it did.
    pub reason: Option<Error>,
}

impl BatchError {
    /// A batch that was refused before any object was processed.
    pub fn rejected(reason: Error) -> Self {
        BatchError {
            changeset: ChangeSet::new(),
            failures: Vec::new(),
            reason: Some(reason),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.reason.is_some()
    }

    /// The failure recorded for `subject`, if any.
    pub fn failure(&self, subject: &str) -> Option<&Error> {
        self.failures
            .iter()
            .find(|(s, _)| s == subject)
            .map(|(_, err)| err)
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(reason) = &self.reason {
            write!(f, "{}", reason)?;
            if !self.failures.is_empty() {
                write!(f, "; ")?;
            }
        }
        if !self.failures.is_empty() {
            write!(f, "{} object(s) failed:", self.failures.len())?;
            for (subject, err) in &self.failures {
                write!(f, "\n* {}: {}", subject, err)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for BatchError {}
