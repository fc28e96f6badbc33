//! Error types for PTO Core
//!
//! This module defines all error types used by the model, codec and store.
//! We use `thiserror` for ergonomic error definitions with automatic Display/Error implementations.
//!
//! Callers that render errors to clients should go through [`PtoError::kind`]:
//! validation, referential and not-found failures are the client's fault,
//! everything else is a server-side fault.

use thiserror::Error;

/// Result type alias for PTO operations
pub type Result<T> = std::result::Result<T, PtoError>;

/// Main error type for PTO operations
#[derive(Error, Debug)]
pub enum PtoError {
    /// Malformed wire input
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Observation references a condition its set did not declare
    #[error("cannot insert observation with undeclared condition {condition} (set {set_id:?})")]
    UndeclaredCondition {
        condition: String,
        set_id: Option<i64>,
    },

    /// Exact condition lookup missed even after a reload
    #[error("unknown condition {0}")]
    UnknownCondition(String),

    /// A set was persisted or indexed before its conditions were resolved
    #[error("condition {0} has no id; resolve the set's conditions first")]
    UnresolvedCondition(String),

    /// An observation reached the store before its path was resolved
    #[error("path {0} has no id")]
    UnresolvedPath(String),

    /// Operation needs a set id but the set was never inserted
    #[error("observation set has not been persisted")]
    SetNotPersisted,

    /// Underlying SQLite failure
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<PtoError>,
    },
}

/// Errors raised while decoding wire input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    #[error("expected a JSON {expected}")]
    WrongShape { expected: &'static str },

    #[error("ObservationSet missing {0}")]
    MissingField(&'static str),

    #[error("{field} must be {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("Observation requires at least five elements, got {0}")]
    TooFewElements(usize),

    #[error("invalid {field} timestamp {value:?}: expected RFC 3339 UTC with trailing Z")]
    BadTimestamp { field: &'static str, value: String },

    #[error("invalid integer {value:?} in {field}")]
    BadInteger { field: &'static str, value: String },

    #[error("unexpected line in observation set file: {0}")]
    UnexpectedLine(String),

    #[error("observation before any observation set header")]
    OrphanObservation,
}

/// Coarse classification of a [`PtoError`], used to pick a client response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input
    Validation,
    /// Observation/condition membership violated
    Referential,
    /// Condition lookup found nothing
    NotFound,
    /// Persistence failure
    Store,
    /// Everything else (configuration, IO, programming errors)
    Internal,
}

impl PtoError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, stripped of context wrappers
    pub fn root(&self) -> &PtoError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::Validation(_) | Self::Serialization(_) => ErrorKind::Validation,
            Self::UndeclaredCondition { .. } => ErrorKind::Referential,
            Self::UnknownCondition(_) => ErrorKind::NotFound,
            Self::Store(_) => ErrorKind::Store,
            _ => ErrorKind::Internal,
        }
    }

    /// True when the caller sent bad input, as opposed to a server fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::Referential | ErrorKind::NotFound
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<PtoError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let err = PtoError::from(ValidationError::TooFewElements(3));
        let err = err.context("line 7");

        assert!(err.to_string().contains("line 7"));
        assert!(err.to_string().contains("at least five"));
    }

    #[test]
    fn test_kind_looks_through_context() {
        let result: Result<()> = Err(PtoError::UndeclaredCondition {
            condition: "tcp.ecn".to_string(),
            set_id: Some(4),
        });
        let err = result.context("line 2").context("file a.osf").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Referential);
        assert!(err.is_client_error());
        assert!(err.to_string().contains("tcp.ecn"));
    }

    #[test]
    fn test_store_errors_are_not_client_errors() {
        let err = PtoError::from(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(err.kind(), ErrorKind::Store);
        assert!(!err.is_client_error());

        let err = PtoError::UnknownCondition("nope".into());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_client_error());
    }
}
