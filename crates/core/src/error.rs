//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Business failures raised by stock bins and reservation buckets.
///
/// Lock poisoning, storage and publication failures are infra errors and
/// never show up here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Bad input, such as a negative delivered quantity.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The command would break the aggregate, such as posting stock below zero
    /// or routing a command to another key's bucket.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A reservation or stream id did not parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Movement posted against a bin that was never opened.
    #[error("not found")]
    NotFound,

    /// Stale stream version, a bin opened twice, or a reused reservation id.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Refused for its origin: reservation entries are only written by
    /// voucher lifecycle code, never inserted by hand.
    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
