//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// stock guards, state conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested entity was not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Illegal state transition, duplicate record, already-resolved row.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stock decrement would take physical stock below zero (or below what is held).
    #[error("insufficient stock: requested {requested}, on hand {on_hand}")]
    InsufficientStock { requested: i64, on_hand: i64 },

    /// A reservation asked for more than is currently available.
    #[error("insufficient available stock: requested {requested}, available {available}")]
    InsufficientAvailable { requested: i64, available: i64 },

    /// A release asked for more than is held against the reference.
    #[error("over-release: requested {requested}, held {held}")]
    OverRelease { requested: i64, held: i64 },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}
