//! Service-level error model.

use thiserror::Error;

use stockflow_auth::AuthzError;
use stockflow_core::DomainError;

use crate::db::StoreError;

pub type ProcurementResult<T> = Result<T, ProcurementError>;

/// Errors surfaced by the `Procurement` facade and the services behind it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcurementError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient stock: requested {requested}, on hand {on_hand}")]
    InsufficientStock { requested: i64, on_hand: i64 },

    #[error("insufficient available stock: requested {requested}, available {available}")]
    InsufficientAvailable { requested: i64, available: i64 },

    #[error("over-release: requested {requested}, held {held}")]
    OverRelease { requested: i64, held: i64 },

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProcurementError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<DomainError> for ProcurementError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::NotFound(what) => Self::NotFound(what),
            DomainError::Conflict(msg) => Self::Conflict(msg),
            DomainError::InsufficientStock { requested, on_hand } => {
                Self::InsufficientStock { requested, on_hand }
            }
            DomainError::InsufficientAvailable {
                requested,
                available,
            } => Self::InsufficientAvailable {
                requested,
                available,
            },
            DomainError::OverRelease { requested, held } => Self::OverRelease { requested, held },
        }
    }
}

impl From<StoreError> for ProcurementError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(msg) => Self::Conflict(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<AuthzError> for ProcurementError {
    fn from(err: AuthzError) -> Self {
        Self::Permission(err.to_string())
    }
}
