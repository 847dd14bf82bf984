//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic validation and invariant failures only. Store and network
/// failures have their own error types in the crates that own those boundaries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A barcode did not satisfy the UPC rule.
    #[error("invalid UPC: {0:?}")]
    InvalidUpc(String),

    /// A tenant token could not be used as a key namespace.
    #[error("invalid tenant name: {0:?}")]
    InvalidTenant(String),

    /// A state transition was attempted out of order.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
