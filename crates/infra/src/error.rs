//! Infrastructure and service error types.

use thiserror::Error;

use millstock_core::DomainError;

pub type StoreResult<T> = Result<T, StoreError>;
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Storage operation error.
///
/// These are **infrastructure errors** as opposed to domain errors
/// (validation, invariants).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write; carries the constraint name.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("database error: {0}")]
    Database(String),

    /// A persisted row could not be turned back into a domain value.
    #[error("failed to decode row: {0}")]
    Decode(String),
}

/// Error returned by every application service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),
}

impl ServiceError {
    /// The domain error, if this is one.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            ServiceError::Store(_) => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(constraint) => ServiceError::Domain(
                DomainError::conflict(format!("unique constraint '{constraint}' violated")),
            ),
            other => ServiceError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_surfaces_as_conflict() {
        let err: ServiceError = StoreError::UniqueViolation("items_tenant_sku_key".to_string()).into();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(msg)) if msg.contains("items_tenant_sku_key")));

        let err: ServiceError = StoreError::Database("connection reset".to_string()).into();
        assert!(err.domain().is_none());
    }
}
