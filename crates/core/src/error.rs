//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::id::UomId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
///
/// Every variant is recoverable: the boundary layer decides whether it becomes
/// a validation response or a not-found response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found, or belongs to another tenant.
    #[error("not found")]
    NotFound,

    /// A uniqueness or state conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No category-level or item-specific conversion exists for the unit pair.
    #[error("no conversion from unit {from} to unit {to}")]
    MissingConversion { from: UomId, to: UomId },

    /// A conversion factor was zero or negative.
    #[error("conversion factor must be positive (got {0})")]
    NonPositiveFactor(Decimal),

    /// A quantity that must be strictly positive was zero or negative.
    #[error("quantity must be positive (got {0})")]
    NonPositiveQuantity(Decimal),

    /// A ledger entry was denominated in a unit other than the item's base unit.
    #[error("unit {found} does not match item base unit {expected}")]
    UomMismatch { expected: UomId, found: UomId },

    /// Referenced entities belong to a tenant other than the acting one.
    #[error("cross-tenant reference: {0}")]
    CrossTenantMismatch(String),

    /// Execution was attempted on a recipe that is not active.
    #[error("recipe is not active")]
    InactiveRecipe,

    /// A posted inventory count (or one of its lines) was about to change.
    #[error("inventory count is posted and can no longer be modified")]
    PostedCountImmutable,
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

    pub fn cross_tenant(msg: impl Into<String>) -> Self {
        Self::CrossTenantMismatch(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
