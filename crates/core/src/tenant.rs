//! Tenant scoping.
//!
//! There is no ambient tenant: every service call receives a [`TenantContext`]
//! (or any other [`TenantProvider`]) explicitly, and every repository lookup is
//! filtered by it.

use crate::error::{DomainError, DomainResult};
use crate::id::TenantId;

/// Tenant context for a call.
///
/// This is immutable and must be present for all tenant-scoped operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Anything that can yield the acting tenant (request extensions, job
/// payloads, test fixtures...).
pub trait TenantProvider {
    fn tenant_id(&self) -> TenantId;
}

impl TenantProvider for TenantContext {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Helper trait for tenant-owned entities.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

/// Resolve a looked-up entity against the acting tenant.
///
/// A missing entity and an entity owned by another tenant are
/// indistinguishable: both become `NotFound`.
pub fn visible<E: TenantScoped>(ctx: &impl TenantProvider, entity: Option<E>) -> DomainResult<E> {
    match entity {
        Some(e) if e.tenant_id() == ctx.tenant_id() => Ok(e),
        _ => Err(DomainError::not_found()),
    }
}

/// Check that an entity referenced by another one belongs to the acting tenant.
pub fn ensure_same_tenant<E: TenantScoped>(
    ctx: &impl TenantProvider,
    entity: &E,
    what: &str,
) -> DomainResult<()> {
    if entity.tenant_id() != ctx.tenant_id() {
        return Err(DomainError::cross_tenant(format!(
            "{what} belongs to a different tenant"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Owned(TenantId);

    impl TenantScoped for Owned {
        fn tenant_id(&self) -> TenantId {
            self.0
        }
    }

    #[test]
    fn foreign_entity_looks_like_missing_entity() {
        let ctx = TenantContext::new(TenantId::new());
        let foreign = visible(&ctx, Some(Owned(TenantId::new()))).err();
        let missing = visible::<Owned>(&ctx, None).err();
        assert_eq!(foreign, Some(DomainError::NotFound));
        assert_eq!(foreign, missing);
    }

    #[test]
    fn referenced_entity_from_other_tenant_is_cross_tenant() {
        let ctx = TenantContext::new(TenantId::new());
        let err = ensure_same_tenant(&ctx, &Owned(TenantId::new()), "item").unwrap_err();
        assert!(matches!(err, DomainError::CrossTenantMismatch(_)));
        assert!(ensure_same_tenant(&ctx, &Owned(ctx.tenant_id()), "item").is_ok());
    }
}
