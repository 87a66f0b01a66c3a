//! Unit conversion resolution.
//!
//! One lookup at most, never chained: identity, a direct category-level
//! conversion, or a direct item-specific override.

use tracing::instrument;

use millstock_core::{
    DomainError, Factor, ItemId, Quantity, TenantContext, UomId, visible,
};
use millstock_inventory::Item;
use millstock_uom::ConversionPath;

use crate::error::ServiceResult;
use crate::store::{CatalogRepository, ItemRepository, Store, UnitOfWork};

/// Factor such that `qty_in_to = qty_in_from * factor` for `item`.
///
/// Runs inside an open unit of work. Unknown units fail with `NotFound`.
pub async fn resolve_factor<T>(tx: &mut T, item: &Item, from: UomId, to: UomId) -> ServiceResult<Factor>
where
    T: CatalogRepository + ?Sized,
{
    let from_uom = tx.get_uom(from).await?.ok_or(DomainError::NotFound)?;
    let to_uom = tx.get_uom(to).await?.ok_or(DomainError::NotFound)?;

    let path = ConversionPath::between(&from_uom, &to_uom);
    let found = match path {
        ConversionPath::Identity => None,
        ConversionPath::Category => tx.find_conversion(from, to).await?.map(|c| c.factor),
        ConversionPath::ItemSpecific => tx
            .find_item_conversion(item.tenant_id, item.id, from, to)
            .await?
            .map(|c| c.factor),
    };
    Ok(path.resolve(&from_uom, &to_uom, found)?)
}

/// Standalone access to conversion resolution.
#[derive(Debug, Clone)]
pub struct ConversionResolver<S> {
    store: S,
}

impl<S: Store> ConversionResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn resolve(
        &self,
        ctx: &TenantContext,
        item_id: ItemId,
        from: UomId,
        to: UomId,
    ) -> ServiceResult<Factor> {
        let mut tx = self.store.begin().await?;
        let item = visible(ctx, tx.get_item(ctx.tenant_id(), item_id).await?)?;
        let factor = resolve_factor(&mut tx, &item, from, to).await?;
        tx.commit().await?;
        Ok(factor)
    }

    /// Convert `quantity` from one unit to another, rounded half-to-even to
    /// six fractional digits.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn convert(
        &self,
        ctx: &TenantContext,
        item_id: ItemId,
        quantity: Quantity,
        from: UomId,
        to: UomId,
    ) -> ServiceResult<Quantity> {
        let factor = self.resolve(ctx, item_id, from, to).await?;
        Ok(Quantity::round(quantity.checked_mul(factor.as_decimal())?)?)
    }
}
