//! Receiving purchased packs into stock.

use chrono::Utc;
use tracing::{info, instrument};

use millstock_core::{DomainError, ItemId, PurchaseOptionId, Quantity, TenantContext, visible};
use millstock_inventory::StockMove;
use millstock_purchasing::{ItemPurchaseOption, NewItemPurchaseOption};

use crate::error::ServiceResult;
use crate::services::conversion::resolve_factor;
use crate::services::ledger::append_in;
use crate::store::{CatalogRepository, ItemRepository, PurchaseOptionRepository, Store, UnitOfWork};

#[derive(Debug, Clone)]
pub struct PurchaseReceiving<S> {
    store: S,
}

impl<S: Store> PurchaseReceiving<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id(), item_id = %input.item_id), err)]
    pub async fn create_purchase_option(
        &self,
        ctx: &TenantContext,
        input: NewItemPurchaseOption,
    ) -> ServiceResult<ItemPurchaseOption> {
        let mut tx = self.store.begin().await?;
        let item = tx
            .get_item(ctx.tenant_id(), input.item_id)
            .await?
            .ok_or_else(|| DomainError::cross_tenant("purchased item is not visible to the acting tenant"))?;
        tx.get_uom(input.pack_uom_id).await?.ok_or(DomainError::NotFound)?;
        let option = ItemPurchaseOption::new(PurchaseOptionId::new(), ctx.tenant_id(), &item, input, Utc::now())?;
        tx.insert_purchase_option(&option).await?;
        tx.commit().await?;
        Ok(option)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn get_purchase_option(
        &self,
        ctx: &TenantContext,
        id: PurchaseOptionId,
    ) -> ServiceResult<ItemPurchaseOption> {
        let mut tx = self.store.begin().await?;
        let option = visible(ctx, tx.get_purchase_option(ctx.tenant_id(), id).await?)?;
        tx.commit().await?;
        Ok(option)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn list_purchase_options(
        &self,
        ctx: &TenantContext,
        item_id: ItemId,
    ) -> ServiceResult<Vec<ItemPurchaseOption>> {
        let mut tx = self.store.begin().await?;
        let item = visible(ctx, tx.get_item(ctx.tenant_id(), item_id).await?)?;
        let options = tx.list_purchase_options(ctx.tenant_id(), item.id).await?;
        tx.commit().await?;
        Ok(options)
    }

    /// Receive `pack_count` packs as one receipt in the item's base unit.
    ///
    /// The pack unit is converted to the base unit with the usual single-step
    /// resolution; no path means `MissingConversion` and nothing is written.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn receive(
        &self,
        ctx: &TenantContext,
        option_id: PurchaseOptionId,
        pack_count: Quantity,
    ) -> ServiceResult<StockMove> {
        let mut tx = self.store.begin().await?;
        let option = visible(ctx, tx.get_purchase_option(ctx.tenant_id(), option_id).await?)?;
        let pack_count = pack_count.ensure_positive()?;
        let item = tx
            .get_item(ctx.tenant_id(), option.item_id)
            .await?
            .ok_or_else(|| DomainError::cross_tenant("purchased item is not visible to the acting tenant"))?;

        let factor = resolve_factor(&mut tx, &item, option.pack_uom_id, item.base_uom_id).await?;
        let draft = option.plan_receipt(&item, pack_count, factor)?;
        let mut moves = append_in(&mut tx, ctx, vec![draft]).await?;
        tx.commit().await?;

        let entry = moves
            .pop()
            .ok_or_else(|| DomainError::validation("receipt produced no ledger entry"))?;
        info!(option_id = %option.id, %pack_count, quantity = %entry.quantity, "purchase received");
        Ok(entry)
    }
}
