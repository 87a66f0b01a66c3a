//! Physical inventory counts and their reconciliation into the ledger.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, instrument};

use millstock_core::{
    DomainError, InventoryCountId, InventoryCountLineId, ItemId, Quantity, TenantContext, UserId,
    visible,
};
use millstock_inventory::{
    InventoryCount, InventoryCountLine, Item, NewInventoryCount, StockMove, plan_adjustments,
};

use crate::error::ServiceResult;
use crate::services::ledger::append_in;
use crate::store::{CountRepository, ItemRepository, LedgerRepository, Store, UnitOfWork};

#[derive(Debug, Clone)]
pub struct CountReconciler<S> {
    store: S,
}

impl<S: Store> CountReconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn create_count(
        &self,
        ctx: &TenantContext,
        input: NewInventoryCount,
    ) -> ServiceResult<InventoryCount> {
        let count = InventoryCount::new(InventoryCountId::new(), ctx.tenant_id(), input, Utc::now())?;
        let mut tx = self.store.begin().await?;
        tx.insert_count(&count).await?;
        tx.commit().await?;
        Ok(count)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn get_count(&self, ctx: &TenantContext, id: InventoryCountId) -> ServiceResult<InventoryCount> {
        let mut tx = self.store.begin().await?;
        let count = visible(ctx, tx.get_count(ctx.tenant_id(), id).await?)?;
        tx.commit().await?;
        Ok(count)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn lines(
        &self,
        ctx: &TenantContext,
        id: InventoryCountId,
    ) -> ServiceResult<Vec<InventoryCountLine>> {
        let mut tx = self.store.begin().await?;
        let count = visible(ctx, tx.get_count(ctx.tenant_id(), id).await?)?;
        let lines = tx.list_count_lines(ctx.tenant_id(), count.id).await?;
        tx.commit().await?;
        Ok(lines)
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn update_count(
        &self,
        ctx: &TenantContext,
        id: InventoryCountId,
        input: NewInventoryCount,
    ) -> ServiceResult<InventoryCount> {
        let mut tx = self.store.begin().await?;
        let mut count = visible(ctx, tx.lock_count(ctx.tenant_id(), id).await?)?;
        count.update(input)?;
        tx.update_count(&count).await?;
        tx.commit().await?;
        Ok(count)
    }

    /// Drafts only; a posted count is part of the audit trail.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn delete_count(&self, ctx: &TenantContext, id: InventoryCountId) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        let count = visible(ctx, tx.lock_count(ctx.tenant_id(), id).await?)?;
        count.ensure_draft()?;
        if !tx.delete_count(ctx.tenant_id(), count.id).await? {
            return Err(DomainError::NotFound.into());
        }
        tx.commit().await?;
        Ok(())
    }

    /// Record a counted quantity, in the item's base unit.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn add_line(
        &self,
        ctx: &TenantContext,
        count_id: InventoryCountId,
        item_id: ItemId,
        counted: Quantity,
    ) -> ServiceResult<InventoryCountLine> {
        let mut tx = self.store.begin().await?;
        let count = visible(ctx, tx.lock_count(ctx.tenant_id(), count_id).await?)?;
        count.ensure_draft()?;
        let item = tx
            .get_item(ctx.tenant_id(), item_id)
            .await?
            .ok_or_else(|| DomainError::cross_tenant("counted item is not visible to the acting tenant"))?;
        let line = InventoryCountLine::new(InventoryCountLineId::new(), &count, &item, counted)?;
        tx.insert_count_line(&line).await?;
        tx.commit().await?;
        Ok(line)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn update_line(
        &self,
        ctx: &TenantContext,
        line_id: InventoryCountLineId,
        counted: Quantity,
    ) -> ServiceResult<InventoryCountLine> {
        let mut tx = self.store.begin().await?;
        let mut line = visible(ctx, tx.get_count_line(ctx.tenant_id(), line_id).await?)?;
        let count = visible(ctx, tx.lock_count(ctx.tenant_id(), line.count_id).await?)?;
        line.set_counted(&count, counted)?;
        tx.update_count_line(&line).await?;
        tx.commit().await?;
        Ok(line)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn delete_line(&self, ctx: &TenantContext, line_id: InventoryCountLineId) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        let line = visible(ctx, tx.get_count_line(ctx.tenant_id(), line_id).await?)?;
        let count = visible(ctx, tx.lock_count(ctx.tenant_id(), line.count_id).await?)?;
        count.ensure_draft()?;
        if !tx.delete_count_line(ctx.tenant_id(), line.id).await? {
            return Err(DomainError::NotFound.into());
        }
        tx.commit().await?;
        Ok(())
    }

    /// Post a draft count: one adjustment per line whose counted quantity
    /// differs from the current balance, then flip the count to posted.
    ///
    /// The count header and every counted item are locked for the duration,
    /// so a concurrent post of the same count sees `PostedCountImmutable` and
    /// concurrent posts touching the same items are serialized.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn post(
        &self,
        ctx: &TenantContext,
        count_id: InventoryCountId,
        actor: UserId,
    ) -> ServiceResult<Vec<StockMove>> {
        let mut tx = self.store.begin().await?;
        let mut count = visible(ctx, tx.lock_count(ctx.tenant_id(), count_id).await?)?;
        count.ensure_draft()?;

        let lines = tx.list_count_lines(ctx.tenant_id(), count.id).await?;
        let ids: Vec<ItemId> = lines.iter().map(|l| l.item_id).collect();
        let items: HashMap<ItemId, Item> = tx
            .lock_items(ctx.tenant_id(), &ids)
            .await?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        let mut balances = HashMap::with_capacity(items.len());
        for item_id in items.keys() {
            balances.insert(*item_id, tx.sum_quantity(ctx.tenant_id(), *item_id).await?);
        }

        let plan = plan_adjustments(&count, &lines, &items, &balances)?;
        for item_id in &plan.unchanged {
            debug!(%item_id, "counted quantity matches balance, no adjustment");
        }

        let moves = append_in(&mut tx, ctx, plan.moves).await?;
        count.mark_posted(actor, Utc::now())?;
        tx.update_count(&count).await?;
        tx.commit().await?;

        info!(
            count_id = %count.id,
            adjusted = moves.len(),
            unchanged = plan.unchanged.len(),
            "inventory count posted"
        );
        Ok(moves)
    }
}
