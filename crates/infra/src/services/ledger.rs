//! Stock ledger service.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{info, instrument};

use millstock_core::{
    DomainError, ItemId, Quantity, StockMoveId, TenantContext, TenantProvider, visible,
};
use millstock_inventory::{Item, MoveSource, NewStockMove, StockMove};

use crate::error::ServiceResult;
use crate::store::{ItemRepository, LedgerRepository, Pagination, Store, UnitOfWork};

/// Validate every draft against its item, then write them all.
///
/// Nothing is inserted unless every draft passes. Items are resolved in the
/// acting tenant; an item that does not resolve is a cross-tenant reference.
pub(crate) async fn append_in<T>(
    tx: &mut T,
    ctx: &impl TenantProvider,
    drafts: Vec<NewStockMove>,
) -> ServiceResult<Vec<StockMove>>
where
    T: ItemRepository + LedgerRepository + ?Sized,
{
    let ids: Vec<ItemId> = drafts.iter().map(|d| d.item_id).collect();
    let items: HashMap<ItemId, Item> = tx
        .get_items(ctx.tenant_id(), &ids)
        .await?
        .into_iter()
        .map(|item| (item.id, item))
        .collect();

    let now = Utc::now();
    let mut moves = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let item = items
            .get(&draft.item_id)
            .ok_or_else(|| DomainError::cross_tenant("ledger item is not visible to the acting tenant"))?;
        moves.push(StockMove::record(StockMoveId::new(), ctx.tenant_id(), item, draft, now)?);
    }

    tx.insert_moves(&moves).await?;
    Ok(moves)
}

/// Append-only stock ledger. Balances are always derived by summation.
#[derive(Debug, Clone)]
pub struct StockLedger<S> {
    store: S,
}

impl<S: Store> StockLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Record one entry. The unit must be the item's base unit.
    #[instrument(skip(self, ctx, draft), fields(tenant_id = %ctx.tenant_id(), item_id = %draft.item_id), err)]
    pub async fn append(&self, ctx: &TenantContext, draft: NewStockMove) -> ServiceResult<StockMove> {
        let mut tx = self.store.begin().await?;
        let item = tx
            .get_item(ctx.tenant_id(), draft.item_id)
            .await?
            .ok_or_else(|| DomainError::cross_tenant("ledger item is not visible to the acting tenant"))?;
        let entry = StockMove::record(StockMoveId::new(), ctx.tenant_id(), &item, draft, Utc::now())?;
        tx.insert_moves(std::slice::from_ref(&entry)).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Record several entries atomically: all land or none do.
    #[instrument(skip(self, ctx, drafts), fields(tenant_id = %ctx.tenant_id(), move_count = drafts.len()), err)]
    pub async fn append_batch(
        &self,
        ctx: &TenantContext,
        drafts: Vec<NewStockMove>,
    ) -> ServiceResult<Vec<StockMove>> {
        let mut tx = self.store.begin().await?;
        let moves = append_in(&mut tx, ctx, drafts).await?;
        tx.commit().await?;
        info!(move_count = moves.len(), "ledger batch appended");
        Ok(moves)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn balance(&self, ctx: &TenantContext, item_id: ItemId) -> ServiceResult<Quantity> {
        let mut tx = self.store.begin().await?;
        let item = visible(ctx, tx.get_item(ctx.tenant_id(), item_id).await?)?;
        let balance = tx.sum_quantity(ctx.tenant_id(), item.id).await?;
        tx.commit().await?;
        Ok(balance)
    }

    /// Balance of each requested item, in request order.
    #[instrument(skip(self, ctx, item_ids), fields(tenant_id = %ctx.tenant_id(), item_count = item_ids.len()), err)]
    pub async fn balances(
        &self,
        ctx: &TenantContext,
        item_ids: &[ItemId],
    ) -> ServiceResult<Vec<(ItemId, Quantity)>> {
        let mut tx = self.store.begin().await?;
        let found = tx.get_items(ctx.tenant_id(), item_ids).await?;
        let mut balances = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            if !found.iter().any(|item| item.id == *item_id) {
                return Err(DomainError::NotFound.into());
            }
            balances.push((*item_id, tx.sum_quantity(ctx.tenant_id(), *item_id).await?));
        }
        tx.commit().await?;
        Ok(balances)
    }

    /// Entries of one item, oldest first.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn history(
        &self,
        ctx: &TenantContext,
        item_id: ItemId,
        page: Pagination,
    ) -> ServiceResult<Vec<StockMove>> {
        let mut tx = self.store.begin().await?;
        let item = visible(ctx, tx.get_item(ctx.tenant_id(), item_id).await?)?;
        let moves = tx.list_moves(ctx.tenant_id(), item.id, page).await?;
        tx.commit().await?;
        Ok(moves)
    }

    /// Entries produced by one operation.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn moves_for_source(
        &self,
        ctx: &TenantContext,
        source: MoveSource,
    ) -> ServiceResult<Vec<StockMove>> {
        let mut tx = self.store.begin().await?;
        let moves = tx.list_moves_by_source(ctx.tenant_id(), source).await?;
        tx.commit().await?;
        Ok(moves)
    }
}
