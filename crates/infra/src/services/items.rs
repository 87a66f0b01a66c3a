//! Item administration.

use chrono::Utc;
use tracing::instrument;

use millstock_core::{DomainError, ItemId, TenantContext, visible};
use millstock_inventory::{Item, NewItem};

use crate::error::ServiceResult;
use crate::store::{CatalogRepository, ItemRepository, Store, UnitOfWork};

/// Creates and reads items. There is no update path for the base unit: every
/// ledger entry of an item stays denominated in the unit it was created with.
#[derive(Debug, Clone)]
pub struct ItemService<S> {
    store: S,
}

impl<S: Store> ItemService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id(), name = %input.name), err)]
    pub async fn create_item(&self, ctx: &TenantContext, input: NewItem) -> ServiceResult<Item> {
        let item = Item::new(ItemId::new(), ctx.tenant_id(), input, Utc::now())?;

        let mut tx = self.store.begin().await?;
        tx.get_uom(item.base_uom_id).await?.ok_or(DomainError::NotFound)?;
        tx.insert_item(&item).await?;
        tx.commit().await?;
        Ok(item)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn get_item(&self, ctx: &TenantContext, id: ItemId) -> ServiceResult<Item> {
        let mut tx = self.store.begin().await?;
        let item = visible(ctx, tx.get_item(ctx.tenant_id(), id).await?)?;
        tx.commit().await?;
        Ok(item)
    }
}
