//! Persistence boundary.
//!
//! Storage is split into narrow capability traits, one per aggregate family.
//! A [`UnitOfWork`] bundles all of them behind one transaction; services open
//! one with [`Store::begin`], do their reads and writes through it and either
//! [`UnitOfWork::commit`] or drop it. Dropping an uncommitted unit of work
//! rolls every write back.
//!
//! Every tenant-owned lookup takes the acting tenant and only returns rows
//! owned by it. The unit catalog is global.

use std::sync::Arc;

use async_trait::async_trait;

use millstock_core::{
    InventoryCountId, InventoryCountLineId, ItemId, PurchaseOptionId, Quantity, RecipeId,
    RecipeLineId, TenantId, UomCategoryId, UomId,
};
use millstock_inventory::{InventoryCount, InventoryCountLine, Item, MoveSource, StockMove};
use millstock_manufacturing::{Recipe, RecipeLine};
use millstock_purchasing::ItemPurchaseOption;
use millstock_uom::{ItemUomConversion, Uom, UomCategory, UomConversion};

use crate::error::StoreResult;

pub mod in_memory;
pub mod postgres;
pub mod query;

pub use in_memory::{InMemoryStore, InMemoryTx};
pub use postgres::{PostgresStore, PostgresTx};
pub use query::Pagination;

/// Unit catalog and item-specific conversion overrides.
#[async_trait]
pub trait CatalogRepository: Send {
    async fn get_category(&mut self, id: UomCategoryId) -> StoreResult<Option<UomCategory>>;

    async fn insert_category(&mut self, category: &UomCategory) -> StoreResult<()>;

    async fn get_uom(&mut self, id: UomId) -> StoreResult<Option<Uom>>;

    /// All units, or those of one category, ordered by symbol.
    async fn list_uoms(&mut self, category_id: Option<UomCategoryId>) -> StoreResult<Vec<Uom>>;

    async fn insert_uom(&mut self, uom: &Uom) -> StoreResult<()>;

    /// The single direct conversion `from -> to`, if one is on file.
    async fn find_conversion(&mut self, from: UomId, to: UomId) -> StoreResult<Option<UomConversion>>;

    async fn insert_conversion(&mut self, conversion: &UomConversion) -> StoreResult<()>;

    async fn find_item_conversion(
        &mut self,
        tenant_id: TenantId,
        item_id: ItemId,
        from: UomId,
        to: UomId,
    ) -> StoreResult<Option<ItemUomConversion>>;

    async fn insert_item_conversion(&mut self, conversion: &ItemUomConversion) -> StoreResult<()>;
}

#[async_trait]
pub trait ItemRepository: Send {
    async fn get_item(&mut self, tenant_id: TenantId, id: ItemId) -> StoreResult<Option<Item>>;

    /// The subset of `ids` owned by the tenant, ordered by id.
    async fn get_items(&mut self, tenant_id: TenantId, ids: &[ItemId]) -> StoreResult<Vec<Item>>;

    /// Like [`ItemRepository::get_items`], but also takes a row lock on each
    /// item (ascending id order) held until the unit of work ends.
    async fn lock_items(&mut self, tenant_id: TenantId, ids: &[ItemId]) -> StoreResult<Vec<Item>>;

    async fn insert_item(&mut self, item: &Item) -> StoreResult<()>;
}

/// Append-only stock ledger. There is no update or delete.
#[async_trait]
pub trait LedgerRepository: Send {
    async fn insert_moves(&mut self, moves: &[StockMove]) -> StoreResult<()>;

    /// Sum of every entry of the item; zero when it has none.
    async fn sum_quantity(&mut self, tenant_id: TenantId, item_id: ItemId) -> StoreResult<Quantity>;

    /// Entries of one item, oldest first.
    async fn list_moves(
        &mut self,
        tenant_id: TenantId,
        item_id: ItemId,
        page: Pagination,
    ) -> StoreResult<Vec<StockMove>>;

    async fn list_moves_by_source(
        &mut self,
        tenant_id: TenantId,
        source: MoveSource,
    ) -> StoreResult<Vec<StockMove>>;
}

#[async_trait]
pub trait RecipeRepository: Send {
    async fn get_recipe(&mut self, tenant_id: TenantId, id: RecipeId) -> StoreResult<Option<Recipe>>;

    async fn list_recipes_for_output(
        &mut self,
        tenant_id: TenantId,
        output_item_id: ItemId,
    ) -> StoreResult<Vec<Recipe>>;

    async fn insert_recipe(&mut self, recipe: &Recipe) -> StoreResult<()>;

    async fn update_recipe(&mut self, recipe: &Recipe) -> StoreResult<()>;

    async fn list_recipe_lines(
        &mut self,
        tenant_id: TenantId,
        recipe_id: RecipeId,
    ) -> StoreResult<Vec<RecipeLine>>;

    async fn insert_recipe_line(&mut self, line: &RecipeLine) -> StoreResult<()>;

    /// Returns whether a line was removed.
    async fn delete_recipe_line(
        &mut self,
        tenant_id: TenantId,
        recipe_id: RecipeId,
        line_id: RecipeLineId,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait CountRepository: Send {
    async fn get_count(
        &mut self,
        tenant_id: TenantId,
        id: InventoryCountId,
    ) -> StoreResult<Option<InventoryCount>>;

    /// Reads the count header under a row lock held until the unit of work ends.
    async fn lock_count(
        &mut self,
        tenant_id: TenantId,
        id: InventoryCountId,
    ) -> StoreResult<Option<InventoryCount>>;

    async fn insert_count(&mut self, count: &InventoryCount) -> StoreResult<()>;

    async fn update_count(&mut self, count: &InventoryCount) -> StoreResult<()>;

    /// Deletes the header and all of its lines.
    async fn delete_count(&mut self, tenant_id: TenantId, id: InventoryCountId) -> StoreResult<bool>;

    /// Lines of one count, ordered by item id.
    async fn list_count_lines(
        &mut self,
        tenant_id: TenantId,
        count_id: InventoryCountId,
    ) -> StoreResult<Vec<InventoryCountLine>>;

    async fn get_count_line(
        &mut self,
        tenant_id: TenantId,
        id: InventoryCountLineId,
    ) -> StoreResult<Option<InventoryCountLine>>;

    async fn insert_count_line(&mut self, line: &InventoryCountLine) -> StoreResult<()>;

    async fn update_count_line(&mut self, line: &InventoryCountLine) -> StoreResult<()>;

    async fn delete_count_line(
        &mut self,
        tenant_id: TenantId,
        id: InventoryCountLineId,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait PurchaseOptionRepository: Send {
    async fn get_purchase_option(
        &mut self,
        tenant_id: TenantId,
        id: PurchaseOptionId,
    ) -> StoreResult<Option<ItemPurchaseOption>>;

    async fn list_purchase_options(
        &mut self,
        tenant_id: TenantId,
        item_id: ItemId,
    ) -> StoreResult<Vec<ItemPurchaseOption>>;

    async fn insert_purchase_option(&mut self, option: &ItemPurchaseOption) -> StoreResult<()>;
}

/// One atomic transaction over every repository.
#[async_trait]
pub trait UnitOfWork:
    CatalogRepository
    + ItemRepository
    + LedgerRepository
    + RecipeRepository
    + CountRepository
    + PurchaseOptionRepository
    + Send
{
    /// Make every write of this unit of work visible at once.
    async fn commit(self) -> StoreResult<()>;
}

/// Entry point to a storage backend.
#[async_trait]
pub trait Store: Send + Sync {
    type Tx: UnitOfWork;

    async fn begin(&self) -> StoreResult<Self::Tx>;
}

#[async_trait]
impl<S> Store for Arc<S>
where
    S: Store + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        (**self).begin().await
    }
}
