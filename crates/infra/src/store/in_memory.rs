//! In-memory store.
//!
//! Intended for tests/dev. Not optimized for performance: a unit of work
//! holds the store's only lock from `begin` until commit or drop and works on a
//! private copy of the whole state, so transactions are fully serialized and a
//! dropped unit of work leaves no trace. Uniqueness and referential rules of
//! the relational schema are emulated so both stores fail the same way.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use millstock_core::{
    InventoryCountId, InventoryCountLineId, ItemId, PurchaseOptionId, Quantity, RecipeId,
    RecipeLineId, TenantId, UomCategoryId, UomId,
};
use millstock_inventory::{InventoryCount, InventoryCountLine, Item, MoveSource, StockMove};
use millstock_manufacturing::{Recipe, RecipeLine};
use millstock_purchasing::ItemPurchaseOption;
use millstock_uom::{ItemUomConversion, Uom, UomCategory, UomConversion};

use super::query::Pagination;
use super::{
    CatalogRepository, CountRepository, ItemRepository, LedgerRepository,
    PurchaseOptionRepository, RecipeRepository, Store, UnitOfWork,
};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
struct State {
    categories: HashMap<UomCategoryId, UomCategory>,
    uoms: HashMap<UomId, Uom>,
    conversions: Vec<UomConversion>,
    item_conversions: Vec<ItemUomConversion>,
    items: HashMap<ItemId, Item>,
    moves: Vec<StockMove>,
    recipes: HashMap<RecipeId, Recipe>,
    recipe_lines: Vec<RecipeLine>,
    counts: HashMap<InventoryCountId, InventoryCount>,
    count_lines: Vec<InventoryCountLine>,
    purchase_options: HashMap<PurchaseOptionId, ItemPurchaseOption>,
}

fn unique(constraint: &str) -> StoreError {
    StoreError::UniqueViolation(constraint.to_string())
}

fn foreign_key(constraint: &str) -> StoreError {
    StoreError::Database(format!("foreign key violation: {constraint}"))
}

impl State {
    fn owned_item(&self, tenant_id: TenantId, id: ItemId) -> Option<&Item> {
        self.items.get(&id).filter(|i| i.tenant_id == tenant_id)
    }

    fn require_item(&self, tenant_id: TenantId, id: ItemId, constraint: &str) -> StoreResult<()> {
        self.owned_item(tenant_id, id)
            .map(|_| ())
            .ok_or_else(|| foreign_key(constraint))
    }

    fn require_uom(&self, id: UomId, constraint: &str) -> StoreResult<()> {
        if self.uoms.contains_key(&id) {
            Ok(())
        } else {
            Err(foreign_key(constraint))
        }
    }

    fn check_default_recipe(&self, recipe: &Recipe) -> StoreResult<()> {
        if !recipe.is_default {
            return Ok(());
        }
        let clash = self.recipes.values().any(|r| {
            r.id != recipe.id
                && r.is_default
                && r.tenant_id == recipe.tenant_id
                && r.output_item_id == recipe.output_item_id
        });
        if clash {
            return Err(unique("recipes_one_default_per_output"));
        }
        Ok(())
    }
}

/// In-memory store shared by cloning.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Unit of work over [`InMemoryStore`].
#[derive(Debug)]
pub struct InMemoryTx {
    committed: OwnedMutexGuard<State>,
    work: State,
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> StoreResult<InMemoryTx> {
        let committed = self.state.clone().lock_owned().await;
        let work = committed.clone();
        Ok(InMemoryTx { committed, work })
    }
}

#[async_trait]
impl UnitOfWork for InMemoryTx {
    async fn commit(self) -> StoreResult<()> {
        let InMemoryTx { mut committed, work } = self;
        *committed = work;
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryTx {
    async fn get_category(&mut self, id: UomCategoryId) -> StoreResult<Option<UomCategory>> {
        Ok(self.work.categories.get(&id).cloned())
    }

    async fn insert_category(&mut self, category: &UomCategory) -> StoreResult<()> {
        if self.work.categories.values().any(|c| c.name == category.name) {
            return Err(unique("uom_categories_name_key"));
        }
        self.work.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn get_uom(&mut self, id: UomId) -> StoreResult<Option<Uom>> {
        Ok(self.work.uoms.get(&id).cloned())
    }

    async fn list_uoms(&mut self, category_id: Option<UomCategoryId>) -> StoreResult<Vec<Uom>> {
        let mut uoms: Vec<Uom> = self
            .work
            .uoms
            .values()
            .filter(|u| category_id.is_none_or(|c| u.category_id == c))
            .cloned()
            .collect();
        uoms.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(uoms)
    }

    async fn insert_uom(&mut self, uom: &Uom) -> StoreResult<()> {
        if !self.work.categories.contains_key(&uom.category_id) {
            return Err(foreign_key("uoms_category_id_fkey"));
        }
        if self.work.uoms.values().any(|u| u.symbol == uom.symbol) {
            return Err(unique("uoms_symbol_key"));
        }
        self.work.uoms.insert(uom.id, uom.clone());
        Ok(())
    }

    async fn find_conversion(&mut self, from: UomId, to: UomId) -> StoreResult<Option<UomConversion>> {
        Ok(self
            .work
            .conversions
            .iter()
            .find(|c| c.from_uom_id == from && c.to_uom_id == to)
            .cloned())
    }

    async fn insert_conversion(&mut self, conversion: &UomConversion) -> StoreResult<()> {
        self.work.require_uom(conversion.from_uom_id, "uom_conversions_from_uom_id_fkey")?;
        self.work.require_uom(conversion.to_uom_id, "uom_conversions_to_uom_id_fkey")?;
        let exists = self.work.conversions.iter().any(|c| {
            c.from_uom_id == conversion.from_uom_id && c.to_uom_id == conversion.to_uom_id
        });
        if exists {
            return Err(unique("uom_conversions_from_uom_id_to_uom_id_key"));
        }
        self.work.conversions.push(conversion.clone());
        Ok(())
    }

    async fn find_item_conversion(
        &mut self,
        tenant_id: TenantId,
        item_id: ItemId,
        from: UomId,
        to: UomId,
    ) -> StoreResult<Option<ItemUomConversion>> {
        Ok(self
            .work
            .item_conversions
            .iter()
            .find(|c| {
                c.tenant_id == tenant_id
                    && c.item_id == item_id
                    && c.from_uom_id == from
                    && c.to_uom_id == to
            })
            .cloned())
    }

    async fn insert_item_conversion(&mut self, conversion: &ItemUomConversion) -> StoreResult<()> {
        self.work
            .require_item(conversion.tenant_id, conversion.item_id, "item_uom_conversions_item_fkey")?;
        self.work.require_uom(conversion.from_uom_id, "item_uom_conversions_from_uom_id_fkey")?;
        self.work.require_uom(conversion.to_uom_id, "item_uom_conversions_to_uom_id_fkey")?;
        let exists = self.work.item_conversions.iter().any(|c| {
            c.tenant_id == conversion.tenant_id
                && c.item_id == conversion.item_id
                && c.from_uom_id == conversion.from_uom_id
                && c.to_uom_id == conversion.to_uom_id
        });
        if exists {
            return Err(unique("item_uom_conversions_tenant_item_pair_key"));
        }
        self.work.item_conversions.push(conversion.clone());
        Ok(())
    }
}

#[async_trait]
impl ItemRepository for InMemoryTx {
    async fn get_item(&mut self, tenant_id: TenantId, id: ItemId) -> StoreResult<Option<Item>> {
        Ok(self.work.owned_item(tenant_id, id).cloned())
    }

    async fn get_items(&mut self, tenant_id: TenantId, ids: &[ItemId]) -> StoreResult<Vec<Item>> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        Ok(ids
            .into_iter()
            .filter_map(|id| self.work.owned_item(tenant_id, id).cloned())
            .collect())
    }

    async fn lock_items(&mut self, tenant_id: TenantId, ids: &[ItemId]) -> StoreResult<Vec<Item>> {
        // The unit of work already holds the store-wide lock.
        self.get_items(tenant_id, ids).await
    }

    async fn insert_item(&mut self, item: &Item) -> StoreResult<()> {
        self.work.require_uom(item.base_uom_id, "items_base_uom_id_fkey")?;
        if let Some(sku) = &item.sku {
            let taken = self
                .work
                .items
                .values()
                .any(|i| i.tenant_id == item.tenant_id && i.sku.as_ref() == Some(sku));
            if taken {
                return Err(unique("items_tenant_id_sku_key"));
            }
        }
        self.work.items.insert(item.id, item.clone());
        Ok(())
    }
}

#[async_trait]
impl LedgerRepository for InMemoryTx {
    async fn insert_moves(&mut self, moves: &[StockMove]) -> StoreResult<()> {
        for m in moves {
            self.work.require_item(m.tenant_id, m.item_id, "stock_moves_item_fkey")?;
        }
        self.work.moves.extend_from_slice(moves);
        Ok(())
    }

    async fn sum_quantity(&mut self, tenant_id: TenantId, item_id: ItemId) -> StoreResult<Quantity> {
        let quantities = self
            .work
            .moves
            .iter()
            .filter(|m| m.tenant_id == tenant_id && m.item_id == item_id)
            .map(|m| m.quantity);
        Quantity::checked_sum(quantities).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn list_moves(
        &mut self,
        tenant_id: TenantId,
        item_id: ItemId,
        page: Pagination,
    ) -> StoreResult<Vec<StockMove>> {
        Ok(self
            .work
            .moves
            .iter()
            .filter(|m| m.tenant_id == tenant_id && m.item_id == item_id)
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn list_moves_by_source(
        &mut self,
        tenant_id: TenantId,
        source: MoveSource,
    ) -> StoreResult<Vec<StockMove>> {
        Ok(self
            .work
            .moves
            .iter()
            .filter(|m| m.tenant_id == tenant_id && m.source == Some(source))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RecipeRepository for InMemoryTx {
    async fn get_recipe(&mut self, tenant_id: TenantId, id: RecipeId) -> StoreResult<Option<Recipe>> {
        Ok(self
            .work
            .recipes
            .get(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_recipes_for_output(
        &mut self,
        tenant_id: TenantId,
        output_item_id: ItemId,
    ) -> StoreResult<Vec<Recipe>> {
        let mut recipes: Vec<Recipe> = self
            .work
            .recipes
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.output_item_id == output_item_id)
            .cloned()
            .collect();
        recipes.sort_by_key(|r| r.id);
        Ok(recipes)
    }

    async fn insert_recipe(&mut self, recipe: &Recipe) -> StoreResult<()> {
        self.work
            .require_item(recipe.tenant_id, recipe.output_item_id, "recipes_output_item_fkey")?;
        self.work.check_default_recipe(recipe)?;
        self.work.recipes.insert(recipe.id, recipe.clone());
        Ok(())
    }

    async fn update_recipe(&mut self, recipe: &Recipe) -> StoreResult<()> {
        self.work.check_default_recipe(recipe)?;
        match self.work.recipes.get_mut(&recipe.id) {
            Some(existing) if existing.tenant_id == recipe.tenant_id => {
                *existing = recipe.clone();
                Ok(())
            }
            _ => Err(StoreError::Database(format!("recipe {} does not exist", recipe.id))),
        }
    }

    async fn list_recipe_lines(
        &mut self,
        tenant_id: TenantId,
        recipe_id: RecipeId,
    ) -> StoreResult<Vec<RecipeLine>> {
        Ok(self
            .work
            .recipe_lines
            .iter()
            .filter(|l| l.tenant_id == tenant_id && l.recipe_id == recipe_id)
            .cloned()
            .collect())
    }

    async fn insert_recipe_line(&mut self, line: &RecipeLine) -> StoreResult<()> {
        let recipe_ok = self
            .work
            .recipes
            .get(&line.recipe_id)
            .is_some_and(|r| r.tenant_id == line.tenant_id);
        if !recipe_ok {
            return Err(foreign_key("recipe_lines_recipe_fkey"));
        }
        self.work
            .require_item(line.tenant_id, line.input_item_id, "recipe_lines_input_item_fkey")?;
        let duplicate = self
            .work
            .recipe_lines
            .iter()
            .any(|l| l.recipe_id == line.recipe_id && l.input_item_id == line.input_item_id);
        if duplicate {
            return Err(unique("recipe_lines_recipe_id_input_item_id_key"));
        }
        self.work.recipe_lines.push(line.clone());
        Ok(())
    }

    async fn delete_recipe_line(
        &mut self,
        tenant_id: TenantId,
        recipe_id: RecipeId,
        line_id: RecipeLineId,
    ) -> StoreResult<bool> {
        let before = self.work.recipe_lines.len();
        self.work
            .recipe_lines
            .retain(|l| !(l.id == line_id && l.recipe_id == recipe_id && l.tenant_id == tenant_id));
        Ok(self.work.recipe_lines.len() != before)
    }
}

#[async_trait]
impl CountRepository for InMemoryTx {
    async fn get_count(
        &mut self,
        tenant_id: TenantId,
        id: InventoryCountId,
    ) -> StoreResult<Option<InventoryCount>> {
        Ok(self
            .work
            .counts
            .get(&id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    async fn lock_count(
        &mut self,
        tenant_id: TenantId,
        id: InventoryCountId,
    ) -> StoreResult<Option<InventoryCount>> {
        self.get_count(tenant_id, id).await
    }

    async fn insert_count(&mut self, count: &InventoryCount) -> StoreResult<()> {
        self.work.counts.insert(count.id, count.clone());
        Ok(())
    }

    async fn update_count(&mut self, count: &InventoryCount) -> StoreResult<()> {
        match self.work.counts.get_mut(&count.id) {
            Some(existing) if existing.tenant_id == count.tenant_id => {
                *existing = count.clone();
                Ok(())
            }
            _ => Err(StoreError::Database(format!("inventory count {} does not exist", count.id))),
        }
    }

    async fn delete_count(&mut self, tenant_id: TenantId, id: InventoryCountId) -> StoreResult<bool> {
        let owned = self.work.counts.get(&id).is_some_and(|c| c.tenant_id == tenant_id);
        if !owned {
            return Ok(false);
        }
        self.work.counts.remove(&id);
        self.work.count_lines.retain(|l| l.count_id != id);
        Ok(true)
    }

    async fn list_count_lines(
        &mut self,
        tenant_id: TenantId,
        count_id: InventoryCountId,
    ) -> StoreResult<Vec<InventoryCountLine>> {
        let mut lines: Vec<InventoryCountLine> = self
            .work
            .count_lines
            .iter()
            .filter(|l| l.tenant_id == tenant_id && l.count_id == count_id)
            .cloned()
            .collect();
        lines.sort_by_key(|l| l.item_id);
        Ok(lines)
    }

    async fn get_count_line(
        &mut self,
        tenant_id: TenantId,
        id: InventoryCountLineId,
    ) -> StoreResult<Option<InventoryCountLine>> {
        Ok(self
            .work
            .count_lines
            .iter()
            .find(|l| l.id == id && l.tenant_id == tenant_id)
            .cloned())
    }

    async fn insert_count_line(&mut self, line: &InventoryCountLine) -> StoreResult<()> {
        let count_ok = self
            .work
            .counts
            .get(&line.count_id)
            .is_some_and(|c| c.tenant_id == line.tenant_id);
        if !count_ok {
            return Err(foreign_key("inventory_count_lines_count_fkey"));
        }
        self.work
            .require_item(line.tenant_id, line.item_id, "inventory_count_lines_item_fkey")?;
        let duplicate = self
            .work
            .count_lines
            .iter()
            .any(|l| l.count_id == line.count_id && l.item_id == line.item_id);
        if duplicate {
            return Err(unique("inventory_count_lines_count_id_item_id_key"));
        }
        self.work.count_lines.push(line.clone());
        Ok(())
    }

    async fn update_count_line(&mut self, line: &InventoryCountLine) -> StoreResult<()> {
        match self
            .work
            .count_lines
            .iter_mut()
            .find(|l| l.id == line.id && l.tenant_id == line.tenant_id)
        {
            Some(existing) => {
                *existing = line.clone();
                Ok(())
            }
            None => Err(StoreError::Database(format!("count line {} does not exist", line.id))),
        }
    }

    async fn delete_count_line(
        &mut self,
        tenant_id: TenantId,
        id: InventoryCountLineId,
    ) -> StoreResult<bool> {
        let before = self.work.count_lines.len();
        self.work
            .count_lines
            .retain(|l| !(l.id == id && l.tenant_id == tenant_id));
        Ok(self.work.count_lines.len() != before)
    }
}

#[async_trait]
impl PurchaseOptionRepository for InMemoryTx {
    async fn get_purchase_option(
        &mut self,
        tenant_id: TenantId,
        id: PurchaseOptionId,
    ) -> StoreResult<Option<ItemPurchaseOption>> {
        Ok(self
            .work
            .purchase_options
            .get(&id)
            .filter(|o| o.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_purchase_options(
        &mut self,
        tenant_id: TenantId,
        item_id: ItemId,
    ) -> StoreResult<Vec<ItemPurchaseOption>> {
        let mut options: Vec<ItemPurchaseOption> = self
            .work
            .purchase_options
            .values()
            .filter(|o| o.tenant_id == tenant_id && o.item_id == item_id)
            .cloned()
            .collect();
        options.sort_by_key(|o| o.id);
        Ok(options)
    }

    async fn insert_purchase_option(&mut self, option: &ItemPurchaseOption) -> StoreResult<()> {
        self.work
            .require_item(option.tenant_id, option.item_id, "item_purchase_options_item_fkey")?;
        self.work
            .require_uom(option.pack_uom_id, "item_purchase_options_pack_uom_id_fkey")?;
        self.work.purchase_options.insert(option.id, option.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use millstock_inventory::{MoveType, NewItem, NewStockMove};

    async fn seed(store: &InMemoryStore, tenant_id: TenantId) -> Item {
        let mut tx = store.begin().await.unwrap();
        let mass = UomCategory::new(UomCategoryId::new(), "Mass").unwrap();
        let kg = Uom::new(UomId::new(), &mass, "Kilogram", "kg").unwrap();
        tx.insert_category(&mass).await.unwrap();
        tx.insert_uom(&kg).await.unwrap();
        let item = Item::new(
            ItemId::new(),
            tenant_id,
            NewItem {
                name: "Flour".to_string(),
                base_uom_id: kg.id,
                ..NewItem::default()
            },
            Utc::now(),
        )
        .unwrap();
        tx.insert_item(&item).await.unwrap();
        tx.commit().await.unwrap();
        item
    }

    fn receipt(item: &Item, q: &str) -> StockMove {
        let draft = NewStockMove::for_item(item, Quantity::parse(q).unwrap(), MoveType::Receipt, None);
        StockMove::record(millstock_core::StockMoveId::new(), item.tenant_id, item, draft, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn dropped_unit_of_work_rolls_back() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let item = seed(&store, tenant).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_moves(&[receipt(&item, "5")]).await.unwrap();
            // dropped without commit
        }

        let mut tx = store.begin().await.unwrap();
        assert!(tx.sum_quantity(tenant, item.id).await.unwrap().is_zero());
    }

    #[tokio::test]
    async fn lookups_are_tenant_filtered() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let item = seed(&store, tenant).await;

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_item(TenantId::new(), item.id).await.unwrap().is_none());
        assert_eq!(tx.get_items(tenant, &[item.id, item.id]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn moves_require_an_owned_item() {
        let store = InMemoryStore::new();
        let item = seed(&store, TenantId::new()).await;
        let mut foreign = receipt(&item, "1");
        foreign.tenant_id = TenantId::new();

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_moves(&[foreign]).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
