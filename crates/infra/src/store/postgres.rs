//! Postgres-backed store.
//!
//! The expected schema lives in `sql/schema.sql`. Every tenant-owned query
//! includes `tenant_id` in its WHERE clause, and composite foreign keys on
//! `(tenant_id, id)` keep rows of one tenant from referencing another's.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation(constraint)` |
//! | Database (other) | Any other | `Database` |
//! | ColumnDecode / ColumnNotFound | N/A | `Decode` |
//! | Other | N/A | `Database` |

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use millstock_core::{
    DomainResult, Factor, InventoryCountId, InventoryCountLineId, ItemId, ItemUomConversionId,
    PlanningPrice, PurchaseOptionId, Quantity, RecipeId, RecipeLineId, StockMoveId, TenantId,
    UomCategoryId, UomConversionId, UomId, UserId,
};
use millstock_inventory::{
    CountStatus, InventoryCount, InventoryCountLine, Item, MoveSource, MoveType, StockMove,
};
use millstock_manufacturing::{Recipe, RecipeLine};
use millstock_purchasing::ItemPurchaseOption;
use millstock_uom::{ItemUomConversion, Uom, UomCategory, UomConversion};

use super::query::Pagination;
use super::{
    CatalogRepository, CountRepository, ItemRepository, LedgerRepository,
    PurchaseOptionRepository, RecipeRepository, Store, UnitOfWork,
};
use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};

/// Postgres-backed store.
///
/// `PgPool` is internally reference-counted, so cloning the store is cheap.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build the connection pool from configuration.
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Unit of work over one Postgres transaction.
///
/// Dropping it without [`UnitOfWork::commit`] rolls the transaction back.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> StoreResult<PostgresTx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTx { tx })
    }
}

#[async_trait]
impl UnitOfWork for PostgresTx {
    async fn commit(self) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

const ITEM_COLUMNS: &str = "id, tenant_id, sku, name, base_uom_id, is_purchasable, is_sellable, \
     is_manufacturable, planning_price_minor, planning_price_currency, created_at";

const MOVE_COLUMNS: &str =
    "id, tenant_id, item_id, uom_id, quantity, move_type, source_kind, source_id, note, created_at";

const RECIPE_COLUMNS: &str =
    "id, tenant_id, output_item_id, name, is_active, is_default, created_at, updated_at";

const COUNT_COLUMNS: &str =
    "id, tenant_id, name, notes, status, posted_at, posted_by, created_at";

const OPTION_COLUMNS: &str =
    "id, tenant_id, item_id, label, supplier_ref, pack_quantity, pack_uom_id, created_at";

#[async_trait]
impl CatalogRepository for PostgresTx {
    async fn get_category(&mut self, id: UomCategoryId) -> StoreResult<Option<UomCategory>> {
        let row = sqlx::query("SELECT id, name FROM uom_categories WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_category", e))?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn insert_category(&mut self, category: &UomCategory) -> StoreResult<()> {
        sqlx::query("INSERT INTO uom_categories (id, name) VALUES ($1, $2)")
            .bind(category.id.as_uuid())
            .bind(&category.name)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_category", e))?;
        Ok(())
    }

    async fn get_uom(&mut self, id: UomId) -> StoreResult<Option<Uom>> {
        let row = sqlx::query("SELECT id, category_id, name, symbol FROM uoms WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_uom", e))?;
        row.as_ref().map(uom_from_row).transpose()
    }

    async fn list_uoms(&mut self, category_id: Option<UomCategoryId>) -> StoreResult<Vec<Uom>> {
        let rows = sqlx::query(
            r#"
            SELECT id, category_id, name, symbol
            FROM uoms
            WHERE $1::uuid IS NULL OR category_id = $1
            ORDER BY symbol
            "#,
        )
        .bind(category_id.map(|c| *c.as_uuid()))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_uoms", e))?;
        rows.iter().map(uom_from_row).collect()
    }

    async fn insert_uom(&mut self, uom: &Uom) -> StoreResult<()> {
        sqlx::query("INSERT INTO uoms (id, category_id, name, symbol) VALUES ($1, $2, $3, $4)")
            .bind(uom.id.as_uuid())
            .bind(uom.category_id.as_uuid())
            .bind(&uom.name)
            .bind(&uom.symbol)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_uom", e))?;
        Ok(())
    }

    async fn find_conversion(&mut self, from: UomId, to: UomId) -> StoreResult<Option<UomConversion>> {
        let row = sqlx::query(
            "SELECT id, from_uom_id, to_uom_id, factor FROM uom_conversions \
             WHERE from_uom_id = $1 AND to_uom_id = $2",
        )
        .bind(from.as_uuid())
        .bind(to.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_conversion", e))?;
        row.as_ref().map(conversion_from_row).transpose()
    }

    async fn insert_conversion(&mut self, conversion: &UomConversion) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO uom_conversions (id, from_uom_id, to_uom_id, factor) VALUES ($1, $2, $3, $4)",
        )
        .bind(conversion.id.as_uuid())
        .bind(conversion.from_uom_id.as_uuid())
        .bind(conversion.to_uom_id.as_uuid())
        .bind(conversion.factor.as_decimal())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_conversion", e))?;
        Ok(())
    }

    async fn find_item_conversion(
        &mut self,
        tenant_id: TenantId,
        item_id: ItemId,
        from: UomId,
        to: UomId,
    ) -> StoreResult<Option<ItemUomConversion>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, item_id, from_uom_id, to_uom_id, factor
            FROM item_uom_conversions
            WHERE tenant_id = $1 AND item_id = $2 AND from_uom_id = $3 AND to_uom_id = $4
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(item_id.as_uuid())
        .bind(from.as_uuid())
        .bind(to.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_item_conversion", e))?;
        row.as_ref().map(item_conversion_from_row).transpose()
    }

    async fn insert_item_conversion(&mut self, conversion: &ItemUomConversion) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO item_uom_conversions (id, tenant_id, item_id, from_uom_id, to_uom_id, factor)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(conversion.id.as_uuid())
        .bind(conversion.tenant_id.as_uuid())
        .bind(conversion.item_id.as_uuid())
        .bind(conversion.from_uom_id.as_uuid())
        .bind(conversion.to_uom_id.as_uuid())
        .bind(conversion.factor.as_decimal())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_item_conversion", e))?;
        Ok(())
    }
}

#[async_trait]
impl ItemRepository for PostgresTx {
    async fn get_item(&mut self, tenant_id: TenantId, id: ItemId) -> StoreResult<Option<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE tenant_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_item", e))?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn get_items(&mut self, tenant_id: TenantId, ids: &[ItemId]) -> StoreResult<Vec<Item>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE tenant_id = $1 AND id = ANY($2) ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(uuids(ids))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_items", e))?;
        rows.iter().map(item_from_row).collect()
    }

    /// Ascending id order keeps two lockers of overlapping item sets from
    /// deadlocking each other.
    #[instrument(level = "debug", skip(self, ids), fields(tenant_id = %tenant_id, item_count = ids.len()), err)]
    async fn lock_items(&mut self, tenant_id: TenantId, ids: &[ItemId]) -> StoreResult<Vec<Item>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE tenant_id = $1 AND id = ANY($2) \
             ORDER BY id FOR UPDATE"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(uuids(ids))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_items", e))?;
        rows.iter().map(item_from_row).collect()
    }

    async fn insert_item(&mut self, item: &Item) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO items (
                id, tenant_id, sku, name, base_uom_id,
                is_purchasable, is_sellable, is_manufacturable,
                planning_price_minor, planning_price_currency, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.tenant_id.as_uuid())
        .bind(item.sku.as_deref())
        .bind(&item.name)
        .bind(item.base_uom_id.as_uuid())
        .bind(item.is_purchasable)
        .bind(item.is_sellable)
        .bind(item.is_manufacturable)
        .bind(item.planning_price.as_ref().map(|p| p.amount_minor))
        .bind(item.planning_price.as_ref().map(|p| p.currency.as_str()))
        .bind(item.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerRepository for PostgresTx {
    #[instrument(level = "debug", skip(self, moves), fields(move_count = moves.len()), err)]
    async fn insert_moves(&mut self, moves: &[StockMove]) -> StoreResult<()> {
        for m in moves {
            sqlx::query(
                r#"
                INSERT INTO stock_moves (
                    id, tenant_id, item_id, uom_id, quantity, move_type,
                    source_kind, source_id, note, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(m.id.as_uuid())
            .bind(m.tenant_id.as_uuid())
            .bind(m.item_id.as_uuid())
            .bind(m.uom_id.as_uuid())
            .bind(m.quantity.as_decimal())
            .bind(m.move_type.as_str())
            .bind(m.source.map(|s| s.kind()))
            .bind(m.source.map(|s| s.id()))
            .bind(m.note.as_deref())
            .bind(m.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_move", e))?;
        }
        Ok(())
    }

    async fn sum_quantity(&mut self, tenant_id: TenantId, item_id: ItemId) -> StoreResult<Quantity> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(quantity), 0)::numeric AS total FROM stock_moves \
             WHERE tenant_id = $1 AND item_id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(item_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("sum_quantity", e))?;
        quantity(&row, "total")
    }

    async fn list_moves(
        &mut self,
        tenant_id: TenantId,
        item_id: ItemId,
        page: Pagination,
    ) -> StoreResult<Vec<StockMove>> {
        let sql = format!(
            "SELECT {MOVE_COLUMNS} FROM stock_moves WHERE tenant_id = $1 AND item_id = $2 \
             ORDER BY created_at ASC, id ASC LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(item_id.as_uuid())
            .bind(i64::from(page.limit))
            .bind(i64::from(page.offset))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_moves", e))?;
        rows.iter().map(move_from_row).collect()
    }

    async fn list_moves_by_source(
        &mut self,
        tenant_id: TenantId,
        source: MoveSource,
    ) -> StoreResult<Vec<StockMove>> {
        let sql = format!(
            "SELECT {MOVE_COLUMNS} FROM stock_moves \
             WHERE tenant_id = $1 AND source_kind = $2 AND source_id = $3 \
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(source.kind())
            .bind(source.id())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_moves_by_source", e))?;
        rows.iter().map(move_from_row).collect()
    }
}

#[async_trait]
impl RecipeRepository for PostgresTx {
    async fn get_recipe(&mut self, tenant_id: TenantId, id: RecipeId) -> StoreResult<Option<Recipe>> {
        let sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE tenant_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_recipe", e))?;
        row.as_ref().map(recipe_from_row).transpose()
    }

    async fn list_recipes_for_output(
        &mut self,
        tenant_id: TenantId,
        output_item_id: ItemId,
    ) -> StoreResult<Vec<Recipe>> {
        let sql = format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE tenant_id = $1 AND output_item_id = $2 ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(output_item_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_recipes_for_output", e))?;
        rows.iter().map(recipe_from_row).collect()
    }

    async fn insert_recipe(&mut self, recipe: &Recipe) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recipes (
                id, tenant_id, output_item_id, name, is_active, is_default, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(recipe.id.as_uuid())
        .bind(recipe.tenant_id.as_uuid())
        .bind(recipe.output_item_id.as_uuid())
        .bind(&recipe.name)
        .bind(recipe.is_active)
        .bind(recipe.is_default)
        .bind(recipe.created_at)
        .bind(recipe.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_recipe", e))?;
        Ok(())
    }

    async fn update_recipe(&mut self, recipe: &Recipe) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE recipes
            SET name = $3, is_active = $4, is_default = $5, updated_at = $6
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(recipe.tenant_id.as_uuid())
        .bind(recipe.id.as_uuid())
        .bind(&recipe.name)
        .bind(recipe.is_active)
        .bind(recipe.is_default)
        .bind(recipe.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_recipe", e))?;
        Ok(())
    }

    async fn list_recipe_lines(
        &mut self,
        tenant_id: TenantId,
        recipe_id: RecipeId,
    ) -> StoreResult<Vec<RecipeLine>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, recipe_id, input_item_id, quantity
            FROM recipe_lines
            WHERE tenant_id = $1 AND recipe_id = $2
            ORDER BY id
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(recipe_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_recipe_lines", e))?;
        rows.iter().map(recipe_line_from_row).collect()
    }

    async fn insert_recipe_line(&mut self, line: &RecipeLine) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recipe_lines (id, tenant_id, recipe_id, input_item_id, quantity)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(line.tenant_id.as_uuid())
        .bind(line.recipe_id.as_uuid())
        .bind(line.input_item_id.as_uuid())
        .bind(line.quantity.as_decimal())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_recipe_line", e))?;
        Ok(())
    }

    async fn delete_recipe_line(
        &mut self,
        tenant_id: TenantId,
        recipe_id: RecipeId,
        line_id: RecipeLineId,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM recipe_lines WHERE tenant_id = $1 AND recipe_id = $2 AND id = $3",
        )
        .bind(tenant_id.as_uuid())
        .bind(recipe_id.as_uuid())
        .bind(line_id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("delete_recipe_line", e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CountRepository for PostgresTx {
    async fn get_count(
        &mut self,
        tenant_id: TenantId,
        id: InventoryCountId,
    ) -> StoreResult<Option<InventoryCount>> {
        let sql = format!(
            "SELECT {COUNT_COLUMNS} FROM inventory_counts WHERE tenant_id = $1 AND id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_count", e))?;
        row.as_ref().map(count_from_row).transpose()
    }

    async fn lock_count(
        &mut self,
        tenant_id: TenantId,
        id: InventoryCountId,
    ) -> StoreResult<Option<InventoryCount>> {
        let sql = format!(
            "SELECT {COUNT_COLUMNS} FROM inventory_counts WHERE tenant_id = $1 AND id = $2 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_count", e))?;
        row.as_ref().map(count_from_row).transpose()
    }

    async fn insert_count(&mut self, count: &InventoryCount) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_counts (
                id, tenant_id, name, notes, status, posted_at, posted_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(count.id.as_uuid())
        .bind(count.tenant_id.as_uuid())
        .bind(&count.name)
        .bind(count.notes.as_deref())
        .bind(count.status.as_str())
        .bind(count.posted_at)
        .bind(count.posted_by.map(|u| *u.as_uuid()))
        .bind(count.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_count", e))?;
        Ok(())
    }

    async fn update_count(&mut self, count: &InventoryCount) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE inventory_counts
            SET name = $3, notes = $4, status = $5, posted_at = $6, posted_by = $7
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(count.tenant_id.as_uuid())
        .bind(count.id.as_uuid())
        .bind(&count.name)
        .bind(count.notes.as_deref())
        .bind(count.status.as_str())
        .bind(count.posted_at)
        .bind(count.posted_by.map(|u| *u.as_uuid()))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_count", e))?;
        Ok(())
    }

    async fn delete_count(&mut self, tenant_id: TenantId, id: InventoryCountId) -> StoreResult<bool> {
        // Lines go with the header (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM inventory_counts WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_count", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_count_lines(
        &mut self,
        tenant_id: TenantId,
        count_id: InventoryCountId,
    ) -> StoreResult<Vec<InventoryCountLine>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, count_id, item_id, counted_quantity
            FROM inventory_count_lines
            WHERE tenant_id = $1 AND count_id = $2
            ORDER BY item_id
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(count_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_count_lines", e))?;
        rows.iter().map(count_line_from_row).collect()
    }

    async fn get_count_line(
        &mut self,
        tenant_id: TenantId,
        id: InventoryCountLineId,
    ) -> StoreResult<Option<InventoryCountLine>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, count_id, item_id, counted_quantity
            FROM inventory_count_lines
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("get_count_line", e))?;
        row.as_ref().map(count_line_from_row).transpose()
    }

    async fn insert_count_line(&mut self, line: &InventoryCountLine) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_count_lines (id, tenant_id, count_id, item_id, counted_quantity)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(line.tenant_id.as_uuid())
        .bind(line.count_id.as_uuid())
        .bind(line.item_id.as_uuid())
        .bind(line.counted_quantity.as_decimal())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_count_line", e))?;
        Ok(())
    }

    async fn update_count_line(&mut self, line: &InventoryCountLine) -> StoreResult<()> {
        sqlx::query(
            "UPDATE inventory_count_lines SET counted_quantity = $3 WHERE tenant_id = $1 AND id = $2",
        )
        .bind(line.tenant_id.as_uuid())
        .bind(line.id.as_uuid())
        .bind(line.counted_quantity.as_decimal())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_count_line", e))?;
        Ok(())
    }

    async fn delete_count_line(
        &mut self,
        tenant_id: TenantId,
        id: InventoryCountLineId,
    ) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM inventory_count_lines WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_count_line", e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PurchaseOptionRepository for PostgresTx {
    async fn get_purchase_option(
        &mut self,
        tenant_id: TenantId,
        id: PurchaseOptionId,
    ) -> StoreResult<Option<ItemPurchaseOption>> {
        let sql = format!(
            "SELECT {OPTION_COLUMNS} FROM item_purchase_options WHERE tenant_id = $1 AND id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_purchase_option", e))?;
        row.as_ref().map(option_from_row).transpose()
    }

    async fn list_purchase_options(
        &mut self,
        tenant_id: TenantId,
        item_id: ItemId,
    ) -> StoreResult<Vec<ItemPurchaseOption>> {
        let sql = format!(
            "SELECT {OPTION_COLUMNS} FROM item_purchase_options \
             WHERE tenant_id = $1 AND item_id = $2 ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(item_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_purchase_options", e))?;
        rows.iter().map(option_from_row).collect()
    }

    async fn insert_purchase_option(&mut self, option: &ItemPurchaseOption) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO item_purchase_options (
                id, tenant_id, item_id, label, supplier_ref, pack_quantity, pack_uom_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(option.id.as_uuid())
        .bind(option.tenant_id.as_uuid())
        .bind(option.item_id.as_uuid())
        .bind(option.label.as_deref())
        .bind(option.supplier_ref.as_deref())
        .bind(option.pack_quantity.as_decimal())
        .bind(option.pack_uom_id.as_uuid())
        .bind(option.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_purchase_option", e))?;
        Ok(())
    }
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                return StoreError::UniqueViolation(constraint.to_string());
            }
            StoreError::Database(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Decode(format!("{operation}: {err}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Database(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Database(format!("sqlx error in {operation}: {err}")),
    }
}

fn uuids<T: Copy>(ids: &[T]) -> Vec<Uuid>
where
    Uuid: From<T>,
{
    ids.iter().map(|id| Uuid::from(*id)).collect()
}

// Row decoding. Persisted rows passed every write-time check, so a domain
// rejection here means the row was written by something else.

fn decoded<T>(result: DomainResult<T>) -> StoreResult<T> {
    result.map_err(|e| StoreError::Decode(e.to_string()))
}

fn col<'r, T>(row: &'r PgRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Decode(format!("column {name}: {e}")))
}

fn quantity(row: &PgRow, name: &str) -> StoreResult<Quantity> {
    decoded(Quantity::from_decimal(col::<Decimal>(row, name)?))
}

fn factor(row: &PgRow) -> StoreResult<Factor> {
    decoded(Factor::new(col::<Decimal>(row, "factor")?))
}

fn category_from_row(row: &PgRow) -> StoreResult<UomCategory> {
    Ok(UomCategory {
        id: UomCategoryId::from_uuid(col(row, "id")?),
        name: col(row, "name")?,
    })
}

fn uom_from_row(row: &PgRow) -> StoreResult<Uom> {
    Ok(Uom {
        id: UomId::from_uuid(col(row, "id")?),
        category_id: UomCategoryId::from_uuid(col(row, "category_id")?),
        name: col(row, "name")?,
        symbol: col(row, "symbol")?,
    })
}

fn conversion_from_row(row: &PgRow) -> StoreResult<UomConversion> {
    Ok(UomConversion {
        id: UomConversionId::from_uuid(col(row, "id")?),
        from_uom_id: UomId::from_uuid(col(row, "from_uom_id")?),
        to_uom_id: UomId::from_uuid(col(row, "to_uom_id")?),
        factor: factor(row)?,
    })
}

fn item_conversion_from_row(row: &PgRow) -> StoreResult<ItemUomConversion> {
    Ok(ItemUomConversion {
        id: ItemUomConversionId::from_uuid(col(row, "id")?),
        tenant_id: TenantId::from_uuid(col(row, "tenant_id")?),
        item_id: ItemId::from_uuid(col(row, "item_id")?),
        from_uom_id: UomId::from_uuid(col(row, "from_uom_id")?),
        to_uom_id: UomId::from_uuid(col(row, "to_uom_id")?),
        factor: factor(row)?,
    })
}

fn item_from_row(row: &PgRow) -> StoreResult<Item> {
    let minor: Option<i64> = col(row, "planning_price_minor")?;
    let currency: Option<String> = col(row, "planning_price_currency")?;
    let planning_price = match (minor, currency) {
        (Some(amount), Some(currency)) => Some(decoded(PlanningPrice::new(amount, &currency))?),
        (None, None) => None,
        _ => {
            return Err(StoreError::Decode(
                "planning price amount and currency must be set together".to_string(),
            ));
        }
    };
    Ok(Item {
        id: ItemId::from_uuid(col(row, "id")?),
        tenant_id: TenantId::from_uuid(col(row, "tenant_id")?),
        sku: col(row, "sku")?,
        name: col(row, "name")?,
        base_uom_id: UomId::from_uuid(col(row, "base_uom_id")?),
        is_purchasable: col(row, "is_purchasable")?,
        is_sellable: col(row, "is_sellable")?,
        is_manufacturable: col(row, "is_manufacturable")?,
        planning_price,
        created_at: col(row, "created_at")?,
    })
}

fn move_from_row(row: &PgRow) -> StoreResult<StockMove> {
    let kind: Option<String> = col(row, "source_kind")?;
    let source_id: Option<Uuid> = col(row, "source_id")?;
    let source = match (kind, source_id) {
        (Some(kind), Some(id)) => Some(decoded(MoveSource::from_parts(&kind, id))?),
        (None, None) => None,
        _ => return Err(StoreError::Decode("half-set move source".to_string())),
    };
    let move_type: String = col(row, "move_type")?;
    Ok(StockMove {
        id: StockMoveId::from_uuid(col(row, "id")?),
        tenant_id: TenantId::from_uuid(col(row, "tenant_id")?),
        item_id: ItemId::from_uuid(col(row, "item_id")?),
        uom_id: UomId::from_uuid(col(row, "uom_id")?),
        quantity: quantity(row, "quantity")?,
        move_type: decoded(MoveType::parse(&move_type))?,
        source,
        note: col(row, "note")?,
        created_at: col(row, "created_at")?,
    })
}

fn recipe_from_row(row: &PgRow) -> StoreResult<Recipe> {
    Ok(Recipe {
        id: RecipeId::from_uuid(col(row, "id")?),
        tenant_id: TenantId::from_uuid(col(row, "tenant_id")?),
        output_item_id: ItemId::from_uuid(col(row, "output_item_id")?),
        name: col(row, "name")?,
        is_active: col(row, "is_active")?,
        is_default: col(row, "is_default")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn recipe_line_from_row(row: &PgRow) -> StoreResult<RecipeLine> {
    Ok(RecipeLine {
        id: RecipeLineId::from_uuid(col(row, "id")?),
        tenant_id: TenantId::from_uuid(col(row, "tenant_id")?),
        recipe_id: RecipeId::from_uuid(col(row, "recipe_id")?),
        input_item_id: ItemId::from_uuid(col(row, "input_item_id")?),
        quantity: quantity(row, "quantity")?,
    })
}

fn count_from_row(row: &PgRow) -> StoreResult<InventoryCount> {
    let status: String = col(row, "status")?;
    let posted_by: Option<Uuid> = col(row, "posted_by")?;
    Ok(InventoryCount {
        id: InventoryCountId::from_uuid(col(row, "id")?),
        tenant_id: TenantId::from_uuid(col(row, "tenant_id")?),
        name: col(row, "name")?,
        notes: col(row, "notes")?,
        status: decoded(CountStatus::parse(&status))?,
        posted_at: col(row, "posted_at")?,
        posted_by: posted_by.map(UserId::from_uuid),
        created_at: col(row, "created_at")?,
    })
}

fn count_line_from_row(row: &PgRow) -> StoreResult<InventoryCountLine> {
    Ok(InventoryCountLine {
        id: InventoryCountLineId::from_uuid(col(row, "id")?),
        tenant_id: TenantId::from_uuid(col(row, "tenant_id")?),
        count_id: InventoryCountId::from_uuid(col(row, "count_id")?),
        item_id: ItemId::from_uuid(col(row, "item_id")?),
        counted_quantity: quantity(row, "counted_quantity")?,
    })
}

fn option_from_row(row: &PgRow) -> StoreResult<ItemPurchaseOption> {
    Ok(ItemPurchaseOption {
        id: PurchaseOptionId::from_uuid(col(row, "id")?),
        tenant_id: TenantId::from_uuid(col(row, "tenant_id")?),
        item_id: ItemId::from_uuid(col(row, "item_id")?),
        label: col(row, "label")?,
        supplier_ref: col(row, "supplier_ref")?,
        pack_quantity: quantity(row, "pack_quantity")?,
        pack_uom_id: UomId::from_uuid(col(row, "pack_uom_id")?),
        created_at: col(row, "created_at")?,
    })
}
