//! Recipe maintenance and execution.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{info, instrument};

use millstock_core::{
    DomainError, ItemId, Quantity, RecipeId, RecipeLineId, TenantContext, visible,
};
use millstock_inventory::{Item, StockMove};
use millstock_manufacturing::{NewRecipe, NewRecipeLine, Recipe, RecipeLine};

use crate::error::ServiceResult;
use crate::services::ledger::append_in;
use crate::store::{ItemRepository, RecipeRepository, Store, UnitOfWork};

/// At most one active recipe per (tenant, output item). Callers hold the
/// output item's row lock so two activations cannot both pass.
async fn ensure_sole_active<T>(tx: &mut T, recipe: &Recipe) -> ServiceResult<()>
where
    T: RecipeRepository + ?Sized,
{
    let siblings = tx
        .list_recipes_for_output(recipe.tenant_id, recipe.output_item_id)
        .await?;
    if siblings.iter().any(|r| r.id != recipe.id && r.is_active) {
        return Err(DomainError::conflict("another recipe for this output item is already active").into());
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct RecipeService<S> {
    store: S,
}

impl<S: Store> RecipeService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id(), output_item_id = %input.output_item_id), err)]
    pub async fn create_recipe(&self, ctx: &TenantContext, input: NewRecipe) -> ServiceResult<Recipe> {
        let mut tx = self.store.begin().await?;
        let output = tx
            .lock_items(ctx.tenant_id(), &[input.output_item_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::cross_tenant("recipe output item is not visible to the acting tenant"))?;
        let recipe = Recipe::new(RecipeId::new(), ctx.tenant_id(), &output, input, Utc::now())?;
        if recipe.is_active {
            ensure_sole_active(&mut tx, &recipe).await?;
        }
        tx.insert_recipe(&recipe).await?;
        tx.commit().await?;
        Ok(recipe)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn get_recipe(&self, ctx: &TenantContext, id: RecipeId) -> ServiceResult<Recipe> {
        let mut tx = self.store.begin().await?;
        let recipe = visible(ctx, tx.get_recipe(ctx.tenant_id(), id).await?)?;
        tx.commit().await?;
        Ok(recipe)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn lines(&self, ctx: &TenantContext, id: RecipeId) -> ServiceResult<Vec<RecipeLine>> {
        let mut tx = self.store.begin().await?;
        let recipe = visible(ctx, tx.get_recipe(ctx.tenant_id(), id).await?)?;
        let lines = tx.list_recipe_lines(ctx.tenant_id(), recipe.id).await?;
        tx.commit().await?;
        Ok(lines)
    }

    /// Activating fails with `Conflict` while another recipe for the same
    /// output item is active.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn set_active(&self, ctx: &TenantContext, id: RecipeId, active: bool) -> ServiceResult<Recipe> {
        let mut tx = self.store.begin().await?;
        let mut recipe = visible(ctx, tx.get_recipe(ctx.tenant_id(), id).await?)?;
        if active {
            tx.lock_items(ctx.tenant_id(), &[recipe.output_item_id]).await?;
            ensure_sole_active(&mut tx, &recipe).await?;
        }
        recipe.set_active(active, Utc::now());
        tx.update_recipe(&recipe).await?;
        tx.commit().await?;
        Ok(recipe)
    }

    /// A second default for the same output item is rejected by the store's
    /// uniqueness constraint and surfaces as `Conflict`.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn set_default(&self, ctx: &TenantContext, id: RecipeId, default: bool) -> ServiceResult<Recipe> {
        let mut tx = self.store.begin().await?;
        let mut recipe = visible(ctx, tx.get_recipe(ctx.tenant_id(), id).await?)?;
        recipe.set_default(default, Utc::now());
        tx.update_recipe(&recipe).await?;
        tx.commit().await?;
        Ok(recipe)
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id(), input_item_id = %input.input_item_id), err)]
    pub async fn add_line(
        &self,
        ctx: &TenantContext,
        recipe_id: RecipeId,
        input: NewRecipeLine,
    ) -> ServiceResult<RecipeLine> {
        let mut tx = self.store.begin().await?;
        let recipe = visible(ctx, tx.get_recipe(ctx.tenant_id(), recipe_id).await?)?;
        let item = tx
            .get_item(ctx.tenant_id(), input.input_item_id)
            .await?
            .ok_or_else(|| DomainError::cross_tenant("recipe input item is not visible to the acting tenant"))?;
        let line = RecipeLine::new(RecipeLineId::new(), &recipe, &item, input.quantity)?;
        tx.insert_recipe_line(&line).await?;
        tx.commit().await?;
        Ok(line)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn remove_line(
        &self,
        ctx: &TenantContext,
        recipe_id: RecipeId,
        line_id: RecipeLineId,
    ) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        let recipe = visible(ctx, tx.get_recipe(ctx.tenant_id(), recipe_id).await?)?;
        if !tx.delete_recipe_line(ctx.tenant_id(), recipe.id, line_id).await? {
            return Err(DomainError::NotFound.into());
        }
        tx.commit().await?;
        Ok(())
    }

    /// Execute with an output quantity given as a decimal string.
    pub async fn execute(
        &self,
        ctx: &TenantContext,
        recipe_id: RecipeId,
        output: &str,
    ) -> ServiceResult<Vec<StockMove>> {
        let output = Quantity::parse(output)?;
        self.execute_quantity(ctx, recipe_id, output).await
    }

    /// Issue every input and receive the output in one unit of work.
    ///
    /// Single-level: an input that is itself manufactured is consumed from
    /// its ledger balance, its own recipe is not run.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn execute_quantity(
        &self,
        ctx: &TenantContext,
        recipe_id: RecipeId,
        output: Quantity,
    ) -> ServiceResult<Vec<StockMove>> {
        let mut tx = self.store.begin().await?;
        let recipe = visible(ctx, tx.get_recipe(ctx.tenant_id(), recipe_id).await?)?;
        recipe.ensure_active()?;
        let output = output.ensure_positive()?;

        let lines = tx.list_recipe_lines(ctx.tenant_id(), recipe.id).await?;
        let mut ids: Vec<ItemId> = lines.iter().map(|l| l.input_item_id).collect();
        ids.push(recipe.output_item_id);
        let items: HashMap<ItemId, Item> = tx
            .get_items(ctx.tenant_id(), &ids)
            .await?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        let drafts = recipe.plan_execution(&lines, &items, output)?;
        let moves = append_in(&mut tx, ctx, drafts).await?;
        tx.commit().await?;

        info!(recipe_id = %recipe.id, move_count = moves.len(), %output, "recipe executed");
        Ok(moves)
    }
}
