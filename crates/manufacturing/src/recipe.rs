use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use millstock_core::{
    DomainError, DomainResult, ItemId, Quantity, RecipeId, RecipeLineId, TenantId, TenantScoped,
};
use millstock_inventory::{Item, MoveSource, MoveType, NewStockMove};

/// Input for creating a recipe header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecipe {
    pub output_item_id: ItemId,
    pub name: String,
    pub is_active: bool,
    pub is_default: bool,
}

/// Bill-of-materials header for one manufacturable output item.
///
/// At most one active and at most one default recipe exist per
/// `(tenant, output item)`; both rules need the other recipes of the item and
/// are enforced when the recipe is written, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: RecipeId,
    pub tenant_id: TenantId,
    pub output_item_id: ItemId,
    pub name: String,
    pub is_active: bool,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recipe {
    pub fn new(
        id: RecipeId,
        tenant_id: TenantId,
        output: &Item,
        input: NewRecipe,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if output.tenant_id != tenant_id {
            return Err(DomainError::cross_tenant("recipe output item belongs to a different tenant"));
        }
        if input.output_item_id != output.id {
            return Err(DomainError::validation("recipe output does not match the given item"));
        }
        output.ensure_manufacturable()?;
        let name = input.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("recipe name cannot be empty"));
        }
        Ok(Self {
            id,
            tenant_id,
            output_item_id: output.id,
            name: name.to_string(),
            is_active: input.is_active,
            is_default: input.is_default,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn ensure_active(&self) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::InactiveRecipe);
        }
        Ok(())
    }

    pub fn set_active(&mut self, active: bool, now: DateTime<Utc>) {
        self.is_active = active;
        self.updated_at = now;
    }

    pub fn set_default(&mut self, default: bool, now: DateTime<Utc>) {
        self.is_default = default;
        self.updated_at = now;
    }

    /// Plan the ledger entries for producing `output` units.
    ///
    /// Every line issues `line.quantity * output` of its input (exact product,
    /// rounded half-to-even to six digits), then one receipt of `output` is
    /// added for the output item. All entries carry this recipe as source.
    /// `items` must hold the output item and every input item, resolved in the
    /// recipe's tenant. Nested recipes of input items are not exploded.
    pub fn plan_execution(
        &self,
        lines: &[RecipeLine],
        items: &HashMap<ItemId, Item>,
        output: Quantity,
    ) -> DomainResult<Vec<NewStockMove>> {
        self.ensure_active()?;
        let output = output.ensure_positive()?;

        let lookup = |item_id: &ItemId, what: &str| {
            items
                .get(item_id)
                .filter(|item| item.tenant_id == self.tenant_id)
                .ok_or_else(|| DomainError::cross_tenant(format!("{what} is not visible to the recipe's tenant")))
        };

        let source = Some(MoveSource::Recipe(self.id));
        let mut moves = Vec::with_capacity(lines.len() + 1);
        for line in lines {
            if line.tenant_id != self.tenant_id {
                return Err(DomainError::cross_tenant("recipe line belongs to a different tenant"));
            }
            if line.recipe_id != self.id {
                return Err(DomainError::validation("recipe line belongs to another recipe"));
            }
            let input = lookup(&line.input_item_id, "recipe input item")?;
            let issued = Quantity::round(line.quantity.checked_mul(output.as_decimal())?)?;
            if issued.is_zero() {
                return Err(DomainError::validation(format!(
                    "consumption of {} below ledger precision",
                    input.name
                )));
            }
            moves.push(NewStockMove::for_item(input, -issued, MoveType::Issue, source));
        }

        let produced = lookup(&self.output_item_id, "recipe output item")?;
        moves.push(NewStockMove::for_item(produced, output, MoveType::Receipt, source));
        Ok(moves)
    }
}

impl TenantScoped for Recipe {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Input for adding a recipe line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecipeLine {
    pub input_item_id: ItemId,
    pub quantity: Quantity,
}

/// Consumption of one input item per unit of recipe output, in the input's
/// base unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLine {
    pub id: RecipeLineId,
    pub tenant_id: TenantId,
    pub recipe_id: RecipeId,
    pub input_item_id: ItemId,
    pub quantity: Quantity,
}

impl RecipeLine {
    pub fn new(id: RecipeLineId, recipe: &Recipe, input: &Item, quantity: Quantity) -> DomainResult<Self> {
        if input.tenant_id != recipe.tenant_id {
            return Err(DomainError::cross_tenant("recipe input item belongs to a different tenant"));
        }
        if input.id == recipe.output_item_id {
            return Err(DomainError::validation("a recipe cannot consume its own output item"));
        }
        Ok(Self {
            id,
            tenant_id: recipe.tenant_id,
            recipe_id: recipe.id,
            input_item_id: input.id,
            quantity: quantity.ensure_positive()?,
        })
    }
}

impl TenantScoped for RecipeLine {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use millstock_core::UomId;
    use millstock_inventory::NewItem;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn qty(s: &str) -> Quantity {
        Quantity::parse(s).unwrap()
    }

    fn item(tenant_id: TenantId, name: &str, manufacturable: bool) -> Item {
        Item::new(
            ItemId::new(),
            tenant_id,
            NewItem {
                name: name.to_string(),
                base_uom_id: UomId::new(),
                is_manufacturable: manufacturable,
                ..NewItem::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn recipe(output: &Item, active: bool) -> Recipe {
        Recipe::new(
            RecipeId::new(),
            output.tenant_id,
            output,
            NewRecipe {
                output_item_id: output.id,
                name: "Bread".to_string(),
                is_active: active,
                is_default: true,
            },
            Utc::now(),
        )
        .unwrap()
    }

    struct Bakery {
        flour: Item,
        bread: Item,
        recipe: Recipe,
        lines: Vec<RecipeLine>,
    }

    impl Bakery {
        fn new(flour_per_loaf: &str) -> Self {
            let tenant = TenantId::new();
            let flour = item(tenant, "Flour", false);
            let bread = item(tenant, "Bread", true);
            let recipe = recipe(&bread, true);
            let lines = vec![RecipeLine::new(RecipeLineId::new(), &recipe, &flour, qty(flour_per_loaf)).unwrap()];
            Self {
                flour,
                bread,
                recipe,
                lines,
            }
        }

        fn items(&self) -> HashMap<ItemId, Item> {
            HashMap::from([
                (self.flour.id, self.flour.clone()),
                (self.bread.id, self.bread.clone()),
            ])
        }

        fn execute(&self, output: &str) -> DomainResult<Vec<NewStockMove>> {
            self.recipe.plan_execution(&self.lines, &self.items(), qty(output))
        }
    }

    #[test]
    fn issues_inputs_then_receives_output() {
        let bakery = Bakery::new("2.000000");
        let moves = bakery.execute("3").unwrap();

        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].item_id, bakery.flour.id);
        assert_eq!(moves[0].move_type, MoveType::Issue);
        assert_eq!(moves[0].quantity.to_string(), "-6.000000");
        assert_eq!(moves[1].item_id, bakery.bread.id);
        assert_eq!(moves[1].move_type, MoveType::Receipt);
        assert_eq!(moves[1].quantity.to_string(), "3.000000");
        assert!(moves.iter().all(|m| m.source == Some(MoveSource::Recipe(bakery.recipe.id))));
    }

    #[test]
    fn non_positive_output_plans_nothing() {
        let bakery = Bakery::new("2");
        for output in ["0", "-1"] {
            assert!(matches!(
                bakery.execute(output),
                Err(DomainError::NonPositiveQuantity(_))
            ));
        }
    }

    #[test]
    fn inactive_recipe_cannot_execute() {
        let mut bakery = Bakery::new("2");
        bakery.recipe.set_active(false, Utc::now());
        assert_eq!(bakery.execute("1"), Err(DomainError::InactiveRecipe));
    }

    #[test]
    fn product_is_rounded_half_to_even() {
        let bakery = Bakery::new("0.000005");
        // 0.000005 * 0.5 = 0.0000025 -> 0.000002
        let moves = bakery.execute("0.5").unwrap();
        assert_eq!(moves[0].quantity.as_decimal(), dec!(-0.000002));
    }

    #[test]
    fn consumption_below_precision_fails_the_whole_plan() {
        let bakery = Bakery::new("0.000001");
        // 0.000001 * 0.4 = 0.0000004 -> 0.000000
        let err = bakery.execute("0.4").unwrap_err();
        assert!(
            matches!(&err, DomainError::Validation(msg) if msg.contains("below ledger precision")),
            "{err:?}"
        );
    }

    #[test]
    fn missing_input_item_is_cross_tenant() {
        let bakery = Bakery::new("2");
        let only_bread = HashMap::from([(bakery.bread.id, bakery.bread.clone())]);
        let err = bakery.recipe.plan_execution(&bakery.lines, &only_bread, qty("1")).unwrap_err();
        assert!(matches!(err, DomainError::CrossTenantMismatch(_)));
    }

    #[test]
    fn empty_recipe_only_receives() {
        let bakery = Bakery::new("2");
        let moves = bakery.recipe.plan_execution(&[], &bakery.items(), qty("4")).unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].move_type, MoveType::Receipt);
    }

    #[test]
    fn output_must_be_manufacturable() {
        let tenant = TenantId::new();
        let flour = item(tenant, "Flour", false);
        let err = Recipe::new(
            RecipeId::new(),
            tenant,
            &flour,
            NewRecipe {
                output_item_id: flour.id,
                name: "Flour".to_string(),
                is_active: true,
                is_default: false,
            },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn line_rules() {
        let tenant = TenantId::new();
        let bread = item(tenant, "Bread", true);
        let recipe = recipe(&bread, true);

        let own_output = RecipeLine::new(RecipeLineId::new(), &recipe, &bread, qty("1")).unwrap_err();
        assert!(matches!(own_output, DomainError::Validation(_)));

        let foreign = item(TenantId::new(), "Flour", false);
        let cross = RecipeLine::new(RecipeLineId::new(), &recipe, &foreign, qty("1")).unwrap_err();
        assert!(matches!(cross, DomainError::CrossTenantMismatch(_)));

        let flour = item(tenant, "Flour", false);
        let zero = RecipeLine::new(RecipeLineId::new(), &recipe, &flour, qty("0")).unwrap_err();
        assert!(matches!(zero, DomainError::NonPositiveQuantity(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: with three-digit inputs the product fits six digits, so the
        /// issue is exactly `line.quantity * output`.
        #[test]
        fn issue_is_exact_product(per_unit in 1i64..10_000_000i64, output in 1i64..10_000_000i64) {
            let per_unit = Decimal::new(per_unit, 3);
            let output = Decimal::new(output, 3);
            let bakery = Bakery::new(&per_unit.to_string());
            let moves = bakery
                .recipe
                .plan_execution(&bakery.lines, &bakery.items(), Quantity::from_decimal(output).unwrap())
                .unwrap();

            prop_assert_eq!(moves[0].quantity.as_decimal(), -(per_unit * output));
            prop_assert_eq!(moves[1].quantity.as_decimal(), output);
        }
    }
}
