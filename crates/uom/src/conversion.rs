use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use millstock_core::{
    DomainError, DomainResult, Factor, ItemId, ItemUomConversionId, TenantId, TenantScoped,
    UomConversionId, UomId,
};

use crate::unit::Uom;

/// Global, directed category-level conversion: `qty_to = qty_from * factor`.
///
/// Unique per ordered `(from_uom_id, to_uom_id)` pair and only valid inside one
/// category. Conversions are never chained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UomConversion {
    pub id: UomConversionId,
    pub from_uom_id: UomId,
    pub to_uom_id: UomId,
    pub factor: Factor,
}

impl UomConversion {
    pub fn new(id: UomConversionId, from: &Uom, to: &Uom, factor: Decimal) -> DomainResult<Self> {
        let factor = Factor::new(factor)?;
        if from.id == to.id {
            return Err(DomainError::validation("conversion units must differ"));
        }
        if !from.same_category(to) {
            return Err(DomainError::validation(format!(
                "category conversion {} -> {} crosses categories; use an item-specific conversion",
                from.symbol, to.symbol
            )));
        }
        Ok(Self {
            id,
            from_uom_id: from.id,
            to_uom_id: to.id,
            factor,
        })
    }
}

/// Input for an item-specific override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItemUomConversion {
    pub item_id: ItemId,
    pub from_uom_id: UomId,
    pub to_uom_id: UomId,
    pub factor: Decimal,
}

/// Tenant+item-scoped direct factor between two arbitrary units (may cross
/// categories, e.g. "patty" -> "gram"). Unique per (tenant, item, from, to).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUomConversion {
    pub id: ItemUomConversionId,
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub from_uom_id: UomId,
    pub to_uom_id: UomId,
    pub factor: Factor,
}

impl ItemUomConversion {
    pub fn new(
        id: ItemUomConversionId,
        tenant_id: TenantId,
        input: NewItemUomConversion,
    ) -> DomainResult<Self> {
        let factor = Factor::new(input.factor)?;
        if input.from_uom_id == input.to_uom_id {
            return Err(DomainError::validation("conversion units must differ"));
        }
        Ok(Self {
            id,
            tenant_id,
            item_id: input.item_id,
            from_uom_id: input.from_uom_id,
            to_uom_id: input.to_uom_id,
            factor,
        })
    }
}

impl TenantScoped for ItemUomConversion {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Which single lookup resolves a unit pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConversionPath {
    /// Same unit: factor 1, no lookup.
    Identity,
    /// Same category: one direct `UomConversion(from -> to)`.
    Category,
    /// Different categories: one `ItemUomConversion(tenant, item, from -> to)`.
    ItemSpecific,
}

impl ConversionPath {
    pub fn between(from: &Uom, to: &Uom) -> Self {
        if from.id == to.id {
            ConversionPath::Identity
        } else if from.same_category(to) {
            ConversionPath::Category
        } else {
            ConversionPath::ItemSpecific
        }
    }

    /// Turn the outcome of the lookup into a factor.
    pub fn resolve(self, from: &Uom, to: &Uom, found: Option<Factor>) -> DomainResult<Factor> {
        match self {
            ConversionPath::Identity => Ok(Factor::one()),
            ConversionPath::Category | ConversionPath::ItemSpecific => {
                found.ok_or(DomainError::MissingConversion {
                    from: from.id,
                    to: to.id,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::UomCategory;
    use millstock_core::{UomCategoryId, UomId};
    use rust_decimal_macros::dec;

    fn units() -> (Uom, Uom, Uom) {
        let mass = UomCategory::new(UomCategoryId::new(), "Mass").unwrap();
        let count = UomCategory::new(UomCategoryId::new(), "Count").unwrap();
        let kg = Uom::new(UomId::new(), &mass, "Kilogram", "kg").unwrap();
        let g = Uom::new(UomId::new(), &mass, "Gram", "g").unwrap();
        let patty = Uom::new(UomId::new(), &count, "Patty", "patty").unwrap();
        (kg, g, patty)
    }

    #[test]
    fn path_selection() {
        let (kg, g, patty) = units();
        assert_eq!(ConversionPath::between(&kg, &kg), ConversionPath::Identity);
        assert_eq!(ConversionPath::between(&kg, &g), ConversionPath::Category);
        assert_eq!(ConversionPath::between(&patty, &g), ConversionPath::ItemSpecific);
    }

    #[test]
    fn identity_ignores_lookup() {
        let (kg, _, _) = units();
        let factor = ConversionPath::Identity.resolve(&kg, &kg, None).unwrap();
        assert_eq!(factor, Factor::one());
    }

    #[test]
    fn missing_lookup_is_missing_conversion() {
        let (kg, _, patty) = units();
        let err = ConversionPath::ItemSpecific.resolve(&kg, &patty, None).unwrap_err();
        assert_eq!(
            err,
            DomainError::MissingConversion {
                from: kg.id,
                to: patty.id
            }
        );
    }

    #[test]
    fn category_conversion_rejects_non_positive_factor() {
        let (kg, g, _) = units();
        let err = UomConversion::new(UomConversionId::new(), &kg, &g, dec!(0)).unwrap_err();
        assert!(matches!(err, DomainError::NonPositiveFactor(_)));
        let err = UomConversion::new(UomConversionId::new(), &kg, &g, dec!(-1000)).unwrap_err();
        assert!(matches!(err, DomainError::NonPositiveFactor(_)));
    }

    #[test]
    fn category_conversion_must_stay_in_one_category() {
        let (kg, _, patty) = units();
        let err = UomConversion::new(UomConversionId::new(), &patty, &kg, dec!(0.113)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("crosses categories")));
    }

    #[test]
    fn item_conversion_may_cross_categories_but_not_be_reflexive() {
        let (_, g, patty) = units();
        let tenant = TenantId::new();
        let item = ItemId::new();
        let ok = ItemUomConversion::new(
            ItemUomConversionId::new(),
            tenant,
            NewItemUomConversion {
                item_id: item,
                from_uom_id: patty.id,
                to_uom_id: g.id,
                factor: dec!(113),
            },
        )
        .unwrap();
        assert_eq!(ok.factor.as_decimal(), dec!(113));

        let err = ItemUomConversion::new(
            ItemUomConversionId::new(),
            tenant,
            NewItemUomConversion {
                item_id: item,
                from_uom_id: g.id,
                to_uom_id: g.id,
                factor: dec!(1),
            },
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
