use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use millstock_core::{
    DomainError, DomainResult, Factor, ItemId, PurchaseOptionId, Quantity, TenantId, TenantScoped,
    UomId,
};
use millstock_inventory::{Item, MoveSource, MoveType, NewStockMove};

/// Input for defining how an item is bought.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItemPurchaseOption {
    pub item_id: ItemId,
    pub label: Option<String>,
    /// Opaque supplier reference; suppliers themselves are managed elsewhere.
    pub supplier_ref: Option<String>,
    pub pack_quantity: Quantity,
    pub pack_uom_id: UomId,
}

/// A purchasable pack of an item: `pack_quantity` units of `pack_uom_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPurchaseOption {
    pub id: PurchaseOptionId,
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub label: Option<String>,
    pub supplier_ref: Option<String>,
    pub pack_quantity: Quantity,
    pub pack_uom_id: UomId,
    pub created_at: DateTime<Utc>,
}

impl ItemPurchaseOption {
    pub fn new(
        id: PurchaseOptionId,
        tenant_id: TenantId,
        item: &Item,
        input: NewItemPurchaseOption,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if item.tenant_id != tenant_id {
            return Err(DomainError::cross_tenant("purchased item belongs to a different tenant"));
        }
        if input.item_id != item.id {
            return Err(DomainError::validation("purchase option does not target the given item"));
        }
        item.ensure_purchasable()?;
        Ok(Self {
            id,
            tenant_id,
            item_id: item.id,
            label: input.label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
            supplier_ref: input.supplier_ref,
            pack_quantity: input.pack_quantity.ensure_positive()?,
            pack_uom_id: input.pack_uom_id,
            created_at,
        })
    }

    /// `pack_quantity * pack_count * factor`, rounded half-to-even to six digits.
    ///
    /// `factor` converts the pack unit into the item's base unit.
    pub fn received_quantity(&self, pack_count: Quantity, factor: Factor) -> DomainResult<Quantity> {
        let pack_count = pack_count.ensure_positive()?;
        let packs = self.pack_quantity.checked_mul(pack_count.as_decimal())?;
        let base = packs
            .checked_mul(factor.as_decimal())
            .ok_or_else(|| DomainError::validation(format!("quantity overflow: {packs} x {factor}")))?;
        Quantity::round(base)
    }

    /// Plan the single receipt for `pack_count` packs.
    pub fn plan_receipt(&self, item: &Item, pack_count: Quantity, factor: Factor) -> DomainResult<NewStockMove> {
        if item.tenant_id != self.tenant_id || item.id != self.item_id {
            return Err(DomainError::cross_tenant(
                "purchase option and item belong to different tenants",
            ));
        }
        let received = self.received_quantity(pack_count, factor)?;
        if received.is_zero() {
            return Err(DomainError::validation("received quantity rounds to zero"));
        }
        Ok(NewStockMove::for_item(
            item,
            received,
            MoveType::Receipt,
            Some(MoveSource::PurchaseOption(self.id)),
        ))
    }
}

impl TenantScoped for ItemPurchaseOption {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use millstock_inventory::NewItem;
    use rust_decimal_macros::dec;

    fn qty(s: &str) -> Quantity {
        Quantity::parse(s).unwrap()
    }

    fn beef(tenant_id: TenantId, purchasable: bool) -> Item {
        Item::new(
            ItemId::new(),
            tenant_id,
            NewItem {
                name: "Ground beef".to_string(),
                base_uom_id: UomId::new(),
                is_purchasable: purchasable,
                ..NewItem::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn option(item: &Item, pack: &str) -> DomainResult<ItemPurchaseOption> {
        ItemPurchaseOption::new(
            PurchaseOptionId::new(),
            item.tenant_id,
            item,
            NewItemPurchaseOption {
                item_id: item.id,
                label: Some(" Case ".to_string()),
                supplier_ref: None,
                pack_quantity: qty(pack),
                pack_uom_id: UomId::new(),
            },
            Utc::now(),
        )
    }

    #[test]
    fn forty_patties_of_113_grams() {
        let item = beef(TenantId::new(), true);
        let opt = option(&item, "40").unwrap();
        assert_eq!(opt.label.as_deref(), Some("Case"));

        let receipt = opt.plan_receipt(&item, qty("1"), Factor::new(dec!(113)).unwrap()).unwrap();
        assert_eq!(receipt.quantity.to_string(), "4520.000000");
        assert_eq!(receipt.uom_id, item.base_uom_id);
        assert_eq!(receipt.move_type, MoveType::Receipt);
        assert_eq!(receipt.source, Some(MoveSource::PurchaseOption(opt.id)));
    }

    #[test]
    fn pack_count_must_be_positive() {
        let item = beef(TenantId::new(), true);
        let opt = option(&item, "10").unwrap();
        for count in ["0", "-2"] {
            let err = opt.plan_receipt(&item, qty(count), Factor::one()).unwrap_err();
            assert!(matches!(err, DomainError::NonPositiveQuantity(_)));
        }
    }

    #[test]
    fn option_requires_purchasable_item_and_positive_pack() {
        let not_bought = beef(TenantId::new(), false);
        assert!(matches!(option(&not_bought, "1"), Err(DomainError::Validation(_))));

        let item = beef(TenantId::new(), true);
        assert!(matches!(option(&item, "0"), Err(DomainError::NonPositiveQuantity(_))));
    }

    #[test]
    fn receiving_into_another_tenants_item_fails() {
        let item = beef(TenantId::new(), true);
        let opt = option(&item, "1").unwrap();
        let mut other = item.clone();
        other.tenant_id = TenantId::new();
        let err = opt.plan_receipt(&other, qty("1"), Factor::one()).unwrap_err();
        assert!(matches!(err, DomainError::CrossTenantMismatch(_)));
    }

    #[test]
    fn fractional_factor_is_rounded_once() {
        let item = beef(TenantId::new(), true);
        let opt = option(&item, "3").unwrap();
        // 3 * 1 * 0.3333333 = 0.9999999 -> 1.000000
        let received = opt
            .received_quantity(qty("1"), Factor::new(dec!(0.3333333)).unwrap())
            .unwrap();
        assert_eq!(received.to_string(), "1.000000");
    }
}
