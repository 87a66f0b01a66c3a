//! Stock ledger entries.
//!
//! A [`StockMove`] is an immutable, signed quantity event against one item.
//! There is no stored on-hand figure anywhere: the balance of an item is the
//! sum of its entries ([`balance`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use millstock_core::{
    DomainError, DomainResult, InventoryCountId, ItemId, MakeOrderId, PurchaseOptionId, Quantity,
    RecipeId, StockMoveId, TenantId, TenantScoped, UomId,
};

use crate::item::Item;

/// Ledger entry type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveType {
    Receipt,
    Issue,
    Adjustment,
    InventoryCountAdjustment,
}

impl MoveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveType::Receipt => "receipt",
            MoveType::Issue => "issue",
            MoveType::Adjustment => "adjustment",
            MoveType::InventoryCountAdjustment => "inventory_count_adjustment",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "receipt" => Ok(MoveType::Receipt),
            "issue" => Ok(MoveType::Issue),
            "adjustment" => Ok(MoveType::Adjustment),
            "inventory_count_adjustment" => Ok(MoveType::InventoryCountAdjustment),
            other => Err(DomainError::validation(format!("unknown move type '{other}'"))),
        }
    }

    fn check_sign(&self, quantity: Quantity) -> DomainResult<()> {
        let ok = match self {
            MoveType::Receipt => quantity.is_positive(),
            MoveType::Issue => quantity.is_negative(),
            MoveType::Adjustment | MoveType::InventoryCountAdjustment => !quantity.is_zero(),
        };
        if ok {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "{} entry cannot carry quantity {quantity}",
                self.as_str()
            )))
        }
    }
}

/// Weak reference to the operation that produced a ledger entry.
///
/// Lookup only; a source never owns its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MoveSource {
    Recipe(RecipeId),
    InventoryCount(InventoryCountId),
    MakeOrder(MakeOrderId),
    PurchaseOption(PurchaseOptionId),
}

impl MoveSource {
    pub fn kind(&self) -> &'static str {
        match self {
            MoveSource::Recipe(_) => "recipe",
            MoveSource::InventoryCount(_) => "inventory_count",
            MoveSource::MakeOrder(_) => "make_order",
            MoveSource::PurchaseOption(_) => "purchase_option",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            MoveSource::Recipe(id) => *id.as_uuid(),
            MoveSource::InventoryCount(id) => *id.as_uuid(),
            MoveSource::MakeOrder(id) => *id.as_uuid(),
            MoveSource::PurchaseOption(id) => *id.as_uuid(),
        }
    }

    /// Rebuild a source from its persisted `(kind, id)` columns.
    pub fn from_parts(kind: &str, id: Uuid) -> DomainResult<Self> {
        match kind {
            "recipe" => Ok(MoveSource::Recipe(RecipeId::from_uuid(id))),
            "inventory_count" => Ok(MoveSource::InventoryCount(InventoryCountId::from_uuid(id))),
            "make_order" => Ok(MoveSource::MakeOrder(MakeOrderId::from_uuid(id))),
            "purchase_option" => Ok(MoveSource::PurchaseOption(PurchaseOptionId::from_uuid(id))),
            other => Err(DomainError::validation(format!("unknown move source '{other}'"))),
        }
    }
}

/// A ledger entry that has not been recorded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStockMove {
    pub item_id: ItemId,
    pub uom_id: UomId,
    pub quantity: Quantity,
    pub move_type: MoveType,
    pub source: Option<MoveSource>,
    pub note: Option<String>,
}

impl NewStockMove {
    /// Draft an entry in the item's base unit.
    pub fn for_item(item: &Item, quantity: Quantity, move_type: MoveType, source: Option<MoveSource>) -> Self {
        Self {
            item_id: item.id,
            uom_id: item.base_uom_id,
            quantity,
            move_type,
            source,
            note: None,
        }
    }
}

/// Immutable ledger entry. Only a creation timestamp exists: entries are never
/// updated after they are recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMove {
    pub id: StockMoveId,
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub uom_id: UomId,
    pub quantity: Quantity,
    pub move_type: MoveType,
    pub source: Option<MoveSource>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StockMove {
    /// Validate a draft against its item and turn it into a ledger entry.
    ///
    /// This is the only way to build a new entry: the unit must be the item's
    /// base unit and the item must belong to the recording tenant.
    pub fn record(
        id: StockMoveId,
        tenant_id: TenantId,
        item: &Item,
        draft: NewStockMove,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if item.tenant_id != tenant_id {
            return Err(DomainError::cross_tenant("ledger item belongs to a different tenant"));
        }
        if draft.item_id != item.id {
            return Err(DomainError::validation("ledger entry does not target the given item"));
        }
        item.ensure_base_unit(draft.uom_id)?;
        draft.move_type.check_sign(draft.quantity)?;

        Ok(Self {
            id,
            tenant_id,
            item_id: item.id,
            uom_id: draft.uom_id,
            quantity: draft.quantity,
            move_type: draft.move_type,
            source: draft.source,
            note: draft.note,
            created_at,
        })
    }
}

impl TenantScoped for StockMove {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Derived on-hand balance: the sum of every entry.
pub fn balance<'a>(moves: impl IntoIterator<Item = &'a StockMove>) -> DomainResult<Quantity> {
    Quantity::checked_sum(moves.into_iter().map(|m| m.quantity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::NewItem;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn flour(tenant_id: TenantId) -> Item {
        Item::new(
            ItemId::new(),
            tenant_id,
            NewItem {
                name: "Flour".to_string(),
                base_uom_id: UomId::new(),
                ..NewItem::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn qty(s: &str) -> Quantity {
        Quantity::parse(s).unwrap()
    }

    #[test]
    fn record_rejects_foreign_unit() {
        let tenant = TenantId::new();
        let item = flour(tenant);
        let mut draft = NewStockMove::for_item(&item, qty("1"), MoveType::Receipt, None);
        draft.uom_id = UomId::new();

        let err = StockMove::record(StockMoveId::new(), tenant, &item, draft, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::UomMismatch { .. }));
    }

    #[test]
    fn record_rejects_item_of_other_tenant() {
        let item = flour(TenantId::new());
        let draft = NewStockMove::for_item(&item, qty("1"), MoveType::Receipt, None);
        let err = StockMove::record(StockMoveId::new(), TenantId::new(), &item, draft, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::CrossTenantMismatch(_)));
    }

    #[test]
    fn sign_must_match_move_type() {
        let tenant = TenantId::new();
        let item = flour(tenant);
        for (move_type, q) in [
            (MoveType::Receipt, "-1"),
            (MoveType::Issue, "2"),
            (MoveType::Adjustment, "0"),
            (MoveType::InventoryCountAdjustment, "0"),
        ] {
            let draft = NewStockMove::for_item(&item, qty(q), move_type, None);
            assert!(
                StockMove::record(StockMoveId::new(), tenant, &item, draft, Utc::now()).is_err(),
                "{move_type:?} with {q} should be rejected"
            );
        }
    }

    #[test]
    fn source_round_trips_through_parts() {
        let source = MoveSource::InventoryCount(InventoryCountId::new());
        let back = MoveSource::from_parts(source.kind(), source.id()).unwrap();
        assert_eq!(back, source);
        assert!(MoveSource::from_parts("invoice", source.id()).is_err());
    }

    #[test]
    fn move_type_parse_matches_as_str() {
        for t in [
            MoveType::Receipt,
            MoveType::Issue,
            MoveType::Adjustment,
            MoveType::InventoryCountAdjustment,
        ] {
            assert_eq!(MoveType::parse(t.as_str()).unwrap(), t);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: the balance equals the sum of entry quantities.
        #[test]
        fn balance_is_sum_of_entries(micros in prop::collection::vec(1i64..1_000_000_000i64, 1..20)) {
            let tenant = TenantId::new();
            let item = flour(tenant);
            let mut moves = Vec::new();
            let mut expected = Decimal::ZERO;
            for (i, m) in micros.iter().enumerate() {
                let signed = if i % 3 == 0 { -*m } else { *m };
                let q = Quantity::from_decimal(Decimal::new(signed, 6)).unwrap();
                let move_type = if signed < 0 { MoveType::Issue } else { MoveType::Receipt };
                let draft = NewStockMove::for_item(&item, q, move_type, None);
                moves.push(StockMove::record(StockMoveId::new(), tenant, &item, draft, Utc::now()).unwrap());
                expected += Decimal::new(signed, 6);
            }
            prop_assert_eq!(balance(&moves).unwrap().as_decimal(), expected);
        }
    }
}
