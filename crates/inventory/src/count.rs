//! Physical inventory counts and their reconciliation against the ledger.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use millstock_core::{
    DomainError, DomainResult, InventoryCountId, InventoryCountLineId, ItemId, Quantity, TenantId,
    TenantScoped, UserId,
};

use crate::item::Item;
use crate::ledger::{MoveSource, MoveType, NewStockMove};

/// Count lifecycle. `Posted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountStatus {
    Draft,
    Posted,
}

impl CountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountStatus::Draft => "draft",
            CountStatus::Posted => "posted",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "draft" => Ok(CountStatus::Draft),
            "posted" => Ok(CountStatus::Posted),
            other => Err(DomainError::validation(format!("unknown count status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewInventoryCount {
    pub name: String,
    pub notes: Option<String>,
}

/// Count header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryCount {
    pub id: InventoryCountId,
    pub tenant_id: TenantId,
    pub name: String,
    pub notes: Option<String>,
    pub status: CountStatus,
    pub posted_at: Option<DateTime<Utc>>,
    pub posted_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

fn count_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("count name cannot be empty"));
    }
    Ok(name.to_string())
}

impl InventoryCount {
    pub fn new(
        id: InventoryCountId,
        tenant_id: TenantId,
        input: NewInventoryCount,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id,
            tenant_id,
            name: count_name(&input.name)?,
            notes: input.notes,
            status: CountStatus::Draft,
            posted_at: None,
            posted_by: None,
            created_at,
        })
    }

    pub fn is_posted(&self) -> bool {
        self.status == CountStatus::Posted
    }

    /// Guard for every mutation of the count or its lines.
    pub fn ensure_draft(&self) -> DomainResult<()> {
        if self.is_posted() {
            return Err(DomainError::PostedCountImmutable);
        }
        Ok(())
    }

    pub fn update(&mut self, input: NewInventoryCount) -> DomainResult<()> {
        self.ensure_draft()?;
        self.name = count_name(&input.name)?;
        self.notes = input.notes;
        Ok(())
    }

    /// `draft -> posted`. Sets `posted_at`/`posted_by` exactly once.
    pub fn mark_posted(&mut self, actor: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_draft()?;
        self.status = CountStatus::Posted;
        self.posted_at = Some(now);
        self.posted_by = Some(actor);
        Ok(())
    }
}

impl TenantScoped for InventoryCount {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// One physically counted quantity, in the item's base unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryCountLine {
    pub id: InventoryCountLineId,
    pub tenant_id: TenantId,
    pub count_id: InventoryCountId,
    pub item_id: ItemId,
    pub counted_quantity: Quantity,
}

fn counted(quantity: Quantity) -> DomainResult<Quantity> {
    if quantity.is_negative() {
        return Err(DomainError::validation(format!(
            "counted quantity cannot be negative (got {quantity})"
        )));
    }
    Ok(quantity)
}

impl InventoryCountLine {
    pub fn new(
        id: InventoryCountLineId,
        count: &InventoryCount,
        item: &Item,
        counted_quantity: Quantity,
    ) -> DomainResult<Self> {
        count.ensure_draft()?;
        if item.tenant_id != count.tenant_id {
            return Err(DomainError::cross_tenant("count line item belongs to a different tenant"));
        }
        Ok(Self {
            id,
            tenant_id: count.tenant_id,
            count_id: count.id,
            item_id: item.id,
            counted_quantity: counted(counted_quantity)?,
        })
    }

    pub fn set_counted(&mut self, count: &InventoryCount, quantity: Quantity) -> DomainResult<()> {
        count.ensure_draft()?;
        self.counted_quantity = counted(quantity)?;
        Ok(())
    }
}

impl TenantScoped for InventoryCountLine {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Ledger entries that bring every counted item onto its counted quantity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reconciliation {
    pub moves: Vec<NewStockMove>,
    /// Items whose balance already equals the counted quantity.
    pub unchanged: Vec<ItemId>,
}

/// Compute `counted - balance` for every line.
///
/// `items` must hold every counted item (resolved in the count's tenant) and
/// `balances` the current balance of each; a missing balance means the item
/// has no entries yet. Zero deltas produce no entry.
pub fn plan_adjustments(
    count: &InventoryCount,
    lines: &[InventoryCountLine],
    items: &HashMap<ItemId, Item>,
    balances: &HashMap<ItemId, Quantity>,
) -> DomainResult<Reconciliation> {
    count.ensure_draft()?;
    if lines.is_empty() {
        return Err(DomainError::validation("inventory count has no lines"));
    }

    let source = Some(MoveSource::InventoryCount(count.id));
    let mut plan = Reconciliation::default();
    for line in lines {
        if line.count_id != count.id {
            return Err(DomainError::validation("count line belongs to another count"));
        }
        let item = items
            .get(&line.item_id)
            .filter(|item| item.tenant_id == count.tenant_id)
            .ok_or_else(|| DomainError::cross_tenant("counted item is not visible to the count's tenant"))?;
        let balance = balances.get(&line.item_id).copied().unwrap_or_default();
        let delta = line.counted_quantity.checked_sub(balance)?;
        if delta.is_zero() {
            plan.unchanged.push(item.id);
            continue;
        }
        plan.moves.push(NewStockMove::for_item(
            item,
            delta,
            MoveType::InventoryCountAdjustment,
            source,
        ));
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::NewItem;
    use crate::ledger::{StockMove, balance};
    use millstock_core::{StockMoveId, UomId};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn qty(s: &str) -> Quantity {
        Quantity::parse(s).unwrap()
    }

    fn item(tenant_id: TenantId, name: &str) -> Item {
        Item::new(
            ItemId::new(),
            tenant_id,
            NewItem {
                name: name.to_string(),
                base_uom_id: UomId::new(),
                ..NewItem::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn draft(tenant_id: TenantId) -> InventoryCount {
        InventoryCount::new(
            InventoryCountId::new(),
            tenant_id,
            NewInventoryCount {
                name: "Month end".to_string(),
                notes: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn index(items: &[&Item]) -> HashMap<ItemId, Item> {
        items.iter().map(|i| (i.id, (*i).clone())).collect()
    }

    #[test]
    fn delta_is_counted_minus_balance() {
        let tenant = TenantId::new();
        let flour = item(tenant, "Flour");
        let count = draft(tenant);
        let line = InventoryCountLine::new(InventoryCountLineId::new(), &count, &flour, qty("5")).unwrap();
        let balances = HashMap::from([(flour.id, qty("2"))]);

        let plan = plan_adjustments(&count, &[line], &index(&[&flour]), &balances).unwrap();
        assert_eq!(plan.moves.len(), 1);
        let adj = &plan.moves[0];
        assert_eq!(adj.quantity.to_string(), "3.000000");
        assert_eq!(adj.move_type, MoveType::InventoryCountAdjustment);
        assert_eq!(adj.source, Some(MoveSource::InventoryCount(count.id)));
        assert_eq!(adj.uom_id, flour.base_uom_id);
    }

    #[test]
    fn zero_delta_is_skipped() {
        let tenant = TenantId::new();
        let flour = item(tenant, "Flour");
        let salt = item(tenant, "Salt");
        let count = draft(tenant);
        let lines = vec![
            InventoryCountLine::new(InventoryCountLineId::new(), &count, &flour, qty("4")).unwrap(),
            InventoryCountLine::new(InventoryCountLineId::new(), &count, &salt, qty("0")).unwrap(),
        ];
        let balances = HashMap::from([(flour.id, qty("4"))]);

        let plan = plan_adjustments(&count, &lines, &index(&[&flour, &salt]), &balances).unwrap();
        assert!(plan.moves.is_empty());
        assert_eq!(plan.unchanged, vec![flour.id, salt.id]);
    }

    #[test]
    fn empty_count_cannot_be_posted() {
        let count = draft(TenantId::new());
        let err = plan_adjustments(&count, &[], &HashMap::new(), &HashMap::new()).unwrap_err();
        assert_eq!(err, DomainError::validation("inventory count has no lines"));
    }

    #[test]
    fn posted_count_is_immutable() {
        let tenant = TenantId::new();
        let flour = item(tenant, "Flour");
        let mut count = draft(tenant);
        let mut line = InventoryCountLine::new(InventoryCountLineId::new(), &count, &flour, qty("1")).unwrap();

        let actor = UserId::new();
        count.mark_posted(actor, Utc::now()).unwrap();
        assert_eq!(count.posted_by, Some(actor));
        assert!(count.posted_at.is_some());

        assert_eq!(count.mark_posted(actor, Utc::now()), Err(DomainError::PostedCountImmutable));
        assert_eq!(
            count.update(NewInventoryCount {
                name: "Renamed".to_string(),
                notes: None
            }),
            Err(DomainError::PostedCountImmutable)
        );
        assert_eq!(line.set_counted(&count, qty("2")), Err(DomainError::PostedCountImmutable));
        assert_eq!(
            InventoryCountLine::new(InventoryCountLineId::new(), &count, &flour, qty("1")).unwrap_err(),
            DomainError::PostedCountImmutable
        );
        assert_eq!(
            plan_adjustments(&count, &[line], &index(&[&flour]), &HashMap::new()).unwrap_err(),
            DomainError::PostedCountImmutable
        );
    }

    #[test]
    fn negative_count_is_rejected() {
        let tenant = TenantId::new();
        let flour = item(tenant, "Flour");
        let count = draft(tenant);
        let err = InventoryCountLine::new(InventoryCountLineId::new(), &count, &flour, qty("-1")).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn foreign_item_cannot_be_counted() {
        let count = draft(TenantId::new());
        let foreign = item(TenantId::new(), "Flour");
        let err = InventoryCountLine::new(InventoryCountLineId::new(), &count, &foreign, qty("1")).unwrap_err();
        assert!(matches!(err, DomainError::CrossTenantMismatch(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: after applying the adjustment, the balance equals the counted quantity.
        #[test]
        fn reconciliation_lands_on_counted_quantity(
            prior in prop::collection::vec(-1_000_000_000i64..1_000_000_000i64, 0..8),
            counted_micros in 0i64..2_000_000_000i64,
        ) {
            let tenant = TenantId::new();
            let flour = item(tenant, "Flour");
            let count = draft(tenant);

            let mut moves: Vec<StockMove> = prior
                .iter()
                .filter(|m| **m != 0)
                .map(|m| {
                    let q = Quantity::from_decimal(Decimal::new(*m, 6)).unwrap();
                    let draft = NewStockMove::for_item(&flour, q, MoveType::Adjustment, None);
                    StockMove::record(StockMoveId::new(), tenant, &flour, draft, Utc::now()).unwrap()
                })
                .collect();

            let target = Quantity::from_decimal(Decimal::new(counted_micros, 6)).unwrap();
            let line = InventoryCountLine::new(InventoryCountLineId::new(), &count, &flour, target).unwrap();
            let balances = HashMap::from([(flour.id, balance(&moves).unwrap())]);
            let plan = plan_adjustments(&count, &[line], &index(&[&flour]), &balances).unwrap();

            for draft in plan.moves {
                moves.push(StockMove::record(StockMoveId::new(), tenant, &flour, draft, Utc::now()).unwrap());
            }
            prop_assert_eq!(balance(&moves).unwrap(), target);
        }
    }
}
