use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use millstock_core::{
    DomainError, DomainResult, ItemId, PlanningPrice, TenantId, TenantScoped, UomId,
};

/// Tenant-owned inventory identity.
///
/// `base_uom_id` is fixed at creation: every ledger entry of the item is
/// denominated in it, so it cannot be changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub tenant_id: TenantId,
    pub sku: Option<String>,
    pub name: String,
    pub base_uom_id: UomId,
    pub is_purchasable: bool,
    pub is_sellable: bool,
    pub is_manufacturable: bool,
    pub planning_price: Option<PlanningPrice>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewItem {
    pub sku: Option<String>,
    pub name: String,
    pub base_uom_id: UomId,
    pub is_purchasable: bool,
    pub is_sellable: bool,
    pub is_manufacturable: bool,
    pub planning_price: Option<PlanningPrice>,
}

impl Item {
    pub fn new(
        id: ItemId,
        tenant_id: TenantId,
        input: NewItem,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("item name cannot be empty"));
        }
        let sku = match input.sku.as_deref().map(str::trim) {
            Some("") => return Err(DomainError::validation("sku cannot be blank")),
            Some(s) => Some(s.to_string()),
            None => None,
        };
        Ok(Self {
            id,
            tenant_id,
            sku,
            name: name.to_string(),
            base_uom_id: input.base_uom_id,
            is_purchasable: input.is_purchasable,
            is_sellable: input.is_sellable,
            is_manufacturable: input.is_manufacturable,
            planning_price: input.planning_price,
            created_at,
        })
    }

    /// Ledger entries must be denominated in the base unit.
    pub fn ensure_base_unit(&self, uom_id: UomId) -> DomainResult<()> {
        if uom_id != self.base_uom_id {
            return Err(DomainError::UomMismatch {
                expected: self.base_uom_id,
                found: uom_id,
            });
        }
        Ok(())
    }

    pub fn ensure_manufacturable(&self) -> DomainResult<()> {
        if !self.is_manufacturable {
            return Err(DomainError::validation(format!(
                "item '{}' is not manufacturable",
                self.name
            )));
        }
        Ok(())
    }

    pub fn ensure_purchasable(&self) -> DomainResult<()> {
        if !self.is_purchasable {
            return Err(DomainError::validation(format!(
                "item '{}' is not purchasable",
                self.name
            )));
        }
        Ok(())
    }
}

impl TenantScoped for Item {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}
