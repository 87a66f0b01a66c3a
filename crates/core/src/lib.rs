//! `millstock-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, tenant scoping, the domain error model and the exact-decimal
//! value objects every other crate computes with.

pub mod error;
pub mod id;
pub mod money;
pub mod quantity;
pub mod tenant;

pub use error::{DomainError, DomainResult};
pub use id::{
    InventoryCountId, InventoryCountLineId, ItemId, ItemUomConversionId, MakeOrderId,
    PurchaseOptionId, RecipeId, RecipeLineId, StockMoveId, TenantId, UomCategoryId,
    UomConversionId, UomId, UserId,
};
pub use money::{CurrencyCode, PlanningPrice};
pub use quantity::{Factor, QUANTITY_SCALE, Quantity};
pub use tenant::{TenantContext, TenantProvider, TenantScoped, ensure_same_tenant, visible};
