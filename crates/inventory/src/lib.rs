//! Inventory domain module.
//!
//! Items, the append-only stock ledger and physical-count reconciliation,
//! implemented purely as deterministic domain logic (no IO, no storage).

pub mod count;
pub mod item;
pub mod ledger;

pub use count::{
    CountStatus, InventoryCount, InventoryCountLine, NewInventoryCount, Reconciliation,
    plan_adjustments,
};
pub use item::{Item, NewItem};
pub use ledger::{MoveSource, MoveType, NewStockMove, StockMove, balance};
