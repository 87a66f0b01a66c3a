//! Application services.
//!
//! Each service owns a [`Store`](crate::store::Store) handle and runs every
//! operation inside one unit of work: explicit domain validation first, then
//! the writes, then commit. A failure anywhere drops the unit of work, so
//! nothing from that operation persists.

pub mod catalog;
pub mod conversion;
pub mod counts;
pub mod items;
pub mod ledger;
pub mod receiving;
pub mod recipes;

pub use catalog::CatalogService;
pub use conversion::{ConversionResolver, resolve_factor};
pub use counts::CountReconciler;
pub use items::ItemService;
pub use ledger::StockLedger;
pub use receiving::PurchaseReceiving;
pub use recipes::RecipeService;
