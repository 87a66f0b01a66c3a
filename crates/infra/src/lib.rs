//! Infrastructure layer: persistence, configuration and application services.

pub mod config;
pub mod error;
pub mod services;
pub mod store;


pub use config::{DatabaseConfig, MillstockConfig};
pub use error::{ServiceError, ServiceResult, StoreError, StoreResult};
pub use services::{
    CatalogService, ConversionResolver, CountReconciler, ItemService, PurchaseReceiving,
    RecipeService, StockLedger,
};
pub use store::{InMemoryStore, Pagination, PostgresStore, Store, UnitOfWork};
