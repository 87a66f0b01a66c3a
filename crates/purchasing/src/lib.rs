//! Purchasing domain module (purchase pack definitions and receiving).
//!
//! This crate contains the receiving math for purchased packs, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod option;

pub use option::{ItemPurchaseOption, NewItemPurchaseOption};
