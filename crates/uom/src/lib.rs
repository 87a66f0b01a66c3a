//! Unit-of-measure catalog.
//!
//! Global unit definitions, direct category-level conversions and per-item
//! overrides, plus the pure part of conversion resolution (which lookup a unit
//! pair needs). No IO; lookups are performed by the infrastructure layer.

pub mod conversion;
pub mod unit;

pub use conversion::{ConversionPath, ItemUomConversion, NewItemUomConversion, UomConversion};
pub use unit::{Uom, UomCategory};
