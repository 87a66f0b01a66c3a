//! Manufacturing domain module: single-level bills of materials.
//!
//! A recipe consumes its input lines and produces its output item. Execution
//! is planned here as ledger drafts; writing them is the caller's job.

pub mod recipe;

pub use recipe::{NewRecipe, NewRecipeLine, Recipe, RecipeLine};
