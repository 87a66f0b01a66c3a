use serde::{Deserialize, Serialize};

use millstock_core::{DomainError, DomainResult, UomCategoryId, UomId};

/// A named group of interchangeable units (e.g. "Mass"). Global, not tenant-scoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UomCategory {
    pub id: UomCategoryId,
    pub name: String,
}

impl UomCategory {
    pub fn new(id: UomCategoryId, name: &str) -> DomainResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("category name cannot be empty"));
        }
        Ok(Self {
            id,
            name: name.to_string(),
        })
    }
}

/// A unit of measure. Belongs to exactly one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uom {
    pub id: UomId,
    pub category_id: UomCategoryId,
    pub name: String,
    /// Display symbol, e.g. "kg".
    pub symbol: String,
}

impl Uom {
    pub fn new(id: UomId, category: &UomCategory, name: &str, symbol: &str) -> DomainResult<Self> {
        let (name, symbol) = (name.trim(), symbol.trim());
        if name.is_empty() {
            return Err(DomainError::validation("unit name cannot be empty"));
        }
        if symbol.is_empty() {
            return Err(DomainError::validation("unit symbol cannot be empty"));
        }
        Ok(Self {
            id,
            category_id: category.id,
            name: name.to_string(),
            symbol: symbol.to_string(),
        })
    }

    pub fn same_category(&self, other: &Uom) -> bool {
        self.category_id == other.category_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_names_are_rejected() {
        assert!(UomCategory::new(UomCategoryId::new(), "  ").is_err());
        let mass = UomCategory::new(UomCategoryId::new(), "Mass").unwrap();
        assert!(Uom::new(UomId::new(), &mass, "", "kg").is_err());
        assert!(Uom::new(UomId::new(), &mass, "Kilogram", " ").is_err());
    }

    #[test]
    fn unit_takes_its_category_from_the_category_value() {
        let mass = UomCategory::new(UomCategoryId::new(), " Mass ").unwrap();
        assert_eq!(mass.name, "Mass");
        let kg = Uom::new(UomId::new(), &mass, "Kilogram", "kg").unwrap();
        let g = Uom::new(UomId::new(), &mass, "Gram", "g").unwrap();
        assert_eq!(kg.category_id, mass.id);
        assert!(kg.same_category(&g));
    }
}
