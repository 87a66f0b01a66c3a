//! Planning prices: integer minor units plus an ISO 4217 currency code.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// ISO 4217 alphabetic currency code (three ASCII uppercase letters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn parse(code: &str) -> DomainResult<Self> {
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(code.to_string()))
        } else {
            Err(DomainError::validation(format!("invalid currency code '{code}'")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}

/// Optional planning price of an item.
///
/// Stored as minor currency units (e.g. cents) so no rounding ever happens on
/// the way in or out of storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningPrice {
    pub amount_minor: i64,
    pub currency: CurrencyCode,
}

impl PlanningPrice {
    pub fn new(amount_minor: i64, currency: &str) -> DomainResult<Self> {
        if amount_minor < 0 {
            return Err(DomainError::validation("planning price cannot be negative"));
        }
        Ok(Self {
            amount_minor,
            currency: CurrencyCode::parse(currency)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_code_must_be_three_uppercase_letters() {
        assert!(CurrencyCode::parse("EUR").is_ok());
        assert!(CurrencyCode::parse("eur").is_err());
        assert!(CurrencyCode::parse("EURO").is_err());
        assert!(CurrencyCode::parse("E1R").is_err());
    }

    #[test]
    fn negative_planning_price_is_rejected() {
        assert!(PlanningPrice::new(-1, "USD").is_err());
        let price = PlanningPrice::new(1250, "USD").unwrap();
        assert_eq!(price.amount_minor, 1250);
        assert_eq!(price.currency.as_str(), "USD");
    }
}
