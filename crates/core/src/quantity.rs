//! Exact decimal value objects: ledger quantities and conversion factors.
//!
//! Quantities are fixed-scale decimals with six fractional digits. All
//! arithmetic goes through `rust_decimal`; binary floating point never touches
//! a quantity or factor.

use core::fmt;
use core::ops::Neg;
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Number of fractional digits carried by every ledger quantity.
pub const QUANTITY_SCALE: u32 = 6;

/// Integer digits a quantity may carry; matches the `NUMERIC(20, 6)` columns.
pub const QUANTITY_INTEGER_DIGITS: u32 = 14;

// 10^14
const QUANTITY_LIMIT: Decimal = Decimal::from_parts(276_447_232, 23_283, 0, false, 0);

/// A signed quantity with exactly [`QUANTITY_SCALE`] fractional digits.
///
/// Construction either rejects extra precision ([`Quantity::parse`],
/// [`Quantity::from_decimal`]) or rounds it away explicitly
/// ([`Quantity::round`]). The stored decimal is always rescaled, so `Display`
/// renders e.g. `"10000.000000"`. Magnitudes are limited to
/// [`QUANTITY_INTEGER_DIGITS`] integer digits, and arithmetic is checked.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity(Decimal);

impl Quantity {
    pub fn zero() -> Self {
        Self::rescaled(Decimal::ZERO)
    }

    /// Parse a decimal string with at most six fractional digits.
    ///
    /// The digits as written count: `"3.0000000"` is rejected even though its
    /// value fits.
    pub fn parse(input: &str) -> DomainResult<Self> {
        let trimmed = input.trim();
        let value = Decimal::from_str(trimmed)
            .map_err(|_| DomainError::validation(format!("invalid quantity '{trimmed}'")))?;
        if value.scale() > QUANTITY_SCALE {
            return Err(DomainError::validation(format!(
                "quantity '{trimmed}' has more than {QUANTITY_SCALE} fractional digits"
            )));
        }
        Self::bounded(value)
    }

    /// Exact conversion of a computed value; fails if it needs more than six
    /// fractional digits. Trailing zeros beyond the scale are accepted.
    pub fn from_decimal(value: Decimal) -> DomainResult<Self> {
        if value.normalize().scale() > QUANTITY_SCALE {
            return Err(DomainError::validation(format!(
                "quantity {value} has more than {QUANTITY_SCALE} fractional digits"
            )));
        }
        Self::bounded(value)
    }

    /// Round to six fractional digits, half to even.
    pub fn round(value: Decimal) -> DomainResult<Self> {
        Self::bounded(
            value.round_dp_with_strategy(QUANTITY_SCALE, RoundingStrategy::MidpointNearestEven),
        )
    }

    /// Sum with overflow and range checks at every step.
    pub fn checked_sum(quantities: impl IntoIterator<Item = Quantity>) -> DomainResult<Quantity> {
        quantities
            .into_iter()
            .try_fold(Quantity::zero(), |acc, q| acc.checked_add(q))
    }

    fn bounded(value: Decimal) -> DomainResult<Self> {
        if value.abs() >= QUANTITY_LIMIT {
            return Err(DomainError::validation(format!(
                "quantity {value} exceeds {QUANTITY_INTEGER_DIGITS} integer digits"
            )));
        }
        Ok(Self::rescaled(value))
    }

    fn rescaled(mut value: Decimal) -> Self {
        if value.is_zero() {
            value = Decimal::ZERO;
        }
        value.rescale(QUANTITY_SCALE);
        Self(value)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Require `> 0`, failing with `NonPositiveQuantity`.
    pub fn ensure_positive(self) -> DomainResult<Self> {
        if self.is_positive() {
            Ok(self)
        } else {
            Err(DomainError::NonPositiveQuantity(self.0))
        }
    }

    /// Exact product with another decimal (scale grows; nothing is rounded).
    pub fn checked_mul(&self, other: Decimal) -> DomainResult<Decimal> {
        self.0
            .checked_mul(other)
            .ok_or_else(|| DomainError::validation(format!("quantity overflow: {} x {other}", self.0)))
    }

    pub fn checked_add(&self, other: Quantity) -> DomainResult<Quantity> {
        self.0
            .checked_add(other.0)
            .ok_or_else(|| DomainError::validation("quantity overflow"))
            .and_then(Self::bounded)
    }

    pub fn checked_sub(&self, other: Quantity) -> DomainResult<Quantity> {
        self.0
            .checked_sub(other.0)
            .ok_or_else(|| DomainError::validation("quantity overflow"))
            .and_then(Self::bounded)
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Quantity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Quantity {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Quantity> for String {
    fn from(value: Quantity) -> Self {
        value.to_string()
    }
}

impl Neg for Quantity {
    type Output = Quantity;

    fn neg(self) -> Self::Output {
        Self::rescaled(-self.0)
    }
}

/// A strictly positive conversion multiplier.
///
/// Factors are not restricted to six fractional digits; the product they take
/// part in is rounded once, at the end, into a [`Quantity`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Factor(Decimal);

impl Factor {
    pub fn one() -> Self {
        Self(Decimal::ONE)
    }

    /// Validate a factor, failing with `NonPositiveFactor` for `<= 0`.
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value <= Decimal::ZERO {
            return Err(DomainError::NonPositiveFactor(value));
        }
        Ok(Self(value.normalize()))
    }

    pub fn parse(input: &str) -> DomainResult<Self> {
        let trimmed = input.trim();
        let value = Decimal::from_str(trimmed)
            .map_err(|_| DomainError::validation(format!("invalid factor '{trimmed}'")))?;
        Self::new(value)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<Decimal> for Factor {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Factor> for Decimal {
    fn from(value: Factor) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_pads_to_six_fractional_digits() {
        assert_eq!(Quantity::parse("3").unwrap().to_string(), "3.000000");
        assert_eq!(Quantity::parse(" -6.5 ").unwrap().to_string(), "-6.500000");
        assert_eq!(Quantity::parse("0.000001").unwrap().to_string(), "0.000001");
    }

    #[test]
    fn parse_rejects_seventh_fractional_digit() {
        for input in ["1.0000001", "3.0000000"] {
            let err = Quantity::parse(input).unwrap_err();
            assert!(
                matches!(&err, DomainError::Validation(msg) if msg.contains("fractional digits")),
                "{input}: {err:?}"
            );
        }
    }

    #[test]
    fn magnitude_is_limited_to_fourteen_integer_digits() {
        assert_eq!(
            Quantity::parse("99999999999999.999999").unwrap().to_string(),
            "99999999999999.999999"
        );
        for input in ["100000000000000", "-100000000000000", "40000000000000000000000000000"] {
            let err = Quantity::parse(input).unwrap_err();
            assert!(
                matches!(&err, DomainError::Validation(msg) if msg.contains("integer digits")),
                "{input}: {err:?}"
            );
        }
        assert!(Quantity::round(dec!(99999999999999.9999996)).is_err());
    }

    #[test]
    fn checked_arithmetic_reports_out_of_range_results() {
        let big = Quantity::parse("90000000000000").unwrap();
        assert!(matches!(big.checked_add(big), Err(DomainError::Validation(_))));
        assert!(matches!((-big).checked_sub(big), Err(DomainError::Validation(_))));
        assert!(matches!(Quantity::checked_sum([big, big, -big]), Err(DomainError::Validation(_))));
        assert_eq!(Quantity::checked_sum([big, -big]).unwrap(), Quantity::zero());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(Quantity::parse("three"), Err(DomainError::Validation(_))));
        assert!(matches!(Quantity::parse(""), Err(DomainError::Validation(_))));
    }

    #[test]
    fn from_decimal_accepts_trailing_zeros_beyond_scale() {
        // 2.000000 x 3.000000 carries scale 12 but is exactly representable.
        let product = dec!(2.000000) * dec!(3.000000);
        assert_eq!(Quantity::from_decimal(product).unwrap().to_string(), "6.000000");
    }

    #[test]
    fn round_is_half_to_even() {
        assert_eq!(Quantity::round(dec!(0.0000005)).unwrap().to_string(), "0.000000");
        assert_eq!(Quantity::round(dec!(0.0000015)).unwrap().to_string(), "0.000002");
    }

    #[test]
    fn ensure_positive_rejects_zero_and_negative() {
        assert!(matches!(
            Quantity::parse("0").unwrap().ensure_positive(),
            Err(DomainError::NonPositiveQuantity(_))
        ));
        assert!(matches!(
            Quantity::parse("-1").unwrap().ensure_positive(),
            Err(DomainError::NonPositiveQuantity(_))
        ));
    }

    #[test]
    fn negating_zero_stays_unsigned() {
        assert_eq!((-Quantity::zero()).to_string(), "0.000000");
    }

    #[test]
    fn factor_must_be_positive() {
        assert!(matches!(Factor::new(dec!(0)), Err(DomainError::NonPositiveFactor(_))));
        assert!(matches!(Factor::new(dec!(-2.5)), Err(DomainError::NonPositiveFactor(_))));
        assert_eq!(Factor::parse("1000").unwrap().as_decimal(), dec!(1000));
    }

    #[test]
    fn quantity_serializes_as_fixed_scale_string() {
        let q = Quantity::parse("4520").unwrap();
        assert_eq!(serde_json::to_string(&q).unwrap(), "\"4520.000000\"");
        let back: Quantity = serde_json::from_str("\"4520.000000\"").unwrap();
        assert_eq!(back, q);
    }

    proptest! {
        /// Summing quantities never loses precision: the sum of n copies of a
        /// micro-unit value is exactly n micro-units.
        #[test]
        fn sums_are_exact(micros in prop::collection::vec(-1_000_000_000i64..1_000_000_000i64, 0..50)) {
            let total = Quantity::checked_sum(
                micros.iter().map(|m| Quantity::from_decimal(Decimal::new(*m, 6)).unwrap()),
            )
            .unwrap();
            let expected: i64 = micros.iter().sum();
            prop_assert_eq!(total.as_decimal(), Decimal::new(expected, 6));
        }
    }
}
