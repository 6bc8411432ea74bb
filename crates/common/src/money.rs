//! Money and percentage value objects.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A price or total, held as an integer number of cents.
///
/// Serialized as the bare number of cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn from_dollars(dollars: i64) -> Self {
        Self(dollars.saturating_mul(100))
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    /// Two-decimal view of the amount, `1234` cents being `12.34`.
    pub fn as_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Price of `quantity` units after taking `discount` off, rounded to the
    /// cent with midpoints away from zero.
    pub fn discounted(self, quantity: u32, discount: Percentage) -> Money {
        let gross = Decimal::from(self.0) * Decimal::from(quantity);
        let net = gross * (Decimal::ONE_HUNDRED - discount.value()) / Decimal::ONE_HUNDRED;
        let cents = net.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        Money(cents.to_i64().unwrap_or(i64::MAX))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.as_decimal())
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        Money(self.0 + other.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |total, amount| total + amount)
    }
}

/// Rejected percentage value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("percentage must be between 0 and 100 with at most two decimals, got {0}")]
pub struct PercentageError(pub Decimal);

/// A discount percentage in `[0, 100]` with at most two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub fn new(value: Decimal) -> Result<Self, PercentageError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED || value.scale() > 2 {
            return Err(PercentageError(value));
        }
        Ok(Self(value.normalize()))
    }

    /// Whole-number percentage, clamped to 100.
    pub fn whole(value: u32) -> Self {
        Self(Decimal::from(value.min(100)))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl Default for Percentage {
    fn default() -> Self {
        Self::zero()
    }
}

impl TryFrom<Decimal> for Percentage {
    type Error = PercentageError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percentage> for Decimal {
    fn from(p: Percentage) -> Self {
        p.0
    }
}

impl std::fmt::Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_displays_two_decimals() {
        let price = Money::from_cents(1234);
        assert_eq!(price.to_string(), "12.34");
        assert_eq!(Money::from_dollars(230).to_string(), "230.00");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
        assert_eq!(price.as_decimal(), Decimal::new(1234, 2));
    }

    #[test]
    fn money_serializes_as_cents() {
        let json = serde_json::to_string(&Money::from_dollars(3)).unwrap();
        assert_eq!(json, "300");
    }

    #[test]
    fn money_sum() {
        let total: Money = [Money::from_cents(18000), Money::from_cents(5000)]
            .into_iter()
            .sum();
        assert_eq!(total, Money::from_dollars(230));
    }

    #[test]
    fn discounted_applies_percentage() {
        let price = Money::from_dollars(100);
        assert_eq!(price.discounted(2, Percentage::whole(10)).cents(), 18000);
        assert_eq!(price.discounted(1, Percentage::zero()).cents(), 10000);
        assert_eq!(price.discounted(3, Percentage::whole(100)).cents(), 0);
    }

    #[test]
    fn discounted_rounds_midpoint_away_from_zero() {
        // 0.25 * 1 * 0.9 = 0.225 -> 0.23
        let price = Money::from_cents(25);
        assert_eq!(price.discounted(1, Percentage::whole(10)).cents(), 23);

        // 3.33 * 3 * 0.85 = 8.4915 -> 8.49
        let price = Money::from_cents(333);
        assert_eq!(price.discounted(3, Percentage::whole(15)).cents(), 849);
    }

    #[test]
    fn percentage_bounds() {
        assert!(Percentage::new(Decimal::new(-1, 0)).is_err());
        assert!(Percentage::new(Decimal::new(10001, 2)).is_err());
        assert!(Percentage::new(Decimal::new(12345, 3)).is_err());
        assert_eq!(
            Percentage::new(Decimal::new(1250, 2)).unwrap().value(),
            Decimal::new(125, 1)
        );
        assert_eq!(Percentage::whole(250).value(), Decimal::ONE_HUNDRED);
    }

    #[test]
    fn percentage_rejects_out_of_range_on_deserialize() {
        let ok: Percentage = serde_json::from_str("\"20\"").unwrap();
        assert_eq!(ok, Percentage::whole(20));
        assert!(serde_json::from_str::<Percentage>("\"120\"").is_err());
    }
}
