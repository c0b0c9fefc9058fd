//! Records flowing through the pipeline.
//!
//! Money is carried as a fixed-point decimal so that derived totals are exact:
//! `total_cost == unit_cost * quantity` holds bit for bit, with no float drift.

use bigdecimal::{num_bigint::BigInt, BigDecimal, RoundingMode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits stored by [`Money`].
pub const MONEY_SCALE: i64 = 4;

/// Fixed-point decimal with four fractional digits.
///
/// Values are bounded by `i64::MAX` ten-thousandths in magnitude; anything
/// larger is rejected at parse time or reported as overflow by
/// [`Money::checked_mul`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Money(BigDecimal);

impl Money {
    /// Build from whole cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(BigDecimal::new(BigInt::from(cents), 2).with_scale(MONEY_SCALE))
    }

    /// Normalize to the fixed scale. `None` if the value needs more than four
    /// fractional digits or falls outside the representable range.
    fn from_decimal(value: BigDecimal) -> Option<Self> {
        let scaled = value.with_scale(MONEY_SCALE);
        if scaled != value || scaled.abs() > Self::max_magnitude() {
            return None;
        }
        Some(Self(scaled))
    }

    fn max_magnitude() -> BigDecimal {
        BigDecimal::new(BigInt::from(i64::MAX), MONEY_SCALE)
    }

    /// Exact multiplication by a quantity. `None` on overflow.
    pub fn checked_mul(&self, quantity: u64) -> Option<Money> {
        Self::from_decimal(&self.0 * BigDecimal::from(quantity))
    }
}

/// Error returned when a decimal string cannot be read as [`Money`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid decimal '{0}'")]
pub struct MoneyParseError(pub String);

impl FromStr for Money {
    type Err = MoneyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || MoneyParseError(s.to_string());
        let trimmed = s.trim();

        // Plain positional notation only, no exponents
        if !trimmed.bytes().any(|b| b.is_ascii_digit()) || trimmed.bytes().any(|b| matches!(b, b'e' | b'E')) {
            return Err(err());
        }

        let value = BigDecimal::from_str(trimmed).map_err(|_| err())?;
        Self::from_decimal(value).ok_or_else(err)
    }
}

impl TryFrom<String> for Money {
    type Error = MoneyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Money> for String {
    fn from(money: Money) -> Self {
        money.0.to_string()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cents = self.0.with_scale_round(2, RoundingMode::HalfUp);
        // Route through pad so width/alignment flags in report rows apply
        f.pad(&cents.to_string())
    }
}

/// One row of the reference product catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub part_number: String,
    pub unit_cost: Money,
    pub unit_price: Money,
}

/// One transactional order as read from the order source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderRecord {
    pub customer_id: i64,
    pub part_number: String,
    pub quantity: u64,
}

/// An order joined against its catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnrichedOrder {
    pub order: OrderRecord,
    pub unit_cost: Money,
    pub unit_price: Money,
    pub total_cost: Money,
    pub total_price: Money,
}

impl EnrichedOrder {
    /// Join an order with its catalog entry, deriving the totals.
    ///
    /// Returns `None` if a total overflows the fixed-point range.
    pub fn from_lookup(order: OrderRecord, entry: &CatalogEntry) -> Option<Self> {
        let total_cost = entry.unit_cost.checked_mul(order.quantity)?;
        let total_price = entry.unit_price.checked_mul(order.quantity)?;
        Some(Self {
            order,
            unit_cost: entry.unit_cost.clone(),
            unit_price: entry.unit_price.clone(),
            total_cost,
            total_price,
        })
    }

    pub fn part_number(&self) -> &str {
        &self.order.part_number
    }

    pub fn quantity(&self) -> u64 {
        self.order.quantity
    }
}
