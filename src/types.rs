//! Core data types shared across the trading engine

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A-share ticker symbol using `Arc<str>` for cheap cloning.
///
/// Symbols are frequently cloned when passed between the ledger, the
/// order book and the matching engine. Using `Arc<str>` instead of
/// `String` reduces heap allocations from O(n) to O(1) per clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for `Arc<str>`
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exchange market code used to build the Eastmoney `secid` query
    /// parameter: `1` for Shanghai (`sh`-prefixed), `0` for Shenzhen
    /// (`sz`-prefixed). Any other prefix defaults to Shenzhen.
    pub fn market_code(&self) -> &'static str {
        if self.0.starts_with("sh") {
            "1"
        } else {
            "0"
        }
    }

    /// The bare numeric code with the exchange prefix stripped, as used
    /// in the `secid` parameter (`<market>.<code>`).
    pub fn code(&self) -> &str {
        self.0.get(2..).unwrap_or(&self.0)
    }

    /// A well-formed symbol is a two-character exchange prefix (`sh` or
    /// `sz`) followed by a non-empty, all-numeric ticker.
    pub fn is_well_formed(&self) -> bool {
        let prefix = self.0.get(..2);
        let ticker = self.0.get(2..);
        matches!(prefix, Some("sh") | Some("sz"))
            && matches!(ticker, Some(t) if !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()))
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

// ============================================================================
// Money - Precise Decimal Arithmetic for Monetary Values
// ============================================================================

use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// Money type for precise decimal arithmetic in monetary calculations.
///
/// Wraps `rust_decimal::Decimal` to prevent floating-point drift in cash
/// and position accounting. Use this type for all monetary values:
/// prices, cash balances, fees, and P&L.
///
/// # Why Money instead of f64?
/// `0.1 + 0.2 != 0.3` in f64. Over thousands of fills, ledger cash would
/// drift from the sum of its trade journal, breaking reconciliation.
///
/// # Example
/// ```
/// use ashare_paper_trader::Money;
/// let price = Money::from_f64(100.50);
/// let qty = Money::from_f64(2.0);
/// let total = price * qty;
/// assert_eq!(total.to_f64(), 201.0);
/// ```
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Money {
    /// Zero value
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// One value
    pub const ONE: Money = Money(Decimal::ONE);

    /// Create from f64 (for API and config boundary conversions)
    pub fn from_f64(value: f64) -> Self {
        Money(Decimal::try_from(value).unwrap_or_else(|_| {
            if value.is_nan() || value.is_infinite() {
                Decimal::ZERO
            } else {
                Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO)
            }
        }))
    }

    /// Convert to f64 (for display and serialization to external systems)
    pub fn to_f64(self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.0.to_f64().unwrap_or(0.0)
    }

    /// Create from a whole share/lot count
    pub fn from_i64(value: i64) -> Self {
        Money(Decimal::from(value))
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative()
    }

    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }

    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    pub fn round_dp(self, dp: u32) -> Self {
        Money(self.0.round_dp(dp))
    }

    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::hash::Hash for Money {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Mul for Money {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        Money(self.0 * rhs.0)
    }
}

impl Div for Money {
    type Output = Self;
    fn div(self, rhs: Self) -> Self::Output {
        if rhs.0.is_zero() {
            Money::ZERO
        } else {
            Money(self.0 / rhs.0)
        }
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl From<f64> for Money {
    fn from(value: f64) -> Self {
        Money::from_f64(value)
    }
}

impl From<Money> for f64 {
    fn from(value: Money) -> Self {
        value.to_f64()
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Money::from_i64(value)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

impl<'a> std::iter::Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + *x)
    }
}

// ============================================================================
// Lots, positions, fills, equity samples
// ============================================================================

/// A single buy fill's quantity, cost price and acquisition date.
/// Consumed oldest-first on sale (FIFO), per [`crate::ledger::Ledger`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub quantity: u64,
    pub cost_price: Money,
    pub acquired_on: NaiveDate,
}

/// Derived, read-only view over a symbol's open lots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub total_quantity: u64,
    pub frozen_quantity: u64,
    pub average_cost: Money,
    pub earliest_acquired_on: Option<NaiveDate>,
}

impl Position {
    pub fn available_quantity(&self) -> u64 {
        self.total_quantity.saturating_sub(self.frozen_quantity)
    }

    pub fn market_value(&self, price: Money) -> Money {
        price * Money::from_i64(self.total_quantity as i64)
    }

    pub fn unrealized_pnl(&self, price: Money) -> Money {
        (price - self.average_cost) * Money::from_i64(self.total_quantity as i64)
    }
}

/// A completed buy or sell fill, appended to the trade journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: u64,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Money,
    pub quantity: u64,
    pub fee: Money,
    pub realized_pnl: Money,
    pub filled_at: DateTime<Utc>,
}

/// A point on the account equity curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquitySample {
    pub at: DateTime<Utc>,
    pub cash: Money,
    pub stock_value: Money,
    pub total_assets: Money,
}
