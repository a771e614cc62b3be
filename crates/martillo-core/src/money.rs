//! # Money Module
//!
//! Fixed-point numeric types for fiscal documents.
//!
//! ## Why Fixed Point?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    10 / 1.18 = 8.474576271186441  (and 8.474576 × 1.18 ≠ 10.00)         │
//! │                                                                         │
//! │  OUR SOLUTION: three integer scales                                     │
//! │    Money         i64 céntimos        (2 decimals, totals)               │
//! │    Quantity      i64 thousandths     (3 decimals, 2.5 m of cable)       │
//! │    NetUnitValue  i64 micro-soles     (6 decimals, valor_unitario)       │
//! │                                                                         │
//! │  Rounding happens exactly once per conversion, half away from zero.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use martillo_core::money::{Money, Quantity};
//!
//! let price = Money::from_cents(1099); // S/ 10.99
//! let line = price.multiply_quantity(Quantity::from_units(3));
//! assert_eq!(line.cents(), 3297);
//! assert_eq!(line.to_decimal_string(), "32.97");
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::TaxRate;

/// Thousandths per unit of quantity.
pub const QUANTITY_SCALE: i64 = 1_000;

/// Micro-units per sol for net unit values.
pub const NET_VALUE_SCALE: i64 = 1_000_000;

/// Integer division rounding half away from zero.
fn div_round(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if (numerator < 0) != (denominator < 0) {
        (numerator - half) / denominator
    } else {
        (numerator + half) / denominator
    }
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in céntimos (1/100 of a sol).
///
/// ## Where Money is Used
/// ```text
/// CartLine.unit_price_gross ──► line total ──► document total ──► "total"
///                                                   │
///                                                   └──► taxable base + IGV
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from céntimos.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from soles and céntimos.
    ///
    /// ## Example
    /// ```rust
    /// use martillo_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in céntimos.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole soles portion.
    #[inline]
    pub const fn soles(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the céntimos portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Calculates tax on a tax-exclusive amount.
    ///
    /// ## Example
    /// ```rust
    /// use martillo_core::money::Money;
    /// use martillo_core::types::TaxRate;
    ///
    /// let base = Money::from_cents(1000);
    /// assert_eq!(base.calculate_tax(TaxRate::from_bps(1800)).cents(), 180);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        let tax = div_round(self.0 as i128 * rate.bps() as i128, 10_000);
        Money::from_cents(tax as i64)
    }

    /// Extracts the taxable base from a tax-inclusive amount.
    ///
    /// `base = round(amount / (1 + rate))`; the tax is whatever remains,
    /// so `base + tax` always equals the original amount exactly.
    ///
    /// ## Example
    /// ```rust
    /// use martillo_core::money::Money;
    /// use martillo_core::types::TaxRate;
    ///
    /// let total = Money::from_cents(3000);
    /// let base = total.taxable_base(TaxRate::from_bps(1800));
    /// assert_eq!(base.cents(), 2542);
    /// assert_eq!((total - base).cents(), 458);
    /// ```
    pub fn taxable_base(&self, rate: TaxRate) -> Money {
        let base = div_round(self.0 as i128 * 10_000, 10_000 + rate.bps() as i128);
        Money::from_cents(base as i64)
    }

    /// Converts a tax-inclusive unit price to its tax-exclusive unit value
    /// with six decimals.
    pub fn net_unit_value(&self, rate: TaxRate) -> NetUnitValue {
        // céntimos → micro-soles is ×10⁴, dividing by (1 + bps/10⁴) is ×10⁴/(10⁴ + bps)
        let micros = div_round(
            self.0 as i128 * 100_000_000,
            10_000 + rate.bps() as i128,
        );
        NetUnitValue::from_micros(micros as i64)
    }

    /// Multiplies a unit price by a (possibly fractional) quantity,
    /// rounding to the céntimo.
    ///
    /// ## Example
    /// ```rust
    /// use martillo_core::money::{Money, Quantity};
    ///
    /// let per_metre = Money::from_cents(350);
    /// let qty: Quantity = "2.5".parse().unwrap();
    /// assert_eq!(per_metre.multiply_quantity(qty).cents(), 875);
    /// ```
    pub fn multiply_quantity(&self, qty: Quantity) -> Money {
        let cents = div_round(self.0 as i128 * qty.milli() as i128, QUANTITY_SCALE as i128);
        Money::from_cents(cents as i64)
    }

    /// Formats the amount as a plain two-decimal string (`"30.00"`), the
    /// representation the fiscal API expects.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, self.soles().abs(), self.cents_part())
    }
}

/// Display shows soles with the currency symbol (`S/ 10.99`).
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S/ {}", self.to_decimal_string())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// A sold quantity in thousandths of a unit.
///
/// Hardware stores sell by the metre and by the kilo, so quantities are not
/// always whole. On the wire a quantity is a decimal string (`"2.5"`);
/// deserialization also accepts a bare JSON integer (`3`). Fields of this
/// type are exported to TypeScript as `string`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(i64);

impl Quantity {
    /// Creates a quantity of whole units.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * QUANTITY_SCALE)
    }

    /// Creates a quantity from thousandths.
    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        Quantity(milli)
    }

    /// Returns the quantity in thousandths.
    #[inline]
    pub const fn milli(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_whole(&self) -> bool {
        self.0 % QUANTITY_SCALE == 0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        let whole = abs / QUANTITY_SCALE;
        let frac = abs % QUANTITY_SCALE;
        if frac == 0 {
            write!(f, "{}{}", sign, whole)
        } else {
            let digits = format!("{:03}", frac);
            write!(f, "{}{}.{}", sign, whole, digits.trim_end_matches('0'))
        }
    }
}

impl FromStr for Quantity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "quantity".to_string(),
            reason: reason.to_string(),
        };

        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("empty"));
        }
        if frac.len() > 3 {
            return Err(invalid("at most 3 decimals"));
        }
        if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid("not a decimal number"));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("too large"))?
        };
        let frac: i64 = format!("{:0<3}", frac).parse().unwrap_or(0);

        let milli = whole
            .checked_mul(QUANTITY_SCALE)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(|| invalid("too large"))?;

        Ok(Quantity(if negative { -milli } else { milli }))
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Units(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Units(units) => Ok(Quantity::from_units(units)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

// =============================================================================
// Net Unit Value
// =============================================================================

/// A tax-exclusive unit value in micro-soles (six decimals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NetUnitValue(i64);

impl NetUnitValue {
    #[inline]
    pub const fn from_micros(micros: i64) -> Self {
        NetUnitValue(micros)
    }

    #[inline]
    pub const fn micros(&self) -> i64 {
        self.0
    }
}

/// Always six decimals, as sent in `valor_unitario`.
impl fmt::Display for NetUnitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(
            f,
            "{}{}.{:06}",
            sign,
            abs / NET_VALUE_SCALE,
            abs % NET_VALUE_SCALE
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.soles(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "S/ 10.99");
        assert_eq!(Money::from_cents(-550).to_string(), "S/ -5.50");
        assert_eq!(Money::from_cents(3000).to_decimal_string(), "30.00");
        assert_eq!(Money::zero().to_decimal_string(), "0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);
        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_net_unit_value_six_decimals() {
        let rate = TaxRate::from_bps(1800);
        assert_eq!(Money::from_cents(1000).net_unit_value(rate).micros(), 8_474_576);
        assert_eq!(Money::from_cents(1000).net_unit_value(rate).to_string(), "8.474576");
        assert_eq!(Money::from_cents(118).net_unit_value(rate).to_string(), "1.000000");
        assert_eq!(Money::from_cents(1000).net_unit_value(TaxRate::zero()).to_string(), "10.000000");
    }

    #[test]
    fn test_taxable_base_and_tax_sum_to_total() {
        let rate = TaxRate::from_bps(1800);
        for cents in [1, 99, 1000, 3000, 12_345, 999_999] {
            let total = Money::from_cents(cents);
            let base = total.taxable_base(rate);
            let tax = total - base;
            assert_eq!((base + tax).cents(), cents);
            // tax is within a céntimo of 18% of the base
            assert!((tax.cents() - base.calculate_tax(rate).cents()).abs() <= 1);
        }
    }

    #[test]
    fn test_multiply_fractional_quantity() {
        let price = Money::from_cents(333);
        assert_eq!(price.multiply_quantity(Quantity::from_units(3)).cents(), 999);
        assert_eq!(price.multiply_quantity(Quantity::from_milli(1500)).cents(), 500);
        assert_eq!(price.multiply_quantity(Quantity::from_milli(250)).cents(), 83);
    }

    #[test]
    fn test_quantity_parse_and_display() {
        let q: Quantity = "2.5".parse().unwrap();
        assert_eq!(q.milli(), 2500);
        assert_eq!(q.to_string(), "2.5");
        assert_eq!(Quantity::from_units(3).to_string(), "3");
        assert_eq!("0.125".parse::<Quantity>().unwrap().milli(), 125);
        assert_eq!(".5".parse::<Quantity>().unwrap().milli(), 500);

        assert!("1.2345".parse::<Quantity>().is_err());
        assert!("abc".parse::<Quantity>().is_err());
        assert!("".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_quantity_serde_accepts_integers_and_strings() {
        let q: Quantity = serde_json::from_str("3").unwrap();
        assert_eq!(q, Quantity::from_units(3));
        let q: Quantity = serde_json::from_str("\"1.75\"").unwrap();
        assert_eq!(q.milli(), 1750);
        assert_eq!(serde_json::to_string(&q).unwrap(), "\"1.75\"");
    }
}
