//! # Decimal Amounts
//!
//! Every credit quantity, balance, and price in the ledger is a [`Dec`]: a
//! non-negative, exact decimal backed by `rust_decimal`. Amounts arrive as
//! strings (`"100"`, `"0.000001"`), are validated strictly, and are persisted
//! as strings again so that no precision is ever lost to a float or to a
//! binary encoding quirk.
//!
//! Arithmetic never rounds: a result that needs more than the 28 digits
//! `Decimal` carries fails with `InvalidAmount`. Subtraction is the dangerous
//! direction for a ledger, so [`Dec::checked_sub`] returns `Ok(None)` rather
//! than a negative value. Callers turn that `None` into the appropriate
//! `Insufficient*` error with the context they have.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{LedgerError, LedgerResult};

/// A non-negative exact decimal amount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Dec(Decimal);

impl Dec {
    pub const ZERO: Self = Self(Decimal::ZERO);
    pub const ONE: Self = Self(Decimal::ONE);

    /// Wraps a `Decimal`, rejecting negative values.
    pub fn from_decimal(value: Decimal) -> LedgerResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(LedgerError::InvalidAmount(format!(
                "amount must not be negative: {value}"
            )));
        }
        Ok(Self(value.normalize()))
    }

    /// Parses a plain decimal string (`digits` or `digits.digits`).
    ///
    /// Signs, exponents, whitespace and empty components are all rejected.
    /// Zero is accepted; use [`Dec::parse_positive`] where it is not.
    pub fn parse(s: &str) -> LedgerResult<Self> {
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (s, None),
        };
        let well_formed = !int_part.is_empty()
            && int_part.bytes().all(|b| b.is_ascii_digit())
            && frac_part.map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()));
        if !well_formed {
            return Err(LedgerError::InvalidAmount(format!(
                "expected a non-negative decimal, got {s:?}"
            )));
        }

        let inexact = || LedgerError::InvalidAmount(format!("cannot represent {s:?} exactly"));
        let value = Decimal::from_str(s).map_err(|_| inexact())?.normalize();
        // rust_decimal rounds digits beyond its 28-digit mantissa instead of
        // failing, so compare against the canonical form of the input.
        if value.to_string() != canonical(int_part, frac_part) {
            return Err(inexact());
        }
        Self::from_decimal(value)
    }

    /// Parses a strictly positive decimal.
    pub fn parse_positive(s: &str) -> LedgerResult<Self> {
        let value = Self::parse(s)?;
        if value.is_zero() {
            return Err(LedgerError::InvalidAmount(format!(
                "expected a positive decimal, got {s:?}"
            )));
        }
        Ok(value)
    }

    /// Parses a strictly positive decimal with at most `precision`
    /// fractional digits.
    pub fn parse_positive_with_precision(s: &str, precision: u32) -> LedgerResult<Self> {
        let value = Self::parse_positive(s)?;
        value.ensure_precision(precision)?;
        Ok(value)
    }

    /// Fails with `InvalidAmount` if this value has more than `precision`
    /// significant fractional digits.
    pub fn ensure_precision(&self, precision: u32) -> LedgerResult<()> {
        if self.decimal_places() > precision {
            return Err(LedgerError::InvalidAmount(format!(
                "{self} exceeds maximum decimal places: {precision}"
            )));
        }
        Ok(())
    }

    /// Returns the inner `Decimal`.
    pub fn inner(&self) -> Decimal {
        self.0
    }

    /// Number of significant fractional digits. `1.500` has one.
    pub fn decimal_places(&self) -> u32 {
        self.0.normalize().scale()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        !self.0.is_zero()
    }

    pub fn is_integer(&self) -> bool {
        self.0.fract().is_zero()
    }

    /// Adds two amounts. A sum that does not fit exactly is `InvalidAmount`.
    pub fn checked_add(&self, rhs: Dec) -> LedgerResult<Dec> {
        let scale = self.0.scale().max(rhs.0.scale());
        aligned(self.0, scale)
            .zip(aligned(rhs.0, scale))
            .and_then(|(a, b)| a.checked_add(b))
            .and_then(|m| exact(m, scale))
            .ok_or_else(|| LedgerError::InvalidAmount(format!("cannot add {rhs} to {self} exactly")))
    }

    /// Subtracts `rhs`. `Ok(None)` if the result would be negative; a
    /// difference that does not fit exactly is `InvalidAmount`.
    pub fn checked_sub(&self, rhs: Dec) -> LedgerResult<Option<Dec>> {
        if rhs.0 > self.0 {
            return Ok(None);
        }
        let scale = self.0.scale().max(rhs.0.scale());
        aligned(self.0, scale)
            .zip(aligned(rhs.0, scale))
            .and_then(|(a, b)| a.checked_sub(b))
            .and_then(|m| exact(m, scale))
            .map(Some)
            .ok_or_else(|| {
                LedgerError::InvalidAmount(format!("cannot subtract {rhs} from {self} exactly"))
            })
    }

    /// Multiplies two amounts. A product that does not fit exactly is
    /// `InvalidAmount`.
    pub fn checked_mul(&self, rhs: Dec) -> LedgerResult<Dec> {
        self.0
            .mantissa()
            .checked_mul(rhs.0.mantissa())
            .and_then(|m| exact(m, self.0.scale() + rhs.0.scale()))
            .ok_or_else(|| {
                LedgerError::InvalidAmount(format!("cannot multiply {self} by {rhs} exactly"))
            })
    }

    /// Multiplies by `10^exponent`.
    pub fn scale_up(&self, exponent: u32) -> LedgerResult<Dec> {
        self.checked_mul(Self::pow10(exponent)?)
    }

    /// Divides by `10^exponent`. Fails rather than drop digits.
    pub fn scale_down(&self, exponent: u32) -> LedgerResult<Dec> {
        self.0
            .scale()
            .checked_add(exponent)
            .and_then(|scale| exact(self.0.mantissa(), scale))
            .ok_or_else(|| LedgerError::InvalidAmount(format!("cannot scale {self} by 10^-{exponent}")))
    }

    fn pow10(exponent: u32) -> LedgerResult<Dec> {
        let mut value = Decimal::ONE;
        for _ in 0..exponent {
            value = value.checked_mul(Decimal::TEN).ok_or_else(|| {
                LedgerError::InvalidAmount(format!("exponent {exponent} out of range"))
            })?;
        }
        Ok(Dec(value))
    }
}

/// Mantissa of `value` rescaled to `scale` (never below its own scale).
fn aligned(value: Decimal, scale: u32) -> Option<i128> {
    10i128
        .checked_pow(scale - value.scale())
        .and_then(|factor| value.mantissa().checked_mul(factor))
}

/// Builds a normalized `Decimal` from `mantissa * 10^-scale`, or `None` if
/// it needs more than 96 bits of mantissa or 28 fractional digits.
fn exact(mut mantissa: i128, mut scale: u32) -> Option<Dec> {
    while scale > 0 && mantissa % 10 == 0 {
        mantissa /= 10;
        scale -= 1;
    }
    Decimal::try_from_i128_with_scale(mantissa, scale)
        .ok()
        .map(|v| Dec(v.normalize()))
}

/// `007.500` -> `7.5`, `0.0` -> `0`.
fn canonical(int_part: &str, frac_part: Option<&str>) -> String {
    let int_part = match int_part.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    match frac_part.map(|f| f.trim_end_matches('0')) {
        Some(frac) if !frac.is_empty() => format!("{int_part}.{frac}"),
        _ => int_part.to_string(),
    }
}

impl PartialOrd for Dec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl FromStr for Dec {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<u64> for Dec {
    fn from(value: u64) -> Self {
        Self(Decimal::from(value))
    }
}

// Serialized as a string in every format. bincode cannot drive
// `deserialize_any`, so the string form is read back explicitly.
impl Serialize for Dec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Dec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Dec::parse(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_plain_decimals() {
        assert_eq!(Dec::parse("100").unwrap().inner(), dec!(100));
        assert_eq!(Dec::parse("0.000001").unwrap().inner(), dec!(0.000001));
        assert_eq!(Dec::parse("0").unwrap(), Dec::ZERO);
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["", "-1", "+1", "1e5", ".5", "5.", "1.2.3", " 1", "abc", "1,0"] {
            assert!(Dec::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn rejects_values_that_would_round() {
        assert!(Dec::parse("0.12345678901234567890123456789").is_err());
        assert_eq!(Dec::parse("007.500").unwrap().to_string(), "7.5");
    }

    #[test]
    fn positive_rejects_zero() {
        assert!(Dec::parse_positive("0").is_err());
        assert!(Dec::parse_positive("0.000").is_err());
        assert!(Dec::parse_positive("0.1").is_ok());
    }

    #[test]
    fn precision_counts_significant_places() {
        assert_eq!(Dec::parse("1.500").unwrap().decimal_places(), 1);
        assert!(Dec::parse_positive_with_precision("1.123456", 6).is_ok());
        let err = Dec::parse_positive_with_precision("1.1234567", 6).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    }

    #[test]
    fn checked_sub_never_goes_negative() {
        let a = Dec::parse("10").unwrap();
        let b = Dec::parse("10.000001").unwrap();
        assert_eq!(a.checked_sub(b).unwrap(), None);
        assert_eq!(b.checked_sub(a).unwrap(), Some(Dec::parse("0.000001").unwrap()));
    }

    #[test]
    fn addition_refuses_to_round() {
        let big = Dec::parse("1000000000000000000000000000").unwrap();
        let dust = Dec::parse("0.000001").unwrap();
        let err = big.checked_add(dust).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));

        let sum = Dec::parse("1.5").unwrap().checked_add(Dec::parse("2.25").unwrap()).unwrap();
        assert_eq!(sum.to_string(), "3.75");
        let sum = Dec::parse("0.5").unwrap().checked_add(Dec::parse("0.5").unwrap()).unwrap();
        assert_eq!(sum, Dec::ONE);
    }

    #[test]
    fn subtraction_refuses_to_round() {
        let big = Dec::parse("1000000000000000000000000000").unwrap();
        let dust = Dec::parse("0.000001").unwrap();
        assert!(matches!(big.checked_sub(dust), Err(LedgerError::InvalidAmount(_))));
        assert_eq!(big.checked_sub(big).unwrap(), Some(Dec::ZERO));
    }

    #[test]
    fn multiplication_refuses_to_round() {
        let a = Dec::parse("1.000000000000000000000000001").unwrap();
        let b = Dec::parse("3.000000000000000000000000007").unwrap();
        assert!(matches!(a.checked_mul(b), Err(LedgerError::InvalidAmount(_))));

        let price = Dec::parse("2.5").unwrap().checked_mul(Dec::parse("0.4").unwrap()).unwrap();
        assert_eq!(price, Dec::ONE);
        let cost = Dec::parse("12.5").unwrap().checked_mul(Dec::parse("3.02").unwrap()).unwrap();
        assert_eq!(cost.to_string(), "37.75");
    }

    #[test]
    fn scale_down_refuses_to_drop_digits() {
        let fine = Dec::parse("0.1234567890123456789012345678").unwrap();
        assert!(fine.scale_down(1).is_err());
        let wide = Dec::parse("1234567890123456789012345678").unwrap();
        assert_eq!(wide.scale_down(6).unwrap().to_string(), "1234567890123456789012.345678");
        assert_eq!(
            Dec::parse("1000000000000000000000000000").unwrap().scale_down(27).unwrap(),
            Dec::ONE
        );
    }

    #[test]
    fn equality_ignores_trailing_zeros() {
        assert_eq!(Dec::parse("1.50").unwrap(), Dec::parse("1.5").unwrap());
        assert_eq!(Dec::parse("1.50").unwrap().to_string(), "1.5");
    }

    #[test]
    fn scaling_by_exponent() {
        let amount = Dec::parse("2.5").unwrap();
        assert_eq!(amount.scale_up(6).unwrap(), Dec::from(2_500_000));
        assert_eq!(Dec::from(2_500_000).scale_down(6).unwrap(), amount);
        assert!(Dec::from(1).scale_down(0).unwrap().is_integer());
    }

    #[test]
    fn serializes_as_string_in_json_and_bincode() {
        let amount = Dec::parse("123.456").unwrap();

        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"123.456\"");
        let back: Dec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);

        let bytes = bincode::serialize(&amount).unwrap();
        let back: Dec = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, amount);
    }

    #[test]
    fn deserialize_rejects_negative_strings() {
        assert!(serde_json::from_str::<Dec>("\"-5\"").is_err());
    }
}
