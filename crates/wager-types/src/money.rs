//! Money is always represented as integer hundredths of the asset unit.
//!
//! Conversion to/from the provider's decimal representation is confined
//! to this module so the rest of the engine never touches floating point.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use thiserror::Error;

/// An amount in integer hundredths of an asset unit (e.g. USDT cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cents(pub i64);

#[derive(Debug, Error)]
pub enum MoneyError {
    #[error("amount must be positive, got {0}")]
    NotPositive(i64),
    #[error("decimal amount '{0}' has more than two fractional digits")]
    TooManyFractionalDigits(String),
    #[error("decimal amount '{0}' is not a valid number")]
    InvalidDecimal(String),
}

impl Cents {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn positive(value: i64) -> Result<Self, MoneyError> {
        if value <= 0 {
            return Err(MoneyError::NotPositive(value));
        }
        Ok(Self(value))
    }

    /// Parses a provider decimal string (e.g. `"12.50"`) into cents.
    /// Rejects inputs with more than two fractional digits.
    pub fn from_decimal_str(s: &str) -> Result<Self, MoneyError> {
        let s = s.trim();
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if frac_part.len() > 2 {
            return Err(MoneyError::TooManyFractionalDigits(s.to_string()));
        }
        let sign = if int_part.starts_with('-') { -1 } else { 1 };
        let int_part = int_part.trim_start_matches('-');
        let int_val: i64 = int_part
            .parse()
            .map_err(|_| MoneyError::InvalidDecimal(s.to_string()))?;
        let padded_frac = format!("{:0<2}", frac_part);
        let frac_val: i64 = if padded_frac.is_empty() {
            0
        } else {
            padded_frac
                .parse()
                .map_err(|_| MoneyError::InvalidDecimal(s.to_string()))?
        };
        Ok(Self(sign * (int_val * 100 + frac_val)))
    }

    /// Renders the amount as a two-decimal-digit provider decimal string.
    pub fn to_decimal_string(self) -> String {
        let negative = self.0 < 0;
        let abs = self.0.unsigned_abs();
        let whole = abs / 100;
        let frac = abs % 100;
        format!("{}{}.{:02}", if negative { "-" } else { "" }, whole, frac)
    }

    pub fn floor_fraction(self, pct: f64) -> Self {
        Cents(((self.0 as f64) * pct).floor() as i64)
    }
}

impl Add for Cents {
    type Output = Cents;
    fn add(self, rhs: Self) -> Self::Output {
        Cents(self.0 + rhs.0)
    }
}

impl Sub for Cents {
    type Output = Cents;
    fn sub(self, rhs: Self) -> Self::Output {
        Cents(self.0 - rhs.0)
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Cents(0), Add::add)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_fractional_digits() {
        assert_eq!(Cents::from_decimal_str("12.50").unwrap(), Cents(1250));
        assert_eq!(Cents::from_decimal_str("12").unwrap(), Cents(1200));
        assert_eq!(Cents::from_decimal_str("0.01").unwrap(), Cents(1));
    }

    #[test]
    fn rejects_extra_fractional_digits() {
        assert!(Cents::from_decimal_str("12.505").is_err());
    }

    #[test]
    fn round_trips_through_decimal_string() {
        let c = Cents(1999);
        let s = c.to_decimal_string();
        assert_eq!(s, "19.99");
        assert_eq!(Cents::from_decimal_str(&s).unwrap(), c);
    }

    #[test]
    fn fee_floor_matches_spec_example() {
        // total = 2000 cents, FEE_PCT = 0.10 -> fee 200, payout 1800
        let total = Cents(2000);
        let fee = total.floor_fraction(0.10);
        assert_eq!(fee, Cents(200));
        assert_eq!((total - fee).0, 1800);
    }
}
