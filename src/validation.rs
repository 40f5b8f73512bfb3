//! Field validation for invoice and premise records
//!
//! FURS rejects malformed fields with a generic schema error, so the client
//! checks the common ones before anything is signed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

const TAX_NUMBER_MIN: u32 = 10_000_000;
const TAX_NUMBER_MAX: u32 = 99_999_999;

/// Check an 8-digit Slovenian tax number
pub fn tax_number(field: &str, value: u32) -> Result<u32> {
    if (TAX_NUMBER_MIN..=TAX_NUMBER_MAX).contains(&value) {
        Ok(value)
    } else {
        Err(Error::InvalidInput(format!(
            "{} must be a number between {} and {}; instead, it is {}",
            field, TAX_NUMBER_MIN, TAX_NUMBER_MAX, value
        )))
    }
}

/// Parse a tax number, accepting an optional `SI` prefix (any case)
pub fn parse_tax_number(field: &str, value: &str) -> Result<u32> {
    let digits = match (value.len(), value.get(..2), value.get(2..)) {
        (10, Some(prefix), Some(rest)) if prefix.eq_ignore_ascii_case("si") => rest,
        _ => value,
    };

    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidInput(format!(
            "{} must be 8 digits, optionally prefixed with SI; instead, it is {:?}",
            field, value
        )));
    }

    let number = digits
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{} is not a number: {:?}", field, value)))?;
    tax_number(field, number)
}

/// Premise, device and similar identifiers: 1 to 20 of `0-9a-zA-Z`
pub fn identifier(field: &str, value: &str) -> Result<()> {
    check_length(field, value, 1, 20)?;
    if !value.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(Error::InvalidInput(format!(
            "{} may only contain 0-9, a-z and A-Z: {:?}",
            field, value
        )));
    }
    Ok(())
}

/// Free-form text with a length limit
pub fn text(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    check_length(field, value, min, max)
}

/// Protective mark (ZOI): 32 hex characters
pub fn protected_id(value: &str) -> Result<()> {
    check_length("protectedId", value, 32, 32)?;
    if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidInput(format!(
            "protectedId must be hexadecimal: {:?}",
            value
        )));
    }
    Ok(())
}

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(Error::InvalidInput(format!(
            "Length of {} must be between {} and {}, but is {}",
            field, min, max, len
        )));
    }
    Ok(())
}

/// Monetary amount with exactly two decimals, at most 14 integer digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

/// Tax rate in percent with two decimals, at most 5 integer digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TaxRate(i64);

macro_rules! fixed_point {
    ($ty:ident, $name:literal, $max_hundredths:expr) => {
        impl $ty {
            pub const MAX_HUNDREDTHS: i64 = $max_hundredths;

            /// Value in hundredths (cents for amounts, basis points for rates)
            pub fn from_hundredths(hundredths: i64) -> Result<Self> {
                if hundredths.unsigned_abs() > Self::MAX_HUNDREDTHS as u64 {
                    return Err(Error::InvalidInput(format!(
                        "{} ({}) is out of range",
                        $name,
                        format_hundredths(hundredths)
                    )));
                }
                Ok(Self(hundredths))
            }

            pub fn hundredths(&self) -> i64 {
                self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&format_hundredths(self.0))
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::from_hundredths(parse_hundredths($name, s)?)
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serde_json::Number::from_str(&self.to_string())
                    .map_err(serde::ser::Error::custom)?
                    .serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let number = serde_json::Number::deserialize(deserializer)?;
                number
                    .to_string()
                    .parse()
                    .map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_point!(Amount, "amount", 9_999_999_999_999_999);
fixed_point!(TaxRate, "taxRate", 9_999_999);

fn format_hundredths(hundredths: i64) -> String {
    let sign = if hundredths < 0 { "-" } else { "" };
    let abs = hundredths.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parse a plain decimal; digits past the second decimal must be zero
fn parse_hundredths(field: &str, s: &str) -> Result<i64> {
    let invalid = || Error::InvalidInput(format!("{} is not a valid decimal: {:?}", field, s));

    let (negative, unsigned) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac_part.len() > 2 && frac_part[2..].bytes().any(|b| b != b'0') {
        return Err(Error::InvalidInput(format!(
            "{} ({}) has too many decimals",
            field, s
        )));
    }

    let mut cents = String::from(&frac_part[..frac_part.len().min(2)]);
    while cents.len() < 2 {
        cents.push('0');
    }

    let whole: i64 = int_part.parse().map_err(|_| invalid())?;
    let cents: i64 = cents.parse().map_err(|_| invalid())?;
    let value = whole
        .checked_mul(100)
        .and_then(|v| v.checked_add(cents))
        .ok_or_else(invalid)?;

    Ok(if negative { -value } else { value })
}
