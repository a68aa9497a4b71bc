//! Fixed-point decimal amounts.
//!
//! Every monetary value in the engine is an [`Amount`]: a non-negative integer
//! of raw units scaled by 10^18. Amounts enter and leave the system only as
//! canonical base-10 strings (`"0.05"`, `"100"`), never as binary floats.
//!
//! Division only happens in [`Amount::multiply_by_bps`], which floors. The
//! sub-unit remainder ("dust") is dropped and belongs to nobody; callers that
//! need an exact split use [`Amount::split_bps`], which hands the remainder
//! to the second part so that both parts always sum to the original.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::AmountError;
use crate::rate::BasisPoints;

/// Number of fractional decimal digits carried by an [`Amount`].
pub const FRACTION_DIGITS: usize = 18;

/// Raw units per whole unit (10^18).
pub const SCALE: u128 = 1_000_000_000_000_000_000;

/// A non-negative decimal quantity stored as raw units (u128) for precision.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Self = Self(0);

    /// Build an amount from raw (already scaled) units.
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Build an amount from whole units.
    pub const fn from_units(units: u64) -> Self {
        Self(units as u128 * SCALE)
    }

    pub const fn raw(&self) -> u128 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parse a decimal string into scaled units.
    ///
    /// Accepts `digits` or `digits.digits` with at most 18 fractional digits.
    /// Signs, whitespace, exponents and bare or trailing dots are rejected.
    pub fn parse(s: &str) -> Result<Self, AmountError> {
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        let (int_part, frac_part) = match s.split_once('.') {
            Some((int_part, frac_part)) => (int_part, Some(frac_part)),
            None => (s, None),
        };
        if !is_digits(int_part) {
            return Err(AmountError::Malformed(s.to_string()));
        }

        let mut whole: u128 = 0;
        for digit in int_part.bytes() {
            whole = whole
                .checked_mul(10)
                .and_then(|w| w.checked_add(u128::from(digit - b'0')))
                .ok_or(AmountError::Overflow)?;
        }
        let mut raw = whole.checked_mul(SCALE).ok_or(AmountError::Overflow)?;

        if let Some(frac_part) = frac_part {
            if !is_digits(frac_part) {
                return Err(AmountError::Malformed(s.to_string()));
            }
            if frac_part.len() > FRACTION_DIGITS {
                return Err(AmountError::TooPrecise(s.to_string()));
            }
            let mut frac: u128 = 0;
            for digit in frac_part.bytes() {
                frac = frac * 10 + u128::from(digit - b'0');
            }
            frac *= 10u128.pow((FRACTION_DIGITS - frac_part.len()) as u32);
            raw = raw.checked_add(frac).ok_or(AmountError::Overflow)?;
        }

        Ok(Self(raw))
    }

    pub fn checked_add(self, other: Self) -> Result<Self, AmountError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(AmountError::Overflow)
    }

    /// Subtract, failing instead of clamping when the result would be negative.
    pub fn checked_sub(self, other: Self) -> Result<Self, AmountError> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(AmountError::Underflow {
                minuend: self,
                subtrahend: other,
            })
    }

    /// `floor(self * bps / 10000)`.
    ///
    /// Computed as `q * bps + floor(r * bps / 10000)` with `self = q * 10000 + r`,
    /// which is exact and cannot overflow for any `bps <= 10000`.
    pub fn multiply_by_bps(self, bps: BasisPoints) -> Self {
        let denom = u128::from(BasisPoints::MAX);
        let bps = u128::from(bps.value());
        let q = self.0 / denom;
        let r = self.0 % denom;
        Self(q * bps + (r * bps) / denom)
    }

    /// Split into `(floor(self * bps / 10000), rest)`; the parts always sum to `self`.
    pub fn split_bps(self, bps: BasisPoints) -> (Self, Self) {
        let part = self.multiply_by_bps(bps);
        (part, Self(self.0 - part.0))
    }

    /// Sum a sequence of amounts, failing on overflow.
    pub fn checked_sum<I>(amounts: I) -> Result<Self, AmountError>
    where
        I: IntoIterator<Item = Self>,
    {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, amount| acc.checked_add(amount))
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Canonical rendering: trailing fractional zeros are trimmed and whole
/// values carry no decimal point.
impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE;
        let frac = self.0 % SCALE;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:018}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({self})")
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
