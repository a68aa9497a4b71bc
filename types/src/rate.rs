//! Basis points and percentages.
//!
//! The engine's public contract speaks basis points. Percentages only appear
//! at the task-configuration edge (slash percentage) and must be converted
//! with [`Percent::to_bps`]; the two are distinct types so a raw percentage
//! can never be passed where basis points are expected.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RateError;

/// A fraction expressed in 1/100ths of a percent (10000 = 100%).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BasisPoints(u32);

impl BasisPoints {
    pub const MAX: u32 = 10_000;
    pub const ZERO: Self = Self(0);
    pub const FULL: Self = Self(Self::MAX);

    pub fn new(value: u32) -> Result<Self, RateError> {
        if value > Self::MAX {
            return Err(RateError::BasisPointsOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// Compile-time constructor; panics during const evaluation when out of range.
    pub const fn from_const(value: u32) -> Self {
        assert!(value <= Self::MAX, "basis points out of range");
        Self(value)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for BasisPoints {
    type Error = RateError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BasisPoints> for u32 {
    fn from(bps: BasisPoints) -> Self {
        bps.0
    }
}

impl fmt::Display for BasisPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

/// A whole percentage in `0..=100`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Percent(u8);

impl Percent {
    pub const ZERO: Self = Self(0);
    pub const HUNDRED: Self = Self(100);

    pub fn new(value: u32) -> Result<Self, RateError> {
        if value > 100 {
            return Err(RateError::PercentOutOfRange(value));
        }
        Ok(Self(value as u8))
    }

    pub const fn value(&self) -> u32 {
        self.0 as u32
    }

    pub const fn to_bps(self) -> BasisPoints {
        BasisPoints(self.0 as u32 * 100)
    }
}

impl TryFrom<u32> for Percent {
    type Error = RateError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Percent> for u32 {
    fn from(p: Percent) -> Self {
        p.value()
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basis_points_range_is_enforced() {
        assert!(BasisPoints::new(10_000).is_ok());
        assert_eq!(
            BasisPoints::new(10_001),
            Err(RateError::BasisPointsOutOfRange(10_001))
        );
    }

    #[test]
    fn percent_converts_to_bps() {
        assert_eq!(Percent::new(50).unwrap().to_bps(), BasisPoints::new(5_000).unwrap());
        assert_eq!(Percent::HUNDRED.to_bps(), BasisPoints::FULL);
        assert_eq!(Percent::new(101), Err(RateError::PercentOutOfRange(101)));
    }

    #[test]
    fn deserialization_validates_range() {
        assert!(serde_json::from_str::<BasisPoints>("300").is_ok());
        assert!(serde_json::from_str::<BasisPoints>("20000").is_err());
        assert!(serde_json::from_str::<Percent>("150").is_err());
    }
}
