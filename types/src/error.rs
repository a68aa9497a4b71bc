//! Errors raised while constructing or combining fundamental types.

use thiserror::Error;

use crate::amount::Amount;

/// Failures of fixed-point decimal parsing and arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("malformed decimal amount: {0:?}")]
    Malformed(String),

    #[error("amount {0:?} has more than 18 fractional digits")]
    TooPrecise(String),

    #[error("amount overflow")]
    Overflow,

    #[error("{minuend} - {subtrahend} would be negative")]
    Underflow { minuend: Amount, subtrahend: Amount },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateError {
    #[error("basis points must be within 0..=10000, got {0}")]
    BasisPointsOutOfRange(u32),

    #[error("percentage must be within 0..=100, got {0}")]
    PercentOutOfRange(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown chain symbol: {0:?}")]
    UnknownChain(String),

    #[error("invalid {kind} id: {value:?}")]
    InvalidId { kind: &'static str, value: String },
}
