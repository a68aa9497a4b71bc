//! Fundamental types for the bounty engine.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! fixed-point amounts, basis points and percentages, chains, ledger owners,
//! identifiers, timestamps, and protocol parameters.

pub mod amount;
pub mod chain;
pub mod error;
pub mod ids;
pub mod owner;
pub mod params;
pub mod rate;
pub mod time;

pub use amount::{Amount, FRACTION_DIGITS, SCALE};
pub use chain::Chain;
pub use error::{AmountError, ParseError, RateError};
pub use ids::{EntryId, MilestoneId, SettlementId, SubmissionId, TaskId, WithdrawalId, WorkerId};
pub use owner::{Owner, OwnerType};
pub use params::ProtocolParams;
pub use rate::{BasisPoints, Percent};
pub use time::{Clock, SystemClock, Timestamp};
