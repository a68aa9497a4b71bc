//! Settlement engine.
//!
//! A settlement pays a worker for an accepted submission: the payer is
//! debited the gross amount, the worker credited the net, and the protocol
//! the fee, with a `payout` and a `protocol_fee_accrual` entry journalled
//! under one deterministic settlement id. The whole transfer happens in one
//! write transaction and the settlement id is claimed in the idempotency
//! index inside it, so a retried or concurrently duplicated settlement
//! applies exactly once and every later attempt reads back the original.

pub mod engine;
pub mod error;
pub mod request;

pub use engine::SettlementEngine;
pub use error::SettlementError;
pub use request::{FundingSource, SettlementBalances, SettlementRequest, SettlementResult};
