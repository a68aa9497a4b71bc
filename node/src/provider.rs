//! Chain provider abstraction.
//!
//! The provider owns address derivation, deposit detection and payout
//! broadcasting. The engine only asks it questions and hands it queued
//! withdrawals; balances change solely through the ledger.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bounty_types::{Amount, Chain, WithdrawalId, WorkerId};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("chain {0} is not supported by this provider")]
    UnsupportedChain(Chain),

    #[error("unknown reference: {0}")]
    UnknownReference(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositAddress {
    pub chain: Chain,
    pub address: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DepositStatus {
    Pending { confirmations: u32 },
    Confirmed { worker: WorkerId, amount: Amount },
    Failed { reason: String },
}

/// A withdrawal already debited from the ledger, ready to broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub withdrawal_id: WithdrawalId,
    pub worker: WorkerId,
    pub chain: Chain,
    pub amount: Amount,
    pub destination: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Queued,
    Broadcast { tx_ref: String },
    Confirmed { tx_ref: String },
    Failed { reason: String },
}

pub trait ChainProvider: Send + Sync {
    fn create_deposit_address(
        &self,
        worker: &WorkerId,
        chain: Chain,
    ) -> Result<DepositAddress, ProviderError>;

    fn get_deposit_status(
        &self,
        chain: Chain,
        reference: &str,
    ) -> Result<DepositStatus, ProviderError>;

    /// Hand over a debited withdrawal. Must tolerate being called again
    /// with the same `withdrawal_id`.
    fn initiate_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), ProviderError>;

    fn get_withdrawal_status(
        &self,
        withdrawal_id: &WithdrawalId,
    ) -> Result<WithdrawalStatus, ProviderError>;
}

#[derive(Default)]
struct Scripted {
    deposits: HashMap<(Chain, String), DepositStatus>,
    withdrawals: HashMap<WithdrawalId, (WithdrawalRequest, WithdrawalStatus)>,
    failing: bool,
}

/// A provider with scripted deposits that records every withdrawal.
#[derive(Default)]
pub struct NullChainProvider {
    state: Mutex<Scripted>,
}

impl NullChainProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the status `get_deposit_status` reports for a reference.
    pub fn set_deposit(&self, chain: Chain, reference: &str, status: DepositStatus) {
        self.lock()
            .deposits
            .insert((chain, reference.to_string()), status);
    }

    /// Make every call fail with `Unavailable` until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    pub fn withdrawals(&self) -> Vec<WithdrawalRequest> {
        let mut requests: Vec<WithdrawalRequest> = self
            .lock()
            .withdrawals
            .values()
            .map(|(request, _)| request.clone())
            .collect();
        requests.sort_by(|a, b| a.withdrawal_id.cmp(&b.withdrawal_id));
        requests
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Scripted> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(state: &Scripted) -> Result<(), ProviderError> {
        if state.failing {
            return Err(ProviderError::Unavailable("scripted outage".into()));
        }
        Ok(())
    }
}

impl ChainProvider for NullChainProvider {
    fn create_deposit_address(
        &self,
        worker: &WorkerId,
        chain: Chain,
    ) -> Result<DepositAddress, ProviderError> {
        Self::check_available(&self.lock())?;
        Ok(DepositAddress {
            chain,
            address: format!("null:{}:{worker}", chain.as_str().to_ascii_lowercase()),
        })
    }

    fn get_deposit_status(
        &self,
        chain: Chain,
        reference: &str,
    ) -> Result<DepositStatus, ProviderError> {
        let state = self.lock();
        Self::check_available(&state)?;
        state
            .deposits
            .get(&(chain, reference.to_string()))
            .cloned()
            .ok_or_else(|| ProviderError::UnknownReference(reference.to_string()))
    }

    fn initiate_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), ProviderError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        state
            .withdrawals
            .entry(request.withdrawal_id.clone())
            .or_insert_with(|| (request.clone(), WithdrawalStatus::Queued));
        Ok(())
    }

    fn get_withdrawal_status(
        &self,
        withdrawal_id: &WithdrawalId,
    ) -> Result<WithdrawalStatus, ProviderError> {
        let state = self.lock();
        Self::check_available(&state)?;
        state
            .withdrawals
            .get(withdrawal_id)
            .map(|(_, status)| status.clone())
            .ok_or_else(|| ProviderError::UnknownReference(withdrawal_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_withdrawal_is_recorded_once() {
        let provider = NullChainProvider::new();
        let request = WithdrawalRequest {
            withdrawal_id: WithdrawalId::new("wd-1").unwrap(),
            worker: WorkerId::new("w1").unwrap(),
            chain: Chain::Btc,
            amount: Amount::parse("0.5").unwrap(),
            destination: "bc1qexample".into(),
        };
        provider.initiate_withdrawal(&request).unwrap();
        provider.initiate_withdrawal(&request).unwrap();
        assert_eq!(provider.withdrawals(), vec![request.clone()]);
        assert_eq!(
            provider.get_withdrawal_status(&request.withdrawal_id).unwrap(),
            WithdrawalStatus::Queued
        );
    }

    #[test]
    fn outage_fails_every_call() {
        let provider = NullChainProvider::new();
        provider.set_failing(true);
        let worker = WorkerId::new("w1").unwrap();
        assert!(matches!(
            provider.create_deposit_address(&worker, Chain::Eth),
            Err(ProviderError::Unavailable(_))
        ));
        provider.set_failing(false);
        let address = provider.create_deposit_address(&worker, Chain::Eth).unwrap();
        assert_eq!(address.address, "null:eth:w1");
    }
}
