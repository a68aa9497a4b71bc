//! The settlement engine.

use std::collections::BTreeSet;

use bounty_ledger::{accounts, journal};
use bounty_store::{
    AccountKey, AuditEvent, EntryMeta, LedgerStore, LedgerTxn, NewEntry, SettlementMeta,
    WorkerRecord,
};
use bounty_types::params::{DEFAULT_FEE_BPS, NEUTRAL_REPUTATION_BPS};
use bounty_types::{Amount, BasisPoints, Chain, Timestamp, WorkerId};

use crate::{
    FundingSource, SettlementBalances, SettlementError, SettlementRequest, SettlementResult,
};

#[derive(Clone, Debug)]
pub struct SettlementEngine {
    default_fee_bps: BasisPoints,
}

impl Default for SettlementEngine {
    fn default() -> Self {
        Self::new(DEFAULT_FEE_BPS)
    }
}

impl SettlementEngine {
    pub fn new(default_fee_bps: BasisPoints) -> Self {
        Self { default_fee_bps }
    }

    pub fn default_fee_bps(&self) -> BasisPoints {
        self.default_fee_bps
    }

    /// Settle in a transaction of its own.
    pub fn settle<S: LedgerStore>(
        &self,
        store: &S,
        request: &SettlementRequest,
        now: Timestamp,
    ) -> Result<SettlementResult, SettlementError> {
        store.write(|txn| self.settle_in_txn(txn, request, now))
    }

    /// Settle inside the caller's write transaction.
    ///
    /// If the settlement id was already claimed, returns the recorded
    /// amounts with `idempotent: true` and writes nothing.
    pub fn settle_in_txn(
        &self,
        txn: &mut dyn LedgerTxn,
        request: &SettlementRequest,
        now: Timestamp,
    ) -> Result<SettlementResult, SettlementError> {
        let settlement_id = request.settlement_id();

        if let Some(entry) = journal::lookup_key(txn, settlement_id.as_str())? {
            let EntryMeta::Settlement(meta) = entry.meta else {
                return Err(SettlementError::CorruptRecord(settlement_id.to_string()));
            };
            tracing::warn!(settlement = %settlement_id, "settlement already applied");
            return Ok(SettlementResult {
                settlement_id,
                idempotent: true,
                gross: meta.gross,
                fee: meta.fee,
                net: meta.net,
                fee_rate: meta.rate,
                balances: None,
            });
        }

        let gross = request.gross_amount;
        if gross.is_zero() {
            return Err(SettlementError::InvalidAmount(
                "gross amount must be positive".into(),
            ));
        }
        let rate = request.fee_rate_bps.unwrap_or(self.default_fee_bps);
        let (fee, net) = gross.split_bps(rate);
        let chain = request.chain;

        let payer_key = AccountKey::worker(&request.payer_id, chain);
        let payer = match request.funding {
            FundingSource::Available => {
                accounts::debit_available(txn, &payer_key, gross, now)?
            }
            FundingSource::Escrow => accounts::debit_locked(txn, &payer_key, gross, now)?,
        };
        let worker_key = AccountKey::worker(&request.worker_id, chain);
        let worker = accounts::credit_available(txn, &worker_key, net, now)?;
        let protocol = accounts::credit_protocol(txn, chain, fee, now)?;
        record_earnings(txn, &request.worker_id, chain, net, now)?;

        let meta = SettlementMeta {
            settlement_id: settlement_id.clone(),
            task_id: request.task_id.clone(),
            milestone_id: request.milestone_id.clone(),
            gross,
            fee,
            net,
            rate,
        };
        journal::record_keyed(
            txn,
            settlement_id.as_str(),
            NewEntry::payout(
                &request.payer_id,
                &request.worker_id,
                chain,
                &request.submission_id,
                meta.clone(),
                now,
            ),
            AuditEvent::FundsTransferred {
                settlement_id: settlement_id.clone(),
                payer: request.payer_id.clone(),
                worker: request.worker_id.clone(),
                chain,
                gross,
                net,
            },
        )?;
        journal::record(
            txn,
            NewEntry::fee_accrual(&request.payer_id, chain, &request.submission_id, meta, now),
            AuditEvent::FeeAccrued {
                settlement_id: settlement_id.clone(),
                chain,
                fee,
            },
        )?;

        tracing::info!(
            settlement = %settlement_id,
            chain = %chain,
            gross = %gross,
            fee = %fee,
            net = %net,
            "settlement applied"
        );

        Ok(SettlementResult {
            settlement_id,
            idempotent: false,
            gross,
            fee,
            net,
            fee_rate: rate,
            balances: Some(SettlementBalances {
                payer,
                worker,
                protocol,
            }),
        })
    }
}

fn record_earnings(
    txn: &mut dyn LedgerTxn,
    worker_id: &WorkerId,
    chain: Chain,
    net: Amount,
    now: Timestamp,
) -> Result<(), SettlementError> {
    let mut worker = match txn.worker(worker_id)? {
        Some(worker) => worker,
        None => WorkerRecord::new(
            worker_id.clone(),
            BTreeSet::new(),
            NEUTRAL_REPUTATION_BPS,
            now,
        ),
    };
    let earned = worker
        .earned_on(chain)
        .checked_add(net)
        .map_err(|e| SettlementError::InvalidAmount(e.to_string()))?;
    worker.total_earned.insert(chain, earned);
    worker.updated_at = now;
    txn.put_worker(&worker)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bounty_ledger::LedgerError;
    use bounty_nullables::NullStore;
    use bounty_store::{EntryType, LedgerRead};
    use bounty_types::{SubmissionId, TaskId};

    fn id<T: TryFrom<String>>(s: &str) -> T
    where
        T::Error: std::fmt::Debug,
    {
        T::try_from(s.to_string()).unwrap()
    }

    fn request(gross: &str, bps: Option<u32>) -> SettlementRequest {
        SettlementRequest {
            task_id: id("T1"),
            submission_id: id("S1"),
            milestone_id: None,
            payer_id: id("payer"),
            worker_id: id("worker"),
            gross_amount: Amount::parse(gross).unwrap(),
            chain: Chain::Usd,
            fee_rate_bps: bps.map(|b| BasisPoints::new(b).unwrap()),
            funding: FundingSource::Available,
        }
    }

    fn store_with_payer(available: &str) -> NullStore {
        let store = NullStore::new();
        store
            .write(|txn| {
                accounts::bootstrap(txn, &Chain::ALL, Timestamp::new(0))?;
                accounts::credit_available(
                    txn,
                    &AccountKey::worker(&id("payer"), Chain::Usd),
                    Amount::parse(available).unwrap(),
                    Timestamp::new(0),
                )?;
                Ok::<_, LedgerError>(())
            })
            .unwrap();
        store
    }

    #[test]
    fn test_fee_split_and_transfer() {
        let store = store_with_payer("100");
        let engine = SettlementEngine::default();
        let result = engine
            .settle(&store, &request("100", Some(300)), Timestamp::new(1))
            .unwrap();

        assert!(!result.idempotent);
        assert_eq!(result.settlement_id.as_str(), "task_T1_S1");
        assert_eq!(result.fee.to_string(), "3");
        assert_eq!(result.net.to_string(), "97");
        let balances = result.balances.unwrap();
        assert_eq!(balances.payer.available, Amount::ZERO);
        assert_eq!(balances.worker.available.to_string(), "97");
        assert_eq!(balances.protocol.available.to_string(), "3");

        let entries = store.read(|r| r.recent_entries(None, 10)).unwrap();
        let kinds: Vec<_> = entries.iter().map(|e| e.entry_type).collect();
        assert_eq!(kinds, vec![EntryType::ProtocolFeeAccrual, EntryType::Payout]);
        assert!(entries
            .iter()
            .all(|e| e.meta.settlement_id().map(|s| s.as_str()) == Some("task_T1_S1")));

        let worker = store.read(|r| r.worker(&id("worker"))).unwrap().unwrap();
        assert_eq!(worker.earned_on(Chain::Usd).to_string(), "97");
    }

    #[test]
    fn test_default_fee_applies() {
        let store = store_with_payer("10");
        let result = SettlementEngine::default()
            .settle(&store, &request("10", None), Timestamp::new(1))
            .unwrap();
        assert_eq!(result.fee_rate, DEFAULT_FEE_BPS);
        assert_eq!(result.fee.to_string(), "0.25");
        assert_eq!(result.net.to_string(), "9.75");
    }

    #[test]
    fn test_second_settlement_is_idempotent() {
        let store = store_with_payer("200");
        let engine = SettlementEngine::default();
        let first = engine
            .settle(&store, &request("100", Some(300)), Timestamp::new(1))
            .unwrap();
        // A retry with a different rate still reports what was recorded.
        let second = engine
            .settle(&store, &request("100", Some(900)), Timestamp::new(2))
            .unwrap();

        assert!(!first.idempotent);
        assert!(second.idempotent);
        assert_eq!(second.fee, first.fee);
        assert_eq!(second.net, first.net);
        assert!(second.balances.is_none());
        assert_eq!(store.read(|r| r.entry_count()).unwrap(), 2);

        let payer = store
            .read(|r| r.account(&AccountKey::worker(&id("payer"), Chain::Usd)))
            .unwrap()
            .unwrap();
        assert_eq!(payer.available.to_string(), "100");
    }

    #[test]
    fn test_failed_settlement_leaves_no_trace() {
        let store = store_with_payer("50");
        let engine = SettlementEngine::default();
        let err = engine
            .settle(&store, &request("100", Some(300)), Timestamp::new(1))
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_balance");
        assert_eq!(store.read(|r| r.entry_count()).unwrap(), 0);
        assert!(store.read(|r| r.idempotency_key("task_T1_S1")).unwrap().is_none());

        // Once funded, the same settlement goes through exactly once.
        store
            .write(|txn| {
                accounts::credit_available(
                    txn,
                    &AccountKey::worker(&id("payer"), Chain::Usd),
                    Amount::from_units(50),
                    Timestamp::new(2),
                )
            })
            .unwrap();
        let retried = engine
            .settle(&store, &request("100", Some(300)), Timestamp::new(3))
            .unwrap();
        assert!(!retried.idempotent);
    }

    #[test]
    fn test_missing_protocol_account_is_fatal() {
        let store = NullStore::new();
        store
            .write(|txn| {
                accounts::credit_available(
                    txn,
                    &AccountKey::worker(&id("payer"), Chain::Usd),
                    Amount::from_units(5),
                    Timestamp::new(0),
                )
            })
            .unwrap();
        let err = SettlementEngine::default()
            .settle(&store, &request("5", None), Timestamp::new(1))
            .unwrap_err();
        assert_eq!(err.code(), "account_not_found");
    }

    #[test]
    fn test_escrow_funding_consumes_locked_balance() {
        let store = store_with_payer("10");
        store
            .write(|txn| {
                accounts::move_available_to_locked(
                    txn,
                    &AccountKey::worker(&id("payer"), Chain::Usd),
                    Amount::from_units(10),
                    Timestamp::new(0),
                )
            })
            .unwrap();
        let mut req = request("4", Some(0));
        req.funding = FundingSource::Escrow;
        let result = SettlementEngine::default()
            .settle(&store, &req, Timestamp::new(1))
            .unwrap();
        let payer = result.balances.unwrap().payer;
        assert_eq!(payer.locked.to_string(), "6");
        assert_eq!(payer.available, Amount::ZERO);
        assert_eq!(result.fee, Amount::ZERO);
    }

    #[test]
    fn test_milestone_settlements_key_on_the_milestone() {
        let store = store_with_payer("10");
        let mut req = request("1", None);
        req.milestone_id = Some(id("M1"));
        let result = SettlementEngine::default()
            .settle(&store, &req, Timestamp::new(1))
            .unwrap();
        assert_eq!(result.settlement_id.as_str(), "milestone_M1_S1");
    }

    #[test]
    fn test_concurrent_duplicates_settle_once() {
        let store = Arc::new(store_with_payer("1000"));
        let engine = SettlementEngine::default();
        let req = request("100", Some(300));

        let results: Vec<SettlementResult> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let engine = engine.clone();
                    let req = req.clone();
                    scope.spawn(move || engine.settle(&store, &req, Timestamp::new(1)).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| !r.idempotent).count(), 1);
        assert!(results.iter().all(|r| r.net.to_string() == "97"));
        assert_eq!(store.read(|r| r.entry_count()).unwrap(), 2);
        let payer = store
            .read(|r| r.account(&AccountKey::worker(&id("payer"), Chain::Usd)))
            .unwrap()
            .unwrap();
        assert_eq!(payer.available.to_string(), "900");
    }

    #[test]
    fn test_request_deserialises_with_defaults() {
        let json = r#"{
            "task_id": "T1",
            "submission_id": "S1",
            "payer_id": "payer",
            "worker_id": "worker",
            "gross_amount": "12.5",
            "chain": "ETH"
        }"#;
        let req: SettlementRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.funding, FundingSource::Available);
        assert_eq!(req.fee_rate_bps, None);
        assert_eq!(req.gross_amount.to_string(), "12.5");
        let _: TaskId = req.task_id;
        let _: SubmissionId = req.submission_id;
    }
}
