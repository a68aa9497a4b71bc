//! Ledger mutations as command objects.
//!
//! A command is plain data: it can be logged, queued or deserialised from a
//! request body, and [`LedgerCommand::apply`] runs it inside one write
//! transaction.

use serde::{Deserialize, Serialize};

use bounty_escrow::{self as escrow, RefundOutcome, StakeOutcome};
use bounty_ledger::LedgerError;
use bounty_market::{MarketError, TaskMarket};
use bounty_settlement::{FundingSource, SettlementRequest, SettlementResult};
use bounty_store::{LedgerTxn, TaskRecord};
use bounty_types::{MilestoneId, Percent, TaskId, Timestamp, WorkerId};

use crate::tracing_spans;
use crate::NodeError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum LedgerCommand {
    LockStake {
        task_id: TaskId,
        worker_id: WorkerId,
        #[serde(default)]
        milestone_id: Option<MilestoneId>,
    },
    UnlockStake {
        task_id: TaskId,
        worker_id: WorkerId,
        #[serde(default)]
        milestone_id: Option<MilestoneId>,
    },
    SlashStake {
        task_id: TaskId,
        worker_id: WorkerId,
        #[serde(default)]
        milestone_id: Option<MilestoneId>,
        /// Whole percent, 0..=100.
        slash_percentage: u32,
    },
    Settle(SettlementRequest),
    RefundExpiredTask {
        task_id: TaskId,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Stake(StakeOutcome),
    Settlement(SettlementResult),
    Refund(RefundOutcome),
}

fn load_task(txn: &dyn LedgerTxn, id: &TaskId) -> Result<TaskRecord, NodeError> {
    Ok(txn
        .task(id)?
        .ok_or_else(|| MarketError::TaskNotFound(id.clone()))?)
}

/// Pay out of the task's escrow, charging the reservation against the task
/// so the same escrow cannot also be refunded or released.
fn settle_from_escrow(
    txn: &mut dyn LedgerTxn,
    market: &TaskMarket,
    request: &SettlementRequest,
    now: Timestamp,
) -> Result<SettlementResult, NodeError> {
    let mut task = load_task(txn, &request.task_id)?;
    if request.payer_id != task.creator {
        return Err(MarketError::NotCreator {
            task: task.id,
            worker: request.payer_id.clone(),
        }
        .into());
    }
    if request.chain != task.chain {
        return Err(NodeError::InvalidRequest(format!(
            "task {} escrow is on {}, not {}",
            task.id, task.chain, request.chain
        )));
    }

    let result = market.settlement().settle_in_txn(txn, request, now)?;
    if !result.idempotent {
        escrow::reserve_escrow(&mut task, result.gross)?;
        task.updated_at = now;
        txn.put_task(&task)?;
    }
    Ok(result)
}

impl LedgerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerCommand::LockStake { .. } => "lock_stake",
            LedgerCommand::UnlockStake { .. } => "unlock_stake",
            LedgerCommand::SlashStake { .. } => "slash_stake",
            LedgerCommand::Settle(_) => "settle_task_payment",
            LedgerCommand::RefundExpiredTask { .. } => "refund_expired_task",
        }
    }

    /// Run the command in the caller's write transaction.
    pub fn apply(
        &self,
        txn: &mut dyn LedgerTxn,
        market: &TaskMarket,
        now: Timestamp,
    ) -> Result<CommandOutcome, NodeError> {
        match self {
            LedgerCommand::LockStake {
                task_id,
                worker_id,
                milestone_id,
            } => {
                let task = load_task(txn, task_id)?;
                let outcome =
                    escrow::lock_stake(txn, &task, worker_id, milestone_id.as_ref(), now)?;
                Ok(CommandOutcome::Stake(outcome))
            }
            LedgerCommand::UnlockStake {
                task_id,
                worker_id,
                milestone_id,
            } => {
                let task = load_task(txn, task_id)?;
                let outcome =
                    escrow::unlock_stake(txn, &task, worker_id, milestone_id.as_ref(), now)?;
                Ok(CommandOutcome::Stake(outcome))
            }
            LedgerCommand::SlashStake {
                task_id,
                worker_id,
                milestone_id,
                slash_percentage,
            } => {
                let rate = Percent::new(*slash_percentage)
                    .map_err(LedgerError::from)?
                    .to_bps();
                let task = load_task(txn, task_id)?;
                let outcome = escrow::slash_stake(
                    txn,
                    &task,
                    worker_id,
                    milestone_id.as_ref(),
                    rate,
                    now,
                )?;
                Ok(CommandOutcome::Stake(outcome))
            }
            LedgerCommand::Settle(request) => {
                let settlement_id = request.settlement_id();
                let _span = tracing_spans::settlement_span(settlement_id.as_str()).entered();
                let result = match request.funding {
                    FundingSource::Available => {
                        market.settlement().settle_in_txn(txn, request, now)?
                    }
                    FundingSource::Escrow => settle_from_escrow(txn, market, request, now)?,
                };
                Ok(CommandOutcome::Settlement(result))
            }
            LedgerCommand::RefundExpiredTask { task_id } => {
                let outcome = market.refund_expired_task(txn, task_id, now)?;
                Ok(CommandOutcome::Refund(outcome))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_deserialise_from_tagged_json() {
        let json = r#"{
            "command": "slash_stake",
            "task_id": "T1",
            "worker_id": "w1",
            "slash_percentage": 100
        }"#;
        let command: LedgerCommand = serde_json::from_str(json).unwrap();
        assert_eq!(command.name(), "slash_stake");
        assert_eq!(
            command,
            LedgerCommand::SlashStake {
                task_id: TaskId::new("T1").unwrap(),
                worker_id: WorkerId::new("w1").unwrap(),
                milestone_id: None,
                slash_percentage: 100,
            }
        );

        let settle = r#"{
            "command": "settle",
            "task_id": "T1",
            "submission_id": "S1",
            "payer_id": "creator",
            "worker_id": "w1",
            "gross_amount": "100",
            "chain": "ETH",
            "fee_rate_bps": 300
        }"#;
        let command: LedgerCommand = serde_json::from_str(settle).unwrap();
        let LedgerCommand::Settle(request) = command else {
            panic!("expected a settlement");
        };
        assert_eq!(request.settlement_id().as_str(), "task_T1_S1");
        assert_eq!(request.fee_rate_bps.map(|bps| bps.value()), Some(300));

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["protocol_fee_rate_bps"], 300);
        assert!(json.get("fee_rate_bps").is_none());
    }
}
