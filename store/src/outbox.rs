//! Audit events queued in the same write transaction as the change they describe.
//!
//! The outbox is drained after commit by the node, which forwards events to
//! the external audit sink and hands withdrawal requests to the chain
//! provider. Nothing in the write path waits on external I/O.

use bounty_types::{
    Amount, Chain, MilestoneId, SettlementId, TaskId, Timestamp, WithdrawalId, WorkerId,
};
use serde::{Deserialize, Serialize};

use crate::task::TaskStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEvent {
    StakeLocked {
        worker: WorkerId,
        task_id: TaskId,
        milestone_id: Option<MilestoneId>,
        chain: Chain,
        amount: Amount,
    },
    StakeUnlocked {
        worker: WorkerId,
        task_id: TaskId,
        milestone_id: Option<MilestoneId>,
        chain: Chain,
        amount: Amount,
    },
    StakeSlashed {
        worker: WorkerId,
        task_id: TaskId,
        milestone_id: Option<MilestoneId>,
        chain: Chain,
        slashed: Amount,
        returned: Amount,
    },
    EscrowLocked {
        creator: WorkerId,
        task_id: TaskId,
        chain: Chain,
        amount: Amount,
    },
    EscrowRefunded {
        creator: WorkerId,
        task_id: TaskId,
        chain: Chain,
        amount: Amount,
    },
    EscrowReleased {
        creator: WorkerId,
        task_id: TaskId,
        chain: Chain,
        remainder: Amount,
    },
    FeeAccrued {
        settlement_id: SettlementId,
        chain: Chain,
        fee: Amount,
    },
    FundsTransferred {
        settlement_id: SettlementId,
        payer: WorkerId,
        worker: WorkerId,
        chain: Chain,
        gross: Amount,
        net: Amount,
    },
    DepositCredited {
        worker: WorkerId,
        chain: Chain,
        amount: Amount,
        reference: String,
    },
    WithdrawalRequested {
        withdrawal_id: WithdrawalId,
        worker: WorkerId,
        chain: Chain,
        amount: Amount,
        destination: String,
    },
    TaskStatusChanged {
        task_id: TaskId,
        from: Option<TaskStatus>,
        to: TaskStatus,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::StakeLocked { .. } => "stake_locked",
            AuditEvent::StakeUnlocked { .. } => "stake_unlocked",
            AuditEvent::StakeSlashed { .. } => "stake_slashed",
            AuditEvent::EscrowLocked { .. } => "escrow_locked",
            AuditEvent::EscrowRefunded { .. } => "escrow_refunded",
            AuditEvent::EscrowReleased { .. } => "escrow_released",
            AuditEvent::FeeAccrued { .. } => "fee_accrued",
            AuditEvent::FundsTransferred { .. } => "funds_transferred",
            AuditEvent::DepositCredited { .. } => "deposit_credited",
            AuditEvent::WithdrawalRequested { .. } => "withdrawal_requested",
            AuditEvent::TaskStatusChanged { .. } => "task_status_changed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub seq: u64,
    pub event: AuditEvent,
    pub created_at: Timestamp,
}
