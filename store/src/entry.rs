//! Ledger entry records: the immutable, append-only journal.
//!
//! Each entry type has its own metadata shape; [`EntryMeta`] is the tagged
//! union over them. Entries are built through the constructors on
//! [`NewEntry`], which pair every entry type with the metadata it carries.

use bounty_types::{
    Amount, BasisPoints, Chain, EntryId, MilestoneId, Owner, SettlementId, SubmissionId, TaskId,
    Timestamp, WithdrawalId, WorkerId,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Lock,
    Unlock,
    Slash,
    Payout,
    ProtocolFeeAccrual,
    Deposit,
    Withdrawal,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Lock => "lock",
            EntryType::Unlock => "unlock",
            EntryType::Slash => "slash",
            EntryType::Payout => "payout",
            EntryType::ProtocolFeeAccrual => "protocol_fee_accrual",
            EntryType::Deposit => "deposit",
            EntryType::Withdrawal => "withdrawal",
        }
    }
}

/// Worker stake locked against a task (and optionally a milestone).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeMeta {
    pub task_id: TaskId,
    pub milestone_id: Option<MilestoneId>,
}

/// Task reward held in escrow for the creator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowMeta {
    pub task_id: TaskId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashMeta {
    pub task_id: TaskId,
    pub milestone_id: Option<MilestoneId>,
    pub locked: Amount,
    pub slashed: Amount,
    pub returned: Amount,
    pub rate: BasisPoints,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementMeta {
    pub settlement_id: SettlementId,
    pub task_id: TaskId,
    pub milestone_id: Option<MilestoneId>,
    pub gross: Amount,
    pub fee: Amount,
    pub net: Amount,
    pub rate: BasisPoints,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositMeta {
    /// Provider-side reference (transaction hash or deposit id).
    pub reference: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalMeta {
    pub withdrawal_id: WithdrawalId,
    pub destination: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryMeta {
    Stake(StakeMeta),
    Escrow(EscrowMeta),
    Slash(SlashMeta),
    Settlement(SettlementMeta),
    Deposit(DepositMeta),
    Withdrawal(WithdrawalMeta),
}

impl EntryMeta {
    pub fn settlement_id(&self) -> Option<&SettlementId> {
        match self {
            EntryMeta::Settlement(meta) => Some(&meta.settlement_id),
            _ => None,
        }
    }
}

/// An entry that has not been assigned an id yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub chain: Chain,
    pub amount: Amount,
    pub entry_type: EntryType,
    pub from: Option<Owner>,
    pub to: Option<Owner>,
    pub task_id: Option<TaskId>,
    pub submission_id: Option<SubmissionId>,
    pub meta: EntryMeta,
    pub created_at: Timestamp,
}

impl NewEntry {
    pub fn stake_lock(
        worker: &WorkerId,
        chain: Chain,
        amount: Amount,
        meta: StakeMeta,
        now: Timestamp,
    ) -> Self {
        Self::stake(EntryType::Lock, worker, chain, amount, meta, now)
    }

    pub fn stake_unlock(
        worker: &WorkerId,
        chain: Chain,
        amount: Amount,
        meta: StakeMeta,
        now: Timestamp,
    ) -> Self {
        Self::stake(EntryType::Unlock, worker, chain, amount, meta, now)
    }

    fn stake(
        entry_type: EntryType,
        worker: &WorkerId,
        chain: Chain,
        amount: Amount,
        meta: StakeMeta,
        now: Timestamp,
    ) -> Self {
        Self {
            chain,
            amount,
            entry_type,
            from: Some(Owner::Worker(worker.clone())),
            to: Some(Owner::Worker(worker.clone())),
            task_id: Some(meta.task_id.clone()),
            submission_id: None,
            meta: EntryMeta::Stake(meta),
            created_at: now,
        }
    }

    pub fn escrow_lock(
        creator: &WorkerId,
        chain: Chain,
        amount: Amount,
        task_id: &TaskId,
        now: Timestamp,
    ) -> Self {
        Self::escrow(EntryType::Lock, creator, chain, amount, task_id, now)
    }

    /// Escrow returned to the creator (refund or unspent remainder).
    pub fn escrow_unlock(
        creator: &WorkerId,
        chain: Chain,
        amount: Amount,
        task_id: &TaskId,
        now: Timestamp,
    ) -> Self {
        Self::escrow(EntryType::Unlock, creator, chain, amount, task_id, now)
    }

    fn escrow(
        entry_type: EntryType,
        creator: &WorkerId,
        chain: Chain,
        amount: Amount,
        task_id: &TaskId,
        now: Timestamp,
    ) -> Self {
        Self {
            chain,
            amount,
            entry_type,
            from: Some(Owner::Worker(creator.clone())),
            to: Some(Owner::Worker(creator.clone())),
            task_id: Some(task_id.clone()),
            submission_id: None,
            meta: EntryMeta::Escrow(EscrowMeta {
                task_id: task_id.clone(),
            }),
            created_at: now,
        }
    }

    /// The entry amount is the slashed part; the returned part lives in the metadata.
    pub fn slash(worker: &WorkerId, chain: Chain, meta: SlashMeta, now: Timestamp) -> Self {
        Self {
            chain,
            amount: meta.slashed,
            entry_type: EntryType::Slash,
            from: Some(Owner::Worker(worker.clone())),
            to: Some(Owner::Protocol),
            task_id: Some(meta.task_id.clone()),
            submission_id: None,
            meta: EntryMeta::Slash(meta),
            created_at: now,
        }
    }

    pub fn payout(
        payer: &WorkerId,
        worker: &WorkerId,
        chain: Chain,
        submission_id: &SubmissionId,
        meta: SettlementMeta,
        now: Timestamp,
    ) -> Self {
        Self {
            chain,
            amount: meta.net,
            entry_type: EntryType::Payout,
            from: Some(Owner::Worker(payer.clone())),
            to: Some(Owner::Worker(worker.clone())),
            task_id: Some(meta.task_id.clone()),
            submission_id: Some(submission_id.clone()),
            meta: EntryMeta::Settlement(meta),
            created_at: now,
        }
    }

    pub fn fee_accrual(
        payer: &WorkerId,
        chain: Chain,
        submission_id: &SubmissionId,
        meta: SettlementMeta,
        now: Timestamp,
    ) -> Self {
        Self {
            chain,
            amount: meta.fee,
            entry_type: EntryType::ProtocolFeeAccrual,
            from: Some(Owner::Worker(payer.clone())),
            to: Some(Owner::Protocol),
            task_id: Some(meta.task_id.clone()),
            submission_id: Some(submission_id.clone()),
            meta: EntryMeta::Settlement(meta),
            created_at: now,
        }
    }

    pub fn deposit(
        worker: &WorkerId,
        chain: Chain,
        amount: Amount,
        reference: &str,
        now: Timestamp,
    ) -> Self {
        Self {
            chain,
            amount,
            entry_type: EntryType::Deposit,
            from: None,
            to: Some(Owner::Worker(worker.clone())),
            task_id: None,
            submission_id: None,
            meta: EntryMeta::Deposit(DepositMeta {
                reference: reference.to_string(),
            }),
            created_at: now,
        }
    }

    pub fn withdrawal(
        worker: &WorkerId,
        chain: Chain,
        amount: Amount,
        meta: WithdrawalMeta,
        now: Timestamp,
    ) -> Self {
        Self {
            chain,
            amount,
            entry_type: EntryType::Withdrawal,
            from: Some(Owner::Worker(worker.clone())),
            to: None,
            task_id: None,
            submission_id: None,
            meta: EntryMeta::Withdrawal(meta),
            created_at: now,
        }
    }
}

/// A journalled entry. Never updated or deleted once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub chain: Chain,
    pub amount: Amount,
    pub entry_type: EntryType,
    pub from: Option<Owner>,
    pub to: Option<Owner>,
    pub task_id: Option<TaskId>,
    pub submission_id: Option<SubmissionId>,
    pub meta: EntryMeta,
    pub created_at: Timestamp,
}

impl LedgerEntry {
    pub fn from_new(id: EntryId, entry: NewEntry) -> Self {
        Self {
            id,
            chain: entry.chain,
            amount: entry.amount,
            entry_type: entry.entry_type,
            from: entry.from,
            to: entry.to,
            task_id: entry.task_id,
            submission_id: entry.submission_id,
            meta: entry.meta,
            created_at: entry.created_at,
        }
    }
}
