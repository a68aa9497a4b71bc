//! The engine facade: every exposed operation, one write transaction each.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use bounty_escrow::{RefundOutcome, StakeOutcome};
use bounty_ledger::{accounts, journal};
use bounty_market::{
    sweep, workers, AcceptOutcome, ClaimOutcome, DisputeResolution, ExpiredClaim, MarketError,
    NewTask, RejectOutcome, ReleaseOutcome, ResolveOutcome, SubmitOutcome, SweepAction,
    TaskMarket,
};
use bounty_settlement::{SettlementRequest, SettlementResult};
use bounty_store::{
    AccountKey, LedgerAccount, LedgerEntry, LedgerRead, LedgerStore, LedgerTxn, SubmissionRecord,
    TaskRecord, WorkerRecord,
};
use bounty_types::{
    Amount, Chain, Clock, MilestoneId, SubmissionId, SystemClock, TaskId, Timestamp,
    WithdrawalId, WorkerId,
};
use bounty_utils::format_duration;

use crate::command::{CommandOutcome, LedgerCommand};
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::funds::{self, DepositOutcome, WithdrawalOutcome};
use crate::legacy::{self, LegacyBalance};
use crate::metrics::NodeMetrics;
use crate::outbox::OutboxDrainer;
use crate::provider::{
    ChainProvider, DepositAddress, DepositStatus, NullChainProvider, WithdrawalStatus,
};
use crate::shutdown::ShutdownController;
use crate::sink::{AuditSink, TracingSink};
use crate::storage::EngineStore;
use crate::tracing_spans;

/// Timeout for waiting on background tasks during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// What one expiry sweep did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub claims_expired: usize,
    pub tasks_expired: usize,
    /// Tasks whose sweep transaction was rolled back.
    pub failures: usize,
}

/// The ledger engine over a storage backend `S`.
pub struct MarketNode<S> {
    config: NodeConfig,
    store: Arc<S>,
    market: TaskMarket,
    clock: Arc<dyn Clock>,
    metrics: Arc<NodeMetrics>,
    sink: Arc<dyn AuditSink>,
    provider: Arc<dyn ChainProvider>,
}

impl MarketNode<EngineStore> {
    /// Open the backend `config` selects, on the wall clock.
    pub fn open(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let store = EngineStore::open(&config)?;
        Self::with_store(config, store, Arc::new(SystemClock))
    }
}

impl<S: LedgerStore + 'static> MarketNode<S> {
    /// Build an engine over an existing store and bootstrap the protocol
    /// account of every configured chain.
    pub fn with_store(config: NodeConfig, store: S, clock: Arc<dyn Clock>) -> Result<Self, NodeError> {
        config.validate()?;
        let market = TaskMarket::new(config.params()?);
        let node = Self {
            store: Arc::new(store),
            market,
            clock,
            metrics: Arc::new(NodeMetrics::new()?),
            sink: Arc::new(TracingSink),
            provider: Arc::new(NullChainProvider::new()),
            config,
        };

        let now = node.clock.now();
        node.store.write(|txn| -> Result<(), NodeError> {
            accounts::bootstrap(txn, &node.config.chains, now)?;
            Ok(())
        })?;
        tracing::info!(
            chains = ?node.config.chains,
            default_fee_bps = node.market.params().default_fee_bps.value(),
            "ledger engine ready"
        );
        Ok(node)
    }

    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn ChainProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    pub fn market(&self) -> &TaskMarket {
        &self.market
    }

    // ── Transaction plumbing ───────────────────────────────────────────

    /// Run `f` in one write transaction, counting and logging a rollback.
    fn write<R, F>(&self, command: &'static str, f: F) -> Result<R, NodeError>
    where
        F: FnOnce(&mut dyn LedgerTxn, Timestamp) -> Result<R, NodeError>,
    {
        let _span = tracing_spans::command_span(command).entered();
        let now = self.clock.now();
        let result = self.store.write(|txn| f(txn, now));
        if let Err(e) = &result {
            self.record_failure(command, e);
        }
        result
    }

    fn read<R, F>(&self, f: F) -> Result<R, NodeError>
    where
        F: FnOnce(&dyn LedgerRead, Timestamp) -> Result<R, NodeError>,
    {
        let now = self.clock.now();
        self.store.read(|reader| f(reader, now))
    }

    fn record_failure(&self, command: &'static str, error: &NodeError) {
        self.metrics
            .command_failures
            .with_label_values(&[error.code()])
            .inc();
        tracing::warn!(command, code = error.code(), error = %error, "command rejected");
    }

    fn observe_stake(&self, outcome: &StakeOutcome) {
        match outcome {
            StakeOutcome::NotRequired => {}
            StakeOutcome::Locked { .. } => self.metrics.stake_locks.inc(),
            StakeOutcome::Unlocked { .. } => self.metrics.stake_unlocks.inc(),
            StakeOutcome::Slashed { .. } => self.metrics.stake_slashes.inc(),
        }
    }

    fn observe_settlement(&self, result: &SettlementResult) {
        if result.idempotent {
            self.metrics.settlement_replays.inc();
            tracing::warn!(settlement = %result.settlement_id, "settlement replayed");
        } else {
            self.metrics.settlements.inc();
        }
    }

    fn observe_refund(&self, outcome: &RefundOutcome) {
        if matches!(outcome, RefundOutcome::Refunded { .. }) {
            self.metrics.escrow_refunds.inc();
        }
    }

    fn observe_expired(&self, expired: &ExpiredClaim) {
        self.metrics.claims_expired.inc();
        self.observe_stake(&expired.stake);
    }

    /// The slash already committed; report the expiry to the caller.
    fn claim_expired(&self, command: &'static str, expired: ExpiredClaim) -> NodeError {
        self.observe_expired(&expired);
        let error = NodeError::from(MarketError::ClaimExpired {
            task: expired.task_id,
            worker: expired.worker,
        });
        self.record_failure(command, &error);
        error
    }

    // ── Ledger commands ────────────────────────────────────────────────

    /// Run one ledger command in its own transaction.
    pub fn execute(&self, command: LedgerCommand) -> Result<CommandOutcome, NodeError> {
        let outcome = self.write(command.name(), |txn, now| {
            command.apply(txn, &self.market, now)
        })?;
        match &outcome {
            CommandOutcome::Stake(stake) => self.observe_stake(stake),
            CommandOutcome::Settlement(result) => self.observe_settlement(result),
            CommandOutcome::Refund(refund) => self.observe_refund(refund),
        }
        Ok(outcome)
    }

    pub fn lock_stake(
        &self,
        task_id: &TaskId,
        worker_id: &WorkerId,
        milestone_id: Option<&MilestoneId>,
    ) -> Result<StakeOutcome, NodeError> {
        self.execute_stake(LedgerCommand::LockStake {
            task_id: task_id.clone(),
            worker_id: worker_id.clone(),
            milestone_id: milestone_id.cloned(),
        })
    }

    pub fn unlock_stake(
        &self,
        task_id: &TaskId,
        worker_id: &WorkerId,
        milestone_id: Option<&MilestoneId>,
    ) -> Result<StakeOutcome, NodeError> {
        self.execute_stake(LedgerCommand::UnlockStake {
            task_id: task_id.clone(),
            worker_id: worker_id.clone(),
            milestone_id: milestone_id.cloned(),
        })
    }

    pub fn slash_stake(
        &self,
        task_id: &TaskId,
        worker_id: &WorkerId,
        milestone_id: Option<&MilestoneId>,
        slash_percentage: u32,
    ) -> Result<StakeOutcome, NodeError> {
        self.execute_stake(LedgerCommand::SlashStake {
            task_id: task_id.clone(),
            worker_id: worker_id.clone(),
            milestone_id: milestone_id.cloned(),
            slash_percentage,
        })
    }

    fn execute_stake(&self, command: LedgerCommand) -> Result<StakeOutcome, NodeError> {
        match self.execute(command)? {
            CommandOutcome::Stake(outcome) => Ok(outcome),
            other => Err(NodeError::InvalidRequest(format!(
                "stake command produced {other:?}"
            ))),
        }
    }

    pub fn settle_task_payment(
        &self,
        request: SettlementRequest,
    ) -> Result<SettlementResult, NodeError> {
        match self.execute(LedgerCommand::Settle(request))? {
            CommandOutcome::Settlement(result) => Ok(result),
            other => Err(NodeError::InvalidRequest(format!(
                "settlement produced {other:?}"
            ))),
        }
    }

    pub fn refund_expired_task(&self, task_id: &TaskId) -> Result<RefundOutcome, NodeError> {
        let command = LedgerCommand::RefundExpiredTask {
            task_id: task_id.clone(),
        };
        match self.execute(command)? {
            CommandOutcome::Refund(outcome) => Ok(outcome),
            other => Err(NodeError::InvalidRequest(format!(
                "refund produced {other:?}"
            ))),
        }
    }

    // ── Reads ──────────────────────────────────────────────────────────

    /// Protocol fee and slash income per configured chain.
    pub fn get_protocol_balances(&self) -> Result<BTreeMap<Chain, LedgerAccount>, NodeError> {
        self.read(|reader, now| {
            self.config
                .chains
                .iter()
                .map(|chain| -> Result<_, NodeError> {
                    let account = accounts::snapshot(reader, &AccountKey::protocol(*chain), now)?;
                    Ok((*chain, account))
                })
                .collect()
        })
    }

    /// Newest entries first; `limit` is clamped to the configured page size.
    pub fn list_ledger_entries(
        &self,
        chain: Option<Chain>,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, NodeError> {
        let max_page = self.market.params().max_entry_page;
        self.read(|reader, _| Ok(journal::list_entries(reader, chain, limit, max_page)?))
    }

    pub fn entries_for_task(&self, task_id: &TaskId) -> Result<Vec<LedgerEntry>, NodeError> {
        self.read(|reader, _| Ok(journal::entries_for_task(reader, task_id)?))
    }

    pub fn get_balance(&self, worker: &WorkerId, chain: Chain) -> Result<LedgerAccount, NodeError> {
        self.read(|reader, now| {
            Ok(accounts::snapshot(
                reader,
                &AccountKey::worker(worker, chain),
                now,
            )?)
        })
    }

    /// The old `{balance, staked, total_earned}` view, derived from the ledger.
    pub fn legacy_balance(&self, worker: &WorkerId, chain: Chain) -> Result<LegacyBalance, NodeError> {
        self.read(|reader, now| legacy::legacy_balance(reader, worker, chain, now))
    }

    pub fn task(&self, task_id: &TaskId) -> Result<Option<TaskRecord>, NodeError> {
        self.read(|reader, _| Ok(reader.task(task_id)?))
    }

    pub fn worker(&self, worker: &WorkerId) -> Result<Option<WorkerRecord>, NodeError> {
        self.read(|reader, _| Ok(reader.worker(worker)?))
    }

    // ── Task lifecycle ─────────────────────────────────────────────────

    pub fn create_task(&self, request: NewTask) -> Result<TaskRecord, NodeError> {
        self.write("create_task", |txn, now| {
            Ok(self.market.create_task(txn, request, now)?)
        })
    }

    pub fn claim_task(&self, task_id: &TaskId, worker: &WorkerId) -> Result<ClaimOutcome, NodeError> {
        let outcome = self.write("claim_task", |txn, now| {
            Ok(self.market.claim(txn, task_id, worker, now)?)
        })?;
        if let Some(expired) = &outcome.expired_previous {
            self.observe_expired(expired);
        }
        self.observe_stake(&outcome.stake);
        Ok(outcome)
    }

    pub fn release_claim(&self, task_id: &TaskId, worker: &WorkerId) -> Result<StakeOutcome, NodeError> {
        let outcome = self.write("release_claim", |txn, now| {
            Ok(self.market.release_claim(txn, task_id, worker, now)?)
        })?;
        match outcome {
            ReleaseOutcome::Released { stake } => {
                self.observe_stake(&stake);
                Ok(stake)
            }
            ReleaseOutcome::ClaimExpired(expired) => Err(self.claim_expired("release_claim", expired)),
        }
    }

    pub fn submit_result(
        &self,
        task_id: &TaskId,
        submission_id: &SubmissionId,
        worker: &WorkerId,
        payload: String,
    ) -> Result<SubmissionRecord, NodeError> {
        let outcome = self.write("submit_result", |txn, now| {
            Ok(self
                .market
                .submit_result(txn, task_id, submission_id, worker, payload, now)?)
        })?;
        self.submitted("submit_result", outcome)
    }

    pub fn submit_milestone(
        &self,
        task_id: &TaskId,
        milestone_id: &MilestoneId,
        submission_id: &SubmissionId,
        worker: &WorkerId,
        payload: String,
    ) -> Result<SubmissionRecord, NodeError> {
        let outcome = self.write("submit_milestone", |txn, now| {
            Ok(self.market.submit_milestone(
                txn,
                task_id,
                milestone_id,
                submission_id,
                worker,
                payload,
                now,
            )?)
        })?;
        self.submitted("submit_milestone", outcome)
    }

    fn submitted(
        &self,
        command: &'static str,
        outcome: SubmitOutcome,
    ) -> Result<SubmissionRecord, NodeError> {
        match outcome {
            SubmitOutcome::Submitted(submission) => Ok(submission),
            SubmitOutcome::ClaimExpired(expired) => Err(self.claim_expired(command, expired)),
        }
    }

    pub fn accept_submission(
        &self,
        submission_id: &SubmissionId,
        reviewer: &WorkerId,
    ) -> Result<AcceptOutcome, NodeError> {
        let outcome = self.write("accept_submission", |txn, now| {
            Ok(self
                .market
                .accept_submission(txn, submission_id, reviewer, now)?)
        })?;
        self.observe_settlement(&outcome.settlement);
        Ok(outcome)
    }

    pub fn reject_submission(
        &self,
        submission_id: &SubmissionId,
        reviewer: &WorkerId,
    ) -> Result<RejectOutcome, NodeError> {
        let outcome = self.write("reject_submission", |txn, now| {
            Ok(self
                .market
                .reject_submission(txn, submission_id, reviewer, now)?)
        })?;
        if let RejectOutcome::AttemptsExhausted { stake } = &outcome {
            self.observe_stake(stake);
        }
        Ok(outcome)
    }

    pub fn dispute_rejection(
        &self,
        submission_id: &SubmissionId,
        worker: &WorkerId,
    ) -> Result<SubmissionRecord, NodeError> {
        self.write("dispute_rejection", |txn, now| {
            Ok(self
                .market
                .dispute_rejection(txn, submission_id, worker, now)?)
        })
    }

    pub fn resolve_dispute(
        &self,
        submission_id: &SubmissionId,
        resolution: DisputeResolution,
    ) -> Result<ResolveOutcome, NodeError> {
        let outcome = self.write("resolve_dispute", |txn, now| {
            Ok(self
                .market
                .resolve_dispute(txn, submission_id, resolution, now)?)
        })?;
        match &outcome {
            ResolveOutcome::Accepted(accepted) => self.observe_settlement(&accepted.settlement),
            ResolveOutcome::Slashed { stake } => self.observe_stake(stake),
        }
        Ok(outcome)
    }

    pub fn cancel_task(&self, task_id: &TaskId, caller: &WorkerId) -> Result<RefundOutcome, NodeError> {
        let outcome = self.write("cancel_task", |txn, now| {
            Ok(self.market.cancel_task(txn, task_id, caller, now)?)
        })?;
        self.observe_refund(&outcome);
        Ok(outcome)
    }

    /// Mirror a worker from the registration layer.
    pub fn upsert_worker(
        &self,
        worker: &WorkerId,
        capabilities: BTreeSet<String>,
    ) -> Result<WorkerRecord, NodeError> {
        self.write("upsert_worker", |txn, now| {
            Ok(workers::upsert_worker(txn, worker, capabilities, now)?)
        })
    }

    /// Apply lazy claim expiry and deadline refunds to every task that is due.
    ///
    /// Each task is swept in its own transaction; a failing task is logged
    /// and counted without stopping the sweep.
    pub fn sweep_expired(&self) -> Result<SweepReport, NodeError> {
        let _span = tracing_spans::sweep_span().entered();
        let now = self.clock.now();
        let due = self.store.read(|reader| sweep::candidates(reader, now))?;

        let mut report = SweepReport::default();
        for task_id in due {
            match self.write("sweep_task", |txn, now| {
                Ok(self.market.sweep_task(txn, &task_id, now)?)
            }) {
                Ok(actions) => {
                    for action in actions {
                        match action {
                            SweepAction::ClaimExpired(expired) => {
                                self.observe_expired(&expired);
                                report.claims_expired += 1;
                            }
                            SweepAction::Expired(refund) => {
                                self.observe_refund(&refund);
                                report.tasks_expired += 1;
                            }
                        }
                    }
                }
                Err(_) => report.failures += 1,
            }
        }

        if report != SweepReport::default() {
            tracing::info!(
                claims_expired = report.claims_expired,
                tasks_expired = report.tasks_expired,
                failures = report.failures,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }

    // ── Funds in and out ───────────────────────────────────────────────

    pub fn confirm_deposit(
        &self,
        worker: &WorkerId,
        chain: Chain,
        amount: Amount,
        reference: &str,
    ) -> Result<DepositOutcome, NodeError> {
        let outcome = self.write("confirm_deposit", |txn, now| {
            funds::confirm_deposit(txn, worker, chain, amount, reference, now)
        })?;
        if matches!(outcome, DepositOutcome::Credited { .. }) {
            self.metrics.deposits.inc();
        }
        Ok(outcome)
    }

    pub fn request_withdrawal(
        &self,
        withdrawal_id: &WithdrawalId,
        worker: &WorkerId,
        chain: Chain,
        amount: Amount,
        destination: &str,
    ) -> Result<WithdrawalOutcome, NodeError> {
        let outcome = self.write("request_withdrawal", |txn, now| {
            funds::request_withdrawal(txn, withdrawal_id, worker, chain, amount, destination, now)
        })?;
        if matches!(outcome, WithdrawalOutcome::Requested { .. }) {
            self.metrics.withdrawals.inc();
        }
        Ok(outcome)
    }

    fn require_chain(&self, chain: Chain) -> Result<(), NodeError> {
        if !self.config.chains.contains(&chain) {
            return Err(NodeError::InvalidRequest(format!(
                "chain {chain} is not configured"
            )));
        }
        Ok(())
    }

    pub fn deposit_address(&self, worker: &WorkerId, chain: Chain) -> Result<DepositAddress, NodeError> {
        self.require_chain(chain)?;
        Ok(self.provider.create_deposit_address(worker, chain)?)
    }

    /// Ask the provider about a deposit and credit it once confirmed.
    ///
    /// Returns `None` while the deposit is still pending.
    pub fn sync_deposit(
        &self,
        chain: Chain,
        reference: &str,
    ) -> Result<Option<DepositOutcome>, NodeError> {
        self.require_chain(chain)?;
        match self.provider.get_deposit_status(chain, reference)? {
            DepositStatus::Confirmed { worker, amount } => self
                .confirm_deposit(&worker, chain, amount, reference)
                .map(Some),
            DepositStatus::Pending { confirmations } => {
                tracing::debug!(reference, confirmations, "deposit still pending");
                Ok(None)
            }
            DepositStatus::Failed { reason } => Err(NodeError::InvalidRequest(format!(
                "deposit {reference} failed: {reason}"
            ))),
        }
    }

    pub fn withdrawal_status(&self, withdrawal_id: &WithdrawalId) -> Result<WithdrawalStatus, NodeError> {
        Ok(self.provider.get_withdrawal_status(withdrawal_id)?)
    }

    // ── Background work ────────────────────────────────────────────────

    /// A drainer delivering this engine's outbox to its sink and provider.
    pub fn outbox_drainer(&self) -> OutboxDrainer<S> {
        OutboxDrainer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.sink),
            Arc::clone(&self.provider),
            Arc::clone(&self.metrics),
            self.config.outbox_batch_size,
        )
    }

    /// Spawn the outbox drainer and, when configured, the expiry sweeper.
    pub fn start(self: &Arc<Self>) -> BackgroundTasks {
        let shutdown = ShutdownController::new();
        let mut handles = Vec::new();

        let interval = self.config.outbox_poll_interval();
        handles.push(self.outbox_drainer().spawn(interval, shutdown.subscribe()));
        tracing::info!(every = %format_duration(interval), "outbox drainer started");

        if let Some(period) = self.config.sweep_interval() {
            let node = Arc::clone(self);
            let mut stop = shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        biased;
                        _ = stop.requested() => {
                            tracing::info!("expiry sweeper shutting down");
                            break;
                        }
                        _ = ticker.tick() => {
                            let node = Arc::clone(&node);
                            match tokio::task::spawn_blocking(move || node.sweep_expired()).await {
                                Ok(Ok(_)) => {}
                                Ok(Err(e)) => tracing::warn!(error = %e, "expiry sweep failed"),
                                Err(e) => tracing::warn!(error = %e, "expiry sweep task panicked"),
                            }
                        }
                    }
                }
            }));
            tracing::info!(every = %format_duration(period), "expiry sweeper started");
        }

        BackgroundTasks { shutdown, handles }
    }
}

/// Handles to the engine's spawned tasks.
pub struct BackgroundTasks {
    shutdown: ShutdownController,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Block until SIGINT/SIGTERM, then stop.
    pub async fn run_until_signal(self) -> Result<(), NodeError> {
        self.shutdown.wait_for_signal().await?;
        self.stop().await
    }

    /// Signal every task and wait for it to finish its last pass.
    pub async fn stop(self) -> Result<(), NodeError> {
        self.shutdown.shutdown();
        for handle in self.handles {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "background task panicked"),
                Err(_) => return Err(NodeError::ShutdownTimeout),
            }
        }
        tracing::info!("background tasks stopped");
        Ok(())
    }
}
