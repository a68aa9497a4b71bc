//! Outbox drainer: delivers committed audit events after the fact.
//!
//! Messages are read in sequence order, handed to the chain provider when
//! they carry a withdrawal, published to the audit sink and then acked. A
//! provider failure stops the pass at that message so the withdrawal is
//! retried on the next tick and later messages keep their order.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use bounty_store::{AuditEvent, LedgerStore, OutboxMessage};

use crate::metrics::NodeMetrics;
use crate::provider::{ChainProvider, WithdrawalRequest};
use crate::shutdown::ShutdownSignal;
use crate::sink::AuditSink;
use crate::tracing_spans;
use crate::NodeError;

pub struct OutboxDrainer<S> {
    store: Arc<S>,
    sink: Arc<dyn AuditSink>,
    provider: Arc<dyn ChainProvider>,
    metrics: Arc<NodeMetrics>,
    batch_size: usize,
}

impl<S> Clone for OutboxDrainer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            sink: Arc::clone(&self.sink),
            provider: Arc::clone(&self.provider),
            metrics: Arc::clone(&self.metrics),
            batch_size: self.batch_size,
        }
    }
}

fn withdrawal_request(message: &OutboxMessage) -> Option<WithdrawalRequest> {
    match &message.event {
        AuditEvent::WithdrawalRequested {
            withdrawal_id,
            worker,
            chain,
            amount,
            destination,
        } => Some(WithdrawalRequest {
            withdrawal_id: withdrawal_id.clone(),
            worker: worker.clone(),
            chain: *chain,
            amount: *amount,
            destination: destination.clone(),
        }),
        _ => None,
    }
}

impl<S: LedgerStore + 'static> OutboxDrainer<S> {
    pub fn new(
        store: Arc<S>,
        sink: Arc<dyn AuditSink>,
        provider: Arc<dyn ChainProvider>,
        metrics: Arc<NodeMetrics>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            sink,
            provider,
            metrics,
            batch_size: batch_size.max(1),
        }
    }

    /// Deliver up to one batch. Returns the number of messages acked.
    pub fn drain_once(&self) -> Result<usize, NodeError> {
        let batch = self
            .store
            .read(|reader| reader.pending_outbox(self.batch_size))?;
        if batch.is_empty() {
            self.metrics.outbox_backlog.set(0);
            return Ok(0);
        }
        let _span = tracing_spans::drain_span(batch.len()).entered();

        let mut delivered = 0;
        for message in &batch {
            if let Some(request) = withdrawal_request(message) {
                if let Err(e) = self.provider.initiate_withdrawal(&request) {
                    tracing::warn!(
                        seq = message.seq,
                        withdrawal = %request.withdrawal_id,
                        error = %e,
                        "chain provider refused withdrawal, will retry"
                    );
                    break;
                }
            }
            self.sink.publish(message);
            self.store.write(|txn| txn.ack_outbox(message.seq))?;
            self.metrics.outbox_delivered.inc();
            delivered += 1;
        }

        let left = batch.len() - delivered;
        self.metrics.outbox_backlog.set(left as i64);
        tracing::debug!(delivered, left, "outbox drain pass finished");
        Ok(delivered)
    }

    /// Drain until a pass comes back short of a full batch.
    pub fn drain_all(&self) -> Result<usize, NodeError> {
        let mut total = 0;
        loop {
            let delivered = self.drain_once()?;
            total += delivered;
            if delivered < self.batch_size {
                return Ok(total);
            }
        }
    }

    /// Run the drainer until shutdown, with one final pass on the way out.
    pub fn spawn(self, interval: Duration, mut shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.requested() => {
                        if let Err(e) = self.drain_blocking().await {
                            tracing::warn!(error = %e, "final outbox drain failed");
                        }
                        tracing::info!("outbox drainer shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.drain_blocking().await {
                            tracing::warn!(error = %e, "outbox drain failed");
                        }
                    }
                }
            }
        })
    }

    /// [`drain_all`](Self::drain_all) on the blocking pool, off the runtime
    /// workers, since store transactions and provider calls block.
    async fn drain_blocking(&self) -> Result<usize, NodeError> {
        let drainer = self.clone();
        tokio::task::spawn_blocking(move || drainer.drain_all())
            .await
            .map_err(|e| NodeError::Background(e.to_string()))?
    }
}
