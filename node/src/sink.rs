//! Destinations for committed audit events.
//!
//! Sinks are fire-and-forget: the drainer acks a message once it has been
//! handed over, whatever the sink does with it.

use std::sync::Mutex;

use bounty_store::OutboxMessage;

pub trait AuditSink: Send + Sync {
    fn publish(&self, message: &OutboxMessage);
}

/// Writes every event to the `audit` tracing target as JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn publish(&self, message: &OutboxMessage) {
        match serde_json::to_string(&message.event) {
            Ok(json) => tracing::info!(
                target: "audit",
                seq = message.seq,
                kind = message.event.kind(),
                at = message.created_at.as_secs(),
                event = %json,
                "audit event"
            ),
            Err(e) => tracing::warn!(
                target: "audit",
                seq = message.seq,
                error = %e,
                "audit event could not be encoded"
            ),
        }
    }
}

/// Keeps every published message in memory, for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<OutboxMessage>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<OutboxMessage> {
        self.lock().clone()
    }

    /// Event kinds in delivery order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.lock().iter().map(|m| m.event.kind()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<OutboxMessage>> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AuditSink for RecordingSink {
    fn publish(&self, message: &OutboxMessage) {
        self.lock().push(message.clone());
    }
}
