//! Audit trail of authorization decisions.
//!
//! Every decision, whatever its source, produces one [`AuditRecord`] handed
//! to an [`AuditSink`]. Sinks are fire-and-forget: they return nothing and
//! must not block, so recording can never fail or delay a decision.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::authz::types::{DecisionSource, PermissionCheck};
use crate::observability::metrics;

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub check: PermissionCheck,
    pub allowed: bool,
    pub source: DecisionSource,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub duration: Duration,
}

impl AuditRecord {
    pub fn new(check: PermissionCheck, allowed: bool, source: DecisionSource, duration: Duration) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            id: Uuid::new_v4(),
            check,
            allowed,
            source,
            timestamp,
            duration,
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Writes records as structured events on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        tracing::info!(
            target: "audit",
            event = "authorization_decision",
            id = %record.id,
            subject = record.check.subject(),
            action = %record.check.action(),
            resource = %record.check.resource(),
            allowed = record.allowed,
            source = record.source.as_str(),
            timestamp = record.timestamp,
            duration_ms = record.duration.as_secs_f64() * 1000.0
        );
    }
}

/// Forwards records over a bounded channel, dropping them when it is full.
#[derive(Debug)]
pub struct ChannelAuditSink {
    tx: mpsc::Sender<AuditRecord>,
    dropped: AtomicU64,
}

impl ChannelAuditSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AuditRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, record: &AuditRecord) {
        if self.tx.try_send(record.clone()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::record_audit_dropped();
        }
    }
}
