//! Audit side-channel.
//!
//! Every job transition emits one [`AuditRecord`]. Emission is best-effort:
//! a failing or panicking sink is logged and ignored, it never fails the
//! transition that produced the record.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use marquee_core::{TenantId, UserId};
use marquee_publishing::PublishingJob;

pub const ENTITY_TYPE: &str = "PublishingJob";

pub const ACTION_GENERATE: &str = "GeneratePublishingJob";
pub const ACTION_PROCESS: &str = "ProcessPublishingJob";
pub const ACTION_APPROVE: &str = "ApprovePublishingJob";
pub const ACTION_RELEASE_STALE: &str = "ReleaseStalePublishingJob";
pub const ACTION_DEACTIVATE: &str = "DeactivatePublishingJob";

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub tenant_id: TenantId,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub actor_id: Option<UserId>,
    pub result_status: String,
    pub error_message: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Record for a job in its post-transition state.
    pub fn for_job(job: &PublishingJob, action: &str, actor_id: Option<UserId>, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id: job.tenant_id,
            action: action.to_string(),
            entity_type: ENTITY_TYPE.to_string(),
            entity_id: job.id.to_string(),
            actor_id,
            result_status: job.status.as_str().to_string(),
            error_message: job.error_message.clone(),
            recorded_at: now,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
    #[error("audit record rejected: {0}")]
    Rejected(String),
}

/// Audit/Log sink collaborator.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord) -> Result<(), AuditError>;

    /// Block until previously recorded entries are durable. No-op for
    /// synchronous sinks.
    fn flush(&self) {}
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        (**self).record(record)
    }

    fn flush(&self) {
        (**self).flush()
    }
}

/// Emit a record, logging and swallowing any sink failure or panic.
pub fn emit_best_effort(sink: &dyn AuditSink, record: AuditRecord) {
    let action = record.action.clone();
    let entity_id = record.entity_id.clone();

    match panic::catch_unwind(AssertUnwindSafe(|| sink.record(record))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(action = %action, entity_id = %entity_id, error = %err, "audit emission failed");
        }
        Err(_) => {
            warn!(action = %action, entity_id = %entity_id, "audit sink panicked");
        }
    }
}

/// Collects records in memory (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn actions_for(&self, entity_id: &str) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| r.entity_id == entity_id)
            .map(|r| r.action)
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records
            .lock()
            .map_err(|_| AuditError::Unavailable("audit buffer lock poisoned".to_string()))?
            .push(record);
        Ok(())
    }
}

/// Writes records to the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        info!(
            target: "audit",
            tenant_id = %record.tenant_id,
            action = %record.action,
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            actor_id = ?record.actor_id,
            result_status = %record.result_status,
            error = ?record.error_message,
            "audit"
        );
        Ok(())
    }
}

enum Msg {
    Record(AuditRecord),
    Flush(mpsc::Sender<()>),
    Stop,
}

/// Forwards records to another sink on a dedicated thread.
///
/// `record` only enqueues. `flush` waits (bounded) until everything enqueued
/// before it has been handed to the inner sink. Dropping the sink drains the
/// queue and joins the thread.
pub struct BackgroundAuditSink {
    tx: mpsc::Sender<Msg>,
    join: Mutex<Option<thread::JoinHandle<()>>>,
}

impl std::fmt::Debug for BackgroundAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundAuditSink").finish_non_exhaustive()
    }
}

impl BackgroundAuditSink {
    pub fn spawn(inner: Arc<dyn AuditSink>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Msg>();

        let join = thread::Builder::new()
            .name("audit-dispatch".to_string())
            .spawn(move || dispatch_loop(inner, rx))?;

        Ok(Self {
            tx,
            join: Mutex::new(Some(join)),
        })
    }
}

fn dispatch_loop(inner: Arc<dyn AuditSink>, rx: mpsc::Receiver<Msg>) {
    for msg in rx {
        match msg {
            Msg::Record(record) => emit_best_effort(inner.as_ref(), record),
            Msg::Flush(ack) => {
                inner.flush();
                let _ = ack.send(());
            }
            Msg::Stop => break,
        }
    }
    inner.flush();
    debug!("audit dispatch stopped");
}

impl AuditSink for BackgroundAuditSink {
    fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.tx
            .send(Msg::Record(record))
            .map_err(|_| AuditError::Unavailable("audit dispatch thread stopped".to_string()))
    }

    fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.tx.send(Msg::Flush(ack_tx)).is_err() {
            return;
        }
        if ack_rx.recv_timeout(FLUSH_TIMEOUT).is_err() {
            warn!(timeout_secs = FLUSH_TIMEOUT.as_secs(), "audit flush timed out");
        }
    }
}

impl Drop for BackgroundAuditSink {
    fn drop(&mut self) {
        let _ = self.tx.send(Msg::Stop);
        if let Ok(mut join) = self.join.lock()
            && let Some(j) = join.take()
        {
            let _ = j.join();
        }
    }
}
