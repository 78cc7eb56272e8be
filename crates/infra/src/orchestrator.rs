//! Publishing orchestrator: claim → adapter → transition → persist → audit.
//!
//! One [`PublishingOrchestrator::process_job`] call owns a job from a
//! successful claim until its final state is persisted. It never panics on a
//! bad job: adapter errors, adapter panics, timeouts and payload decoding
//! failures are all recorded on the job as a retryable failure.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use marquee_core::{DomainError, TenantId, UserId};
use marquee_publishing::{
    AdapterError, AdapterRegistry, ChannelAdapter, PublishingJob, PublishingJobId, PublishingStatus,
    ResolvedAdapter, RetryPolicy,
};

use crate::audit::{emit_best_effort, AuditRecord, AuditSink, ACTION_PROCESS};
use crate::config::OrchestratorConfig;
use crate::error::PublishingError;
use crate::jobs::{ClaimOutcome, JobRef, JobStore};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(120);

const PUBLISH_FAILED: &str = "publish failed without an error message";

/// Why a job was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum SkipReason {
    AlreadyProcessing,
    NotClaimable { status: PublishingStatus },
    Inactive,
    /// The claim was released or superseded while the adapter ran; the
    /// result was discarded.
    ClaimLost,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Skipped(SkipReason),
    /// Claimed and driven to a persisted state.
    Finished(PublishingJob),
}

/// Per-batch counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub published: usize,
    pub awaiting_approval: usize,
    pub retry_scheduled: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.published + self.awaiting_approval + self.retry_scheduled + self.failed
    }

    fn count(&mut self, outcome: &Result<ProcessOutcome, PublishingError>) {
        match outcome {
            Ok(ProcessOutcome::Skipped(_)) => self.skipped += 1,
            Ok(ProcessOutcome::Finished(job)) => match job.status {
                PublishingStatus::Success => self.published += 1,
                PublishingStatus::RequiresApproval => self.awaiting_approval += 1,
                PublishingStatus::Pending => self.retry_scheduled += 1,
                PublishingStatus::Failed => self.failed += 1,
                PublishingStatus::Processing => self.errors += 1,
            },
            Err(_) => self.errors += 1,
        }
    }
}

/// Unexpected failure while driving a claimed job.
#[derive(Debug, thiserror::Error)]
enum DriveError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("payload could not be decoded: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("adapter call timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("adapter panicked: {0}")]
    Panicked(String),
    #[error("could not start adapter call: {0}")]
    Spawn(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub struct PublishingOrchestrator {
    store: Arc<dyn JobStore>,
    adapters: Arc<AdapterRegistry>,
    audit: Arc<dyn AuditSink>,
    policy: RetryPolicy,
    job_timeout: Option<Duration>,
    batch_size: usize,
}

impl PublishingOrchestrator {
    pub fn new(store: Arc<dyn JobStore>, adapters: Arc<AdapterRegistry>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            adapters,
            audit,
            policy: RetryPolicy::default(),
            job_timeout: Some(DEFAULT_JOB_TIMEOUT),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// `None` waits for adapters indefinitely.
    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Apply the batch size and job timeout from worker configuration.
    pub fn configured(self, config: &OrchestratorConfig) -> Self {
        self.with_batch_size(config.batch_size)
            .with_job_timeout(config.job_timeout)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Up to one batch of due `Pending` jobs, oldest first.
    pub fn list_pending_job_ids(&self, tenant_id: Option<TenantId>) -> Result<Vec<JobRef>, PublishingError> {
        Ok(self.store.list_pending(tenant_id, Utc::now(), self.batch_size)?)
    }

    /// Up to one batch of `Pending` jobs whose schedule time has passed.
    pub fn list_due_scheduled_job_ids(&self, tenant_id: Option<TenantId>) -> Result<Vec<JobRef>, PublishingError> {
        Ok(self.store.list_due_scheduled(tenant_id, Utc::now(), self.batch_size)?)
    }

    pub fn process_job(
        &self,
        tenant_id: TenantId,
        job_id: PublishingJobId,
        actor: Option<UserId>,
    ) -> Result<ProcessOutcome, PublishingError> {
        self.process_job_at(tenant_id, job_id, actor, Utc::now())
    }

    /// Process one job as of `now` (claim time, transition time and backoff base).
    pub fn process_job_at(
        &self,
        tenant_id: TenantId,
        job_id: PublishingJobId,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, PublishingError> {
        let mut job = match self.store.try_claim(tenant_id, job_id, now)? {
            ClaimOutcome::Claimed(job) => job,
            ClaimOutcome::NotFound => {
                return Err(PublishingError::not_found(format!("publishing job {job_id}")));
            }
            other => {
                let reason = match other {
                    ClaimOutcome::AlreadyProcessing => SkipReason::AlreadyProcessing,
                    ClaimOutcome::NotClaimable(status) => SkipReason::NotClaimable { status },
                    _ => SkipReason::Inactive,
                };
                debug!(tenant_id = %tenant_id, job_id = %job_id, reason = ?reason, "claim skipped");
                return Ok(ProcessOutcome::Skipped(reason));
            }
        };

        let claimed_at = job.processed_at.unwrap_or(now);
        debug!(
            tenant_id = %tenant_id,
            job_id = %job_id,
            channel = %job.channel,
            retry_count = job.retry_count,
            "job claimed"
        );

        if let Err(err) = self.drive(&mut job, now) {
            error!(
                tenant_id = %tenant_id,
                job_id = %job_id,
                channel = %job.channel,
                error = %err,
                "unexpected failure while processing job"
            );
            job.record_failure(err.to_string(), true, &self.policy, now)?;
        }

        if !self.store.complete_claim(&job, claimed_at)? {
            warn!(
                tenant_id = %tenant_id,
                job_id = %job_id,
                channel = %job.channel,
                discarded_status = %job.status,
                "claim lost before completion; result discarded"
            );
            return Ok(ProcessOutcome::Skipped(SkipReason::ClaimLost));
        }
        log_outcome(&job);
        emit_best_effort(self.audit.as_ref(), AuditRecord::for_job(&job, ACTION_PROCESS, actor, now));

        Ok(ProcessOutcome::Finished(job))
    }

    /// Process `refs` in order, checking `should_stop` between jobs only.
    pub fn process_batch(&self, refs: &[JobRef], should_stop: &dyn Fn() -> bool) -> BatchReport {
        let mut report = BatchReport::default();
        for job_ref in refs {
            if should_stop() {
                break;
            }
            let outcome = self.process_job(job_ref.tenant_id, job_ref.job_id, None);
            if let Err(err) = &outcome {
                error!(
                    tenant_id = %job_ref.tenant_id,
                    job_id = %job_ref.job_id,
                    error = %err,
                    "job processing failed"
                );
            }
            report.count(&outcome);
        }
        report
    }

    fn drive(&self, job: &mut PublishingJob, now: DateTime<Utc>) -> Result<(), DriveError> {
        let resolved = self.adapters.resolve(&job.channel);
        let payload = job.payload_or_snapshot()?;

        if job.requires_approval || resolved.is_manual() {
            let package = self.call_adapter(&resolved, move |adapter| adapter.generate_package(&payload))?;
            job.mark_requires_approval(&package, now)?;
            return Ok(());
        }

        let scheduled_at = job.scheduled_at;
        let result = self.call_adapter(&resolved, move |adapter| adapter.publish(&payload, scheduled_at))?;
        if result.success {
            job.mark_published(&result, now)?;
        } else {
            let message = result.error_message.unwrap_or_else(|| PUBLISH_FAILED.to_string());
            job.record_failure(message, result.is_transient_error, &self.policy, now)?;
        }
        Ok(())
    }

    /// Run an adapter call, bounded by the job timeout when one is set.
    ///
    /// A timed-out call keeps running on its helper thread; its result is
    /// dropped.
    fn call_adapter<T, F>(&self, resolved: &ResolvedAdapter, call: F) -> Result<T, DriveError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ChannelAdapter) -> Result<T, AdapterError> + Send + 'static,
    {
        let adapter = Arc::clone(&resolved.adapter);

        let Some(timeout) = self.job_timeout else {
            return match panic::catch_unwind(AssertUnwindSafe(|| call(adapter.as_ref()))) {
                Ok(result) => Ok(result?),
                Err(panic) => Err(DriveError::Panicked(panic_message(panic.as_ref()))),
            };
        };

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name(format!("adapter-{}", adapter.channel()))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| call(adapter.as_ref())));
                let _ = tx.send(outcome.map_err(|panic| panic_message(panic.as_ref())));
            })
            .map_err(|e| DriveError::Spawn(e.to_string()))?;

        match rx.recv_timeout(timeout) {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(message)) => Err(DriveError::Panicked(message)),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(DriveError::Timeout(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(DriveError::Panicked("adapter call ended without a result".to_string()))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn log_outcome(job: &PublishingJob) {
    match job.status {
        PublishingStatus::Success => info!(
            tenant_id = %job.tenant_id,
            job_id = %job.id,
            channel = %job.channel,
            published_url = ?job.published_url,
            "job published"
        ),
        PublishingStatus::RequiresApproval => info!(
            tenant_id = %job.tenant_id,
            job_id = %job.id,
            channel = %job.channel,
            "job packaged; awaiting approval"
        ),
        PublishingStatus::Pending => warn!(
            tenant_id = %job.tenant_id,
            job_id = %job.id,
            channel = %job.channel,
            retry_count = job.retry_count,
            next_attempt_at = ?job.scheduled_at,
            error = ?job.error_message,
            "retry scheduled"
        ),
        PublishingStatus::Failed => info!(
            tenant_id = %job.tenant_id,
            job_id = %job.id,
            channel = %job.channel,
            retry_count = job.retry_count,
            error = ?job.error_message,
            "job failed"
        ),
        PublishingStatus::Processing => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_messages_are_extracted() {
        let caught = panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "boom 1");

        let caught = panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "static");
    }

    #[test]
    fn report_counts_by_final_status() {
        let mut report = BatchReport::default();
        report.count(&Ok(ProcessOutcome::Skipped(SkipReason::AlreadyProcessing)));
        report.count(&Err(PublishingError::not_found("job")));
        assert_eq!(report.skipped, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(report.processed(), 0);
    }

    #[test]
    fn timeout_error_message_names_duration() {
        let err = DriveError::Timeout(Duration::from_secs(3));
        assert_eq!(err.to_string(), "adapter call timed out after 3s");
    }
}
