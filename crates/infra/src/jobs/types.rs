//! Store-facing job types.

use serde::Serialize;

use marquee_core::TenantId;
use marquee_publishing::{PublishingJob, PublishingJobId, PublishingStatus};

/// Tenant-qualified job reference, as returned by the listing queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct JobRef {
    pub tenant_id: TenantId,
    pub job_id: PublishingJobId,
}

impl JobRef {
    pub fn of(job: &PublishingJob) -> Self {
        Self {
            tenant_id: job.tenant_id,
            job_id: job.id,
        }
    }
}

/// Result of an atomic claim attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The job is now `Processing` and owned by the caller.
    Claimed(PublishingJob),
    /// Another execution holds the job.
    AlreadyProcessing,
    /// The job exists but its status does not allow a claim.
    NotClaimable(PublishingStatus),
    /// The job was deactivated.
    Inactive,
    /// No such job under the tenant.
    NotFound,
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed(_))
    }
}

/// Per-tenant job counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub processing: usize,
    pub requires_approval: usize,
    pub success: usize,
    pub failed: usize,
    pub inactive: usize,
}

impl JobStats {
    pub fn count(&mut self, job: &PublishingJob) {
        if !job.is_active {
            self.inactive += 1;
            return;
        }
        match job.status {
            PublishingStatus::Pending => self.pending += 1,
            PublishingStatus::Processing => self.processing += 1,
            PublishingStatus::RequiresApproval => self.requires_approval += 1,
            PublishingStatus::Success => self.success += 1,
            PublishingStatus::Failed => self.failed += 1,
        }
    }
}
