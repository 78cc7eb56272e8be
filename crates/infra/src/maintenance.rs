//! Operator tools: releasing stale claims and campaign archival.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use marquee_core::{CampaignId, TenantId, UserId};
use marquee_publishing::PublishingJob;

use crate::audit::{emit_best_effort, AuditRecord, AuditSink, ACTION_DEACTIVATE, ACTION_RELEASE_STALE};
use crate::error::PublishingError;
use crate::jobs::{JobStore, JobStoreError};

pub const STALE_CLAIM_REASON: &str = "released after stale claim";

/// Upper bound on jobs released per call.
const RELEASE_BATCH: usize = 100;

pub struct JobMaintenance {
    store: Arc<dyn JobStore>,
    audit: Arc<dyn AuditSink>,
}

impl JobMaintenance {
    pub fn new(store: Arc<dyn JobStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Return jobs stuck in `Processing` for longer than `older_than` to
    /// `Pending`. The retry count is left alone. `scope = None` covers every
    /// tenant (background sweep).
    pub fn release_stale_claims(
        &self,
        scope: Option<TenantId>,
        older_than: Duration,
        actor: Option<UserId>,
    ) -> Result<Vec<PublishingJob>, PublishingError> {
        let now = Utc::now();
        let older_than = chrono::Duration::from_std(older_than)
            .map_err(|_| PublishingError::validation("stale claim age out of range"))?;
        let cutoff = now - older_than;

        let stale = self.store.list_stale_processing(scope, cutoff, RELEASE_BATCH)?;
        let mut released = Vec::with_capacity(stale.len());

        for job_ref in stale {
            let result = self.store.release_if_stale(
                job_ref.tenant_id,
                job_ref.job_id,
                cutoff,
                STALE_CLAIM_REASON,
                now,
            );
            match result {
                Ok(Some(job)) => {
                    warn!(
                        tenant_id = %job.tenant_id,
                        job_id = %job.id,
                        claimed_at = ?job.processed_at,
                        "stale claim released"
                    );
                    emit_best_effort(
                        self.audit.as_ref(),
                        AuditRecord::for_job(&job, ACTION_RELEASE_STALE, actor, now),
                    );
                    released.push(job);
                }
                // Finished or re-claimed since listing.
                Ok(None) | Err(JobStoreError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        Ok(released)
    }

    /// Soft-delete every job of an archived campaign.
    pub fn deactivate_campaign_jobs(
        &self,
        tenant_id: TenantId,
        campaign_id: CampaignId,
        actor: Option<UserId>,
    ) -> Result<usize, PublishingError> {
        let now = Utc::now();
        let affected = self
            .store
            .list_by_status(tenant_id, None, usize::MAX)?
            .into_iter()
            .filter(|job| job.campaign_id == campaign_id && job.is_active)
            .collect::<Vec<_>>();

        let count = self.store.deactivate_campaign(tenant_id, campaign_id, now)?;

        for mut job in affected {
            job.deactivate(now);
            emit_best_effort(
                self.audit.as_ref(),
                AuditRecord::for_job(&job, ACTION_DEACTIVATE, actor, now),
            );
        }

        info!(tenant_id = %tenant_id, campaign_id = %campaign_id, count, "campaign jobs deactivated");
        Ok(count)
    }
}
