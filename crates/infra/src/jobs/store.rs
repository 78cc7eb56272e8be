//! Job storage: trait + in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use marquee_core::{CampaignId, DomainError, TenantId};
use marquee_publishing::{PublishingJob, PublishingJobId, PublishingStatus};

use super::types::{ClaimOutcome, JobRef, JobStats};

/// Persistent job store shared by every orchestrator instance.
///
/// Every single-job operation is tenant-scoped. The listing queries used by
/// the background loop span tenants and return [`JobRef`]s only.
///
/// `try_claim`, `update_if_status`, `complete_claim` and `release_if_stale`
/// are the only ways to change a job's status concurrently and must be
/// atomic compare-and-set operations against the stored status.
pub trait JobStore: Send + Sync {
    /// Persist a new job.
    fn insert(&self, job: PublishingJob) -> Result<PublishingJobId, JobStoreError>;

    /// Get a job by ID.
    fn get(&self, tenant_id: TenantId, job_id: PublishingJobId) -> Result<Option<PublishingJob>, JobStoreError>;

    /// Persist the result of a claim. Writes only while the stored job is
    /// still `Processing` under the claim taken at `claimed_at`, and keeps the
    /// stored `is_active`. Returns `false` when the claim was lost.
    fn complete_claim(&self, job: &PublishingJob, claimed_at: DateTime<Utc>) -> Result<bool, JobStoreError>;

    /// Overwrite a job only if its stored status is still `expected`.
    /// Returns `false` when another writer got there first.
    fn update_if_status(&self, job: &PublishingJob, expected: PublishingStatus) -> Result<bool, JobStoreError>;

    /// Atomically move a claimable job into `Processing`.
    fn try_claim(
        &self,
        tenant_id: TenantId,
        job_id: PublishingJobId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, JobStoreError>;

    /// Active `Pending` jobs that are unscheduled or due, oldest first.
    /// `tenant_id = None` spans all tenants.
    fn list_pending(
        &self,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRef>, JobStoreError>;

    /// Active `Pending` jobs whose schedule time has passed, earliest first.
    fn list_due_scheduled(
        &self,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRef>, JobStoreError>;

    /// `Processing` jobs claimed at or before `claimed_before`.
    fn list_stale_processing(
        &self,
        tenant_id: Option<TenantId>,
        claimed_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRef>, JobStoreError>;

    /// Return a job to `Pending` if it is still `Processing` and was claimed at
    /// or before `claimed_before`. `None` if the job moved on in the meantime.
    fn release_if_stale(
        &self,
        tenant_id: TenantId,
        job_id: PublishingJobId,
        claimed_before: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PublishingJob>, JobStoreError>;

    /// List a tenant's jobs, optionally filtered by status, newest first.
    fn list_by_status(
        &self,
        tenant_id: TenantId,
        status: Option<PublishingStatus>,
        limit: usize,
    ) -> Result<Vec<PublishingJob>, JobStoreError>;

    /// Soft-delete every job of a campaign. Returns how many were deactivated.
    fn deactivate_campaign(
        &self,
        tenant_id: TenantId,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<usize, JobStoreError>;

    /// Job counts per status.
    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(PublishingJobId),
    #[error("tenant isolation violation")]
    TenantIsolation,
    #[error("job already exists: {0}")]
    AlreadyExists(PublishingJobId),
    #[error("storage error: {0}")]
    Storage(String),
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn insert(&self, job: PublishingJob) -> Result<PublishingJobId, JobStoreError> {
        (**self).insert(job)
    }

    fn get(&self, tenant_id: TenantId, job_id: PublishingJobId) -> Result<Option<PublishingJob>, JobStoreError> {
        (**self).get(tenant_id, job_id)
    }

    fn complete_claim(&self, job: &PublishingJob, claimed_at: DateTime<Utc>) -> Result<bool, JobStoreError> {
        (**self).complete_claim(job, claimed_at)
    }

    fn update_if_status(&self, job: &PublishingJob, expected: PublishingStatus) -> Result<bool, JobStoreError> {
        (**self).update_if_status(job, expected)
    }

    fn try_claim(
        &self,
        tenant_id: TenantId,
        job_id: PublishingJobId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, JobStoreError> {
        (**self).try_claim(tenant_id, job_id, now)
    }

    fn list_pending(
        &self,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRef>, JobStoreError> {
        (**self).list_pending(tenant_id, now, limit)
    }

    fn list_due_scheduled(
        &self,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRef>, JobStoreError> {
        (**self).list_due_scheduled(tenant_id, now, limit)
    }

    fn list_stale_processing(
        &self,
        tenant_id: Option<TenantId>,
        claimed_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRef>, JobStoreError> {
        (**self).list_stale_processing(tenant_id, claimed_before, limit)
    }

    fn release_if_stale(
        &self,
        tenant_id: TenantId,
        job_id: PublishingJobId,
        claimed_before: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PublishingJob>, JobStoreError> {
        (**self).release_if_stale(tenant_id, job_id, claimed_before, reason, now)
    }

    fn list_by_status(
        &self,
        tenant_id: TenantId,
        status: Option<PublishingStatus>,
        limit: usize,
    ) -> Result<Vec<PublishingJob>, JobStoreError> {
        (**self).list_by_status(tenant_id, status, limit)
    }

    fn deactivate_campaign(
        &self,
        tenant_id: TenantId,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<usize, JobStoreError> {
        (**self).deactivate_campaign(tenant_id, campaign_id, now)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        (**self).stats(tenant_id)
    }
}

/// In-memory job store for tests/dev.
///
/// A single `RwLock` makes every compare-and-set trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<PublishingJobId, PublishingJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<PublishingJobId, PublishingJob>>, JobStoreError> {
        self.jobs
            .read()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<PublishingJobId, PublishingJob>>, JobStoreError> {
        self.jobs
            .write()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".to_string()))
    }
}

fn owned_by(job: &PublishingJob, tenant_id: TenantId) -> Result<(), JobStoreError> {
    if job.tenant_id == tenant_id {
        Ok(())
    } else {
        Err(JobStoreError::TenantIsolation)
    }
}

fn in_scope(job: &PublishingJob, tenant_id: Option<TenantId>) -> bool {
    tenant_id.is_none_or(|t| job.tenant_id == t)
}

/// Conditional saves never write `is_active`; only deactivation does.
fn replace_keeping_activity(stored: &mut PublishingJob, job: &PublishingJob) {
    let is_active = stored.is_active;
    *stored = job.clone();
    stored.is_active = is_active;
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: PublishingJob) -> Result<PublishingJobId, JobStoreError> {
        let mut jobs = self.write()?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, tenant_id: TenantId, job_id: PublishingJobId) -> Result<Option<PublishingJob>, JobStoreError> {
        let jobs = self.read()?;
        match jobs.get(&job_id) {
            Some(job) => {
                owned_by(job, tenant_id)?;
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    fn complete_claim(&self, job: &PublishingJob, claimed_at: DateTime<Utc>) -> Result<bool, JobStoreError> {
        let mut jobs = self.write()?;
        let stored = jobs.get_mut(&job.id).ok_or(JobStoreError::NotFound(job.id))?;
        owned_by(stored, job.tenant_id)?;
        if stored.status != PublishingStatus::Processing || stored.processed_at != Some(claimed_at) {
            return Ok(false);
        }
        replace_keeping_activity(stored, job);
        Ok(true)
    }

    fn update_if_status(&self, job: &PublishingJob, expected: PublishingStatus) -> Result<bool, JobStoreError> {
        let mut jobs = self.write()?;
        let stored = jobs.get_mut(&job.id).ok_or(JobStoreError::NotFound(job.id))?;
        owned_by(stored, job.tenant_id)?;
        if stored.status != expected {
            return Ok(false);
        }
        replace_keeping_activity(stored, job);
        Ok(true)
    }

    fn try_claim(
        &self,
        tenant_id: TenantId,
        job_id: PublishingJobId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, JobStoreError> {
        let mut jobs = self.write()?;
        let Some(job) = jobs.get_mut(&job_id) else {
            return Ok(ClaimOutcome::NotFound);
        };
        owned_by(job, tenant_id)?;

        match job.claim(now) {
            Ok(()) => Ok(ClaimOutcome::Claimed(job.clone())),
            Err(DomainError::Conflict(_)) => Ok(ClaimOutcome::AlreadyProcessing),
            Err(_) if !job.is_active => Ok(ClaimOutcome::Inactive),
            Err(_) => Ok(ClaimOutcome::NotClaimable(job.status)),
        }
    }

    fn list_pending(
        &self,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRef>, JobStoreError> {
        let jobs = self.read()?;
        let mut due: Vec<&PublishingJob> = jobs
            .values()
            .filter(|j| j.is_due(now) && in_scope(j, tenant_id))
            .collect();
        due.sort_by_key(|j| (j.eligible_since(), j.created_at, j.id));
        Ok(due.into_iter().take(limit).map(JobRef::of).collect())
    }

    fn list_due_scheduled(
        &self,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRef>, JobStoreError> {
        let jobs = self.read()?;
        let mut due: Vec<&PublishingJob> = jobs
            .values()
            .filter(|j| j.scheduled_at.is_some() && j.is_due(now) && in_scope(j, tenant_id))
            .collect();
        due.sort_by_key(|j| (j.scheduled_at, j.created_at, j.id));
        Ok(due.into_iter().take(limit).map(JobRef::of).collect())
    }

    fn list_stale_processing(
        &self,
        tenant_id: Option<TenantId>,
        claimed_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRef>, JobStoreError> {
        let jobs = self.read()?;
        let mut stale: Vec<&PublishingJob> = jobs
            .values()
            .filter(|j| {
                j.status == PublishingStatus::Processing
                    && j.processed_at.is_some_and(|at| at <= claimed_before)
                    && in_scope(j, tenant_id)
            })
            .collect();
        stale.sort_by_key(|j| (j.processed_at, j.id));
        Ok(stale.into_iter().take(limit).map(JobRef::of).collect())
    }

    fn release_if_stale(
        &self,
        tenant_id: TenantId,
        job_id: PublishingJobId,
        claimed_before: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PublishingJob>, JobStoreError> {
        let mut jobs = self.write()?;
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        owned_by(job, tenant_id)?;

        let stale = job.status == PublishingStatus::Processing
            && job.processed_at.is_some_and(|at| at <= claimed_before);
        if !stale {
            return Ok(None);
        }

        job.release_claim(reason, now)
            .map_err(|e| JobStoreError::Storage(e.to_string()))?;
        Ok(Some(job.clone()))
    }

    fn list_by_status(
        &self,
        tenant_id: TenantId,
        status: Option<PublishingStatus>,
        limit: usize,
    ) -> Result<Vec<PublishingJob>, JobStoreError> {
        let jobs = self.read()?;
        let mut result: Vec<PublishingJob> = jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id && status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        result.truncate(limit);
        Ok(result)
    }

    fn deactivate_campaign(
        &self,
        tenant_id: TenantId,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<usize, JobStoreError> {
        let mut jobs = self.write()?;
        let mut count = 0;
        for job in jobs.values_mut() {
            if job.tenant_id == tenant_id && job.campaign_id == campaign_id && job.is_active {
                job.deactivate(now);
                count += 1;
            }
        }
        Ok(count)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        let jobs = self.read()?;
        let mut stats = JobStats::default();
        for job in jobs.values().filter(|j| j.tenant_id == tenant_id) {
            stats.count(job);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use proptest::prelude::*;

    use super::*;
    use marquee_publishing::{Channel, RetryPolicy};

    fn job(tenant: TenantId, created_at: DateTime<Utc>) -> PublishingJob {
        PublishingJob::new(tenant, CampaignId::new(), Channel::manual(), created_at)
    }

    #[test]
    fn insert_and_claim() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let now = Utc::now();

        let job_id = store.insert(job(tenant, now)).unwrap();

        let outcome = store.try_claim(tenant, job_id, now).unwrap();
        let ClaimOutcome::Claimed(claimed) = outcome else {
            panic!("expected claim, got {outcome:?}");
        };
        assert_eq!(claimed.status, PublishingStatus::Processing);

        // Second claim loses.
        assert_eq!(
            store.try_claim(tenant, job_id, now).unwrap(),
            ClaimOutcome::AlreadyProcessing
        );
    }

    #[test]
    fn tenant_isolation() {
        let store = InMemoryJobStore::new();
        let tenant1 = TenantId::new();
        let tenant2 = TenantId::new();

        let job_id = store.insert(job(tenant1, Utc::now())).unwrap();

        assert!(matches!(store.get(tenant2, job_id), Err(JobStoreError::TenantIsolation)));
        assert!(matches!(
            store.try_claim(tenant2, job_id, Utc::now()),
            Err(JobStoreError::TenantIsolation)
        ));
        assert!(store.list_by_status(tenant2, None, 10).unwrap().is_empty());
        assert!(store.list_pending(Some(tenant2), Utc::now(), 10).unwrap().is_empty());
        assert_eq!(store.list_pending(Some(tenant1), Utc::now(), 10).unwrap().len(), 1);
    }

    #[test]
    fn pending_listing_is_ordered_bounded_and_skips_future_jobs() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let now = Utc::now();

        let mut ids = Vec::new();
        for i in 0..5 {
            let j = job(tenant, now - Duration::minutes(10 - i));
            ids.push(store.insert(j).unwrap());
        }
        let future = job(tenant, now - Duration::hours(1)).scheduled_for(Some(now + Duration::minutes(5)));
        store.insert(future).unwrap();

        let listed = store.list_pending(None, now, 3).unwrap();
        assert_eq!(
            listed.iter().map(|r| r.job_id).collect::<Vec<_>>(),
            ids[..3].to_vec()
        );
        assert_eq!(store.list_pending(None, now, 100).unwrap().len(), 5);
    }

    #[test]
    fn due_scheduled_listing_only_returns_passed_schedules() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let now = Utc::now();

        store.insert(job(tenant, now)).unwrap();
        let due_id = store
            .insert(job(tenant, now).scheduled_for(Some(now - Duration::seconds(1))))
            .unwrap();
        store
            .insert(job(tenant, now).scheduled_for(Some(now + Duration::minutes(1))))
            .unwrap();

        let listed = store.list_due_scheduled(None, now, 10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].job_id, due_id);
    }

    #[test]
    fn conditional_update_detects_concurrent_change() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let j = job(tenant, Utc::now());
        store.insert(j.clone()).unwrap();

        assert!(store.update_if_status(&j, PublishingStatus::Pending).unwrap());
        assert!(!store.update_if_status(&j, PublishingStatus::RequiresApproval).unwrap());
    }

    #[test]
    fn completing_a_claim_keeps_a_concurrent_deactivation() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let now = Utc::now();
        let j = job(tenant, now);
        let campaign = j.campaign_id;
        let id = store.insert(j).unwrap();

        let ClaimOutcome::Claimed(mut claimed) = store.try_claim(tenant, id, now).unwrap() else {
            panic!("expected claim");
        };
        assert_eq!(store.deactivate_campaign(tenant, campaign, now).unwrap(), 1);

        claimed.release_claim("retry later", now).unwrap();
        assert!(store.complete_claim(&claimed, now).unwrap());

        let stored = store.get(tenant, id).unwrap().unwrap();
        assert_eq!(stored.status, PublishingStatus::Pending);
        assert!(!stored.is_active);
        assert!(store.list_pending(None, now, 10).unwrap().is_empty());
    }

    #[test]
    fn completing_a_superseded_claim_is_refused() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let first_claim = Utc::now() - Duration::hours(1);
        let second_claim = Utc::now();
        let id = store.insert(job(tenant, first_claim)).unwrap();

        let ClaimOutcome::Claimed(mut stale) = store.try_claim(tenant, id, first_claim).unwrap() else {
            panic!("expected claim");
        };
        store
            .release_if_stale(tenant, id, second_claim, "released", second_claim)
            .unwrap()
            .unwrap();
        let ClaimOutcome::Claimed(mut current) = store.try_claim(tenant, id, second_claim).unwrap() else {
            panic!("expected second claim");
        };
        current
            .record_failure("rejected", false, &RetryPolicy::default(), second_claim)
            .unwrap();
        assert!(store.complete_claim(&current, second_claim).unwrap());

        stale.release_claim("late result", second_claim).unwrap();
        assert!(!store.complete_claim(&stale, first_claim).unwrap());
        let stored = store.get(tenant, id).unwrap().unwrap();
        assert_eq!(stored.status, PublishingStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("rejected"));
    }

    #[test]
    fn stale_release_only_touches_old_claims() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let now = Utc::now();

        let old_id = store.insert(job(tenant, now)).unwrap();
        let fresh_id = store.insert(job(tenant, now)).unwrap();
        store.try_claim(tenant, old_id, now - Duration::hours(1)).unwrap();
        store.try_claim(tenant, fresh_id, now).unwrap();

        let cutoff = now - Duration::minutes(15);
        let stale = store.list_stale_processing(None, cutoff, 10).unwrap();
        assert_eq!(stale, vec![JobRef { tenant_id: tenant, job_id: old_id }]);

        let released = store
            .release_if_stale(tenant, old_id, cutoff, "released", now)
            .unwrap()
            .unwrap();
        assert_eq!(released.status, PublishingStatus::Pending);
        assert!(store.release_if_stale(tenant, fresh_id, cutoff, "released", now).unwrap().is_none());
    }

    #[test]
    fn deactivated_jobs_disappear_from_listing_and_claims() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let now = Utc::now();
        let j = job(tenant, now);
        let campaign = j.campaign_id;
        let id = store.insert(j).unwrap();
        store.insert(job(tenant, now)).unwrap();

        assert_eq!(store.deactivate_campaign(tenant, campaign, now).unwrap(), 1);
        assert_eq!(store.list_pending(None, now, 10).unwrap().len(), 1);
        assert_eq!(store.try_claim(tenant, id, now).unwrap(), ClaimOutcome::Inactive);

        let stats = store.stats(tenant).unwrap();
        assert_eq!(stats.inactive, 1);
        assert_eq!(stats.pending, 1);
    }

    proptest! {
        #[test]
        fn pending_listing_is_sorted_and_capped(
            offsets in prop::collection::vec(-600i64..600, 0..20),
            limit in 1usize..10,
        ) {
            let store = InMemoryJobStore::new();
            let tenant = TenantId::new();
            let now = Utc::now();

            for offset in &offsets {
                let scheduled = now + Duration::minutes(*offset);
                store.insert(job(tenant, now - Duration::days(1)).scheduled_for(Some(scheduled))).unwrap();
            }

            let listed = store.list_pending(None, now, limit).unwrap();
            let due = offsets.iter().filter(|o| **o <= 0).count();
            prop_assert_eq!(listed.len(), due.min(limit));

            let times: Vec<DateTime<Utc>> = listed
                .iter()
                .map(|r| store.get(tenant, r.job_id).unwrap().unwrap().eligible_since())
                .collect();
            prop_assert!(times.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
