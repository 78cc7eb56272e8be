//! Postgres-backed job store.
//!
//! Every state change that can race (claim, conditional update, stale
//! release) is a single conditional `UPDATE ... RETURNING`, so two
//! orchestrator instances sharing the table cannot both win a claim.
//!
//! ## Runtime
//!
//! The [`JobStore`] trait is synchronous. The inherent async methods do the
//! work; the trait impl drives them with `block_on` on the runtime handle
//! captured at construction. Call the trait methods from plain threads (the
//! orchestrator worker) or from `spawn_blocking`, never from inside an async
//! task.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tokio::runtime::Handle;
use tracing::{instrument, Span};
use uuid::Uuid;

use marquee_core::{AssetPromptId, CampaignId, CopyId, MarketingPackId, TenantId, UserId};
use marquee_publishing::{Channel, PublishingJob, PublishingJobId, PublishingStatus};

use super::store::{JobStore, JobStoreError};
use super::types::{ClaimOutcome, JobRef, JobStats};

const SCHEMA: &str = include_str!("../../migrations/0001_publishing_jobs.sql");

const JOB_COLUMNS: &str = "id, tenant_id, campaign_id, marketing_pack_id, generated_copy_id, asset_prompt_id, \
     channel, copy_text, hashtags, media_url, scheduled_at, processed_at, status, retry_count, \
     max_retries, error_message, requires_approval, approved_at, approved_by, published_at, \
     published_url, external_post_id, payload, package, is_active, created_at, updated_at";

/// Stored state a conditional save must still see.
#[derive(Debug, Clone, Copy)]
enum SaveGuard {
    Status(PublishingStatus),
    /// Still `Processing` under the claim taken at this instant.
    Claim(DateTime<Utc>),
}

/// Postgres-backed [`JobStore`].
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
    runtime: Handle,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool, runtime: Handle) -> Self {
        Self {
            pool: Arc::new(pool),
            runtime,
        }
    }

    /// Create the table and indexes if missing.
    pub async fn migrate(&self) -> Result<(), JobStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    #[instrument(skip(self, job), fields(tenant_id = %job.tenant_id, job_id = %job.id), err)]
    pub async fn insert_job(&self, job: &PublishingJob) -> Result<PublishingJobId, JobStoreError> {
        let sql = format!(
            "INSERT INTO publishing_jobs ({JOB_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, \
              $20, $21, $22, $23, $24, $25, $26, $27)"
        );

        bind_job(sqlx::query(&sql), job)
            .execute(&*self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => JobStoreError::AlreadyExists(job.id),
                other => map_sqlx_error("insert_job", other),
            })?;

        Ok(job.id)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, job_id = %job_id), err)]
    pub async fn load_job(
        &self,
        tenant_id: TenantId,
        job_id: PublishingJobId,
    ) -> Result<Option<PublishingJob>, JobStoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM publishing_jobs WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_job", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let job = job_from_row(&row)?;
        if job.tenant_id != tenant_id {
            return Err(JobStoreError::TenantIsolation);
        }
        Ok(Some(job))
    }

    /// Overwrite the mutable columns if the stored row still matches `guard`.
    /// `is_active` is left alone; only campaign deactivation writes it.
    #[instrument(skip(self, job), fields(tenant_id = %job.tenant_id, job_id = %job.id, status = %job.status), err)]
    async fn save_job(&self, job: &PublishingJob, guard: SaveGuard) -> Result<bool, JobStoreError> {
        let (expected, claimed_at) = match guard {
            SaveGuard::Status(status) => (status, None),
            SaveGuard::Claim(claimed_at) => (PublishingStatus::Processing, Some(claimed_at)),
        };
        let result = sqlx::query(
            r#"
            UPDATE publishing_jobs SET
                marketing_pack_id = $3, generated_copy_id = $4, asset_prompt_id = $5,
                channel = $6, copy_text = $7, hashtags = $8, media_url = $9,
                scheduled_at = $10, processed_at = $11, status = $12, retry_count = $13,
                max_retries = $14, error_message = $15, requires_approval = $16,
                approved_at = $17, approved_by = $18, published_at = $19, published_url = $20,
                external_post_id = $21, payload = $22, package = $23, updated_at = $24
            WHERE tenant_id = $1 AND id = $2 AND status = $25
              AND ($26::TIMESTAMPTZ IS NULL OR processed_at = $26)
            "#,
        )
        .bind(job.tenant_id.as_uuid())
        .bind(job.id.as_uuid())
        .bind(job.marketing_pack_id.map(|id| *id.as_uuid()))
        .bind(job.generated_copy_id.map(|id| *id.as_uuid()))
        .bind(job.asset_prompt_id.map(|id| *id.as_uuid()))
        .bind(job.channel.as_str())
        .bind(&job.copy_text)
        .bind(&job.hashtags)
        .bind(&job.media_url)
        .bind(job.scheduled_at)
        .bind(job.processed_at)
        .bind(job.status.as_str())
        .bind(to_i32(job.retry_count))
        .bind(to_i32(job.max_retries))
        .bind(&job.error_message)
        .bind(job.requires_approval)
        .bind(job.approved_at)
        .bind(job.approved_by.map(|id| *id.as_uuid()))
        .bind(job.published_at)
        .bind(&job.published_url)
        .bind(&job.external_post_id)
        .bind(&job.payload)
        .bind(&job.package)
        .bind(job.updated_at)
        .bind(expected.as_str())
        .bind(claimed_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_job", e))?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        self.ensure_exists(job.tenant_id, job.id).await.map(|_| false)
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, job_id = %job_id, claimed = tracing::field::Empty),
        err
    )]
    pub async fn claim_job(
        &self,
        tenant_id: TenantId,
        job_id: PublishingJobId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, JobStoreError> {
        let span = Span::current();

        let sql = format!(
            "UPDATE publishing_jobs \
             SET status = 'Processing', processed_at = $3, updated_at = $3 \
             WHERE tenant_id = $1 AND id = $2 AND is_active AND status IN ('Pending', 'Failed') \
             RETURNING {JOB_COLUMNS}"
        );
        let claimed = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(job_id.as_uuid())
            .bind(now)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("claim_job", e))?;

        span.record("claimed", claimed.is_some());
        if let Some(row) = claimed {
            return Ok(ClaimOutcome::Claimed(job_from_row(&row)?));
        }

        // Lost the claim: classify why.
        let outcome = match self.load_job(tenant_id, job_id).await? {
            None => ClaimOutcome::NotFound,
            Some(job) if job.status == PublishingStatus::Processing => ClaimOutcome::AlreadyProcessing,
            Some(job) if !job.is_active => ClaimOutcome::Inactive,
            Some(job) => ClaimOutcome::NotClaimable(job.status),
        };
        Ok(outcome)
    }

    #[instrument(skip(self), err)]
    pub async fn pending_refs(
        &self,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
        limit: usize,
        scheduled_only: bool,
    ) -> Result<Vec<JobRef>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, id FROM publishing_jobs
            WHERE status = 'Pending' AND is_active
              AND (scheduled_at IS NULL OR scheduled_at <= $1)
              AND (NOT $3 OR scheduled_at IS NOT NULL)
              AND ($4::UUID IS NULL OR tenant_id = $4)
            ORDER BY COALESCE(scheduled_at, created_at) ASC, created_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(to_limit(limit))
        .bind(scheduled_only)
        .bind(tenant_id.map(|t| *t.as_uuid()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("pending_refs", e))?;

        rows.iter().map(ref_from_row).collect()
    }

    #[instrument(skip(self), err)]
    pub async fn stale_refs(
        &self,
        tenant_id: Option<TenantId>,
        claimed_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRef>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, id FROM publishing_jobs
            WHERE status = 'Processing' AND processed_at <= $1
              AND ($2::UUID IS NULL OR tenant_id = $2)
            ORDER BY processed_at ASC, id ASC
            LIMIT $3
            "#,
        )
        .bind(claimed_before)
        .bind(tenant_id.map(|t| *t.as_uuid()))
        .bind(to_limit(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stale_refs", e))?;

        rows.iter().map(ref_from_row).collect()
    }

    #[instrument(skip(self, reason), fields(tenant_id = %tenant_id, job_id = %job_id), err)]
    pub async fn release_stale(
        &self,
        tenant_id: TenantId,
        job_id: PublishingJobId,
        claimed_before: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PublishingJob>, JobStoreError> {
        let sql = format!(
            "UPDATE publishing_jobs \
             SET status = 'Pending', error_message = $4, updated_at = $5 \
             WHERE tenant_id = $1 AND id = $2 AND status = 'Processing' AND processed_at <= $3 \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(job_id.as_uuid())
            .bind(claimed_before)
            .bind(reason)
            .bind(now)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("release_stale", e))?;

        match row {
            Some(row) => Ok(Some(job_from_row(&row)?)),
            None => self.ensure_exists(tenant_id, job_id).await.map(|_| None),
        }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn jobs_by_status(
        &self,
        tenant_id: TenantId,
        status: Option<PublishingStatus>,
        limit: usize,
    ) -> Result<Vec<PublishingJob>, JobStoreError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM publishing_jobs \
             WHERE tenant_id = $1 AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY created_at DESC, id DESC LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(status.map(|s| s.as_str()))
            .bind(to_limit(limit))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("jobs_by_status", e))?;

        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, campaign_id = %campaign_id), err)]
    pub async fn deactivate_campaign_jobs(
        &self,
        tenant_id: TenantId,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<usize, JobStoreError> {
        let result = sqlx::query(
            "UPDATE publishing_jobs SET is_active = FALSE, updated_at = $3 \
             WHERE tenant_id = $1 AND campaign_id = $2 AND is_active",
        )
        .bind(tenant_id.as_uuid())
        .bind(campaign_id.as_uuid())
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("deactivate_campaign_jobs", e))?;

        Ok(result.rows_affected() as usize)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn job_stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        let rows = sqlx::query(
            "SELECT status, is_active, COUNT(*) AS n FROM publishing_jobs \
             WHERE tenant_id = $1 GROUP BY status, is_active",
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("job_stats", e))?;

        let mut stats = JobStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(|e| map_sqlx_error("job_stats", e))?;
            let active: bool = row.try_get("is_active").map_err(|e| map_sqlx_error("job_stats", e))?;
            let n: i64 = row.try_get("n").map_err(|e| map_sqlx_error("job_stats", e))?;
            let n = n.max(0) as usize;

            if !active {
                stats.inactive += n;
                continue;
            }
            match PublishingStatus::from_str(&status) {
                Ok(PublishingStatus::Pending) => stats.pending += n,
                Ok(PublishingStatus::Processing) => stats.processing += n,
                Ok(PublishingStatus::RequiresApproval) => stats.requires_approval += n,
                Ok(PublishingStatus::Success) => stats.success += n,
                Ok(PublishingStatus::Failed) => stats.failed += n,
                Err(e) => return Err(JobStoreError::Storage(e.to_string())),
            }
        }
        Ok(stats)
    }

    async fn ensure_exists(&self, tenant_id: TenantId, job_id: PublishingJobId) -> Result<(), JobStoreError> {
        match self.load_job(tenant_id, job_id).await? {
            Some(_) => Ok(()),
            None => Err(JobStoreError::NotFound(job_id)),
        }
    }
}

impl JobStore for PostgresJobStore {
    fn insert(&self, job: PublishingJob) -> Result<PublishingJobId, JobStoreError> {
        self.runtime.block_on(self.insert_job(&job))
    }

    fn get(&self, tenant_id: TenantId, job_id: PublishingJobId) -> Result<Option<PublishingJob>, JobStoreError> {
        self.runtime.block_on(self.load_job(tenant_id, job_id))
    }

    fn complete_claim(&self, job: &PublishingJob, claimed_at: DateTime<Utc>) -> Result<bool, JobStoreError> {
        self.runtime.block_on(self.save_job(job, SaveGuard::Claim(claimed_at)))
    }

    fn update_if_status(&self, job: &PublishingJob, expected: PublishingStatus) -> Result<bool, JobStoreError> {
        self.runtime.block_on(self.save_job(job, SaveGuard::Status(expected)))
    }

    fn try_claim(
        &self,
        tenant_id: TenantId,
        job_id: PublishingJobId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, JobStoreError> {
        self.runtime.block_on(self.claim_job(tenant_id, job_id, now))
    }

    fn list_pending(
        &self,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRef>, JobStoreError> {
        self.runtime.block_on(self.pending_refs(tenant_id, now, limit, false))
    }

    fn list_due_scheduled(
        &self,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRef>, JobStoreError> {
        self.runtime.block_on(self.pending_refs(tenant_id, now, limit, true))
    }

    fn list_stale_processing(
        &self,
        tenant_id: Option<TenantId>,
        claimed_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRef>, JobStoreError> {
        self.runtime.block_on(self.stale_refs(tenant_id, claimed_before, limit))
    }

    fn release_if_stale(
        &self,
        tenant_id: TenantId,
        job_id: PublishingJobId,
        claimed_before: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PublishingJob>, JobStoreError> {
        self.runtime
            .block_on(self.release_stale(tenant_id, job_id, claimed_before, reason, now))
    }

    fn list_by_status(
        &self,
        tenant_id: TenantId,
        status: Option<PublishingStatus>,
        limit: usize,
    ) -> Result<Vec<PublishingJob>, JobStoreError> {
        self.runtime.block_on(self.jobs_by_status(tenant_id, status, limit))
    }

    fn deactivate_campaign(
        &self,
        tenant_id: TenantId,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<usize, JobStoreError> {
        self.runtime
            .block_on(self.deactivate_campaign_jobs(tenant_id, campaign_id, now))
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        self.runtime.block_on(self.job_stats(tenant_id))
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

fn bind_job<'q>(query: PgQuery<'q>, job: &'q PublishingJob) -> PgQuery<'q> {
    query
        .bind(job.id.as_uuid())
        .bind(job.tenant_id.as_uuid())
        .bind(job.campaign_id.as_uuid())
        .bind(job.marketing_pack_id.map(|id| *id.as_uuid()))
        .bind(job.generated_copy_id.map(|id| *id.as_uuid()))
        .bind(job.asset_prompt_id.map(|id| *id.as_uuid()))
        .bind(job.channel.as_str())
        .bind(&job.copy_text)
        .bind(&job.hashtags)
        .bind(&job.media_url)
        .bind(job.scheduled_at)
        .bind(job.processed_at)
        .bind(job.status.as_str())
        .bind(to_i32(job.retry_count))
        .bind(to_i32(job.max_retries))
        .bind(&job.error_message)
        .bind(job.requires_approval)
        .bind(job.approved_at)
        .bind(job.approved_by.map(|id| *id.as_uuid()))
        .bind(job.published_at)
        .bind(&job.published_url)
        .bind(&job.external_post_id)
        .bind(&job.payload)
        .bind(&job.package)
        .bind(job.is_active)
        .bind(job.created_at)
        .bind(job.updated_at)
}

fn job_from_row(row: &PgRow) -> Result<PublishingJob, JobStoreError> {
    decode_job(row).map_err(|e| JobStoreError::Storage(format!("failed to decode job row: {e}")))
}

fn decode_job(row: &PgRow) -> Result<PublishingJob, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = PublishingStatus::from_str(&status).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let channel: String = row.try_get("channel")?;
    let channel = Channel::new(channel).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(PublishingJob {
        id: PublishingJobId::from_uuid(row.try_get("id")?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
        campaign_id: CampaignId::from_uuid(row.try_get("campaign_id")?),
        marketing_pack_id: row
            .try_get::<Option<Uuid>, _>("marketing_pack_id")?
            .map(MarketingPackId::from_uuid),
        generated_copy_id: row.try_get::<Option<Uuid>, _>("generated_copy_id")?.map(CopyId::from_uuid),
        asset_prompt_id: row
            .try_get::<Option<Uuid>, _>("asset_prompt_id")?
            .map(AssetPromptId::from_uuid),
        channel,
        copy_text: row.try_get("copy_text")?,
        hashtags: row.try_get("hashtags")?,
        media_url: row.try_get("media_url")?,
        scheduled_at: row.try_get("scheduled_at")?,
        processed_at: row.try_get("processed_at")?,
        status,
        retry_count: row.try_get::<i32, _>("retry_count")?.max(0) as u32,
        max_retries: row.try_get::<i32, _>("max_retries")?.max(0) as u32,
        error_message: row.try_get("error_message")?,
        requires_approval: row.try_get("requires_approval")?,
        approved_at: row.try_get("approved_at")?,
        approved_by: row.try_get::<Option<Uuid>, _>("approved_by")?.map(UserId::from_uuid),
        published_at: row.try_get("published_at")?,
        published_url: row.try_get("published_url")?,
        external_post_id: row.try_get("external_post_id")?,
        payload: row.try_get("payload")?,
        package: row.try_get("package")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn ref_from_row(row: &PgRow) -> Result<JobRef, JobStoreError> {
    let tenant_id: Uuid = row.try_get("tenant_id").map_err(|e| map_sqlx_error("ref_from_row", e))?;
    let job_id: Uuid = row.try_get("id").map_err(|e| map_sqlx_error("ref_from_row", e))?;
    Ok(JobRef {
        tenant_id: TenantId::from_uuid(tenant_id),
        job_id: PublishingJobId::from_uuid(job_id),
    })
}

fn to_i32(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn to_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    JobStoreError::Storage(format!("{operation}: {err}"))
}
