use chrono::{DateTime, Utc};
use serde::Deserialize;

use marquee_core::{CampaignId, CopyId, MarketingPackId};
use marquee_infra::{BatchReport, JobRef, JobStats, ProcessOutcome};
use marquee_publishing::PublishingJob;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub campaign_id: CampaignId,
    pub marketing_pack_id: MarketingPackId,
    #[serde(default)]
    pub copy_id: Option<CopyId>,
    pub channel: String,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default = "default_requires_approval")]
    pub requires_approval: bool,
}

fn default_requires_approval() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveJobRequest {
    #[serde(default)]
    pub published_url: Option<String>,
    #[serde(default)]
    pub external_post_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseStaleRequest {
    /// Claims older than this are released; defaults to the worker setting.
    #[serde(default)]
    pub older_than_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn job_to_json(job: &PublishingJob) -> serde_json::Value {
    serde_json::json!({
        "id": job.id.to_string(),
        "tenantId": job.tenant_id.to_string(),
        "campaignId": job.campaign_id.to_string(),
        "marketingPackId": job.marketing_pack_id.map(|id| id.to_string()),
        "generatedCopyId": job.generated_copy_id.map(|id| id.to_string()),
        "channel": job.channel.as_str(),
        "copyText": job.copy_text,
        "hashtags": job.hashtags,
        "mediaUrl": job.media_url,
        "status": job.status.as_str(),
        "scheduledAt": job.scheduled_at,
        "processedAt": job.processed_at,
        "retryCount": job.retry_count,
        "maxRetries": job.max_retries,
        "errorMessage": job.error_message,
        "requiresApproval": job.requires_approval,
        "approvedAt": job.approved_at,
        "approvedBy": job.approved_by.map(|id| id.to_string()),
        "publishedAt": job.published_at,
        "publishedUrl": job.published_url,
        "externalPostId": job.external_post_id,
        "hasPackage": job.package.is_some(),
        "isActive": job.is_active,
        "createdAt": job.created_at,
        "updatedAt": job.updated_at,
    })
}

pub fn job_refs_to_json(refs: &[JobRef]) -> serde_json::Value {
    serde_json::json!({
        "jobIds": refs.iter().map(|r| r.job_id.to_string()).collect::<Vec<_>>(),
    })
}

pub fn process_outcome_to_json(outcome: &ProcessOutcome) -> serde_json::Value {
    match outcome {
        ProcessOutcome::Finished(job) => serde_json::json!({
            "outcome": "finished",
            "job": job_to_json(job),
        }),
        ProcessOutcome::Skipped(reason) => serde_json::json!({
            "outcome": "skipped",
            "skipped": reason,
        }),
    }
}

pub fn batch_report_to_json(report: &BatchReport) -> serde_json::Value {
    serde_json::json!({
        "published": report.published,
        "awaitingApproval": report.awaiting_approval,
        "retryScheduled": report.retry_scheduled,
        "failed": report.failed,
        "skipped": report.skipped,
        "errors": report.errors,
    })
}

pub fn stats_to_json(stats: &JobStats) -> serde_json::Value {
    serde_json::json!({
        "pending": stats.pending,
        "processing": stats.processing,
        "requiresApproval": stats.requires_approval,
        "success": stats.success,
        "failed": stats.failed,
        "inactive": stats.inactive,
    })
}
