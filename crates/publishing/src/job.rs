//! The publishing job entity and its state machine.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use marquee_core::{
    AssetPromptId, CampaignId, CopyId, DomainError, DomainResult, Entity, MarketingPackId, TenantId,
    UserId,
};

use crate::channel::Channel;
use crate::payload::{PublishingPackage, PublishingPayload, PublishingResult};
use crate::retry::{DEFAULT_MAX_RETRIES, RetryPolicy};

/// Unique publishing job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublishingJobId(pub Uuid);

impl PublishingJobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PublishingJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PublishingJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PublishingJobId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::from_str(s)
            .map(Self)
            .map_err(|e| DomainError::invalid_id(format!("PublishingJobId: {e}")))
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublishingStatus {
    /// Waiting for the orchestrator (possibly until `scheduled_at`).
    Pending,
    /// Claimed by exactly one orchestrator execution.
    Processing,
    /// Package generated; waiting for a human to publish and confirm.
    RequiresApproval,
    /// Published (automatically or confirmed by an approver).
    Success,
    /// Permanent failure or retries exhausted.
    Failed,
}

impl PublishingStatus {
    pub const ALL: [PublishingStatus; 5] = [
        PublishingStatus::Pending,
        PublishingStatus::Processing,
        PublishingStatus::RequiresApproval,
        PublishingStatus::Success,
        PublishingStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PublishingStatus::Pending => "Pending",
            PublishingStatus::Processing => "Processing",
            PublishingStatus::RequiresApproval => "RequiresApproval",
            PublishingStatus::Success => "Success",
            PublishingStatus::Failed => "Failed",
        }
    }

    /// Statuses a claim may start from. `Failed` is only ever claimed by an
    /// explicit operator retry; the loop never lists failed jobs.
    pub fn is_claimable(&self) -> bool {
        matches!(self, PublishingStatus::Pending | PublishingStatus::Failed)
    }

    /// Terminal for the automated path.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PublishingStatus::RequiresApproval | PublishingStatus::Success | PublishingStatus::Failed
        )
    }
}

impl std::fmt::Display for PublishingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PublishingStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("unknown publishing status: {s}")))
    }
}

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to `Pending`, eligible again at `next_attempt_at`.
    RetryScheduled {
        retry_count: u32,
        next_attempt_at: DateTime<Utc>,
    },
    /// Terminal `Failed`.
    Failed { retry_count: u32 },
}

/// One unit of publish work tied to a tenant, campaign, and channel.
///
/// The content fields are a snapshot taken at build time; later edits to the
/// source pack do not change an in-flight job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishingJob {
    pub id: PublishingJobId,
    pub tenant_id: TenantId,

    pub campaign_id: CampaignId,
    pub marketing_pack_id: Option<MarketingPackId>,
    pub generated_copy_id: Option<CopyId>,
    pub asset_prompt_id: Option<AssetPromptId>,

    pub channel: Channel,
    pub copy_text: String,
    pub hashtags: Vec<String>,
    pub media_url: Option<String>,

    /// `None` means eligible immediately.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Time of the most recent claim.
    pub processed_at: Option<DateTime<Utc>>,

    pub status: PublishingStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,

    pub requires_approval: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<UserId>,

    pub published_at: Option<DateTime<Utc>>,
    pub published_url: Option<String>,
    pub external_post_id: Option<String>,

    /// Serialized [`PublishingPayload`].
    pub payload: Option<serde_json::Value>,
    /// Serialized [`PublishingPackage`] (approval path only).
    pub package: Option<serde_json::Value>,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for PublishingJob {
    type Id = PublishingJobId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl PublishingJob {
    /// Create a `Pending` job with no content yet.
    pub fn new(tenant_id: TenantId, campaign_id: CampaignId, channel: Channel, now: DateTime<Utc>) -> Self {
        Self {
            id: PublishingJobId::new(),
            tenant_id,
            campaign_id,
            marketing_pack_id: None,
            generated_copy_id: None,
            asset_prompt_id: None,
            channel,
            copy_text: String::new(),
            hashtags: Vec::new(),
            media_url: None,
            scheduled_at: None,
            processed_at: None,
            status: PublishingStatus::Pending,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            error_message: None,
            requires_approval: true,
            approved_at: None,
            approved_by: None,
            published_at: None,
            published_url: None,
            external_post_id: None,
            payload: None,
            package: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_pack(mut self, pack_id: MarketingPackId, asset_prompt_id: Option<AssetPromptId>) -> Self {
        self.marketing_pack_id = Some(pack_id);
        self.asset_prompt_id = asset_prompt_id;
        self
    }

    pub fn with_copy(mut self, copy_id: Option<CopyId>, text: impl Into<String>, hashtags: Vec<String>) -> Self {
        self.generated_copy_id = copy_id;
        self.copy_text = text.into();
        self.hashtags = hashtags;
        self
    }

    pub fn with_media(mut self, media_url: Option<String>) -> Self {
        self.media_url = media_url;
        self
    }

    pub fn scheduled_for(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.scheduled_at = at;
        self
    }

    pub fn requiring_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_payload(mut self, payload: &PublishingPayload) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Eligible for the loop: active, pending, and not scheduled in the future.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.status == PublishingStatus::Pending
            && self.scheduled_at.is_none_or(|at| at <= now)
    }

    /// Sort key for batch ordering: schedule time, else creation time.
    pub fn eligible_since(&self) -> DateTime<Utc> {
        self.scheduled_at.unwrap_or(self.created_at)
    }

    /// Move into `Processing`. The store must perform this atomically against
    /// the stored status; this method only enforces the transition rules.
    pub fn claim(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status == PublishingStatus::Processing {
            return Err(DomainError::conflict(format!("job {} is already processing", self.id)));
        }
        if !self.is_active {
            return Err(DomainError::invalid_state(format!("job {} is inactive", self.id)));
        }
        if !self.status.is_claimable() {
            return Err(DomainError::invalid_state(format!(
                "job {} cannot be claimed from {}",
                self.id, self.status
            )));
        }

        self.status = PublishingStatus::Processing;
        self.processed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// The frozen adapter input, or a minimal one rebuilt from the snapshot
    /// fields when no payload was stored.
    pub fn payload_or_snapshot(&self) -> Result<PublishingPayload, serde_json::Error> {
        if let Some(value) = &self.payload {
            return serde_json::from_value(value.clone());
        }

        let mut payload = PublishingPayload::new(self.copy_text.clone(), self.hashtags.clone())
            .with_campaign(self.campaign_id);
        if let Some(url) = &self.media_url {
            payload = payload.with_media(url.clone());
        }
        if let Some(pack) = self.marketing_pack_id {
            payload = payload.with_pack(pack);
        }
        Ok(payload)
    }

    /// Approval path outcome: package stored, waiting for a human.
    pub fn mark_requires_approval(&mut self, package: &PublishingPackage, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_processing("mark requires approval")?;
        let value = serde_json::to_value(package)
            .map_err(|e| DomainError::validation(format!("package not serializable: {e}")))?;

        self.package = Some(value);
        self.status = PublishingStatus::RequiresApproval;
        self.error_message = None;
        self.updated_at = now;
        Ok(())
    }

    /// Automated path success.
    pub fn mark_published(&mut self, result: &PublishingResult, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_processing("mark published")?;

        self.status = PublishingStatus::Success;
        self.published_at = Some(now);
        self.published_url = result.published_url.clone();
        self.external_post_id = result.external_post_id.clone();
        self.error_message = None;
        self.updated_at = now;
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Retryable failures (transient adapter errors and unexpected errors)
    /// increment `retry_count`; while it stays below `max_retries` the job goes
    /// back to `Pending` at `now + backoff(retry_count)`, otherwise it fails.
    /// Permanent failures fail immediately without touching the count.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        retryable: bool,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> DomainResult<FailureOutcome> {
        self.ensure_processing("record failure")?;

        self.error_message = Some(error.into());
        self.updated_at = now;

        if !retryable {
            self.status = PublishingStatus::Failed;
            return Ok(FailureOutcome::Failed {
                retry_count: self.retry_count,
            });
        }

        self.retry_count = self.retry_count.saturating_add(1);
        if RetryPolicy::should_retry(self.retry_count, self.max_retries) {
            let next_attempt_at = policy.next_attempt_at(self.retry_count, now);
            self.status = PublishingStatus::Pending;
            self.scheduled_at = Some(next_attempt_at);
            Ok(FailureOutcome::RetryScheduled {
                retry_count: self.retry_count,
                next_attempt_at,
            })
        } else {
            self.status = PublishingStatus::Failed;
            Ok(FailureOutcome::Failed {
                retry_count: self.retry_count,
            })
        }
    }

    /// Human confirmation that a packaged job was published.
    pub fn approve(
        &mut self,
        approver: UserId,
        published_url: Option<String>,
        external_post_id: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.status != PublishingStatus::RequiresApproval {
            return Err(DomainError::invalid_state(format!(
                "job {} is {}, expected {}",
                self.id,
                self.status,
                PublishingStatus::RequiresApproval
            )));
        }

        self.status = PublishingStatus::Success;
        self.published_at = Some(now);
        self.published_url = published_url;
        self.external_post_id = external_post_id;
        self.approved_at = Some(now);
        self.approved_by = Some(approver);
        self.error_message = None;
        self.updated_at = now;
        Ok(())
    }

    /// Return a stuck `Processing` job to `Pending` without spending a retry.
    pub fn release_claim(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_processing("release claim")?;
        self.status = PublishingStatus::Pending;
        self.error_message = Some(reason.into());
        self.updated_at = now;
        Ok(())
    }

    /// Soft delete: hidden from the orchestrator, history kept.
    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = now;
    }

    fn ensure_processing(&self, action: &str) -> DomainResult<()> {
        if self.status == PublishingStatus::Processing {
            Ok(())
        } else {
            Err(DomainError::invalid_state(format!(
                "cannot {action}: job {} is {}",
                self.id, self.status
            )))
        }
    }
}
