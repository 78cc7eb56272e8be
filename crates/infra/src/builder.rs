//! Job Builder: marketing pack + copy + media → persisted `Pending` job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use marquee_auth::{authorize_in_tenant, MembershipDirectory, Permission};
use marquee_core::{CampaignId, CopyId, MarketingPackId, TenantId, UserId};
use marquee_publishing::{select_copy, Channel, CopyVariant, PublishingJob, PublishingPayload};

use crate::audit::{emit_best_effort, AuditRecord, AuditSink, ACTION_GENERATE};
use crate::catalog::CampaignCatalog;
use crate::error::PublishingError;
use crate::jobs::JobStore;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildJobRequest {
    pub tenant_id: TenantId,
    pub user_id: UserId,
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

pub struct JobBuilder {
    store: Arc<dyn JobStore>,
    catalog: Arc<dyn CampaignCatalog>,
    directory: Arc<dyn MembershipDirectory>,
    audit: Arc<dyn AuditSink>,
}

impl JobBuilder {
    pub fn new(
        store: Arc<dyn JobStore>,
        catalog: Arc<dyn CampaignCatalog>,
        directory: Arc<dyn MembershipDirectory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            catalog,
            directory,
            audit,
        }
    }

    /// Build and persist a job. Nothing is written unless every lookup passes.
    pub fn build(&self, request: BuildJobRequest) -> Result<PublishingJob, PublishingError> {
        let now = Utc::now();
        let tenant_id = request.tenant_id;
        let channel = Channel::new(request.channel)?;

        authorize_in_tenant(
            self.directory.as_ref(),
            tenant_id,
            request.user_id,
            &Permission::JOBS_WRITE,
        )?;

        let campaign = self
            .catalog
            .campaign(tenant_id, request.campaign_id)?
            .ok_or_else(|| PublishingError::not_found(format!("campaign {}", request.campaign_id)))?;
        if campaign.archived {
            return Err(PublishingError::invalid_state(format!("campaign {} is archived", campaign.id)));
        }

        let pack = self
            .catalog
            .marketing_pack(tenant_id, request.marketing_pack_id)?
            .filter(|pack| pack.campaign_id == campaign.id)
            .ok_or_else(|| {
                PublishingError::not_found(format!(
                    "marketing pack {} in campaign {}",
                    request.marketing_pack_id, campaign.id
                ))
            })?;

        let copies = self.catalog.copies_for_pack(tenant_id, pack.id)?;
        let copy = choose_copy(&channel, &copies, request.copy_id)
            .ok_or_else(|| PublishingError::not_found(format!("usable copy for marketing pack {}", pack.id)))?
            .clone();

        let media_url = match pack.content_id {
            Some(content_id) => self
                .catalog
                .content(tenant_id, content_id)?
                .and_then(|content| content.media_url)
                .filter(|url| !url.trim().is_empty()),
            None => None,
        };

        let mut payload = PublishingPayload::new(copy.text.clone(), copy.hashtags.clone())
            .with_campaign(campaign.id)
            .with_pack(pack.id)
            .with_metadata("packId", pack.id)
            .with_metadata("copyId", copy.id)
            .with_metadata("channel", &channel);
        if let Some(content_id) = pack.content_id {
            payload = payload.with_metadata("contentId", content_id);
        }
        if let Some(url) = &media_url {
            payload = payload.with_media(url.clone());
        }

        let job = PublishingJob::new(tenant_id, campaign.id, channel, now)
            .with_pack(pack.id, pack.asset_prompt_id)
            .with_copy(Some(copy.id), copy.text, copy.hashtags)
            .with_media(media_url)
            .scheduled_for(request.scheduled_at)
            .requiring_approval(request.requires_approval)
            .with_payload(&payload)?;

        self.store.insert(job.clone())?;

        info!(
            tenant_id = %tenant_id,
            job_id = %job.id,
            campaign_id = %campaign.id,
            channel = %job.channel,
            requires_approval = job.requires_approval,
            "publishing job created"
        );
        emit_best_effort(
            self.audit.as_ref(),
            AuditRecord::for_job(&job, ACTION_GENERATE, Some(request.user_id), now),
        );

        Ok(job)
    }
}

/// An explicit copy must belong to the pack and have text; otherwise pick by
/// channel preference.
fn choose_copy<'a>(channel: &Channel, copies: &'a [CopyVariant], explicit: Option<CopyId>) -> Option<&'a CopyVariant> {
    match explicit {
        Some(id) => copies.iter().find(|c| c.id == id && c.is_usable()),
        None => select_copy(channel, copies),
    }
}
