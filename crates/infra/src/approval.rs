//! Approval Gate: the human bridge from `RequiresApproval` to `Success`.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use marquee_auth::{authorize_in_tenant, MembershipDirectory, Permission};
use marquee_core::{TenantId, UserId};
use marquee_publishing::{PublishingJobId, PublishingStatus};

use crate::audit::{emit_best_effort, AuditRecord, AuditSink, ACTION_APPROVE};
use crate::error::PublishingError;
use crate::jobs::JobStore;

const MAX_EXTERNAL_ID_LEN: usize = 256;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub job_id: PublishingJobId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    #[serde(default)]
    pub published_url: Option<String>,
    #[serde(default)]
    pub external_post_id: Option<String>,
}

pub struct ApprovalGate {
    store: Arc<dyn JobStore>,
    directory: Arc<dyn MembershipDirectory>,
    audit: Arc<dyn AuditSink>,
}

impl ApprovalGate {
    pub fn new(store: Arc<dyn JobStore>, directory: Arc<dyn MembershipDirectory>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            directory,
            audit,
        }
    }

    /// Mark a packaged job as published.
    ///
    /// Order of checks: membership, existence under the tenant, status, then
    /// input shape. A job that is not exactly `RequiresApproval` is left
    /// untouched and fails with `InvalidState` whatever the input.
    pub fn approve(&self, request: ApprovalRequest) -> Result<bool, PublishingError> {
        let ApprovalRequest {
            job_id,
            tenant_id,
            user_id,
            published_url,
            external_post_id,
        } = request;

        authorize_in_tenant(self.directory.as_ref(), tenant_id, user_id, &Permission::JOBS_APPROVE)?;

        let mut job = self
            .store
            .get(tenant_id, job_id)?
            .ok_or_else(|| PublishingError::not_found(format!("publishing job {job_id}")))?;
        if !job.is_active {
            return Err(PublishingError::invalid_state(format!("publishing job {job_id} is inactive")));
        }
        if job.status != PublishingStatus::RequiresApproval {
            return Err(PublishingError::invalid_state(format!(
                "publishing job {job_id} is {}, expected {}",
                job.status,
                PublishingStatus::RequiresApproval
            )));
        }

        let published_url = normalize_url(published_url)?;
        let external_post_id = normalize_text(external_post_id, "externalPostId")?;

        let now = Utc::now();
        job.approve(user_id, published_url, external_post_id, now)?;

        if !self.store.update_if_status(&job, PublishingStatus::RequiresApproval)? {
            return Err(PublishingError::invalid_state(format!(
                "publishing job {job_id} changed state during approval"
            )));
        }

        info!(
            tenant_id = %tenant_id,
            job_id = %job_id,
            approved_by = %user_id,
            published_url = ?job.published_url,
            "job approved"
        );
        emit_best_effort(
            self.audit.as_ref(),
            AuditRecord::for_job(&job, ACTION_APPROVE, Some(user_id), now),
        );

        Ok(true)
    }
}

fn normalize_text(value: Option<String>, field: &str) -> Result<Option<String>, PublishingError> {
    let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if value.len() > MAX_EXTERNAL_ID_LEN {
        return Err(PublishingError::validation(format!(
            "{field} must be at most {MAX_EXTERNAL_ID_LEN} characters"
        )));
    }
    Ok(Some(value))
}

fn normalize_url(value: Option<String>) -> Result<Option<String>, PublishingError> {
    let Some(url) = normalize_text(value, "publishedUrl")? else {
        return Ok(None);
    };
    let lower = url.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !url.contains(char::is_whitespace) => Ok(Some(url)),
        _ => Err(PublishingError::validation(
            "publishedUrl must be an absolute http(s) URL",
        )),
    }
}
