use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Extension, Path, Query},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use marquee_auth::Permission;
use marquee_infra::{ApprovalRequest, BatchReport, BuildJobRequest, JobStore, PublishingError};

use crate::app::routes::common::{authorized, blocking};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/pending", get(list_pending))
        .route("/jobs/due", get(list_due))
        .route("/jobs/process-pending", post(process_pending))
        .route("/jobs/release-stale", post(release_stale))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/package", get(download_package))
        .route("/jobs/:id/process", post(process_job))
        .route("/jobs/:id/approve", post(approve_job))
        .route("/campaigns/:id/deactivate-jobs", post(deactivate_campaign_jobs))
        .route("/stats", get(stats))
}

pub async fn create_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateJobRequest>,
) -> axum::response::Response {
    let builder = services.job_builder(services.request_directory(&tenant, &principal));
    let request = BuildJobRequest {
        tenant_id: tenant.tenant_id(),
        user_id: principal.user_id(),
        campaign_id: body.campaign_id,
        marketing_pack_id: body.marketing_pack_id,
        copy_id: body.copy_id,
        channel: body.channel,
        scheduled_at: body.scheduled_at,
        requires_approval: body.requires_approval,
    };

    match blocking(move || builder.build(request)).await {
        Ok(Ok(job)) => (StatusCode::CREATED, Json(dto::job_to_json(&job))).into_response(),
        Ok(Err(e)) => errors::publishing_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ListJobsQuery>,
) -> axum::response::Response {
    if let Err(resp) = authorized(&services, &tenant, &principal, &Permission::JOBS_READ) {
        return resp;
    }
    let status = match query.status.as_deref().map(errors::parse_status).transpose() {
        Ok(status) => status,
        Err(resp) => return resp,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);

    let store = services.store.clone();
    let tenant_id = tenant.tenant_id();
    match blocking(move || store.list_by_status(tenant_id, status, limit)).await {
        Ok(Ok(jobs)) => Json(serde_json::json!({
            "jobs": jobs.iter().map(dto::job_to_json).collect::<Vec<_>>(),
        }))
        .into_response(),
        Ok(Err(e)) => errors::publishing_error_to_response(e.into()),
        Err(resp) => resp,
    }
}

pub async fn list_pending(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = authorized(&services, &tenant, &principal, &Permission::JOBS_READ) {
        return resp;
    }
    let orchestrator = services.orchestrator.clone();
    let tenant_id = tenant.tenant_id();
    match blocking(move || orchestrator.list_pending_job_ids(Some(tenant_id))).await {
        Ok(Ok(refs)) => Json(dto::job_refs_to_json(&refs)).into_response(),
        Ok(Err(e)) => errors::publishing_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn list_due(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = authorized(&services, &tenant, &principal, &Permission::JOBS_READ) {
        return resp;
    }
    let orchestrator = services.orchestrator.clone();
    let tenant_id = tenant.tenant_id();
    match blocking(move || orchestrator.list_due_scheduled_job_ids(Some(tenant_id))).await {
        Ok(Ok(refs)) => Json(dto::job_refs_to_json(&refs)).into_response(),
        Ok(Err(e)) => errors::publishing_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authorized(&services, &tenant, &principal, &Permission::JOBS_READ) {
        return resp;
    }
    let job_id = match errors::parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let store = services.store.clone();
    let tenant_id = tenant.tenant_id();
    match blocking(move || store.get(tenant_id, job_id)).await {
        Ok(Ok(Some(job))) => Json(dto::job_to_json(&job)).into_response(),
        Ok(Ok(None)) => errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("publishing job {job_id}")),
        Ok(Err(e)) => errors::publishing_error_to_response(e.into()),
        Err(resp) => resp,
    }
}

/// The package is served as a JSON attachment, exactly as stored.
pub async fn download_package(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authorized(&services, &tenant, &principal, &Permission::JOBS_READ) {
        return resp;
    }
    let job_id = match errors::parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let store = services.store.clone();
    let tenant_id = tenant.tenant_id();
    let job = match blocking(move || store.get(tenant_id, job_id)).await {
        Ok(Ok(Some(job))) => job,
        Ok(Ok(None)) => {
            return errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("publishing job {job_id}"));
        }
        Ok(Err(e)) => return errors::publishing_error_to_response(e.into()),
        Err(resp) => return resp,
    };

    match job.package {
        Some(package) => (
            [(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"publishing-package-{job_id}.json\""),
            )],
            Json(package),
        )
            .into_response(),
        None => errors::json_error(
            StatusCode::NOT_FOUND,
            "no_package",
            format!("publishing job {job_id} has no package"),
        ),
    }
}

pub async fn process_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authorized(&services, &tenant, &principal, &Permission::JOBS_OPERATE) {
        return resp;
    }
    let job_id = match errors::parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let orchestrator = services.orchestrator.clone();
    let tenant_id = tenant.tenant_id();
    let actor = principal.user_id();
    match blocking(move || orchestrator.process_job(tenant_id, job_id, Some(actor))).await {
        Ok(Ok(outcome)) => Json(dto::process_outcome_to_json(&outcome)).into_response(),
        Ok(Err(e)) => errors::publishing_error_to_response(e),
        Err(resp) => resp,
    }
}

/// Run one batch of the tenant's due pending jobs now, instead of waiting for
/// the next worker tick.
pub async fn process_pending(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = authorized(&services, &tenant, &principal, &Permission::JOBS_OPERATE) {
        return resp;
    }

    let orchestrator = services.orchestrator.clone();
    let tenant_id = tenant.tenant_id();
    let run = move || -> Result<BatchReport, PublishingError> {
        let refs = orchestrator.list_pending_job_ids(Some(tenant_id))?;
        Ok(orchestrator.process_batch(&refs, &|| false))
    };
    match blocking(run).await {
        Ok(Ok(report)) => Json(dto::batch_report_to_json(&report)).into_response(),
        Ok(Err(e)) => errors::publishing_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn approve_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ApproveJobRequest>>,
) -> axum::response::Response {
    let job_id = match errors::parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let gate = services.approval_gate(services.request_directory(&tenant, &principal));
    let request = ApprovalRequest {
        job_id,
        tenant_id: tenant.tenant_id(),
        user_id: principal.user_id(),
        published_url: body.published_url,
        external_post_id: body.external_post_id,
    };

    match blocking(move || gate.approve(request)).await {
        Ok(Ok(approved)) => Json(serde_json::json!({
            "id": job_id.to_string(),
            "approved": approved,
        }))
        .into_response(),
        Ok(Err(e)) => errors::publishing_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn release_stale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    body: Option<Json<dto::ReleaseStaleRequest>>,
) -> axum::response::Response {
    if let Err(resp) = authorized(&services, &tenant, &principal, &Permission::JOBS_OPERATE) {
        return resp;
    }
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let older_than = match body.older_than_secs {
        Some(0) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                "olderThanSecs must be greater than zero",
            );
        }
        Some(secs) => Duration::from_secs(secs),
        None => services.stale_claim_after,
    };

    let maintenance = services.maintenance.clone();
    let tenant_id = tenant.tenant_id();
    let actor = principal.user_id();
    match blocking(move || maintenance.release_stale_claims(Some(tenant_id), older_than, Some(actor))).await {
        Ok(Ok(released)) => Json(serde_json::json!({
            "released": released.iter().map(|job| job.id.to_string()).collect::<Vec<_>>(),
        }))
        .into_response(),
        Ok(Err(e)) => errors::publishing_error_to_response(e),
        Err(resp) => resp,
    }
}

/// Soft-delete every job of a campaign that was archived upstream.
pub async fn deactivate_campaign_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authorized(&services, &tenant, &principal, &Permission::JOBS_OPERATE) {
        return resp;
    }
    let campaign_id = match errors::parse_campaign_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let maintenance = services.maintenance.clone();
    let tenant_id = tenant.tenant_id();
    let actor = principal.user_id();
    match blocking(move || maintenance.deactivate_campaign_jobs(tenant_id, campaign_id, Some(actor))).await {
        Ok(Ok(count)) => Json(serde_json::json!({ "deactivated": count })).into_response(),
        Ok(Err(e)) => errors::publishing_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = authorized(&services, &tenant, &principal, &Permission::JOBS_READ) {
        return resp;
    }
    let store = services.store.clone();
    let tenant_id = tenant.tenant_id();
    match blocking(move || store.stats(tenant_id)).await {
        Ok(Ok(stats)) => Json(dto::stats_to_json(&stats)).into_response(),
        Ok(Err(e)) => errors::publishing_error_to_response(e.into()),
        Err(resp) => resp,
    }
}
