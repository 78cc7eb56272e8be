use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use marquee_auth::AuthzError;
use marquee_core::CampaignId;
use marquee_infra::PublishingError;
use marquee_publishing::{PublishingJobId, PublishingStatus};

pub fn publishing_error_to_response(err: PublishingError) -> axum::response::Response {
    match err {
        PublishingError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        PublishingError::Unauthorized(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
        PublishingError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        PublishingError::InvalidState(msg) => json_error(StatusCode::CONFLICT, "invalid_state", msg),
        PublishingError::Store(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
        PublishingError::Catalog(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "catalog_error", e.to_string())
        }
        PublishingError::Serialization(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "serialization_error", e.to_string())
        }
    }
}

pub fn forbidden(err: AuthzError) -> axum::response::Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_job_id(s: &str) -> Result<PublishingJobId, axum::response::Response> {
    s.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", "job id must be a UUID"))
}

pub fn parse_campaign_id(s: &str) -> Result<CampaignId, axum::response::Response> {
    s.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", "campaign id must be a UUID"))
}

pub fn parse_status(s: &str) -> Result<PublishingStatus, axum::response::Response> {
    s.parse().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_status",
            "status must be one of: Pending, Processing, RequiresApproval, Success, Failed",
        )
    })
}
