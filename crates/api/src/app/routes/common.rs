use std::sync::Arc;

use axum::http::StatusCode;

use marquee_auth::Permission;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::authz::{self, RequestDirectory};
use crate::context::{PrincipalContext, TenantContext};

/// Resolve the caller's membership and require `permission` in the request tenant.
pub fn authorized(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    permission: &Permission,
) -> Result<Arc<RequestDirectory>, axum::response::Response> {
    let directory = services.request_directory(tenant, principal);
    authz::require(&directory, permission).map_err(errors::forbidden)?;
    Ok(directory)
}

/// Run synchronous service code off the async executor.
///
/// Job stores and adapters are blocking (the Postgres store bridges into the
/// runtime itself), so every service call from a handler goes through here.
pub async fn blocking<T, F>(f: F) -> Result<T, axum::response::Response>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!(error = %e, "blocking task failed");
        errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "request task failed")
    })
}
