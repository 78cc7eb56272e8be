use axum::{routing::get, Router};

pub mod common;
pub mod jobs;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/publishing", jobs::router())
}
