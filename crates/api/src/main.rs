use std::sync::Arc;

use anyhow::Context;

use marquee_api::app::{build_app, services::build_services};
use marquee_api::config::ApiConfig;
use marquee_infra::OrchestratorWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    marquee_observability::init();

    let config = ApiConfig::from_env()?;
    let services = Arc::new(build_services(&config).await?);

    let worker = OrchestratorWorker::spawn(
        services.orchestrator.clone(),
        services.maintenance.clone(),
        services.audit.clone(),
        config.orchestrator.clone(),
    )
    .context("spawning orchestrator worker")?;

    let app = build_app(services, &config.jwt_secret);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("draining orchestrator worker");
    tokio::task::spawn_blocking(move || worker.shutdown())
        .await
        .context("joining orchestrator worker")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
