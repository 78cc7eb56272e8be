//! Service wiring: job store, catalog, audit sink, and the publishing services.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::PgPool;

use marquee_auth::{InMemoryMembershipDirectory, MembershipDirectory};
use marquee_infra::{
    ApprovalGate, AuditSink, BackgroundAuditSink, CampaignCatalog, InMemoryCatalog, InMemoryJobStore, JobBuilder,
    JobMaintenance, JobStore, OrchestratorConfig, PostgresJobStore, PublishingOrchestrator, TracingAuditSink,
};
use marquee_publishing::AdapterRegistry;

use crate::authz::RequestDirectory;
use crate::config::{ApiConfig, SeedFile};
use crate::context::{PrincipalContext, TenantContext};

/// Everything the handlers and the background worker share.
pub struct AppServices {
    pub store: Arc<dyn JobStore>,
    pub catalog: Arc<dyn CampaignCatalog>,
    /// Seeded directory entries; see [`RequestDirectory`].
    pub directory: Arc<InMemoryMembershipDirectory>,
    pub audit: Arc<dyn AuditSink>,
    pub orchestrator: Arc<PublishingOrchestrator>,
    pub maintenance: Arc<JobMaintenance>,
    /// Age used by the operator release endpoint when the request names none.
    pub stale_claim_after: Duration,
}

const FALLBACK_STALE_CLAIM: Duration = Duration::from_secs(900);

impl AppServices {
    pub fn new(
        store: Arc<dyn JobStore>,
        catalog: Arc<dyn CampaignCatalog>,
        directory: Arc<InMemoryMembershipDirectory>,
        audit: Arc<dyn AuditSink>,
        adapters: Arc<AdapterRegistry>,
        config: &OrchestratorConfig,
    ) -> Self {
        let orchestrator = Arc::new(
            PublishingOrchestrator::new(store.clone(), adapters, audit.clone()).configured(config),
        );
        let maintenance = Arc::new(JobMaintenance::new(store.clone(), audit.clone()));
        Self {
            store,
            catalog,
            directory,
            audit,
            orchestrator,
            maintenance,
            stale_claim_after: config.stale_claim_after.unwrap_or(FALLBACK_STALE_CLAIM),
        }
    }

    /// In-memory wiring for tests and local development.
    pub fn in_memory(catalog: Arc<dyn CampaignCatalog>, audit: Arc<dyn AuditSink>) -> Self {
        Self::new(
            Arc::new(InMemoryJobStore::new()),
            catalog,
            Arc::new(InMemoryMembershipDirectory::new()),
            audit,
            Arc::new(AdapterRegistry::new()),
            &OrchestratorConfig::default(),
        )
    }

    pub fn request_directory(&self, tenant: &TenantContext, principal: &PrincipalContext) -> Arc<RequestDirectory> {
        Arc::new(RequestDirectory::new(tenant, principal, self.directory.clone()))
    }

    pub fn job_builder(&self, directory: Arc<dyn MembershipDirectory>) -> JobBuilder {
        JobBuilder::new(self.store.clone(), self.catalog.clone(), directory, self.audit.clone())
    }

    pub fn approval_gate(&self, directory: Arc<dyn MembershipDirectory>) -> ApprovalGate {
        ApprovalGate::new(self.store.clone(), directory, self.audit.clone())
    }
}

/// Wire services from configuration.
///
/// `DATABASE_URL` selects the Postgres job store (migrated on startup);
/// otherwise jobs live in memory. The catalog and seeded memberships always
/// come from the optional seed file.
pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let seed = match &config.seed_file {
        Some(path) => SeedFile::load(path)?,
        None => SeedFile::default(),
    };

    let directory = Arc::new(InMemoryMembershipDirectory::new());
    for membership in seed.memberships {
        directory.grant(membership.into());
    }
    let catalog: Arc<dyn CampaignCatalog> = Arc::new(InMemoryCatalog::from_seed(seed.catalog));

    let store: Arc<dyn JobStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url).await.context("connecting to Postgres")?;
            let store = PostgresJobStore::new(pool, tokio::runtime::Handle::current());
            store.migrate().await.context("migrating publishing_jobs")?;
            tracing::info!("using Postgres job store");
            Arc::new(store)
        }
        None => {
            tracing::info!("using in-memory job store");
            Arc::new(InMemoryJobStore::new())
        }
    };

    let audit: Arc<dyn AuditSink> = Arc::new(
        BackgroundAuditSink::spawn(Arc::new(TracingAuditSink)).context("spawning audit dispatcher")?,
    );

    Ok(AppServices::new(
        store,
        catalog,
        directory,
        audit,
        Arc::new(AdapterRegistry::new()),
        &config.orchestrator,
    ))
}
