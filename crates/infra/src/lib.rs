//! Infrastructure layer: job storage, catalog and audit collaborators, and
//! the publishing services (builder, orchestrator, approval gate, worker).

pub mod approval;
pub mod audit;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod error;
pub mod jobs;
pub mod maintenance;
pub mod orchestrator;
pub mod worker;


pub use approval::{ApprovalGate, ApprovalRequest};
pub use audit::{
    emit_best_effort, AuditError, AuditRecord, AuditSink, BackgroundAuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use builder::{BuildJobRequest, JobBuilder};
pub use catalog::{
    CampaignCatalog, CampaignRecord, CatalogError, CatalogSeed, ContentRecord, InMemoryCatalog, MarketingPackRecord,
};
pub use config::{ConfigError, OrchestratorConfig};
pub use error::PublishingError;
pub use jobs::{ClaimOutcome, InMemoryJobStore, JobRef, JobStats, JobStore, JobStoreError, PostgresJobStore};
pub use maintenance::JobMaintenance;
pub use orchestrator::{BatchReport, ProcessOutcome, PublishingOrchestrator, SkipReason};
pub use worker::{OrchestratorWorker, OrchestratorWorkerHandle, WorkerStats};
