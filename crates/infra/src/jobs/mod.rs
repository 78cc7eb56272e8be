//! Publishing job persistence.
//!
//! - [`JobStore`]: tenant-scoped storage with atomic claim/release
//! - [`InMemoryJobStore`]: single-process store for tests and dev
//! - [`PostgresJobStore`]: shared store for multi-instance deployments

pub mod postgres;
pub mod store;
pub mod types;

pub use postgres::PostgresJobStore;
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use types::{ClaimOutcome, JobRef, JobStats};
