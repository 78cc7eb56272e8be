//! Channel adapter capability.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::payload::{PublishingPackage, PublishingPayload, PublishingResult};

/// Unexpected adapter failure.
///
/// Reported publish failures are `Ok(PublishingResult { success: false, .. })`;
/// an `Err` means the adapter itself broke (bug, lost connection, bad payload)
/// and the orchestrator handles it like any other unexpected failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("channel unavailable: {0}")]
    Unavailable(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("adapter failure: {0}")]
    Internal(String),
}

/// Per-channel packaging/publishing logic.
///
/// Implementations must tolerate repeated calls with the same payload:
/// delivery is at-least-once (a claimed job can be retried after a crash or a
/// timeout even if the first call eventually went through).
pub trait ChannelAdapter: Send + Sync {
    /// Channel name this adapter is registered under.
    fn channel(&self) -> &str;

    /// Whether the adapter can currently publish (credentials present, API reachable).
    fn can_publish(&self) -> bool;

    /// Build a package for manual publication.
    fn generate_package(&self, payload: &PublishingPayload) -> Result<PublishingPackage, AdapterError>;

    /// Attempt direct publication.
    fn publish(
        &self,
        payload: &PublishingPayload,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<PublishingResult, AdapterError>;
}
