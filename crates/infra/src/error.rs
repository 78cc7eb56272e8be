//! Synchronous error surface of the publishing services.

use marquee_auth::AuthzError;
use marquee_core::DomainError;

use crate::catalog::CatalogError;
use crate::jobs::JobStoreError;

#[derive(Debug, thiserror::Error)]
pub enum PublishingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("job store error: {0}")]
    Store(String),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PublishingError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<DomainError> for PublishingError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::InvalidState(msg) | DomainError::Conflict(msg) => Self::InvalidState(msg),
        }
    }
}

impl From<JobStoreError> for PublishingError {
    fn from(err: JobStoreError) -> Self {
        match err {
            // A job owned by another tenant is reported as missing.
            JobStoreError::NotFound(id) => Self::NotFound(format!("publishing job {id}")),
            JobStoreError::TenantIsolation => Self::NotFound("publishing job".to_string()),
            other => Self::Store(other.to_string()),
        }
    }
}

impl From<AuthzError> for PublishingError {
    fn from(err: AuthzError) -> Self {
        Self::Unauthorized(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::{TenantId, UserId};
    use marquee_publishing::PublishingJobId;

    #[test]
    fn cross_tenant_access_looks_like_not_found() {
        let err: PublishingError = JobStoreError::TenantIsolation.into();
        assert!(matches!(err, PublishingError::NotFound(_)));

        let err: PublishingError = JobStoreError::NotFound(PublishingJobId::new()).into();
        assert!(matches!(err, PublishingError::NotFound(_)));
    }

    #[test]
    fn membership_failures_are_unauthorized() {
        let err: PublishingError = AuthzError::NotAMember {
            tenant_id: TenantId::new(),
            user_id: UserId::new(),
        }
        .into();
        assert!(matches!(err, PublishingError::Unauthorized(_)));
    }

    #[test]
    fn conflicts_surface_as_invalid_state() {
        let err: PublishingError = DomainError::conflict("already processing").into();
        assert!(matches!(err, PublishingError::InvalidState(_)));
    }
}
