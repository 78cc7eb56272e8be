use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "publishing.jobs.write").
/// A special wildcard permission `"*"` can be used by policy layers to indicate
/// "allow all" without hardcoding domain permissions into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));
    /// Read publishing jobs and download packages.
    pub const JOBS_READ: Permission = Permission(Cow::Borrowed("publishing.jobs.read"));
    /// Build new publishing jobs.
    pub const JOBS_WRITE: Permission = Permission(Cow::Borrowed("publishing.jobs.write"));
    /// Confirm manually published jobs.
    pub const JOBS_APPROVE: Permission = Permission(Cow::Borrowed("publishing.jobs.approve"));
    /// Trigger processing, release stale claims, archive campaign jobs.
    pub const JOBS_OPERATE: Permission = Permission(Cow::Borrowed("publishing.jobs.operate"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
