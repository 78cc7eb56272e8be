use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
///
/// Roles are intentionally opaque strings at this layer; [`permissions_for_roles`]
/// is the built-in mapping used when no external policy source is wired.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Built-in role → permission mapping.
///
/// - `admin`: everything in the tenant (`*`)
/// - `marketer`: build and read jobs
/// - `approver`: read and approve jobs
/// - `operator`: read jobs, trigger processing and maintenance
///
/// Unknown roles grant nothing.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut out: Vec<Permission> = Vec::new();
    for role in roles {
        let granted = match role.as_str() {
            "admin" => vec![Permission::WILDCARD],
            "marketer" => vec![Permission::JOBS_READ, Permission::JOBS_WRITE],
            "approver" => vec![Permission::JOBS_READ, Permission::JOBS_APPROVE],
            "operator" => vec![Permission::JOBS_READ, Permission::JOBS_OPERATE],
            _ => Vec::new(),
        };
        for perm in granted {
            if !out.contains(&perm) {
                out.push(perm);
            }
        }
    }
    out
}
