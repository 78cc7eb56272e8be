//! Request-scoped membership resolution.
//!
//! The signed token is the identity store's assertion of the caller's tenant
//! and roles. A seeded directory entry for the same (tenant, user) overrides
//! it, which lets operators revoke or narrow a role without reissuing tokens.

use std::sync::Arc;

use marquee_auth::{
    AuthzError, InMemoryMembershipDirectory, MembershipDirectory, Permission, TenantMembership, authorize_in_tenant,
};
use marquee_core::{TenantId, UserId};

use crate::context::{PrincipalContext, TenantContext};

pub struct RequestDirectory {
    token: TenantMembership,
    seeded: Arc<InMemoryMembershipDirectory>,
}

impl RequestDirectory {
    pub fn new(tenant: &TenantContext, principal: &PrincipalContext, seeded: Arc<InMemoryMembershipDirectory>) -> Self {
        Self {
            token: TenantMembership::with_roles(tenant.tenant_id(), principal.user_id(), principal.roles().to_vec()),
            seeded,
        }
    }
}

impl MembershipDirectory for RequestDirectory {
    fn membership(&self, tenant_id: TenantId, user_id: UserId) -> Option<TenantMembership> {
        if let Some(seeded) = self.seeded.membership(tenant_id, user_id) {
            return Some(seeded);
        }
        (self.token.tenant_id == tenant_id && self.token.user_id == user_id).then(|| self.token.clone())
    }
}

/// Check one permission for the caller in the request's tenant.
pub fn require(directory: &RequestDirectory, permission: &Permission) -> Result<(), AuthzError> {
    authorize_in_tenant(directory, directory.token.tenant_id, directory.token.user_id, permission).map(|_| ())
}
