//! Tenant membership lookup (the Tenant/Identity store seam).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use marquee_core::{TenantId, UserId};

use crate::{Permission, Role, permissions_for_roles};

/// A user's membership in a tenant.
///
/// This is an authorization boundary object: it states *which tenant* the
/// user is acting within and which roles/permissions are granted there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl TenantMembership {
    /// Membership whose permissions are derived from the built-in role mapping.
    pub fn with_roles(tenant_id: TenantId, user_id: UserId, roles: Vec<Role>) -> Self {
        let permissions = permissions_for_roles(&roles);
        Self {
            tenant_id,
            user_id,
            roles,
            permissions,
        }
    }
}

/// Resolves whether a user belongs to a tenant.
///
/// Implemented by the identity store; the publishing services only ever ask
/// this one question.
pub trait MembershipDirectory: Send + Sync {
    fn membership(&self, tenant_id: TenantId, user_id: UserId) -> Option<TenantMembership>;
}

impl<D> MembershipDirectory for Arc<D>
where
    D: MembershipDirectory + ?Sized,
{
    fn membership(&self, tenant_id: TenantId, user_id: UserId) -> Option<TenantMembership> {
        (**self).membership(tenant_id, user_id)
    }
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryMembershipDirectory {
    inner: RwLock<HashMap<(TenantId, UserId), TenantMembership>>,
}

impl InMemoryMembershipDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, membership: TenantMembership) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((membership.tenant_id, membership.user_id), membership);
        }
    }

    pub fn revoke(&self, tenant_id: TenantId, user_id: UserId) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(&(tenant_id, user_id));
        }
    }
}

impl MembershipDirectory for InMemoryMembershipDirectory {
    fn membership(&self, tenant_id: TenantId, user_id: UserId) -> Option<TenantMembership> {
        let map = self.inner.read().ok()?;
        map.get(&(tenant_id, user_id)).cloned()
    }
}
