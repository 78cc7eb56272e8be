use std::collections::HashSet;

use thiserror::Error;

use marquee_core::{TenantId, UserId};

use crate::{MembershipDirectory, Permission, TenantMembership};

/// A fully resolved principal for authorization decisions.
///
/// Construction of this object is intentionally decoupled from storage and
/// transport: API/workers derive memberships from a [`MembershipDirectory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("user {user_id} is not a member of tenant {tenant_id}")]
    NotAMember { tenant_id: TenantId, user_id: UserId },

    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal within its active tenant context.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id
        || principal.user_id != principal.membership.user_id
    {
        return Err(AuthzError::TenantMismatch);
    }

    let perms: HashSet<&str> = principal
        .membership
        .permissions
        .iter()
        .map(|p| p.as_str())
        .collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Look up the user's membership in `tenant_id` and build a [`Principal`].
pub fn resolve_principal<D>(
    directory: &D,
    tenant_id: TenantId,
    user_id: UserId,
) -> Result<Principal, AuthzError>
where
    D: MembershipDirectory + ?Sized,
{
    let membership = directory
        .membership(tenant_id, user_id)
        .ok_or(AuthzError::NotAMember { tenant_id, user_id })?;

    Ok(Principal {
        user_id,
        active_tenant_id: tenant_id,
        membership,
    })
}

/// Resolve membership and check one permission in a single step.
pub fn authorize_in_tenant<D>(
    directory: &D,
    tenant_id: TenantId,
    user_id: UserId,
    required: &Permission,
) -> Result<Principal, AuthzError>
where
    D: MembershipDirectory + ?Sized,
{
    let principal = resolve_principal(directory, tenant_id, user_id)?;
    authorize(&principal, required)?;
    Ok(principal)
}
