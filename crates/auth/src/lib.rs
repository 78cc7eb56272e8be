//! `marquee-auth`: tenant membership and authorization boundary (zero-trust).
//!
//! This crate is intentionally decoupled from HTTP and storage. The identity
//! store itself is an external collaborator; [`MembershipDirectory`] is the
//! seam it plugs into.

pub mod authorize;
pub mod claims;
pub mod membership;
pub mod permissions;
pub mod roles;

pub use authorize::{AuthzError, Principal, authorize, authorize_in_tenant, resolve_principal};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use membership::{InMemoryMembershipDirectory, MembershipDirectory, TenantMembership};
pub use permissions::Permission;
pub use roles::{Role, permissions_for_roles};
