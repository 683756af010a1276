//! `garments-auth`: authentication and authorization boundary.
//!
//! Users, password hashing, JWT issue/validation and RBAC policy checks.
//! Decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod roles;
pub mod user;

pub use authorize::{
    AuthorizationExplanation, AuthzError, CommandAuthorization, Principal, RbacRegistry, TenantMembership,
    authorize, effective_permissions, explain_authorization,
};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtIssuer, JwtValidator};
pub use password::{PasswordError, hash_password, validate_password_strength, verify_password};
pub use permissions::{PERMISSION_CATALOGUE, Permission, PermissionDefinition, is_known_permission};
pub use roles::{
    BUILTIN_ROLES, Role, RoleAuditAction, RoleAuditLog, RoleDefinition, RoleInput, is_builtin_role,
};
pub use user::{NewUser, ProfileUpdate, UserAccount, UserProfile, UserStatus};
