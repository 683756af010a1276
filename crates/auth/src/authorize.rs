use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use garments_core::{TenantId, UserId};

use crate::permissions::PermissionDefinition;
use crate::roles::RoleDefinition;
use crate::{Permission, Role};

/// A principal's membership in a tenant: the roles and effective
/// permissions granted there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract (checked before dispatch).
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Union of every role's permissions and the user's direct grants.
pub fn effective_permissions<F>(roles: &[Role], direct: &[Permission], role_permissions: F) -> BTreeSet<String>
where
    F: Fn(&str) -> Vec<String>,
{
    let mut perms: BTreeSet<String> = roles
        .iter()
        .flat_map(|r| role_permissions(r.as_str()))
        .collect();
    perms.extend(direct.iter().map(|p| p.as_str().to_string()));
    perms
}

/// Authorize a principal within its active tenant context. No IO.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    let granted = principal
        .membership
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Why a permission check passed or failed.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub granted: bool,
    pub reason: String,
    pub user_id: UserId,
    pub roles: Vec<String>,
    pub effective_permissions: Vec<String>,
    pub has_wildcard: bool,
    /// Assigned roles whose mapping includes the permission.
    pub granting_roles: Vec<String>,
    pub suggestions: Vec<String>,
}

pub fn explain_authorization<F>(
    principal: &Principal,
    required: &Permission,
    role_permissions: F,
) -> AuthorizationExplanation
where
    F: Fn(&str) -> Vec<String>,
{
    let required_str = required.as_str();
    let roles: Vec<String> = principal
        .membership
        .roles
        .iter()
        .map(|r| r.as_str().to_string())
        .collect();
    let effective = effective_permissions(
        &principal.membership.roles,
        &principal.membership.permissions,
        &role_permissions,
    );
    let has_wildcard = effective.contains(Permission::WILDCARD);
    let granting_roles: Vec<String> = roles
        .iter()
        .filter(|r| {
            role_permissions(r)
                .iter()
                .any(|p| p == required_str || p == Permission::WILDCARD)
        })
        .cloned()
        .collect();

    let (granted, reason, suggestions) = if principal.active_tenant_id != principal.membership.tenant_id {
        (
            false,
            format!(
                "Tenant mismatch: active tenant {} but membership is for tenant {}",
                principal.active_tenant_id, principal.membership.tenant_id
            ),
            vec!["Sign in again to obtain a token for the correct tenant".to_string()],
        )
    } else if has_wildcard {
        (
            true,
            "Principal has wildcard permission '*' (granted by admin role)".to_string(),
            Vec::new(),
        )
    } else if effective.contains(required_str) {
        let source = if granting_roles.is_empty() {
            "a direct user grant".to_string()
        } else {
            format!("role(s) {}", granting_roles.join(", "))
        };
        (
            true,
            format!("Permission '{required_str}' is granted by {source}"),
            Vec::new(),
        )
    } else {
        (
            false,
            format!("Principal does not have permission '{required_str}'"),
            vec![
                format!("Assign a role that grants '{required_str}'"),
                format!("Grant '{required_str}' directly to the user"),
            ],
        )
    };

    AuthorizationExplanation {
        required_permission: required_str.to_string(),
        granted,
        reason,
        user_id: principal.user_id,
        roles,
        effective_permissions: effective.into_iter().collect(),
        has_wildcard,
        granting_roles,
        suggestions,
    }
}

/// Complete view of roles and permissions for auditing.
#[derive(Debug, Clone, Serialize)]
pub struct RbacRegistry {
    pub roles: BTreeMap<String, RoleDefinition>,
    pub permissions: Vec<PermissionDefinition>,
}

impl RbacRegistry {
    pub fn new(roles: impl IntoIterator<Item = RoleDefinition>) -> Self {
        Self {
            roles: roles.into_iter().map(|r| (r.name.clone(), r)).collect(),
            permissions: PermissionDefinition::all(),
        }
    }

    /// Roles whose mapping grants `permission`.
    pub fn roles_granting(&self, permission: &str) -> Vec<&str> {
        self.roles
            .values()
            .filter(|r| {
                r.permissions
                    .iter()
                    .any(|p| p.is_wildcard() || p.as_str() == permission)
            })
            .map(|r| r.name.as_str())
            .collect()
    }
}
