//! API-side authorization guard for commands.
//!
//! This enforces authorization at the command boundary (before dispatch),
//! while keeping domain aggregates and infra auth-agnostic.

use garments_auth::{
    AuthzError, CommandAuthorization, Permission, Principal, Role, RoleDefinition, TenantMembership, UserAccount,
    authorize, effective_permissions,
};
use garments_core::{TenantId, UserId};
use garments_infra::{StoreError, TenantStore, default_role_permissions};

use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

/// Permissions a role grants in this tenant.
///
/// Roles missing from the tenant's role store fall back to the built-in policy.
pub fn role_permissions(roles: &[RoleDefinition], name: &str) -> Vec<String> {
    roles
        .iter()
        .find(|r| r.name.eq_ignore_ascii_case(name))
        .map(RoleDefinition::permission_names)
        .unwrap_or_else(|| default_role_permissions(name))
}

/// Build the authorization principal for the request: token roles resolved
/// through the tenant's role store, plus the user's direct grants.
pub async fn resolve_principal(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
) -> Result<Principal, StoreError> {
    let tenant_id = tenant.tenant_id();
    let direct = services
        .users
        .get(tenant_id, &principal.user_id())
        .await?
        .map(|u| u.permissions)
        .unwrap_or_default();
    let roles = services.tenant_roles(tenant_id).await?;
    Ok(build_principal(tenant_id, principal.user_id(), principal.roles(), &direct, &roles))
}

/// Principal for a stored user account (roles as currently assigned).
pub async fn principal_for_user(services: &AppServices, tenant_id: TenantId, user: &UserAccount) -> Result<Principal, StoreError> {
    let roles = services.tenant_roles(tenant_id).await?;
    Ok(build_principal(tenant_id, user.id, &user.roles, &user.permissions, &roles))
}

fn build_principal(
    tenant_id: TenantId,
    user_id: UserId,
    roles: &[Role],
    direct: &[Permission],
    definitions: &[RoleDefinition],
) -> Principal {
    let permissions = effective_permissions(roles, direct, |name| role_permissions(definitions, name))
        .into_iter()
        .map(Permission::new)
        .collect();

    Principal {
        user_id,
        active_tenant_id: tenant_id,
        membership: TenantMembership {
            tenant_id,
            roles: roles.to_vec(),
            permissions,
        },
    }
}

/// Check authorization for a command in the current request context.
///
/// This is intended to be called **before** dispatching a command.
pub fn authorize_command<C: CommandAuthorization>(principal: &Principal, command: &C) -> Result<(), AuthzError> {
    for perm in command.required_permissions() {
        authorize(principal, perm)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::app::routes::common::PermissionGuard;

    fn principal(permissions: &[&str]) -> Principal {
        let tenant_id = TenantId::new();
        Principal {
            user_id: UserId::new(),
            active_tenant_id: tenant_id,
            membership: TenantMembership {
                tenant_id,
                roles: vec![Role::new("accountant")],
                permissions: permissions.iter().map(|p| Permission::new(p.to_string())).collect(),
            },
        }
    }

    #[test]
    fn stored_roles_override_the_default_policy() {
        let custom = RoleDefinition::builtin(
            "accountant",
            "Books only",
            vec![Permission::new("journal_entry.read")],
            Utc::now(),
        );
        assert_eq!(role_permissions(&[custom], "Accountant"), vec!["journal_entry.read".to_string()]);
        assert!(role_permissions(&[], "accountant").contains(&"journal_entry.create".to_string()));
        assert!(role_permissions(&[], "unknown").is_empty());
    }

    #[test]
    fn every_required_permission_must_be_held() {
        let p = principal(&["journal_entry.read", "journal_entry.create"]);
        let ok = PermissionGuard {
            required: vec![Permission::new("journal_entry.create")],
        };
        assert!(authorize_command(&p, &ok).is_ok());

        let denied = PermissionGuard {
            required: vec![Permission::new("journal_entry.create"), Permission::new("journal_entry.approve")],
        };
        assert_eq!(
            authorize_command(&p, &denied),
            Err(AuthzError::Forbidden("journal_entry.approve".to_string()))
        );
    }
}
