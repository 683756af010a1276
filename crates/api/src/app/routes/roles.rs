use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    routing::get,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use garments_auth::{RoleAuditAction, RoleAuditLog, RoleDefinition, RoleInput};
use garments_core::{DomainError, TenantId, UserId};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{created, deleted, ok, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/audit-logs", get(all_audit_logs))
        .route("/:name", get(get_role).put(update_role).delete(delete_role))
        .route("/:name/permissions", get(role_permissions).put(set_role_permissions))
        .route("/:name/audit-logs", get(role_audit_logs))
}

#[derive(Debug, Serialize)]
struct RoleView {
    #[serde(flatten)]
    role: RoleDefinition,
    user_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PermissionList {
    pub permissions: Vec<String>,
}

async fn load_role(services: &AppServices, tenant_id: TenantId, name: &str) -> Result<RoleDefinition, ApiError> {
    services
        .tenant_roles(tenant_id)
        .await?
        .into_iter()
        .find(|r| r.name.eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| DomainError::not_found(format!("Role '{name}'")).into())
}

async fn user_count(services: &AppServices, tenant_id: TenantId, role: &str) -> Result<usize, ApiError> {
    Ok(services
        .users
        .list(tenant_id)
        .await?
        .iter()
        .filter(|u| u.has_role(role))
        .count())
}

async fn audit(
    services: &AppServices,
    tenant_id: TenantId,
    role: &str,
    action: RoleAuditAction,
    details: String,
    by: UserId,
) -> Result<(), ApiError> {
    let log = RoleAuditLog::record(role, action, details, by, Utc::now());
    services.role_audit_logs.upsert(tenant_id, log.id, log).await?;
    Ok(())
}

async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.roles.read").await?;
    let tenant_id = tenant.tenant_id();
    let users = services.users.list(tenant_id).await?;
    let mut roles: Vec<RoleView> = services
        .tenant_roles(tenant_id)
        .await?
        .into_iter()
        .map(|role| RoleView {
            user_count: users.iter().filter(|u| u.has_role(&role.name)).count(),
            role,
        })
        .collect();
    roles.sort_by(|a, b| a.role.name.cmp(&b.role.name));
    Ok(ok(roles))
}

async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(name): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.roles.read").await?;
    let role = load_role(&services, tenant.tenant_id(), &name).await?;
    let user_count = user_count(&services, tenant.tenant_id(), &role.name).await?;
    Ok(ok(RoleView { role, user_count }))
}

async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<RoleInput>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.roles.write").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let existing = services.tenant_roles(tenant_id).await?;
    let role = RoleDefinition::create(&body, &existing, Utc::now())?;
    services.roles.upsert(tenant_id, role.name.clone(), role.clone()).await?;
    audit(
        &services,
        tenant_id,
        &role.name,
        RoleAuditAction::Create,
        format!("Created role with {} permission(s)", role.permissions.len()),
        principal.user_id(),
    )
    .await?;

    tracing::info!(tenant_id = %tenant_id, role = %role.name, "role created");
    Ok(created(RoleView { role, user_count: 0 }))
}

async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(name): Path<String>,
    Json(body): Json<RoleUpdate>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.roles.write").await?;
    let tenant_id = tenant.tenant_id();
    let mut role = load_role(&services, tenant_id, &name).await?;
    role.update(body.description, Utc::now())?;
    services.roles.upsert(tenant_id, role.name.clone(), role.clone()).await?;
    audit(
        &services,
        tenant_id,
        &role.name,
        RoleAuditAction::Update,
        format!("Description set to '{}'", role.description.as_deref().unwrap_or("")),
        principal.user_id(),
    )
    .await?;
    let user_count = user_count(&services, tenant_id, &role.name).await?;
    Ok(ok(RoleView { role, user_count }))
}

async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(name): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.roles.write").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let role = load_role(&services, tenant_id, &name).await?;
    role.ensure_deletable(user_count(&services, tenant_id, &role.name).await?)?;
    services.roles.remove(tenant_id, &role.name).await?;
    audit(
        &services,
        tenant_id,
        &role.name,
        RoleAuditAction::Delete,
        "Role deleted".to_string(),
        principal.user_id(),
    )
    .await?;

    tracing::info!(tenant_id = %tenant_id, role = %role.name, "role deleted");
    Ok(deleted("Role"))
}

async fn role_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(name): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.roles.read").await?;
    let role = load_role(&services, tenant.tenant_id(), &name).await?;
    Ok(ok(serde_json::json!({
        "role": role.name,
        "permissions": role.permission_names(),
    })))
}

async fn set_role_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(name): Path<String>,
    Json(body): Json<PermissionList>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.roles.write").await?;
    let tenant_id = tenant.tenant_id();
    let mut role = load_role(&services, tenant_id, &name).await?;
    let before = role.permission_names();
    role.set_permissions(&body.permissions, Utc::now())?;
    let after = role.permission_names();
    services.roles.upsert(tenant_id, role.name.clone(), role.clone()).await?;

    let added: Vec<&str> = after.iter().filter(|p| !before.contains(p)).map(String::as_str).collect();
    let removed: Vec<&str> = before.iter().filter(|p| !after.contains(p)).map(String::as_str).collect();
    audit(
        &services,
        tenant_id,
        &role.name,
        RoleAuditAction::AssignPermissions,
        format!("Added [{}]; removed [{}]", added.join(", "), removed.join(", ")),
        principal.user_id(),
    )
    .await?;

    tracing::info!(tenant_id = %tenant_id, role = %role.name, count = after.len(), "role permissions replaced");
    Ok(ok(serde_json::json!({
        "role": role.name,
        "permissions": after,
    })))
}

async fn audit_logs(services: &AppServices, tenant_id: TenantId, role: Option<&str>) -> Result<Vec<RoleAuditLog>, ApiError> {
    let mut logs: Vec<RoleAuditLog> = services
        .role_audit_logs
        .list(tenant_id)
        .await?
        .into_iter()
        .filter(|l| role.is_none_or(|r| l.role_name.eq_ignore_ascii_case(r)))
        .collect();
    logs.sort_by(|a, b| b.performed_at.cmp(&a.performed_at));
    Ok(logs)
}

async fn all_audit_logs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.roles.read").await?;
    Ok(ok(audit_logs(&services, tenant.tenant_id(), None).await?))
}

async fn role_audit_logs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(name): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.roles.read").await?;
    Ok(ok(audit_logs(&services, tenant.tenant_id(), Some(&name)).await?))
}
