use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use garments_auth::{Permission, PermissionDefinition, explain_authorization};
use garments_core::{DomainError, UserId};
use garments_infra::TenantStore;

use crate::app::errors::ApiResult;
use crate::app::routes::common::{ok, parse, require};
use crate::app::routes::users::load_user;
use crate::app::services::AppServices;
use crate::authz::{principal_for_user, resolve_principal, role_permissions};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_permissions))
        .route("/check/:user_id/:permission", get(check_permission))
        .route("/effective/:user_id", get(effective))
        .route("/user-permissions", post(set_user_permissions))
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub permission: String,
}

#[derive(Debug, Deserialize)]
pub struct UserPermissions {
    pub user_id: String,
    pub permissions: Vec<String>,
}

async fn list_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.roles.read").await?;
    Ok(ok(PermissionDefinition::all()))
}

async fn check_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((user_id, permission)): Path<(String, String)>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.users.read").await?;
    let user = load_user(&services, &tenant, &user_id).await?;
    let subject = principal_for_user(&services, tenant.tenant_id(), &user).await?;
    let roles = services.tenant_roles(tenant.tenant_id()).await?;
    let explanation = explain_authorization(&subject, &Permission::new(permission), |name| {
        role_permissions(&roles, name)
    });
    Ok(ok(explanation))
}

async fn effective(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(user_id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.users.read").await?;
    let user = load_user(&services, &tenant, &user_id).await?;
    let subject = principal_for_user(&services, tenant.tenant_id(), &user).await?;
    Ok(ok(json!({
        "user_id": user.id,
        "roles": user.roles,
        "direct_permissions": user.permissions,
        "effective_permissions": subject.membership.permissions,
    })))
}

async fn set_user_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<UserPermissions>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.users.write").await?;
    let user_id: UserId = parse(&body.user_id)?;
    let mut user = services
        .users
        .get(tenant.tenant_id(), &user_id)
        .await?
        .ok_or_else(|| DomainError::not_found("User"))?;
    user.set_permissions(&body.permissions, Utc::now())?;
    services.users.upsert(tenant.tenant_id(), user.id, user.clone()).await?;

    tracing::info!(
        user_id = %user.id,
        by = %principal.user_id(),
        count = user.permissions.len(),
        "direct permissions replaced"
    );
    Ok(ok(user.profile()))
}

/// Why the caller does or does not hold a permission.
pub async fn explain(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ExplainQuery>,
) -> ApiResult {
    let subject = resolve_principal(&services, &tenant, &principal).await?;
    let roles = services.tenant_roles(tenant.tenant_id()).await?;
    let explanation = explain_authorization(&subject, &Permission::new(query.permission), |name| {
        role_permissions(&roles, name)
    });
    Ok(ok(explanation))
}
