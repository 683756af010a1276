use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use garments_auth::{NewUser, ProfileUpdate, UserAccount};
use garments_core::{DomainError, TenantId};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{created, ok, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/profile", get(profile).put(update_profile))
        .route("/change-password", post(change_password))
        .route("/roles", get(roles))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email or username.
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

async fn known_roles(services: &AppServices, tenant_id: TenantId) -> Result<Vec<String>, ApiError> {
    Ok(services
        .tenant_roles(tenant_id)
        .await?
        .into_iter()
        .map(|r| r.name)
        .collect())
}

fn session(services: &AppServices, tenant_id: TenantId, user: &UserAccount) -> Result<serde_json::Value, ApiError> {
    let (token, claims) = services
        .jwt_issuer
        .issue(user.id, tenant_id, user.roles.clone(), Utc::now())
        .map_err(|e| {
            tracing::error!(error = %e, "failed to sign token");
            ApiError::Internal("could not issue a token".to_string())
        })?;
    Ok(json!({
        "token": token,
        "token_type": "Bearer",
        "expires_at": claims.expires_at,
        "user": user.profile(),
    }))
}

/// Create the first administrator of the default tenant.
pub async fn setup_admin(
    Extension(services): Extension<Arc<AppServices>>,
    Json(mut body): Json<NewUser>,
) -> ApiResult {
    let tenant_id = services.config.default_tenant_id;
    let _guard = services.write_lock().await;

    let existing = services.users.list(tenant_id).await?;
    if !existing.is_empty() {
        return Err(DomainError::conflict("An administrator already exists").into());
    }
    body.role = "admin".to_string();
    let roles = known_roles(&services, tenant_id).await?;
    let user = UserAccount::register(&body, &existing, &roles, Utc::now())?;
    services.users.upsert(tenant_id, user.id, user.clone()).await?;

    tracing::info!(tenant_id = %tenant_id, user_id = %user.id, "administrator created");
    Ok(created(session(&services, tenant_id, &user)?))
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<LoginRequest>,
) -> ApiResult {
    let tenant_id = services.config.default_tenant_id;
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let mut user = services
        .users
        .list(tenant_id)
        .await?
        .into_iter()
        .find(|u| u.matches_login(&body.email))
        .ok_or_else(invalid)?;

    match user.authenticate(&body.password, Utc::now()) {
        Ok(()) => {}
        Err(DomainError::Unauthorized) => {
            tracing::warn!(user_id = %user.id, "failed login");
            return Err(invalid());
        }
        Err(other) => return Err(other.into()),
    }
    services.users.upsert(tenant_id, user.id, user.clone()).await?;

    tracing::info!(tenant_id = %tenant_id, user_id = %user.id, "user logged in");
    Ok(ok(session(&services, tenant_id, &user)?))
}

async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewUser>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.users.write").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let existing = services.users.list(tenant_id).await?;
    let roles = known_roles(&services, tenant_id).await?;
    let user = UserAccount::register(&body, &existing, &roles, Utc::now())?;
    services.users.upsert(tenant_id, user.id, user.clone()).await?;

    tracing::info!(tenant_id = %tenant_id, user_id = %user.id, role = %body.role, "user registered");
    Ok(created(user.profile()))
}

async fn current_user(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
) -> Result<UserAccount, ApiError> {
    services
        .users
        .get(tenant.tenant_id(), &principal.user_id())
        .await?
        .ok_or_else(|| DomainError::not_found("User").into())
}

async fn profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    let user = current_user(&services, &tenant, &principal).await?;
    Ok(ok(user.profile()))
}

async fn update_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ProfileUpdate>,
) -> ApiResult {
    let mut user = current_user(&services, &tenant, &principal).await?;
    user.update_profile(&body, Utc::now())?;
    services.users.upsert(tenant.tenant_id(), user.id, user.clone()).await?;
    Ok(ok(user.profile()))
}

async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ChangePasswordRequest>,
) -> ApiResult {
    let mut user = current_user(&services, &tenant, &principal).await?;
    user.change_password(
        &body.current_password,
        &body.new_password,
        &body.confirm_password,
        Utc::now(),
    )?;
    services.users.upsert(tenant.tenant_id(), user.id, user).await?;
    tracing::info!(user_id = %principal.user_id(), "password changed");
    Ok(ok(json!({ "message": "Password changed successfully" })))
}

/// Roles a new user can be registered with.
async fn roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.users.read").await?;
    let mut roles: Vec<_> = services
        .tenant_roles(tenant.tenant_id())
        .await?
        .into_iter()
        .map(|r| json!({ "name": r.name, "description": r.description }))
        .collect();
    roles.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    Ok(ok(roles))
}
