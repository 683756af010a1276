use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    routing::{get, put},
};
use chrono::Utc;

use garments_auth::UserAccount;
use garments_core::{DomainError, UserId};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{ok, parse, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users))
        .route("/:id", get(get_user))
        .route("/:id/deactivate", put(deactivate_user))
        .route("/:id/reactivate", put(reactivate_user))
}

pub(crate) async fn load_user(services: &AppServices, tenant: &TenantContext, raw_id: &str) -> Result<UserAccount, ApiError> {
    let id: UserId = parse(raw_id)?;
    services
        .users
        .get(tenant.tenant_id(), &id)
        .await?
        .ok_or_else(|| DomainError::not_found("User").into())
}

async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.users.read").await?;
    let mut users = services.users.list(tenant.tenant_id()).await?;
    users.sort_by(|a, b| a.username.to_lowercase().cmp(&b.username.to_lowercase()));
    Ok(ok(users.iter().map(UserAccount::profile).collect::<Vec<_>>()))
}

async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.users.read").await?;
    let user = load_user(&services, &tenant, &id).await?;
    Ok(ok(user.profile()))
}

async fn deactivate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.users.write").await?;
    let mut user = load_user(&services, &tenant, &id).await?;
    user.deactivate(principal.user_id(), Utc::now())?;
    services.users.upsert(tenant.tenant_id(), user.id, user.clone()).await?;
    tracing::info!(user_id = %user.id, by = %principal.user_id(), "user deactivated");
    Ok(ok(user.profile()))
}

async fn reactivate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "admin.users.write").await?;
    let mut user = load_user(&services, &tenant, &id).await?;
    user.reactivate(Utc::now())?;
    services.users.upsert(tenant.tenant_id(), user.id, user.clone()).await?;
    tracing::info!(user_id = %user.id, by = %principal.user_id(), "user reactivated");
    Ok(ok(user.profile()))
}
