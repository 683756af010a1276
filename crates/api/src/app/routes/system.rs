use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde_json::json;

use garments_infra::check_all;

use crate::app::errors::ApiResult;
use crate::app::routes::common::ok;
use crate::app::services::AppServices;
use crate::authz::resolve_principal;
use crate::context::{PrincipalContext, TenantContext};

pub fn health_router() -> Router {
    Router::new()
        .route("/", get(health))
        .route("/detailed", get(detailed))
        .route("/database", get(database))
        .route("/redis", get(redis))
}

pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "garments-api",
            "timestamp": Utc::now(),
        })),
    )
}

async fn detailed(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let statuses = check_all(&services.probes).await;
    let healthy = statuses.iter().all(|s| s.healthy);
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "timestamp": Utc::now(),
            "dependencies": statuses,
        })),
    )
        .into_response()
}

async fn single(services: &AppServices, service: &'static str) -> Response {
    let Some(probe) = services.probes.iter().find(|p| p.service() == service) else {
        return ok(json!({
            "service": service,
            "healthy": true,
            "message": format!("{service} is not configured"),
            "timestamp": Utc::now(),
        }));
    };
    let status = probe.check().await;
    let code = if status.healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(status)).into_response()
}

async fn database(Extension(services): Extension<Arc<AppServices>>) -> Response {
    single(&services, "database").await
}

async fn redis(Extension(services): Extension<Arc<AppServices>>) -> Response {
    single(&services, "redis").await
}

pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    let resolved = resolve_principal(&services, &tenant, &principal).await?;
    Ok(ok(json!({
        "tenant_id": tenant.tenant_id(),
        "user_id": principal.user_id(),
        "roles": principal.roles(),
        "permissions": resolved.membership.permissions,
    })))
}
