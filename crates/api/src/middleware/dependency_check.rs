//! Refuse traffic until every backing service has answered once.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use garments_infra::check_all;

use crate::app::services::AppServices;

fn is_health_path(path: &str) -> bool {
    path.starts_with("/api/health") || path.starts_with("/health")
}

pub async fn dependency_check(
    State(services): State<Arc<AppServices>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if !services.config.dependency_check_enabled
        || is_health_path(req.uri().path())
        || services.dependencies_verified()
    {
        return next.run(req).await;
    }

    let statuses = check_all(&services.probes).await;
    if statuses.iter().all(|s| s.healthy) {
        tracing::info!(dependencies = statuses.len(), "all dependencies healthy");
        services.mark_dependencies_verified();
        return next.run(req).await;
    }

    tracing::warn!(
        unhealthy = ?statuses.iter().filter(|s| !s.healthy).map(|s| s.service.as_str()).collect::<Vec<_>>(),
        "refusing request: dependencies unhealthy"
    );
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "error": "service_unavailable",
            "message": "Service dependencies are not healthy. Please ensure PostgreSQL and Redis are running.",
            "dependencies": statuses,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_paths_bypass_the_check() {
        assert!(is_health_path("/api/health"));
        assert!(is_health_path("/api/health/detailed"));
        assert!(is_health_path("/health"));
        assert!(!is_health_path("/api/trial-balance"));
    }
}
