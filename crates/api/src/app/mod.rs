//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services/`: stores, audit trail, caches and the cross-aggregate helpers
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use garments_infra::{AppConfig, StoreError};

use crate::middleware;

pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: AppConfig) -> Result<Router, StoreError> {
    let services = Arc::new(services::AppServices::from_config(config).await?);
    Ok(router_with(services))
}

/// Router over already-wired services.
pub fn router_with(services: Arc<services::AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        jwt: services.jwt_validator.clone(),
    };

    // Protected routes: require auth + tenant context.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    let api = routes::public_router().merge(protected);

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    services.clone(),
                    middleware::ip_restriction,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    services.clone(),
                    middleware::dependency_check,
                ))
                .layer(axum::middleware::from_fn_with_state(services.clone(), middleware::rate_limit))
                .layer(Extension(services)),
        )
}
