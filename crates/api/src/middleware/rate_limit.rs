//! Per-client request limits on the trial-balance endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;

use garments_infra::RateLimitStatus;
use garments_infra::rate_limit::DEFAULT_WINDOW;

use super::{client_ip, extract_bearer, peer_addr};
use crate::app::services::AppServices;

const PREFIX: &str = "/api/trial-balance";

/// Normalized endpoint key for a limited path, `None` when unlimited.
pub fn endpoint_key(path: &str) -> Option<&'static str> {
    let path = path.to_ascii_lowercase();
    if !path.starts_with(PREFIX) {
        return None;
    }
    let key = if path.starts_with("/api/trial-balance/account") {
        "/api/trial-balance/account"
    } else if path.starts_with("/api/trial-balance/compare") {
        "/api/trial-balance/compare"
    } else if path.contains("export") {
        "/api/trial-balance/export"
    } else {
        PREFIX
    };
    Some(key)
}

/// Requests per window for an endpoint key.
pub fn limit_for(endpoint: &str) -> u32 {
    match endpoint {
        "/api/trial-balance" => 30,
        "/api/trial-balance/account" => 60,
        "/api/trial-balance/compare" => 10,
        "/api/trial-balance/export" => 5,
        _ => 20,
    }
}

fn client_id(services: &AppServices, req: &Request<axum::body::Body>) -> String {
    let user = extract_bearer(req.headers()).and_then(|t| services.jwt_validator.validate(t, Utc::now()).ok());
    match user {
        Some(claims) => format!("user:{}", claims.sub),
        None => format!("ip:{}", client_ip(req.headers(), peer_addr(req), false)),
    }
}

fn set_headers(headers: &mut HeaderMap, status: &RateLimitStatus) {
    let pairs = [
        ("x-ratelimit-limit", status.max_requests.to_string()),
        ("x-ratelimit-remaining", status.remaining.to_string()),
        ("x-ratelimit-reset", status.reset_at.timestamp().to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

fn exceeded(status: &RateLimitStatus) -> Response {
    let retry_after = status.retry_after_seconds(Utc::now());
    let mut res = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "rate_limit_exceeded",
            "message": "Rate limit exceeded. Please try again later.",
            "details": {
                "max_requests": status.max_requests,
                "remaining_requests": status.remaining,
                "reset_time": status.reset_at,
                "retry_after_seconds": retry_after,
            },
        })),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
        res.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
    }
    res
}

pub async fn rate_limit(
    State(services): State<Arc<AppServices>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if !services.config.rate_limit_enabled {
        return next.run(req).await;
    }
    let Some(endpoint) = endpoint_key(req.uri().path()) else {
        return next.run(req).await;
    };

    let client = client_id(&services, &req);
    let max = limit_for(endpoint);
    let status = match services
        .rate_limits
        .record(&client, endpoint, max, DEFAULT_WINDOW, Utc::now())
        .await
    {
        Ok(status) => status,
        Err(err) => {
            tracing::error!(client = %client, endpoint, error = %err, "rate limit store failed; allowing request");
            return next.run(req).await;
        }
    };

    if !status.allowed {
        tracing::warn!(
            client = %client,
            endpoint,
            max_requests = status.max_requests,
            "rate limit exceeded"
        );
        let mut res = exceeded(&status);
        set_headers(res.headers_mut(), &status);
        return res;
    }

    let mut res = next.run(req).await;
    set_headers(res.headers_mut(), &status);
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_bucketed_by_prefix() {
        assert_eq!(endpoint_key("/api/trial-balance"), Some("/api/trial-balance"));
        assert_eq!(
            endpoint_key("/api/trial-balance/account/42/transactions"),
            Some("/api/trial-balance/account")
        );
        assert_eq!(endpoint_key("/api/Trial-Balance/compare"), Some("/api/trial-balance/compare"));
        assert_eq!(endpoint_key("/api/trial-balance/export"), Some("/api/trial-balance/export"));
        assert_eq!(endpoint_key("/api/journalentry/journal-entries"), None);
    }

    #[test]
    fn limits_per_bucket() {
        assert_eq!(limit_for("/api/trial-balance"), 30);
        assert_eq!(limit_for("/api/trial-balance/account"), 60);
        assert_eq!(limit_for("/api/trial-balance/compare"), 10);
        assert_eq!(limit_for("/api/trial-balance/export"), 5);
        assert_eq!(limit_for("/api/other"), 20);
    }
}
