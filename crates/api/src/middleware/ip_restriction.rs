//! Allow/block lists on the client address.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::{client_ip, peer_addr};
use crate::app::services::AppServices;

const BLOCKED: &str = "Access denied - IP address is blocked";
const NOT_AUTHORIZED: &str = "Access denied - IP address not authorized";

/// Why an address is refused, if it is.
pub fn check_ip(ip: &str, allowed: &[String], blocked: &[String]) -> Option<&'static str> {
    if blocked.iter().any(|b| b.eq_ignore_ascii_case(ip)) {
        return Some(BLOCKED);
    }
    if !allowed.is_empty() && !allowed.iter().any(|a| a.eq_ignore_ascii_case(ip)) {
        return Some(NOT_AUTHORIZED);
    }
    None
}

pub async fn ip_restriction(
    State(services): State<Arc<AppServices>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ip = client_ip(req.headers(), peer_addr(&req), true);
    tracing::debug!(client_ip = %ip, path = %req.uri().path(), "request received");

    let config = &services.config;
    if let Some(message) = check_ip(&ip, &config.ip_allowed, &config.ip_blocked) {
        tracing::warn!(client_ip = %ip, path = %req.uri().path(), reason = message, "request refused");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "ip_restricted",
                "message": message,
                "timestamp": Utc::now(),
                "request_id": Uuid::now_v7(),
            })),
        )
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn block_list_wins_over_allow_list() {
        let allowed = list(&["10.0.0.1"]);
        let blocked = list(&["10.0.0.1"]);
        assert_eq!(check_ip("10.0.0.1", &allowed, &blocked), Some(BLOCKED));
    }

    #[test]
    fn empty_allow_list_admits_everyone_not_blocked() {
        assert_eq!(check_ip("192.0.2.1", &[], &list(&["192.0.2.2"])), None);
        assert_eq!(check_ip("192.0.2.2", &[], &list(&["192.0.2.2"])), Some(BLOCKED));
    }

    #[test]
    fn allow_list_is_case_insensitive() {
        let allowed = list(&["FE80::1"]);
        assert_eq!(check_ip("fe80::1", &allowed, &[]), None);
        assert_eq!(check_ip("fe80::2", &allowed, &[]), Some(NOT_AUTHORIZED));
    }
}
