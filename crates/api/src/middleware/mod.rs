use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use garments_auth::JwtValidator;

use crate::app::errors::ApiError;
use crate::context::{PrincipalContext, TenantContext};

pub mod dependency_check;
pub mod ip_restriction;
pub mod rate_limit;

pub use dependency_check::dependency_check;
pub use ip_restriction::ip_restriction;
pub use rate_limit::rate_limit;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    let claims = state.jwt.validate(token, Utc::now()).map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        ApiError::Unauthorized("invalid or expired token".to_string())
    })?;

    req.extensions_mut().insert(TenantContext::new(claims.tenant_id));
    req.extensions_mut()
        .insert(PrincipalContext::new(claims.sub, claims.roles.clone()));

    Ok(next.run(req).await)
}

pub(crate) fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client address as seen through proxies.
///
/// `X-Forwarded-For` (first hop) wins, then `X-Real-IP`, then
/// `CF-Connecting-IP` when `cloudflare` is set, then the socket peer.
pub(crate) fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, cloudflare: bool) -> String {
    if let Some(first) = header_value(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').map(str::trim).find(|ip| !ip.is_empty()))
    {
        return first.to_string();
    }
    if let Some(real) = header_value(headers, "x-real-ip") {
        return real.to_string();
    }
    if let Some(cf) = header_value(headers, "cf-connecting-ip").filter(|_| cloudflare) {
        return cf.to_string();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub(crate) fn peer_addr<B>(req: &Request<B>) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_static(v));
        }
        h
    }

    #[test]
    fn bearer_tokens_need_the_scheme_and_a_value() {
        assert_eq!(extract_bearer(&headers(&[("authorization", "Bearer abc")])), Some("abc"));
        assert_eq!(extract_bearer(&headers(&[("authorization", "Basic abc")])), None);
        assert_eq!(extract_bearer(&headers(&[("authorization", "Bearer   ")])), None);
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }

    #[test]
    fn forwarded_headers_take_precedence_over_the_peer() {
        let peer: SocketAddr = "10.0.0.9:5000".parse().unwrap();
        let h = headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1"), ("x-real-ip", "198.51.100.2")]);
        assert_eq!(client_ip(&h, Some(peer), true), "203.0.113.7");

        let h = headers(&[("x-real-ip", "198.51.100.2"), ("cf-connecting-ip", "192.0.2.4")]);
        assert_eq!(client_ip(&h, Some(peer), true), "198.51.100.2");

        let h = headers(&[("cf-connecting-ip", "192.0.2.4")]);
        assert_eq!(client_ip(&h, Some(peer), true), "192.0.2.4");
        assert_eq!(client_ip(&h, Some(peer), false), "10.0.0.9");
        assert_eq!(client_ip(&HeaderMap::new(), None, true), "unknown");
    }
}
