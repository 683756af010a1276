//! Process configuration read from the environment.

use std::net::SocketAddr;

use garments_core::TenantId;
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEV_JWT_SECRET: &str = "dev-secret";
pub const DEFAULT_JWT_TTL_MINUTES: i64 = 480;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub jwt_ttl_minutes: i64,
    pub database_url: Option<String>,
    pub use_persistent_stores: bool,
    pub redis_url: Option<String>,
    pub ip_allowed: Vec<String>,
    pub ip_blocked: Vec<String>,
    pub rate_limit_enabled: bool,
    pub dependency_check_enabled: bool,
    pub default_tenant_id: TenantId,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let jwt_secret = match var("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let jwt_ttl_minutes = match var("JWT_TTL_MINUTES") {
            Some(raw) => match raw.parse::<i64>() {
                Ok(m) if m > 0 => m,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "JWT_TTL_MINUTES",
                        reason: format!("expected a positive number of minutes, got '{raw}'"),
                    });
                }
            },
            None => DEFAULT_JWT_TTL_MINUTES,
        };

        let default_tenant_id = match var("DEFAULT_TENANT_ID") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "DEFAULT_TENANT_ID",
                reason: format!("'{raw}' is not a UUID"),
            })?,
            None => TenantId::new(),
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            jwt_ttl_minutes,
            database_url: var("DATABASE_URL"),
            use_persistent_stores: flag(var("USE_PERSISTENT_STORES"), "USE_PERSISTENT_STORES", false)?,
            redis_url: var("REDIS_URL"),
            ip_allowed: list(var("IP_ALLOWED")),
            ip_blocked: list(var("IP_BLOCKED")),
            rate_limit_enabled: flag(var("RATE_LIMIT_ENABLED"), "RATE_LIMIT_ENABLED", true)?,
            dependency_check_enabled: flag(
                var("DEPENDENCY_CHECK_ENABLED"),
                "DEPENDENCY_CHECK_ENABLED",
                true,
            )?,
            default_tenant_id,
        })
    }
}

fn flag(raw: Option<String>, name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            name,
            reason: format!("expected true/false, got '{other}'"),
        }),
    }
}

fn list(raw: Option<String>) -> Vec<String> {
    raw.map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(cfg.jwt_ttl_minutes, DEFAULT_JWT_TTL_MINUTES);
        assert!(cfg.database_url.is_none());
        assert!(!cfg.use_persistent_stores);
        assert!(cfg.rate_limit_enabled);
        assert!(cfg.dependency_check_enabled);
        assert!(cfg.ip_allowed.is_empty());
    }

    #[test]
    fn lists_and_flags_are_parsed() {
        let tenant = TenantId::new();
        let cfg = config(&[
            ("IP_BLOCKED", " 10.0.0.1, ,10.0.0.2 "),
            ("RATE_LIMIT_ENABLED", "False"),
            ("USE_PERSISTENT_STORES", "yes"),
            ("DATABASE_URL", "postgres://localhost/garments"),
            ("DEFAULT_TENANT_ID", &tenant.to_string()),
        ])
        .unwrap();
        assert_eq!(cfg.ip_blocked, vec!["10.0.0.1", "10.0.0.2"]);
        assert!(!cfg.rate_limit_enabled);
        assert!(cfg.use_persistent_stores);
        assert_eq!(cfg.default_tenant_id, tenant);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(config(&[("JWT_TTL_MINUTES", "0")]).is_err());
        assert!(config(&[("RATE_LIMIT_ENABLED", "maybe")]).is_err());
        assert!(config(&[("BIND_ADDR", "nowhere")]).is_err());
        assert!(config(&[("DEFAULT_TENANT_ID", "tenant-1")]).is_err());
    }
}
