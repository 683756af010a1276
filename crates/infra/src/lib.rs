//! Infrastructure layer: configuration, storage, caching, rate limiting and
//! dependency health.

pub mod audit;
pub mod cache;
pub mod config;
pub mod health;
pub mod policy;
pub mod rate_limit;
pub mod store;

pub use audit::{AuditRecord, AuditTrail, InMemoryAuditTrail, PostgresAuditTrail};
pub use cache::{BalanceCache, InMemoryBalanceCache};
pub use config::{AppConfig, ConfigError};
pub use health::{DependencyProbe, DependencyStatus, PostgresProbe, check_all};
pub use policy::{default_role_permissions, seed_roles};
pub use rate_limit::{InMemoryRateLimitStore, RateLimitStatus, RateLimitStore};
pub use store::{Document, InMemoryTenantStore, PostgresTenantStore, StoreError, TenantStore};
