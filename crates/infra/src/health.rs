//! Dependency probes for the health endpoints and the dependency-check
//! middleware.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyStatus {
    pub service: String,
    pub healthy: bool,
    pub message: String,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl DependencyStatus {
    fn finish(service: &str, started: Instant, outcome: Result<(), String>) -> Self {
        let response_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let (healthy, message) = match outcome {
            Ok(()) => (true, format!("{service} is reachable")),
            Err(err) => {
                tracing::warn!(service, error = %err, "dependency check failed");
                (false, format!("{service} is unreachable: {err}"))
            }
        };
        Self {
            service: service.to_string(),
            healthy,
            message,
            response_time_ms,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait DependencyProbe: Send + Sync {
    fn service(&self) -> &'static str;

    async fn check(&self) -> DependencyStatus;
}

/// Run every probe in order.
pub async fn check_all(probes: &[Arc<dyn DependencyProbe>]) -> Vec<DependencyStatus> {
    let mut out = Vec::with_capacity(probes.len());
    for probe in probes {
        out.push(probe.check().await);
    }
    out
}

pub struct PostgresProbe {
    pool: Arc<PgPool>,
}

impl PostgresProbe {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DependencyProbe for PostgresProbe {
    fn service(&self) -> &'static str {
        "database"
    }

    async fn check(&self) -> DependencyStatus {
        let started = Instant::now();
        let outcome = sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string());
        DependencyStatus::finish(self.service(), started, outcome)
    }
}

#[cfg(feature = "redis")]
pub use self::redis_probe::RedisProbe;

#[cfg(feature = "redis")]
mod redis_probe {
    use super::*;

    pub struct RedisProbe {
        client: redis::Client,
    }

    impl RedisProbe {
        pub fn new(url: &str) -> Result<Self, redis::RedisError> {
            Ok(Self {
                client: redis::Client::open(url)?,
            })
        }
    }

    #[async_trait]
    impl DependencyProbe for RedisProbe {
        fn service(&self) -> &'static str {
            "redis"
        }

        async fn check(&self) -> DependencyStatus {
            let started = Instant::now();
            let outcome = async {
                let mut conn = self.client.get_multiplexed_tokio_connection().await?;
                redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
                Ok::<(), redis::RedisError>(())
            }
            .await
            .map_err(|e| e.to_string());
            DependencyStatus::finish(self.service(), started, outcome)
        }
    }
}
