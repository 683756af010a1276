//! Sliding-window request counters per (client, endpoint).
//!
//! Every call to [`RateLimitStore::record`] counts the current request, then
//! reports whether the client is still within `max_requests` for the window.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::StoreError;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub max_requests: u32,
    pub remaining: u32,
    /// When the oldest request in the window drops out.
    pub reset_at: DateTime<Utc>,
    pub allowed: bool,
}

impl RateLimitStatus {
    fn from_window(max_requests: u32, count: usize, oldest: DateTime<Utc>, window: Duration) -> Self {
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::seconds(60));
        Self {
            max_requests,
            remaining: max_requests.saturating_sub(count),
            reset_at: oldest + window,
            allowed: count <= max_requests,
        }
    }

    /// Seconds until the client may try again (at least one).
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.reset_at - now).num_seconds().max(1)
    }
}

/// Storage key; separators and URL punctuation are flattened to `_`.
pub fn rate_limit_key(client_id: &str, endpoint: &str) -> String {
    fn sanitize(raw: &str) -> String {
        if raw.is_empty() {
            return "unknown".to_string();
        }
        raw.chars()
            .map(|c| match c {
                ':' | ' ' | '/' | '\\' | '?' | '&' | '=' | '#' | '%' => '_',
                other => other,
            })
            .collect()
    }
    format!("rate_limit:{}:{}", sanitize(client_id), sanitize(endpoint))
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn record(
        &self,
        client_id: &str,
        endpoint: &str,
        max_requests: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitStatus, StoreError>;

    async fn reset(&self, client_id: &str, endpoint: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct Windows {
    by_key: HashMap<String, VecDeque<DateTime<Utc>>>,
    last_sweep: Option<DateTime<Utc>>,
}

impl Windows {
    /// Drop keys with no request inside the window. Runs at most once per window.
    fn sweep(&mut self, now: DateTime<Utc>, span: chrono::Duration) {
        if self.last_sweep.is_some_and(|at| now - at < span) {
            return;
        }
        let window_start = now - span;
        self.by_key
            .retain(|_, requests| requests.back().is_some_and(|t| *t > window_start));
        self.last_sweep = Some(now);
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    windows: RwLock<Windows>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of (client, endpoint) windows currently held.
    pub fn tracked_keys(&self) -> usize {
        self.windows.read().map(|w| w.by_key.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn record(
        &self,
        client_id: &str,
        endpoint: &str,
        max_requests: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitStatus, StoreError> {
        let span = chrono::Duration::from_std(window)
            .map_err(|e| StoreError::Backend(format!("invalid rate-limit window: {e}")))?;
        let window_start = now - span;

        let mut windows = self
            .windows
            .write()
            .map_err(|_| StoreError::Backend("rate limiter lock poisoned".into()))?;
        windows.sweep(now, span);

        let requests = windows.by_key.entry(rate_limit_key(client_id, endpoint)).or_default();
        while requests.front().is_some_and(|t| *t <= window_start) {
            requests.pop_front();
        }
        requests.push_back(now);

        let oldest = requests.front().copied().unwrap_or(now);
        Ok(RateLimitStatus::from_window(max_requests, requests.len(), oldest, window))
    }

    async fn reset(&self, client_id: &str, endpoint: &str) -> Result<(), StoreError> {
        let mut windows = self
            .windows
            .write()
            .map_err(|_| StoreError::Backend("rate limiter lock poisoned".into()))?;
        windows.by_key.remove(&rate_limit_key(client_id, endpoint));
        tracing::info!(client_id, endpoint, "rate limit reset");
        Ok(())
    }
}

#[cfg(feature = "redis")]
pub use self::redis_store::RedisRateLimitStore;

#[cfg(feature = "redis")]
mod redis_store {
    use super::*;
    use chrono::TimeZone;
    use redis::AsyncCommands;
    use redis::aio::MultiplexedConnection;

    /// One sorted set per key; members are request ids scored by millisecond timestamp.
    pub struct RedisRateLimitStore {
        conn: MultiplexedConnection,
    }

    fn redis_err(operation: &str, err: redis::RedisError) -> StoreError {
        StoreError::Backend(format!("redis error in {operation}: {err}"))
    }

    impl RedisRateLimitStore {
        pub async fn connect(url: &str) -> Result<Self, StoreError> {
            let client = redis::Client::open(url).map_err(|e| redis_err("connect", e))?;
            let conn = client
                .get_multiplexed_tokio_connection()
                .await
                .map_err(|e| redis_err("connect", e))?;
            Ok(Self { conn })
        }
    }

    #[async_trait]
    impl RateLimitStore for RedisRateLimitStore {
        async fn record(
            &self,
            client_id: &str,
            endpoint: &str,
            max_requests: u32,
            window: Duration,
            now: DateTime<Utc>,
        ) -> Result<RateLimitStatus, StoreError> {
            let key = rate_limit_key(client_id, endpoint);
            let now_ms = now.timestamp_millis();
            let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
            let member = format!("{now_ms}-{}", uuid::Uuid::now_v7());

            let mut conn = self.conn.clone();
            let (count, oldest): (usize, Vec<(String, i64)>) = redis::pipe()
                .atomic()
                .zrembyscore(&key, "-inf", now_ms - window_ms)
                .ignore()
                .zadd(&key, member, now_ms)
                .ignore()
                .zcard(&key)
                .zrange_withscores(&key, 0, 0)
                .pexpire(&key, window_ms + 60_000)
                .ignore()
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_err("record", e))?;

            let oldest = oldest
                .first()
                .and_then(|(_, ms)| Utc.timestamp_millis_opt(*ms).single())
                .unwrap_or(now);
            Ok(RateLimitStatus::from_window(max_requests, count, oldest, window))
        }

        async fn reset(&self, client_id: &str, endpoint: &str) -> Result<(), StoreError> {
            let mut conn = self.conn.clone();
            conn.del::<_, ()>(rate_limit_key(client_id, endpoint))
                .await
                .map_err(|e| redis_err("reset", e))?;
            tracing::info!(client_id, endpoint, "rate limit reset");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_sanitized() {
        assert_eq!(
            rate_limit_key("ip:10.0.0.1", "/api/trial-balance?x=1"),
            "rate_limit:ip_10.0.0.1:_api_trial-balance_x_1"
        );
        assert_eq!(rate_limit_key("", "/x"), "rate_limit:unknown:_x");
    }

    #[tokio::test]
    async fn requests_beyond_the_limit_are_refused_until_the_window_slides() {
        let store = InMemoryRateLimitStore::new();
        let t0 = Utc::now();
        for i in 0..3 {
            let status = store
                .record("user:1", "/api/trial-balance/compare", 3, DEFAULT_WINDOW, t0 + chrono::Duration::seconds(i))
                .await
                .unwrap();
            assert!(status.allowed);
            assert_eq!(status.remaining, 2 - i as u32);
        }

        let refused = store
            .record("user:1", "/api/trial-balance/compare", 3, DEFAULT_WINDOW, t0 + chrono::Duration::seconds(10))
            .await
            .unwrap();
        assert!(!refused.allowed);
        assert_eq!(refused.remaining, 0);
        assert_eq!(refused.reset_at, t0 + chrono::Duration::seconds(60));
        assert_eq!(refused.retry_after_seconds(t0 + chrono::Duration::seconds(10)), 50);

        // The first three requests have left the window.
        let later = store
            .record("user:1", "/api/trial-balance/compare", 3, DEFAULT_WINDOW, t0 + chrono::Duration::seconds(62))
            .await
            .unwrap();
        assert!(later.allowed);

        let other = store
            .record("user:2", "/api/trial-balance/compare", 3, DEFAULT_WINDOW, t0)
            .await
            .unwrap();
        assert_eq!(other.remaining, 2);
    }

    #[tokio::test]
    async fn reset_clears_the_window() {
        let store = InMemoryRateLimitStore::new();
        let now = Utc::now();
        for _ in 0..2 {
            store.record("ip:1.2.3.4", "/api/trial-balance/export", 1, DEFAULT_WINDOW, now).await.unwrap();
        }
        store.reset("ip:1.2.3.4", "/api/trial-balance/export").await.unwrap();
        let status = store
            .record("ip:1.2.3.4", "/api/trial-balance/export", 1, DEFAULT_WINDOW, now)
            .await
            .unwrap();
        assert!(status.allowed);
    }

    #[tokio::test]
    async fn idle_clients_are_forgotten() {
        let store = InMemoryRateLimitStore::new();
        let t0 = Utc::now();
        for n in 0..50 {
            let client = format!("ip:203.0.113.{n}");
            store.record(&client, "/api/trial-balance", 30, DEFAULT_WINDOW, t0).await.unwrap();
        }
        assert_eq!(store.tracked_keys(), 50);

        let later = t0 + chrono::Duration::seconds(61);
        store.record("user:7", "/api/trial-balance", 30, DEFAULT_WINDOW, later).await.unwrap();
        assert_eq!(store.tracked_keys(), 1);
    }
}
