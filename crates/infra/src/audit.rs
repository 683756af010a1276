//! Append-only change history per record.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use garments_core::{Event, TenantId, UserId};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use crate::store::StoreError;
use crate::store::postgres::map_sqlx_error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub subject_type: String,
    pub subject_id: String,
    pub event_type: String,
    pub actor: Option<UserId>,
    pub details: String,
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn from_event<E: Event>(
        subject_type: &str,
        subject_id: impl Display,
        event: &E,
        actor: Option<UserId>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            subject_type: subject_type.to_string(),
            subject_id: subject_id.to_string(),
            event_type: event.event_type().to_string(),
            actor,
            details: details.into(),
            occurred_at: event.occurred_at(),
        }
    }
}

#[async_trait]
pub trait AuditTrail: Send + Sync {
    async fn append(&self, tenant_id: TenantId, record: AuditRecord) -> Result<(), StoreError>;

    /// Records for one subject, oldest first.
    async fn list(
        &self,
        tenant_id: TenantId,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Vec<AuditRecord>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryAuditTrail {
    inner: RwLock<HashMap<(TenantId, String, String), Vec<AuditRecord>>>,
}

impl InMemoryAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditTrail for InMemoryAuditTrail {
    async fn append(&self, tenant_id: TenantId, record: AuditRecord) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::Backend("audit trail lock poisoned".into()))?;
        let key = (tenant_id, record.subject_type.clone(), record.subject_id.clone());
        map.entry(key).or_default().push(record);
        Ok(())
    }

    async fn list(
        &self,
        tenant_id: TenantId,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::Backend("audit trail lock poisoned".into()))?;
        let mut records = map
            .get(&(tenant_id, subject_type.to_string(), subject_id.to_string()))
            .cloned()
            .unwrap_or_default();
        records.sort_by_key(|r| r.occurred_at);
        Ok(records)
    }
}

/// Audit trail over the `audit_log` table.
pub struct PostgresAuditTrail {
    pool: Arc<PgPool>,
}

impl PostgresAuditTrail {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditTrail for PostgresAuditTrail {
    #[instrument(
        skip(self, record),
        fields(tenant_id = %tenant_id, subject_type = %record.subject_type, subject_id = %record.subject_id),
        err
    )]
    async fn append(&self, tenant_id: TenantId, record: AuditRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, tenant_id, subject_type, subject_id, event_type, actor, details, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(tenant_id.as_uuid())
        .bind(&record.subject_type)
        .bind(&record.subject_id)
        .bind(&record.event_type)
        .bind(record.actor.map(Uuid::from))
        .bind(&record.details)
        .bind(record.occurred_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("audit_append", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list(
        &self,
        tenant_id: TenantId,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, subject_type, subject_id, event_type, actor, details, occurred_at
            FROM audit_log
            WHERE tenant_id = $1 AND subject_type = $2 AND subject_id = $3
            ORDER BY occurred_at ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(subject_type)
        .bind(subject_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("audit_list", e))?;

        rows.iter()
            .map(|row| {
                Ok(AuditRecord {
                    id: row.try_get("id")?,
                    subject_type: row.try_get("subject_type")?,
                    subject_id: row.try_get("subject_id")?,
                    event_type: row.try_get("event_type")?,
                    actor: row.try_get::<Option<Uuid>, _>("actor")?.map(UserId::from_uuid),
                    details: row.try_get("details")?,
                    occurred_at: row.try_get("occurred_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("audit_list", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Stitched(DateTime<Utc>);

    impl Event for Stitched {
        fn event_type(&self) -> &'static str {
            "test.stitched"
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[tokio::test]
    async fn records_are_listed_per_subject_in_time_order() {
        let trail = InMemoryAuditTrail::new();
        let tenant = TenantId::new();
        let later = Utc::now();
        let earlier = later - chrono::Duration::minutes(5);

        for at in [later, earlier] {
            let record = AuditRecord::from_event("journal_entry", "je-1", &Stitched(at), None, "step");
            trail.append(tenant, record).await.unwrap();
        }
        let other = AuditRecord::from_event("journal_entry", "je-2", &Stitched(later), None, "other");
        trail.append(tenant, other).await.unwrap();

        let records = trail.list(tenant, "journal_entry", "je-1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].occurred_at, earlier);
        assert_eq!(records[0].event_type, "test.stitched");
        assert!(trail.list(TenantId::new(), "journal_entry", "je-1").await.unwrap().is_empty());
    }
}
