//! Postgres-backed tenant store.
//!
//! All record types share the `documents` table; rows are partitioned by
//! `(tenant_id, collection)` and the record itself is stored as JSONB.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | StoreError |
//! |---|---|---|
//! | `Database` | `23505` (unique violation) | `Conflict` |
//! | `Database` | other | `Backend` |
//! | `PoolClosed` / IO / other | - | `Backend` |

use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use garments_core::TenantId;
use sqlx::{PgPool, Row};
use tracing::instrument;

use super::documents::Document;
use super::tenant_store::{StoreError, TenantStore};

const SCHEMA: &str = include_str!("../../migrations/0001_documents.sql");

/// Apply the bundled schema. Every statement is idempotent.
#[instrument(skip(pool), err)]
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("migrate", e))?;
    Ok(())
}

/// Postgres-backed tenant store for one document collection.
///
/// Every query includes `tenant_id` and `collection` in the WHERE clause, so a
/// store can only ever see its own tenant's records of its own type.
pub struct PostgresTenantStore<K, V> {
    pool: Arc<PgPool>,
    _key: PhantomData<fn() -> K>,
    _value: PhantomData<fn() -> V>,
}

impl<K, V> PostgresTenantStore<K, V> {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            _key: PhantomData,
            _value: PhantomData,
        }
    }
}

fn decode<V: Document>(body: serde_json::Value) -> Result<V, StoreError> {
    serde_json::from_value(body)
        .map_err(|e| StoreError::Serialization(format!("{}: {e}", V::COLLECTION)))
}

#[async_trait]
impl<K, V> TenantStore<K, V> for PostgresTenantStore<K, V>
where
    K: Display + Send + Sync + 'static,
    V: Document,
{
    #[instrument(skip(self, key), fields(tenant_id = %tenant_id, collection = V::COLLECTION, id = %key), err)]
    async fn get(&self, tenant_id: TenantId, key: &K) -> Result<Option<V>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT body
            FROM documents
            WHERE tenant_id = $1 AND collection = $2 AND id = $3
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(V::COLLECTION)
        .bind(key.to_string())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", e))?;

        match row {
            Some(row) => {
                let body: serde_json::Value = row.try_get("body").map_err(|e| map_sqlx_error("get", e))?;
                decode(body).map(Some)
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, key, value), fields(tenant_id = %tenant_id, collection = V::COLLECTION, id = %key), err)]
    async fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> Result<(), StoreError> {
        let body = serde_json::to_value(&value)
            .map_err(|e| StoreError::Serialization(format!("{}: {e}", V::COLLECTION)))?;

        sqlx::query(
            r#"
            INSERT INTO documents (tenant_id, collection, id, body, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (tenant_id, collection, id)
            DO UPDATE SET body = EXCLUDED.body, updated_at = now()
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(V::COLLECTION)
        .bind(key.to_string())
        .bind(body)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert", e))?;
        Ok(())
    }

    #[instrument(skip(self, key), fields(tenant_id = %tenant_id, collection = V::COLLECTION, id = %key), err)]
    async fn remove(&self, tenant_id: TenantId, key: &K) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM documents WHERE tenant_id = $1 AND collection = $2 AND id = $3",
        )
        .bind(tenant_id.as_uuid())
        .bind(V::COLLECTION)
        .bind(key.to_string())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("remove", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, collection = V::COLLECTION), err)]
    async fn list(&self, tenant_id: TenantId) -> Result<Vec<V>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT body
            FROM documents
            WHERE tenant_id = $1 AND collection = $2
            ORDER BY id ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(V::COLLECTION)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let body: serde_json::Value = row.try_get("body").map_err(|e| map_sqlx_error("list", e))?;
            out.push(decode(body)?);
        }
        Ok(out)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, collection = V::COLLECTION), err)]
    async fn clear_tenant(&self, tenant_id: TenantId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM documents WHERE tenant_id = $1 AND collection = $2")
            .bind(tenant_id.as_uuid())
            .bind(V::COLLECTION)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("clear_tenant", e))?;
        Ok(())
    }
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
