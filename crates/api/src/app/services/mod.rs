//! Infrastructure wiring: one tenant store per record type plus the shared
//! audit trail, balance cache, rate-limit counters and dependency probes.
//!
//! Handlers reach everything through `Extension(Arc<AppServices>)`.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use garments_accounting::{
    AccountId, AccountNames, AccountingSettings, Category, CategoryId, ChartOfAccount, JournalEntry,
    JournalEntryId,
};
use garments_auth::{Hs256JwtValidator, JwtIssuer, JwtValidator, RoleAuditLog, RoleDefinition, UserAccount};
use garments_core::{TenantId, UserId};
use garments_infra::cache::DEFAULT_TTL;
use garments_infra::store::{SETTINGS_KEY, migrate};
use garments_infra::{
    AppConfig, AuditTrail, BalanceCache, DependencyProbe, Document, InMemoryAuditTrail, InMemoryBalanceCache,
    InMemoryRateLimitStore, InMemoryTenantStore, PostgresAuditTrail, PostgresProbe, PostgresTenantStore,
    RateLimitStore, StoreError, TenantStore, seed_roles,
};
use garments_inventory::{Product, ProductId, StockItem, StockItemId, StockMovement, StockMovementId, Warehouse, WarehouseId};
use garments_invoicing::InvoiceId;
use garments_parties::{Contact, ContactId};
use garments_payroll::{Employee, EmployeeId, Payroll, PayrollId};
use garments_purchasing::PurchaseInvoice;
use garments_sales::SalesInvoice;

mod cash_book;
mod invoices;
mod ledger;
mod stock;

pub use cash_book::CashBookSummary;
pub use ledger::{JOURNAL_SUBJECT, PreparedJournal};
pub use stock::{STOCK_SUBJECT, StockBatch};

pub type Store<K, V> = Arc<dyn TenantStore<K, V>>;

pub struct AppServices {
    pub config: AppConfig,

    pub accounts: Store<AccountId, ChartOfAccount>,
    pub journals: Store<JournalEntryId, JournalEntry>,
    pub categories: Store<CategoryId, Category>,
    pub settings: Store<String, AccountingSettings>,
    pub contacts: Store<ContactId, Contact>,
    pub products: Store<ProductId, Product>,
    pub warehouses: Store<WarehouseId, Warehouse>,
    pub stock_items: Store<StockItemId, StockItem>,
    pub stock_movements: Store<StockMovementId, StockMovement>,
    pub sales_invoices: Store<InvoiceId, SalesInvoice>,
    pub purchase_invoices: Store<InvoiceId, PurchaseInvoice>,
    pub employees: Store<EmployeeId, Employee>,
    pub payrolls: Store<PayrollId, Payroll>,
    pub users: Store<UserId, UserAccount>,
    /// Keyed by lower-case role name.
    pub roles: Store<String, RoleDefinition>,
    pub role_audit_logs: Store<Uuid, RoleAuditLog>,

    pub audit: Arc<dyn AuditTrail>,
    pub balance_cache: Arc<dyn BalanceCache>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub probes: Vec<Arc<dyn DependencyProbe>>,

    pub jwt_issuer: JwtIssuer,
    pub jwt_validator: Arc<dyn JwtValidator>,

    dependencies_verified: AtomicBool,
    write_lock: Mutex<()>,
}

/// Creates one store per record type for a backend.
trait StoreFactory {
    fn store<K, V>(&self) -> Store<K, V>
    where
        K: Clone + Eq + Hash + Display + Send + Sync + 'static,
        V: Document;
}

struct MemoryStores;

impl StoreFactory for MemoryStores {
    fn store<K, V>(&self) -> Store<K, V>
    where
        K: Clone + Eq + Hash + Display + Send + Sync + 'static,
        V: Document,
    {
        Arc::new(InMemoryTenantStore::<K, V>::new())
    }
}

struct PostgresStores(Arc<PgPool>);

impl StoreFactory for PostgresStores {
    fn store<K, V>(&self) -> Store<K, V>
    where
        K: Clone + Eq + Hash + Display + Send + Sync + 'static,
        V: Document,
    {
        Arc::new(PostgresTenantStore::<K, V>::new(self.0.clone()))
    }
}

struct Shared {
    audit: Arc<dyn AuditTrail>,
    balance_cache: Arc<dyn BalanceCache>,
    rate_limits: Arc<dyn RateLimitStore>,
    probes: Vec<Arc<dyn DependencyProbe>>,
}

impl Shared {
    fn in_memory() -> Self {
        Self {
            audit: Arc::new(InMemoryAuditTrail::new()),
            balance_cache: Arc::new(InMemoryBalanceCache::new()),
            rate_limits: Arc::new(InMemoryRateLimitStore::new()),
            probes: Vec::new(),
        }
    }
}

impl AppServices {
    /// Everything in process memory (dev and tests).
    pub fn in_memory(config: AppConfig) -> Self {
        Self::assemble(config, &MemoryStores, Shared::in_memory())
    }

    /// Wire the backends selected by the configuration.
    pub async fn from_config(config: AppConfig) -> Result<Self, StoreError> {
        let mut shared = Shared::in_memory();

        #[cfg(feature = "redis")]
        if let Some(url) = config.redis_url.as_deref() {
            use garments_infra::cache::RedisBalanceCache;
            use garments_infra::health::RedisProbe;
            use garments_infra::rate_limit::RedisRateLimitStore;

            shared.balance_cache = Arc::new(RedisBalanceCache::connect(url).await?);
            shared.rate_limits = Arc::new(RedisRateLimitStore::connect(url).await?);
            let probe = RedisProbe::new(url).map_err(|e| StoreError::Backend(format!("invalid REDIS_URL: {e}")))?;
            shared.probes.push(Arc::new(probe));
            tracing::info!("redis cache and rate-limit counters enabled");
        }
        #[cfg(not(feature = "redis"))]
        if config.redis_url.is_some() {
            tracing::warn!("REDIS_URL is set but the redis feature is not enabled; using in-memory counters");
        }

        if !config.use_persistent_stores {
            return Ok(Self::assemble(config, &MemoryStores, shared));
        }

        let url = config.database_url.clone().ok_or_else(|| {
            StoreError::Backend("USE_PERSISTENT_STORES=true requires DATABASE_URL".to_string())
        })?;
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&url)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to connect to Postgres: {e}")))?;
        migrate(&pool).await?;
        let pool = Arc::new(pool);
        tracing::info!("postgres stores enabled");

        shared.audit = Arc::new(PostgresAuditTrail::new(pool.clone()));
        shared.probes.insert(0, Arc::new(PostgresProbe::new(pool.clone())));
        Ok(Self::assemble(config, &PostgresStores(pool), shared))
    }

    fn assemble(config: AppConfig, stores: &impl StoreFactory, shared: Shared) -> Self {
        let secret = config.jwt_secret.clone().into_bytes();
        let jwt_issuer = JwtIssuer::new(&secret, chrono::Duration::minutes(config.jwt_ttl_minutes));
        let jwt_validator: Arc<dyn JwtValidator> = Arc::new(Hs256JwtValidator::new(secret));

        Self {
            config,
            accounts: stores.store(),
            journals: stores.store(),
            categories: stores.store(),
            settings: stores.store(),
            contacts: stores.store(),
            products: stores.store(),
            warehouses: stores.store(),
            stock_items: stores.store(),
            stock_movements: stores.store(),
            sales_invoices: stores.store(),
            purchase_invoices: stores.store(),
            employees: stores.store(),
            payrolls: stores.store(),
            users: stores.store(),
            roles: stores.store(),
            role_audit_logs: stores.store(),
            audit: shared.audit,
            balance_cache: shared.balance_cache,
            rate_limits: shared.rate_limits,
            probes: shared.probes,
            jwt_issuer,
            jwt_validator,
            dependencies_verified: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        }
    }

    /// Serializes writes that allocate numbers or check uniqueness.
    pub async fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    pub fn dependencies_verified(&self) -> bool {
        self.dependencies_verified.load(Ordering::Acquire)
    }

    pub fn mark_dependencies_verified(&self) {
        self.dependencies_verified.store(true, Ordering::Release);
    }

    /// The tenant's roles, seeding the built-in set on first use.
    pub async fn tenant_roles(&self, tenant_id: TenantId) -> Result<Vec<RoleDefinition>, StoreError> {
        let roles = self.roles.list(tenant_id).await?;
        if !roles.is_empty() {
            return Ok(roles);
        }
        let seeded = seed_roles(Utc::now());
        for role in &seeded {
            self.roles.upsert(tenant_id, role.name.clone(), role.clone()).await?;
        }
        tracing::info!(tenant_id = %tenant_id, count = seeded.len(), "seeded built-in roles");
        Ok(seeded)
    }

    pub async fn accounting_settings(&self, tenant_id: TenantId) -> Result<AccountingSettings, StoreError> {
        Ok(self
            .settings
            .get(tenant_id, &SETTINGS_KEY.to_string())
            .await?
            .unwrap_or_default())
    }

    /// Chart of accounts together with an id → name map for journal listings.
    pub async fn chart(&self, tenant_id: TenantId) -> Result<(Vec<ChartOfAccount>, AccountNames), StoreError> {
        let accounts = self.accounts.list(tenant_id).await?;
        let names = accounts.iter().map(|a| (a.id, a.name.clone())).collect();
        Ok((accounts, names))
    }

    /// Cached value for `key`; cache failures read as a miss.
    pub async fn cached<T: DeserializeOwned>(&self, tenant_id: TenantId, key: &str) -> Option<T> {
        match self.balance_cache.get(tenant_id, key).await {
            Ok(value) => value.and_then(|v| serde_json::from_value(v).ok()),
            Err(err) => {
                tracing::warn!(tenant_id = %tenant_id, key, error = %err, "balance cache read failed");
                None
            }
        }
    }

    pub async fn cache<T: Serialize>(&self, tenant_id: TenantId, key: &str, value: &T) {
        let json = match serde_json::to_value(value) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(key, error = %err, "value not cacheable");
                return;
            }
        };
        if let Err(err) = self.balance_cache.set(tenant_id, key, json, DEFAULT_TTL).await {
            tracing::warn!(tenant_id = %tenant_id, key, error = %err, "balance cache write failed");
        }
    }

    /// Drop cached balances and trial balances after a journal change.
    ///
    /// A cache failure is logged; the write itself already succeeded.
    pub async fn invalidate_balances(&self, tenant_id: TenantId) {
        if let Err(err) = self.balance_cache.clear(tenant_id).await {
            tracing::error!(tenant_id = %tenant_id, error = %err, "failed to clear balance cache");
        }
    }
}
