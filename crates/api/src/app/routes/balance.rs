use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    routing::{delete, get, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use garments_accounting::balance::{account_balance, bank_balance, cash_balance, summarize};
use garments_accounting::{AccountBalance, AccountId, BalanceSummary, ChartOfAccount, JournalEntry};
use garments_core::{DomainError, Money, TenantId};
use garments_infra::TenantStore;

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{ok, parse, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/bank", get(bank))
        .route("/cash", get(cash))
        .route("/summary", get(summary))
        .route("/account/:id", get(account))
        .route("/account/:id/as-of/:date", get(account_as_of))
        .route("/account/:id/realtime", get(account_realtime))
        .route("/refresh-cache", post(refresh_cache))
        .route("/cache/account/:id", delete(clear_account))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TotalBalance {
    balance: Money,
    last_updated: DateTime<Utc>,
    is_from_cache: bool,
}

fn account_key(id: AccountId) -> String {
    format!("balance:account:{id}")
}

async fn load_account(services: &AppServices, tenant_id: TenantId, raw_id: &str) -> Result<ChartOfAccount, ApiError> {
    let id: AccountId = parse(raw_id)?;
    services
        .accounts
        .get(tenant_id, &id)
        .await?
        .ok_or_else(|| DomainError::not_found("Account").into())
}

/// Bank or cash total, served from cache within its TTL.
async fn total(
    services: &AppServices,
    tenant_id: TenantId,
    key: &str,
    compute: fn(&[ChartOfAccount], &[JournalEntry]) -> Money,
) -> Result<TotalBalance, ApiError> {
    if let Some(mut hit) = services.cached::<TotalBalance>(tenant_id, key).await {
        hit.is_from_cache = true;
        return Ok(hit);
    }
    let accounts = services.accounts.list(tenant_id).await?;
    let entries = services.journals.list(tenant_id).await?;
    let fresh = TotalBalance {
        balance: compute(&accounts, &entries),
        last_updated: Utc::now(),
        is_from_cache: false,
    };
    services.cache(tenant_id, key, &fresh).await;
    Ok(fresh)
}

async fn bank(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "balance.read").await?;
    Ok(ok(total(&services, tenant.tenant_id(), "balance:bank", bank_balance).await?))
}

async fn cash(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "balance.read").await?;
    Ok(ok(total(&services, tenant.tenant_id(), "balance:cash", cash_balance).await?))
}

async fn summary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "balance.read").await?;
    let tenant_id = tenant.tenant_id();
    const KEY: &str = "balance:summary";
    if let Some(mut hit) = services.cached::<BalanceSummary>(tenant_id, KEY).await {
        hit.is_from_cache = true;
        return Ok(ok(hit));
    }
    let accounts = services.accounts.list(tenant_id).await?;
    let entries = services.journals.list(tenant_id).await?;
    let fresh = summarize(&accounts, &entries, Utc::now());
    services.cache(tenant_id, KEY, &fresh).await;
    Ok(ok(fresh))
}

async fn compute_account(
    services: &AppServices,
    tenant_id: TenantId,
    account: &ChartOfAccount,
    as_of: Option<NaiveDate>,
) -> Result<AccountBalance, ApiError> {
    let entries = services.journals.list(tenant_id).await?;
    Ok(account_balance(account, &entries, as_of, Utc::now()))
}

async fn account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "balance.read").await?;
    let tenant_id = tenant.tenant_id();
    let account = load_account(&services, tenant_id, &id).await?;
    let key = account_key(account.id);
    if let Some(mut hit) = services.cached::<AccountBalance>(tenant_id, &key).await {
        hit.is_from_cache = true;
        return Ok(ok(hit));
    }
    let fresh = compute_account(&services, tenant_id, &account, None).await?;
    services.cache(tenant_id, &key, &fresh).await;
    Ok(ok(fresh))
}

async fn account_as_of(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, date)): Path<(String, String)>,
) -> ApiResult {
    require(&services, &tenant, &principal, "balance.read").await?;
    let as_of = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| DomainError::validation(format!("Invalid date '{date}', expected YYYY-MM-DD")))?;
    let account = load_account(&services, tenant.tenant_id(), &id).await?;
    Ok(ok(compute_account(&services, tenant.tenant_id(), &account, Some(as_of)).await?))
}

async fn account_realtime(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "balance.read").await?;
    let tenant_id = tenant.tenant_id();
    let account = load_account(&services, tenant_id, &id).await?;
    let fresh = compute_account(&services, tenant_id, &account, None).await?;
    services.cache(tenant_id, &account_key(account.id), &fresh).await;
    Ok(ok(fresh))
}

async fn refresh_cache(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "balance.admin").await?;
    services.balance_cache.clear(tenant.tenant_id()).await?;
    tracing::info!(tenant_id = %tenant.tenant_id(), by = %principal.user_id(), "balance cache cleared");
    Ok(ok(json!({ "message": "Balance cache refreshed successfully" })))
}

async fn clear_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "balance.admin").await?;
    let id: AccountId = parse(&id)?;
    services.balance_cache.remove(tenant.tenant_id(), &account_key(id)).await?;
    Ok(ok(json!({ "message": format!("Cache cleared for account {id}") })))
}
