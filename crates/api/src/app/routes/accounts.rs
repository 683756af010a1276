use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use garments_accounting::account::sort_for_listing;
use garments_accounting::balance::balance_of;
use garments_accounting::{
    AccountId, AccountType, AccountUpdate, ChartOfAccount, JournalEntry, NewAccount, build_hierarchy,
    next_account_code,
};
use garments_core::{DomainError, Page, PageRequest, TenantId};
use garments_infra::TenantStore;

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{MAX_PAGE_SIZE, SearchQuery, created, deleted, ok, parse, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

const DEFAULT_ACCOUNT_PAGE_SIZE: u32 = 50;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_accounts).post(create_account))
        .route("/account-types", get(account_types))
        .route("/next-account-code", get(next_code))
        .route("/generate-code/:account_type", get(generate_code))
        .route("/hierarchy", get(hierarchy))
        .route("/search", get(search))
        .route("/by-type/:account_type", get(by_type))
        .route("/:id", get(get_account).put(update_account).delete(delete_account))
}

#[derive(Debug, Default, Deserialize)]
pub struct AccountListQuery {
    pub account_type: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct NextCodeQuery {
    pub account_type: String,
}

/// Accounts with `current_balance` derived from the journal.
async fn accounts_with_balances(services: &AppServices, tenant_id: TenantId) -> Result<Vec<ChartOfAccount>, ApiError> {
    let entries: Vec<JournalEntry> = services.journals.list(tenant_id).await?;
    let mut accounts = services.accounts.list(tenant_id).await?;
    for account in &mut accounts {
        account.current_balance = balance_of(account, &entries, None);
    }
    sort_for_listing(&mut accounts);
    Ok(accounts)
}

async fn list_accounts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<AccountListQuery>,
) -> ApiResult {
    require(&services, &tenant, &principal, "chart_of_accounts.read").await?;
    let page = PageRequest::new(
        query.page.unwrap_or(1),
        query.page_size.unwrap_or(DEFAULT_ACCOUNT_PAGE_SIZE),
        u32::MAX,
        MAX_PAGE_SIZE,
    )?;
    let account_type = query.account_type.as_deref().map(AccountType::parse).transpose()?;

    let accounts: Vec<ChartOfAccount> = accounts_with_balances(&services, tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|a| account_type.is_none_or(|t| a.account_type == t))
        .filter(|a| query.search.as_deref().is_none_or(|s| a.matches_search(s)))
        .collect();
    Ok(ok(Page::from_vec(accounts, page)))
}

async fn get_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "chart_of_accounts.read").await?;
    let id: AccountId = parse(&id)?;
    let account = accounts_with_balances(&services, tenant.tenant_id())
        .await?
        .into_iter()
        .find(|a| a.id == id)
        .ok_or_else(|| DomainError::not_found("Account"))?;
    Ok(ok(account))
}

async fn create_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewAccount>,
) -> ApiResult {
    require(&services, &tenant, &principal, "chart_of_accounts.write").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let existing = services.accounts.list(tenant_id).await?;
    let account = ChartOfAccount::create(body, &existing, Utc::now())?;
    services.accounts.upsert(tenant_id, account.id, account.clone()).await?;

    tracing::info!(tenant_id = %tenant_id, code = %account.code, name = %account.name, "account created");
    Ok(created(account))
}

async fn update_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<AccountUpdate>,
) -> ApiResult {
    require(&services, &tenant, &principal, "chart_of_accounts.write").await?;
    let tenant_id = tenant.tenant_id();
    let id: AccountId = parse(&id)?;
    let _guard = services.write_lock().await;

    let existing = services.accounts.list(tenant_id).await?;
    let mut account = existing
        .iter()
        .find(|a| a.id == id)
        .cloned()
        .ok_or_else(|| DomainError::not_found("Account"))?;
    account.update(body, &existing, Utc::now())?;
    services.accounts.upsert(tenant_id, account.id, account.clone()).await?;
    services.invalidate_balances(tenant_id).await;

    tracing::info!(tenant_id = %tenant_id, code = %account.code, "account updated");
    Ok(ok(account))
}

async fn delete_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "chart_of_accounts.write").await?;
    let tenant_id = tenant.tenant_id();
    let id: AccountId = parse(&id)?;
    let _guard = services.write_lock().await;

    let accounts = services.accounts.list(tenant_id).await?;
    let account = accounts
        .iter()
        .find(|a| a.id == id)
        .ok_or_else(|| DomainError::not_found("Account"))?;
    let journals = services.journals.list(tenant_id).await?;
    if journals.iter().any(|e| e.references_account(id)) {
        return Err(DomainError::invariant(
            "Cannot delete account that has transactions. Consider deactivating instead.",
        )
        .into());
    }
    if accounts.iter().any(|a| a.parent_id == Some(id)) {
        return Err(DomainError::invariant("Cannot delete an account that has child accounts").into());
    }
    services.accounts.remove(tenant_id, &id).await?;

    tracing::info!(tenant_id = %tenant_id, code = %account.code, "account deleted");
    Ok(deleted("Account"))
}

async fn account_types(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "chart_of_accounts.read").await?;
    let types: Vec<_> = AccountType::ALL
        .iter()
        .map(|t| {
            json!({
                "name": t.name(),
                "description": t.description(),
                "code_prefix": t.code_prefix(),
                "category": t.category_name(),
            })
        })
        .collect();
    Ok(ok(types))
}

async fn code_for(services: &AppServices, tenant_id: TenantId, raw_type: &str) -> ApiResult {
    let account_type = AccountType::parse(raw_type)?;
    let existing = services.accounts.list(tenant_id).await?;
    Ok(ok(json!({
        "account_type": account_type.name(),
        "code": next_account_code(account_type, &existing),
    })))
}

async fn next_code(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<NextCodeQuery>,
) -> ApiResult {
    require(&services, &tenant, &principal, "chart_of_accounts.read").await?;
    code_for(&services, tenant.tenant_id(), &query.account_type).await
}

async fn generate_code(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(account_type): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "chart_of_accounts.write").await?;
    code_for(&services, tenant.tenant_id(), &account_type).await
}

async fn hierarchy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "chart_of_accounts.read").await?;
    let accounts = accounts_with_balances(&services, tenant.tenant_id()).await?;
    Ok(ok(build_hierarchy(&accounts)))
}

async fn search(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<SearchQuery>,
) -> ApiResult {
    require(&services, &tenant, &principal, "chart_of_accounts.read").await?;
    let accounts: Vec<ChartOfAccount> = accounts_with_balances(&services, tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|a| a.is_active && a.matches_search(&query.q))
        .collect();
    Ok(ok(accounts))
}

async fn by_type(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(account_type): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "chart_of_accounts.read").await?;
    let account_type = AccountType::parse(&account_type)?;
    let accounts: Vec<ChartOfAccount> = accounts_with_balances(&services, tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|a| a.account_type == account_type)
        .collect();
    Ok(ok(accounts))
}
