use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use garments_accounting::{
    CashBookRow, CashTransaction, CategoryType, Counterparty, CounterpartyRole, parse_cash_book_csv,
    recent_transactions,
};
use garments_core::{DomainError, Money};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{created, ok, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub const DEFAULT_RECENT_LIMIT: usize = 20;
pub const MAX_RECENT_LIMIT: usize = 100;

pub fn router() -> Router {
    Router::new()
        .route("/credit", post(save_credit))
        .route("/debit", post(save_debit))
        .route("/recent", get(recent))
        .route("/import-csv", post(import_csv))
        .route("/import-manual", post(import_manual))
}

#[derive(Debug, Deserialize)]
pub struct CreditRequest {
    pub date: NaiveDate,
    pub category_name: String,
    pub particulars: String,
    pub amount: Money,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DebitRequest {
    pub date: NaiveDate,
    pub category_name: String,
    pub particulars: String,
    pub amount: Money,
    #[serde(default)]
    pub supplier_name: Option<String>,
    #[serde(default)]
    pub buyer_name: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

fn named(name: Option<&str>, role: CounterpartyRole) -> Option<Counterparty> {
    name.map(str::trim).filter(|n| !n.is_empty()).map(|n| Counterparty {
        name: n.to_string(),
        role,
    })
}

impl From<CreditRequest> for CashTransaction {
    fn from(body: CreditRequest) -> Self {
        CashTransaction {
            side: CategoryType::Credit,
            date: body.date,
            counterparty: named(body.contact_name.as_deref(), CounterpartyRole::Customer),
            category_name: body.category_name,
            particulars: body.particulars,
            amount: body.amount,
            reference: body.reference,
        }
    }
}

impl From<DebitRequest> for CashTransaction {
    fn from(body: DebitRequest) -> Self {
        CashTransaction {
            side: CategoryType::Debit,
            date: body.date,
            counterparty: named(body.supplier_name.as_deref(), CounterpartyRole::Supplier)
                .or_else(|| named(body.buyer_name.as_deref(), CounterpartyRole::Customer)),
            category_name: body.category_name,
            particulars: body.particulars,
            amount: body.amount,
            reference: body.reference,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ManualImport {
    #[serde(default)]
    pub transactions: Vec<CashBookRow>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

/// Cash-book entries are posted on save, so both permissions are needed.
async fn require_posting(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
) -> Result<(), ApiError> {
    require(services, tenant, principal, "journal_entry.create").await?;
    require(services, tenant, principal, "journal_entry.update").await?;
    Ok(())
}

async fn save_single(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    tx: CashTransaction,
) -> ApiResult {
    require_posting(services, tenant, principal).await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let summary = services
        .record_cash_transactions(tenant_id, std::slice::from_ref(&tx), principal.user_id(), Utc::now())
        .await?;
    let entry = summary
        .entries
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Internal("cash book entry was not saved".to_string()))?;
    Ok(created(json!({
        "message": format!("{} transaction saved successfully", tx.side.name()),
        "entry": entry,
        "accounts_created": summary.accounts_created,
        "contacts_created": summary.contacts_created,
    })))
}

async fn save_credit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CreditRequest>,
) -> ApiResult {
    save_single(&services, &tenant, &principal, body.into()).await
}

async fn save_debit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<DebitRequest>,
) -> ApiResult {
    save_single(&services, &tenant, &principal, body.into()).await
}

async fn recent(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<RecentQuery>,
) -> ApiResult {
    require(&services, &tenant, &principal, "journal_entry.read").await?;
    let tenant_id = tenant.tenant_id();
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    if !(1..=MAX_RECENT_LIMIT).contains(&limit) {
        return Err(DomainError::validation(format!("Limit must be between 1 and {MAX_RECENT_LIMIT}")).into());
    }
    let entries = services.journals.list(tenant_id).await?;
    let (_, names) = services.chart(tenant_id).await?;
    let cash = services.accounting_settings(tenant_id).await?.cash_account_id;
    Ok(ok(recent_transactions(&entries, cash, limit, |id| names.get(&id).cloned())))
}

async fn import_csv(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    body: String,
) -> ApiResult {
    require_posting(&services, &tenant, &principal).await?;
    if body.trim().is_empty() {
        return Err(DomainError::validation("CSV content is empty").into());
    }
    let parsed = parse_cash_book_csv(&body);
    if parsed.transactions.is_empty() {
        let mut errors = vec!["No cash book transactions found in the CSV".to_string()];
        errors.extend(parsed.skipped);
        return Err(DomainError::validation_all(errors).into());
    }
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let mut summary = services
        .record_cash_transactions(tenant_id, &parsed.transactions, principal.user_id(), Utc::now())
        .await?;
    if !parsed.skipped.is_empty() {
        tracing::warn!(tenant_id = %tenant_id, skipped = parsed.skipped.len(), "cash book rows skipped");
    }
    summary.skipped = parsed.skipped;
    Ok(ok(summary))
}

async fn import_manual(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ManualImport>,
) -> ApiResult {
    require_posting(&services, &tenant, &principal).await?;
    let transactions: Vec<CashTransaction> = body.transactions.iter().flat_map(CashBookRow::transactions).collect();
    if transactions.is_empty() {
        return Err(DomainError::validation("No cash book transactions to import").into());
    }
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let summary = services
        .record_cash_transactions(tenant_id, &transactions, principal.user_id(), Utc::now())
        .await?;
    Ok(ok(summary))
}
