use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use garments_accounting::trial_balance::{account_transactions, generate};
use garments_accounting::{AccountId, ComparisonRequest, TrialBalanceReport, TrialBalanceRequest, compare};
use garments_core::{DomainError, TenantId};
use garments_infra::TenantStore;

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{csv_response, ok, parse, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(trial_balance))
        .route("/account/:id/transactions", get(transactions))
        .route("/compare", post(compare_periods))
        .route("/export", post(export))
}

/// Query-string form of a trial balance request; `category_filter` is comma separated.
#[derive(Debug, Default, Deserialize)]
pub struct TrialBalanceQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub group_by_category: Option<bool>,
    pub include_zero_balances: Option<bool>,
    pub category_filter: Option<String>,
}

impl TrialBalanceQuery {
    fn into_request(self) -> Result<TrialBalanceRequest, DomainError> {
        let mut missing = Vec::new();
        if self.start_date.is_none() {
            missing.push("Start date is required".to_string());
        }
        if self.end_date.is_none() {
            missing.push("End date is required".to_string());
        }
        let (Some(start), Some(end)) = (self.start_date, self.end_date) else {
            return Err(DomainError::validation_all(missing));
        };
        let mut request = TrialBalanceRequest::new(start, end);
        if let Some(group) = self.group_by_category {
            request.group_by_category = group;
        }
        request.include_zero_balances = self.include_zero_balances.unwrap_or(false);
        request.category_filter = self
            .category_filter
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        Ok(request)
    }
}

#[derive(Debug, Deserialize)]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Generate a report, reusing the tenant's cached copy when present.
async fn report_for(
    services: &AppServices,
    tenant_id: TenantId,
    request: &TrialBalanceRequest,
) -> Result<TrialBalanceReport, ApiError> {
    request.validate()?;
    let key = format!("trial_balance:{}", request.cache_key());
    if let Some(report) = services.cached::<TrialBalanceReport>(tenant_id, &key).await {
        tracing::debug!(tenant_id = %tenant_id, key = %key, "trial balance served from cache");
        return Ok(report);
    }

    let started = std::time::Instant::now();
    let accounts = services.accounts.list(tenant_id).await?;
    let entries = services.journals.list(tenant_id).await?;
    let report = generate(request, &accounts, &entries, Utc::now())?;
    services.cache(tenant_id, &key, &report).await;

    tracing::info!(
        tenant_id = %tenant_id,
        start = %request.start_date,
        end = %request.end_date,
        accounts = report.account_rows().len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "trial balance generated"
    );
    Ok(report)
}

async fn trial_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<TrialBalanceQuery>,
) -> ApiResult {
    require(&services, &tenant, &principal, "trial_balance.view").await?;
    let request = query.into_request()?;
    Ok(ok(report_for(&services, tenant.tenant_id(), &request).await?))
}

async fn transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(range): Query<DateRange>,
) -> ApiResult {
    require(&services, &tenant, &principal, "trial_balance.view").await?;
    let tenant_id = tenant.tenant_id();
    let id: AccountId = parse(&id)?;
    let account = services
        .accounts
        .get(tenant_id, &id)
        .await?
        .ok_or_else(|| DomainError::not_found("Account"))?;
    let entries = services.journals.list(tenant_id).await?;
    let rows = account_transactions(&account, &entries, range.start_date, range.end_date)?;
    Ok(ok(json!({
        "account_id": account.id,
        "account_code": account.code,
        "account_name": account.name,
        "start_date": range.start_date,
        "end_date": range.end_date,
        "transactions": rows,
    })))
}

async fn compare_periods(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ComparisonRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "trial_balance.compare").await?;
    body.validate()?;
    let tenant_id = tenant.tenant_id();
    let period1 = report_for(&services, tenant_id, &body.period1).await?;
    let period2 = report_for(&services, tenant_id, &body.period2).await?;
    Ok(ok(compare(period1, period2)))
}

const EXPORT_HEADER: [&str; 9] = [
    "Category",
    "Account Code",
    "Account Name",
    "Category Description",
    "Particulars",
    "Debit",
    "Credit",
    "Net Balance",
    "Transactions",
];

fn export_rows(report: &TrialBalanceReport) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = report
        .account_rows()
        .into_iter()
        .map(|a| {
            vec![
                a.category_name.clone(),
                a.account_code.clone(),
                a.account_name.clone(),
                a.category_description.clone(),
                a.particulars.clone(),
                a.debit_amount.to_major_string(),
                a.credit_amount.to_major_string(),
                a.net_balance.to_major_string(),
                a.transaction_count.to_string(),
            ]
        })
        .collect();
    rows.push(vec![String::new(); EXPORT_HEADER.len()]);
    rows.push(vec![
        "Totals".to_string(),
        String::new(),
        String::new(),
        String::new(),
        report.calculation_expression.clone(),
        report.total_debits.to_major_string(),
        report.total_credits.to_major_string(),
        report.final_balance.to_major_string(),
        report.total_transactions.to_string(),
    ]);
    rows
}

async fn export(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<TrialBalanceRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "trial_balance.view").await?;
    let report = report_for(&services, tenant.tenant_id(), &body).await?;
    let filename = format!("trial_balance_{}_{}.csv", body.start_date, body.end_date);
    csv_response(&filename, &EXPORT_HEADER, export_rows(&report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_requires_both_dates() {
        let err = TrialBalanceQuery::default().into_request().unwrap_err();
        assert_eq!(
            err,
            DomainError::Validation("Start date is required; End date is required".to_string())
        );
    }

    #[test]
    fn query_splits_category_filter() {
        let query = TrialBalanceQuery {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 31),
            group_by_category: Some(false),
            include_zero_balances: None,
            category_filter: Some(" Assets, ,Income ".to_string()),
        };
        let request = query.into_request().unwrap();
        assert!(!request.group_by_category);
        assert!(!request.include_zero_balances);
        assert_eq!(request.category_filter, vec!["Assets".to_string(), "Income".to_string()]);
    }
}
