use std::sync::Arc;

use axum::{Json, Router, extract::Extension, routing::get};

use garments_accounting::{AccountId, AccountingSettings};
use garments_core::DomainError;
use garments_infra::TenantStore;
use garments_infra::store::SETTINGS_KEY;

use crate::app::errors::ApiResult;
use crate::app::routes::common::{ok, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new().route("/accounting", get(get_accounting).put(put_accounting))
}

fn configured(settings: &AccountingSettings) -> [(&'static str, Option<AccountId>); 6] {
    [
        ("Receivable account", settings.receivable_account_id),
        ("Revenue account", settings.revenue_account_id),
        ("Payable account", settings.payable_account_id),
        ("Purchase account", settings.purchase_account_id),
        ("Cash account", settings.cash_account_id),
        ("Salary expense account", settings.salary_expense_account_id),
    ]
}

async fn get_accounting(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "settings.read").await?;
    Ok(ok(services.accounting_settings(tenant.tenant_id()).await?))
}

/// Replace the account mapping; every id given must be a postable account.
async fn put_accounting(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<AccountingSettings>,
) -> ApiResult {
    require(&services, &tenant, &principal, "settings.write").await?;
    let tenant_id = tenant.tenant_id();

    let mut errors = Vec::new();
    for (label, id) in configured(&body) {
        let Some(id) = id else { continue };
        match services.accounts.get(tenant_id, &id).await? {
            None => errors.push(format!("{label} {id} does not exist")),
            Some(account) if !account.accepts_postings() => errors.push(format!(
                "{label} {} ({}) does not accept transactions",
                account.code, account.name
            )),
            Some(_) => {}
        }
    }
    if !errors.is_empty() {
        return Err(DomainError::validation_all(errors).into());
    }

    services.settings.upsert(tenant_id, SETTINGS_KEY.to_string(), body.clone()).await?;
    tracing::info!(tenant_id = %tenant_id, user_id = %principal.user_id(), "accounting settings updated");
    Ok(ok(body))
}
