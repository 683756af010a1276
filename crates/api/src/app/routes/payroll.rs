use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::{get, patch, post},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use garments_core::{DomainError, Page, TenantId, execute};
use garments_infra::TenantStore;
use garments_payroll::{
    CreatePayroll, EmployeeId, Payroll, PayrollCommand, PayrollEvent, PayrollId, PayrollStatus, PayrollTerms,
    run_for_period,
};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{PageQuery, created, deleted, ok, parse, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub const PAYROLL_SUBJECT: &str = "payroll";

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_payrolls).post(create_payroll))
        .route("/run", post(run_payroll))
        .route("/:id", get(get_payroll).put(update_payroll).delete(delete_payroll))
        .route("/:id/approve", patch(approve_payroll))
        .route("/:id/process", patch(process_payroll))
        .route("/:id/pay", patch(pay_payroll))
}

#[derive(Debug, Default, Deserialize)]
pub struct PayrollFilter {
    pub status: Option<PayrollStatus>,
    pub employee_id: Option<EmployeeId>,
}

#[derive(Debug, Deserialize)]
pub struct PayrollRequest {
    pub employee_id: EmployeeId,
    #[serde(flatten)]
    pub terms: PayrollTerms,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub pay_period_start: NaiveDate,
    pub pay_period_end: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
pub struct PayRequest {
    #[serde(default)]
    pub paid_on: Option<NaiveDate>,
}

async fn load(services: &AppServices, tenant_id: TenantId, raw_id: &str) -> Result<Payroll, ApiError> {
    let id: PayrollId = parse(raw_id)?;
    services
        .payrolls
        .get(tenant_id, &id)
        .await?
        .ok_or_else(|| DomainError::not_found("Payroll").into())
}

async fn save(
    services: &AppServices,
    tenant_id: TenantId,
    principal: &PrincipalContext,
    payroll: &Payroll,
    events: &[PayrollEvent],
) -> Result<(), ApiError> {
    services.payrolls.upsert(tenant_id, payroll.id, payroll.clone()).await?;
    services
        .record_events(tenant_id, PAYROLL_SUBJECT, payroll.id, events, Some(principal.user_id()))
        .await?;
    Ok(())
}

/// Reject a period that overlaps another payroll of the same employee.
fn ensure_no_overlap(
    existing: &[Payroll],
    skip: Option<PayrollId>,
    employee_id: EmployeeId,
    terms: &PayrollTerms,
) -> Result<(), ApiError> {
    let clash = existing.iter().any(|p| {
        Some(p.id) != skip
            && p.employee_id == employee_id
            && p.overlaps(terms.pay_period_start, terms.pay_period_end)
    });
    if clash {
        return Err(DomainError::conflict("The employee already has a payroll overlapping this period").into());
    }
    Ok(())
}

async fn list_payrolls(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(filter): Query<PayrollFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult {
    require(&services, &tenant, &principal, "payroll.read").await?;
    let page = page.request()?;
    let mut payrolls: Vec<Payroll> = services
        .payrolls
        .list(tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|p| filter.status.is_none_or(|s| p.status == s))
        .filter(|p| filter.employee_id.is_none_or(|e| p.employee_id == e))
        .collect();
    payrolls.sort_by(|a, b| {
        b.pay_period_start
            .cmp(&a.pay_period_start)
            .then_with(|| a.employee_id.cmp(&b.employee_id))
    });
    Ok(ok(Page::from_vec(payrolls, page)))
}

async fn get_payroll(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "payroll.read").await?;
    Ok(ok(load(&services, tenant.tenant_id(), &id).await?))
}

async fn create_payroll(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<PayrollRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "payroll.write").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let employee = services
        .employees
        .get(tenant_id, &body.employee_id)
        .await?
        .ok_or_else(|| DomainError::not_found("Employee"))?;
    if !employee.is_payable_for(body.terms.pay_period_start, body.terms.pay_period_end) {
        return Err(DomainError::invariant(format!(
            "{} is not employed during this pay period",
            employee.full_name()
        ))
        .into());
    }
    let existing = services.payrolls.list(tenant_id).await?;
    ensure_no_overlap(&existing, None, employee.id, &body.terms)?;

    let payroll_id = PayrollId::new();
    let mut payroll = Payroll::empty(payroll_id);
    let events = execute(
        &mut payroll,
        &PayrollCommand::Create(CreatePayroll {
            payroll_id,
            employee_id: employee.id,
            terms: body.terms,
            created_by: principal.user_id(),
            occurred_at: Utc::now(),
        }),
    )?;
    save(&services, tenant_id, &principal, &payroll, &events).await?;

    tracing::info!(tenant_id = %tenant_id, payroll_id = %payroll.id, employee_id = %employee.id, "payroll created");
    Ok(created(payroll))
}

/// Draft payrolls for every payable employee without one in the period.
async fn run_payroll(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<RunRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "payroll.write").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;
    let now = Utc::now();

    let employees = services.employees.list(tenant_id).await?;
    let existing = services.payrolls.list(tenant_id).await?;
    let commands = run_for_period(
        &employees,
        &existing,
        body.pay_period_start,
        body.pay_period_end,
        principal.user_id(),
        now,
    )?;

    let mut created_payrolls = Vec::with_capacity(commands.len());
    for command in commands {
        let mut payroll = Payroll::empty(command.payroll_id);
        let events = execute(&mut payroll, &PayrollCommand::Create(command))?;
        save(&services, tenant_id, &principal, &payroll, &events).await?;
        created_payrolls.push(payroll);
    }

    tracing::info!(
        tenant_id = %tenant_id,
        start = %body.pay_period_start,
        end = %body.pay_period_end,
        count = created_payrolls.len(),
        "payroll run completed"
    );
    Ok(created(json!({
        "created": created_payrolls.len(),
        "payrolls": created_payrolls,
    })))
}

async fn update_payroll(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(terms): Json<PayrollTerms>,
) -> ApiResult {
    require(&services, &tenant, &principal, "payroll.write").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let mut payroll = load(&services, tenant_id, &id).await?;
    let existing = services.payrolls.list(tenant_id).await?;
    ensure_no_overlap(&existing, Some(payroll.id), payroll.employee_id, &terms)?;
    let events = execute(
        &mut payroll,
        &PayrollCommand::Update {
            terms,
            occurred_at: Utc::now(),
        },
    )?;
    save(&services, tenant_id, &principal, &payroll, &events).await?;
    Ok(ok(payroll))
}

async fn delete_payroll(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "payroll.write").await?;
    let tenant_id = tenant.tenant_id();
    let payroll = load(&services, tenant_id, &id).await?;
    payroll.ensure_deletable()?;
    services.payrolls.remove(tenant_id, &payroll.id).await?;

    tracing::info!(tenant_id = %tenant_id, payroll_id = %payroll.id, "payroll deleted");
    Ok(deleted("Payroll"))
}

async fn transition(
    services: &AppServices,
    tenant_id: TenantId,
    principal: &PrincipalContext,
    raw_id: &str,
    command: PayrollCommand,
) -> Result<Payroll, ApiError> {
    let mut payroll = load(services, tenant_id, raw_id).await?;
    let events = execute(&mut payroll, &command)?;
    save(services, tenant_id, principal, &payroll, &events).await?;
    tracing::info!(
        tenant_id = %tenant_id,
        payroll_id = %payroll.id,
        status = payroll.status.name(),
        "payroll status changed"
    );
    Ok(payroll)
}

async fn approve_payroll(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "payroll.approve").await?;
    let command = PayrollCommand::Approve {
        approved_by: principal.user_id(),
        occurred_at: Utc::now(),
    };
    Ok(ok(transition(&services, tenant.tenant_id(), &principal, &id, command).await?))
}

async fn process_payroll(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "payroll.write").await?;
    let command = PayrollCommand::Process { occurred_at: Utc::now() };
    Ok(ok(transition(&services, tenant.tenant_id(), &principal, &id, command).await?))
}

/// Mark paid and post the net salary when the payroll accounts are configured.
async fn pay_payroll(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<PayRequest>>,
) -> ApiResult {
    require(&services, &tenant, &principal, "payroll.write").await?;
    let tenant_id = tenant.tenant_id();
    let user_id = principal.user_id();
    let _guard = services.write_lock().await;
    let now = Utc::now();
    let paid_on = body
        .and_then(|Json(b)| b.paid_on)
        .unwrap_or_else(|| now.date_naive());

    let mut payroll = load(&services, tenant_id, &id).await?;
    let employee = services
        .employees
        .get(tenant_id, &payroll.employee_id)
        .await?
        .ok_or_else(|| DomainError::not_found("Employee"))?;
    let events = execute(&mut payroll, &PayrollCommand::Pay { paid_on, occurred_at: now })?;

    let settings = services.accounting_settings(tenant_id).await?;
    let journal = services
        .prepare_posting(tenant_id, payroll.salary_posting(&settings, &employee), user_id, now)
        .await?;
    let journal_entry = match journal {
        Some(prepared) => Some(services.commit_journal(tenant_id, prepared).await?),
        None => None,
    };
    save(&services, tenant_id, &principal, &payroll, &events).await?;

    tracing::info!(
        tenant_id = %tenant_id,
        payroll_id = %payroll.id,
        net_salary = %payroll.net_salary,
        posted = journal_entry.is_some(),
        "payroll paid"
    );
    Ok(ok(json!({
        "payroll": payroll,
        "journal_entry_id": journal_entry.map(|e| e.id),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use garments_core::{Money, UserId};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn terms(start: NaiveDate, end: NaiveDate) -> PayrollTerms {
        PayrollTerms {
            pay_period_start: start,
            pay_period_end: end,
            gross_salary: Money::from_minor(40_000_00),
            deductions: Money::ZERO,
        }
    }

    fn payroll(employee_id: EmployeeId, start: NaiveDate, end: NaiveDate) -> Payroll {
        let payroll_id = PayrollId::new();
        let mut p = Payroll::empty(payroll_id);
        execute(
            &mut p,
            &PayrollCommand::Create(CreatePayroll {
                payroll_id,
                employee_id,
                terms: terms(start, end),
                created_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        p
    }

    #[test]
    fn overlapping_period_for_same_employee_is_rejected() {
        let employee = EmployeeId::new();
        let existing = vec![payroll(employee, date(6, 1), date(6, 30))];

        let clash = ensure_no_overlap(&existing, None, employee, &terms(date(6, 15), date(7, 14)));
        assert!(matches!(clash, Err(ApiError::Domain(DomainError::Conflict(_)))));

        assert!(ensure_no_overlap(&existing, None, employee, &terms(date(7, 1), date(7, 31))).is_ok());
        assert!(ensure_no_overlap(&existing, None, EmployeeId::new(), &terms(date(6, 1), date(6, 30))).is_ok());
    }

    #[test]
    fn editing_a_payroll_does_not_clash_with_itself() {
        let employee = EmployeeId::new();
        let existing = vec![payroll(employee, date(6, 1), date(6, 30))];
        let own = existing[0].id;
        assert!(ensure_no_overlap(&existing, Some(own), employee, &terms(date(6, 1), date(6, 29))).is_ok());
    }
}
