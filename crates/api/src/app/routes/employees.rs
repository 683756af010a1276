use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::{get, put},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use garments_core::{DomainError, Page, TenantId};
use garments_infra::TenantStore;
use garments_payroll::{Employee, EmployeeId, EmployeeInput};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{PageQuery, created, ok, parse, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_employees).post(create_employee))
        .route("/:id", get(get_employee).put(update_employee))
        .route("/:id/terminate", put(terminate_employee))
}

#[derive(Debug, Default, Deserialize)]
pub struct EmployeeFilter {
    pub active: Option<bool>,
    pub department: Option<String>,
    pub search: Option<String>,
}

impl EmployeeFilter {
    fn matches(&self, e: &Employee) -> bool {
        if self.active.is_some_and(|a| a != e.is_active) {
            return false;
        }
        let in_department = self.department.as_deref().is_none_or(|wanted| {
            e.department.as_deref().is_some_and(|d| d.eq_ignore_ascii_case(wanted))
        });
        if !in_department {
            return false;
        }
        match self.search.as_deref().map(|s| s.trim().to_lowercase()) {
            Some(term) if !term.is_empty() => {
                e.full_name().to_lowercase().contains(&term) || e.email.to_lowercase().contains(&term)
            }
            _ => true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TerminateRequest {
    pub termination_date: Option<NaiveDate>,
}

async fn load(services: &AppServices, tenant_id: TenantId, raw_id: &str) -> Result<Employee, ApiError> {
    let id: EmployeeId = parse(raw_id)?;
    services
        .employees
        .get(tenant_id, &id)
        .await?
        .ok_or_else(|| DomainError::not_found("Employee").into())
}

async fn list_employees(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(filter): Query<EmployeeFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult {
    require(&services, &tenant, &principal, "payroll.read").await?;
    let page = page.request()?;
    let mut employees: Vec<Employee> = services
        .employees
        .list(tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|e| filter.matches(e))
        .collect();
    employees.sort_by(|a, b| {
        (a.last_name.to_lowercase(), a.first_name.to_lowercase())
            .cmp(&(b.last_name.to_lowercase(), b.first_name.to_lowercase()))
    });
    Ok(ok(Page::from_vec(employees, page)))
}

async fn get_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "payroll.read").await?;
    Ok(ok(load(&services, tenant.tenant_id(), &id).await?))
}

async fn create_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<EmployeeInput>,
) -> ApiResult {
    require(&services, &tenant, &principal, "payroll.write").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let existing = services.employees.list(tenant_id).await?;
    let employee = Employee::create(&body, &existing, Utc::now())?;
    services.employees.upsert(tenant_id, employee.id, employee.clone()).await?;

    tracing::info!(tenant_id = %tenant_id, employee_id = %employee.id, "employee created");
    Ok(created(employee))
}

async fn update_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<EmployeeInput>,
) -> ApiResult {
    require(&services, &tenant, &principal, "payroll.write").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let mut employee = load(&services, tenant_id, &id).await?;
    let existing = services.employees.list(tenant_id).await?;
    employee.update(&body, &existing, Utc::now())?;
    services.employees.upsert(tenant_id, employee.id, employee.clone()).await?;
    Ok(ok(employee))
}

async fn terminate_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<TerminateRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "payroll.write").await?;
    let tenant_id = tenant.tenant_id();
    let now = Utc::now();
    let _guard = services.write_lock().await;

    let mut employee = load(&services, tenant_id, &id).await?;
    employee.terminate(body.termination_date.unwrap_or_else(|| now.date_naive()), now)?;
    services.employees.upsert(tenant_id, employee.id, employee.clone()).await?;

    tracing::info!(
        tenant_id = %tenant_id,
        employee_id = %employee.id,
        termination_date = ?employee.termination_date,
        "employee terminated"
    );
    Ok(ok(employee))
}

#[cfg(test)]
mod tests {
    use super::*;
    use garments_core::Money;

    fn employee(department: Option<&str>) -> Employee {
        Employee::create(
            &EmployeeInput {
                first_name: "Ayesha".into(),
                last_name: "Khan".into(),
                email: "ayesha@example.com".into(),
                phone: None,
                address: None,
                department: department.map(str::to_string),
                position: None,
                hire_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
                salary: Money::from_minor(50_000_00),
                user_id: None,
            },
            &[],
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn filter_matches_department_case_insensitively() {
        let filter = EmployeeFilter {
            department: Some("stitching".into()),
            ..Default::default()
        };
        assert!(filter.matches(&employee(Some("Stitching"))));
        assert!(!filter.matches(&employee(Some("Cutting"))));
        assert!(!filter.matches(&employee(None)));
    }

    #[test]
    fn filter_searches_name_and_email() {
        let e = employee(None);
        let by_name = EmployeeFilter {
            search: Some(" ayesha k ".into()),
            ..Default::default()
        };
        let by_email = EmployeeFilter {
            search: Some("EXAMPLE.COM".into()),
            ..Default::default()
        };
        let miss = EmployeeFilter {
            search: Some("bilal".into()),
            ..Default::default()
        };
        assert!(by_name.matches(&e));
        assert!(by_email.matches(&e));
        assert!(!miss.matches(&e));
    }
}
