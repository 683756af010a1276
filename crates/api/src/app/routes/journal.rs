use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::{get, patch, post},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use garments_accounting::journal_query::{JournalEntryRow, JournalSummary, distinct_categories, list_entries, statistics};
use garments_accounting::{
    CreateJournalEntry, JournalCommand, JournalEntry, JournalEntryId, JournalFilterParams, JournalLineInput,
    JournalStatus, JournalType, StatisticsParams, UpdateJournalEntry, validate_lines,
};
use garments_core::{DomainError, TenantId, execute};
use garments_infra::TenantStore;

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{ReasonBody, created, csv_response, deleted, ok, parse, require};
use crate::app::services::{AppServices, JOURNAL_SUBJECT};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_journal_entries).post(create_journal_entry))
        .route("/statistics", get(journal_statistics))
        .route("/export", post(export_journal_entries))
        .route("/categories", get(categories))
        .route("/statuses", get(statuses))
        .route("/types", get(types))
        .route(
            "/:id",
            get(get_journal_entry)
                .put(update_journal_entry)
                .delete(delete_journal_entry),
        )
        .route("/:id/post", patch(post_journal_entry))
        .route("/:id/approve", patch(approve_journal_entry))
        .route("/:id/reverse", patch(reverse_journal_entry))
        .route("/:id/validate", get(validate_journal_entry))
        .route("/:id/audit-trail", get(audit_trail))
}

#[derive(Debug, Deserialize)]
pub struct JournalEntryRequest {
    pub transaction_date: NaiveDate,
    #[serde(default)]
    pub journal_type: Option<JournalType>,
    #[serde(default)]
    pub reference_number: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub lines: Vec<JournalLineInput>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportRequest {
    #[serde(flatten)]
    pub filter: JournalFilterParams,
    #[serde(default)]
    pub include_summary: bool,
}

async fn load_entry(services: &AppServices, tenant_id: TenantId, raw_id: &str) -> Result<JournalEntry, ApiError> {
    let id: JournalEntryId = parse(raw_id)?;
    services
        .journals
        .get(tenant_id, &id)
        .await?
        .ok_or_else(|| DomainError::not_found("Journal entry").into())
}

/// Run one command against a stored entry and persist the outcome.
async fn apply(
    services: &AppServices,
    tenant_id: TenantId,
    raw_id: &str,
    command: JournalCommand,
) -> Result<JournalEntry, ApiError> {
    let _guard = services.write_lock().await;
    let mut entry = load_entry(services, tenant_id, raw_id).await?;
    if let JournalCommand::Update(update) = &command {
        services.check_line_accounts(tenant_id, &update.lines).await?;
    }
    let events = execute(&mut entry, &command)?;
    services.journals.upsert(tenant_id, entry.id, entry.clone()).await?;
    services.record_journal_events(tenant_id, &entry, &events).await?;
    services.invalidate_balances(tenant_id).await;

    tracing::info!(
        tenant_id = %tenant_id,
        journal_number = %entry.journal_number,
        status = entry.status.name(),
        "journal entry changed"
    );
    Ok(entry)
}

async fn list_journal_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(params): Query<JournalFilterParams>,
) -> ApiResult {
    require(&services, &tenant, &principal, "journal_entry.read").await?;
    let filter = params.validate()?;
    let (_, names) = services.chart(tenant.tenant_id()).await?;
    let entries = services.journals.list(tenant.tenant_id()).await?;
    Ok(ok(list_entries(&entries, &names, &filter)))
}

async fn get_journal_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "journal_entry.read").await?;
    Ok(ok(load_entry(&services, tenant.tenant_id(), &id).await?))
}

async fn create_journal_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<JournalEntryRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "journal_entry.create").await?;
    let tenant_id = tenant.tenant_id();
    let now = Utc::now();
    let _guard = services.write_lock().await;

    let prepared = services
        .prepare_journal(tenant_id, now, |entry_id, journal_number| CreateJournalEntry {
            entry_id,
            journal_number,
            transaction_date: body.transaction_date,
            journal_type: body.journal_type.unwrap_or(JournalType::General),
            reference_number: body.reference_number,
            description: body.description,
            lines: body.lines,
            post_immediately: false,
            created_by: principal.user_id(),
            occurred_at: now,
        })
        .await?;
    let entry = services.commit_journal(tenant_id, prepared).await?;
    Ok(created(entry))
}

async fn update_journal_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<JournalEntryRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "journal_entry.update").await?;
    let command = JournalCommand::Update(UpdateJournalEntry {
        transaction_date: body.transaction_date,
        journal_type: body.journal_type.unwrap_or(JournalType::General),
        reference_number: body.reference_number,
        description: body.description,
        lines: body.lines,
        updated_by: principal.user_id(),
        occurred_at: Utc::now(),
    });
    Ok(ok(apply(&services, tenant.tenant_id(), &id, command).await?))
}

async fn delete_journal_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "journal_entry.delete").await?;
    let command = JournalCommand::Reverse {
        reason: "Deleted".to_string(),
        reversed_by: principal.user_id(),
        occurred_at: Utc::now(),
    };
    apply(&services, tenant.tenant_id(), &id, command).await?;
    Ok(deleted("Journal entry"))
}

async fn post_journal_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "journal_entry.update").await?;
    let command = JournalCommand::Post {
        posted_by: principal.user_id(),
        occurred_at: Utc::now(),
    };
    Ok(ok(apply(&services, tenant.tenant_id(), &id, command).await?))
}

async fn approve_journal_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "journal_entry.approve").await?;
    let command = JournalCommand::Approve {
        approved_by: principal.user_id(),
        occurred_at: Utc::now(),
    };
    Ok(ok(apply(&services, tenant.tenant_id(), &id, command).await?))
}

async fn reverse_journal_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ReasonBody>,
) -> ApiResult {
    require(&services, &tenant, &principal, "journal_entry.reverse").await?;
    let command = JournalCommand::Reverse {
        reason: body.reason,
        reversed_by: principal.user_id(),
        occurred_at: Utc::now(),
    };
    Ok(ok(apply(&services, tenant.tenant_id(), &id, command).await?))
}

async fn validate_journal_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "journal_entry.read").await?;
    let entry = load_entry(&services, tenant.tenant_id(), &id).await?;
    let lines = entry.line_inputs();
    let mut validation = validate_lines(&lines);
    match services.check_line_accounts(tenant.tenant_id(), &lines).await {
        Ok(()) => {}
        Err(ApiError::Domain(DomainError::Validation(msg))) => {
            validation.errors.extend(msg.split("; ").map(str::to_string));
        }
        Err(other) => return Err(other),
    }
    validation.is_valid = validation.errors.is_empty();
    Ok(ok(validation))
}

async fn audit_trail(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "journal_entry.read").await?;
    let entry = load_entry(&services, tenant.tenant_id(), &id).await?;
    let records = services
        .audit
        .list(tenant.tenant_id(), JOURNAL_SUBJECT, &entry.id.to_string())
        .await?;
    let trail: Vec<_> = records
        .into_iter()
        .map(|r| {
            json!({
                "timestamp": r.occurred_at,
                "action": r.event_type,
                "user_id": r.actor,
                "details": r.details,
            })
        })
        .collect();
    Ok(ok(json!({
        "journal_entry_id": entry.id,
        "journal_number": entry.journal_number,
        "audit_trail": trail,
    })))
}

async fn journal_statistics(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(params): Query<StatisticsParams>,
) -> ApiResult {
    require(&services, &tenant, &principal, "journal_entry.read").await?;
    let (_, names) = services.chart(tenant.tenant_id()).await?;
    let entries = services.journals.list(tenant.tenant_id()).await?;
    Ok(ok(statistics(&entries, &names, &params)?))
}

const EXPORT_HEADER: [&str; 9] = [
    "Journal Number",
    "Date",
    "Type",
    "Category",
    "Contact",
    "Particulars",
    "Reference",
    "Amount",
    "Status",
];

fn export_row(row: JournalEntryRow) -> Vec<String> {
    vec![
        row.journal_number,
        row.date.to_string(),
        row.entry_type.name().to_string(),
        row.category_name,
        row.contact_name.unwrap_or_default(),
        row.particulars.unwrap_or_default(),
        row.reference_number,
        row.amount.to_string(),
        row.status.name().to_string(),
    ]
}

fn summary_rows(summary: &JournalSummary) -> Vec<Vec<String>> {
    let labelled = |label: &str, value: String| {
        let mut row = vec![String::new(); EXPORT_HEADER.len()];
        row[0] = label.to_string();
        row[EXPORT_HEADER.len() - 2] = value;
        row
    };
    vec![
        vec![String::new(); EXPORT_HEADER.len()],
        labelled("Total Entries", summary.total_entries.to_string()),
        labelled("Total Debits", summary.total_debits.to_string()),
        labelled("Total Credits", summary.total_credits.to_string()),
        labelled("Balance", summary.balance.to_string()),
    ]
}

async fn export_journal_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ExportRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "journal_entry.export").await?;
    let filter = body.filter.validate()?;
    let (_, names) = services.chart(tenant.tenant_id()).await?;
    let entries = services.journals.list(tenant.tenant_id()).await?;
    let matched = filter.apply(&entries, &names);

    let mut rows: Vec<Vec<String>> = matched
        .iter()
        .map(|e| export_row(JournalEntryRow::from_entry(e, &names)))
        .collect();
    if body.include_summary {
        rows.extend(summary_rows(&JournalSummary::over(matched.iter().copied())));
    }

    tracing::info!(tenant_id = %tenant.tenant_id(), rows = matched.len(), "journal entries exported");
    let filename = format!("journal_entries_{}.csv", Utc::now().format("%Y%m%d_%H%M%S"));
    csv_response(&filename, &EXPORT_HEADER, rows)
}

async fn categories(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "journal_entry.read").await?;
    let (_, names) = services.chart(tenant.tenant_id()).await?;
    let entries = services.journals.list(tenant.tenant_id()).await?;
    Ok(ok(distinct_categories(&entries, &names)))
}

async fn statuses(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "journal_entry.read").await?;
    Ok(ok(JournalStatus::ALL.iter().map(|s| s.name()).collect::<Vec<_>>()))
}

async fn types(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "journal_entry.read").await?;
    Ok(ok(JournalType::ALL.iter().map(|t| t.name()).collect::<Vec<_>>()))
}
