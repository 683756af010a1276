use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use garments_core::{DomainError, Page, TenantId, execute};
use garments_infra::TenantStore;
use garments_inventory::WarehouseId;
use garments_invoicing::{
    CreateInvoice, Invoice, InvoiceCommand, InvoiceDraft, InvoiceEvent, InvoiceId, next_invoice_number,
};
use garments_sales::{NUMBER_PREFIX, SalesInvoice};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{
    InvoiceFilter, PageQuery, PaymentRequest, ReasonBody, created, ok, parse, require, sort_invoices,
};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub const SALES_SUBJECT: &str = "sales_invoice";

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_invoices).post(create_invoice))
        .route("/mark-overdue", post(mark_overdue))
        .route("/:id", get(get_invoice).put(update_invoice))
        .route("/:id/issue", post(issue_invoice))
        .route("/:id/payments", post(record_payment))
        .route("/:id/cancel", post(cancel_invoice))
        .route("/:id/void", post(void_invoice))
}

#[derive(Debug, Deserialize)]
pub struct SalesInvoiceRequest {
    #[serde(flatten)]
    pub draft: InvoiceDraft,
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
}

async fn load(services: &AppServices, tenant_id: TenantId, raw_id: &str) -> Result<SalesInvoice, ApiError> {
    let id: InvoiceId = parse(raw_id)?;
    services
        .sales_invoices
        .get(tenant_id, &id)
        .await?
        .ok_or_else(|| DomainError::not_found("Sales invoice").into())
}

/// Customer, products and warehouse referenced by a draft.
async fn check_draft(
    services: &AppServices,
    tenant_id: TenantId,
    draft: &InvoiceDraft,
    warehouse_id: Option<WarehouseId>,
) -> Result<(), ApiError> {
    let contact = services.contacts.get(tenant_id, &draft.contact_id).await?;
    SalesInvoice::check_customer(draft, contact.as_ref())?;
    services.check_invoice_refs(tenant_id, draft, warehouse_id).await
}

async fn save(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    sale: &SalesInvoice,
    events: &[InvoiceEvent],
) -> Result<(), ApiError> {
    let tenant_id = tenant.tenant_id();
    services.sales_invoices.upsert(tenant_id, sale.invoice.id, sale.clone()).await?;
    services
        .record_events(tenant_id, SALES_SUBJECT, sale.invoice.id, events, Some(principal.user_id()))
        .await?;
    Ok(())
}

async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(filter): Query<InvoiceFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult {
    require(&services, &tenant, &principal, "sales.read").await?;
    let page = page.request()?;
    let mut invoices: Vec<SalesInvoice> = services
        .sales_invoices
        .list(tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|s| filter.matches(&s.invoice))
        .collect();
    sort_invoices(&mut invoices, |s| &s.invoice);
    Ok(ok(Page::from_vec(invoices, page)))
}

async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "sales.read").await?;
    Ok(ok(load(&services, tenant.tenant_id(), &id).await?))
}

async fn create_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<SalesInvoiceRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "sales.write").await?;
    let tenant_id = tenant.tenant_id();
    check_draft(&services, tenant_id, &body.draft, body.warehouse_id).await?;

    let _guard = services.write_lock().await;
    let now = Utc::now();
    let existing = services.sales_invoices.list(tenant_id).await?;
    let number = next_invoice_number(
        NUMBER_PREFIX,
        now.date_naive(),
        existing.iter().map(|s| s.invoice.number.as_str()),
    );
    let invoice_id = InvoiceId::new();
    let mut invoice = Invoice::empty(invoice_id);
    let events = execute(
        &mut invoice,
        &InvoiceCommand::Create(CreateInvoice {
            invoice_id,
            number,
            draft: body.draft,
            created_by: principal.user_id(),
            occurred_at: now,
        }),
    )?;
    let sale = SalesInvoice::new(invoice, body.warehouse_id);
    save(&services, &tenant, &principal, &sale, &events).await?;

    tracing::info!(
        tenant_id = %tenant_id,
        number = %sale.invoice.number,
        total = %sale.invoice.totals.total_amount,
        "sales invoice created"
    );
    Ok(created(sale))
}

async fn update_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<SalesInvoiceRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "sales.write").await?;
    let tenant_id = tenant.tenant_id();
    check_draft(&services, tenant_id, &body.draft, body.warehouse_id).await?;

    let _guard = services.write_lock().await;
    let mut sale = load(&services, tenant_id, &id).await?;
    let events = execute(
        &mut sale.invoice,
        &InvoiceCommand::UpdateDraft {
            draft: body.draft,
            occurred_at: Utc::now(),
        },
    )?;
    sale.warehouse_id = body.warehouse_id;
    save(&services, &tenant, &principal, &sale, &events).await?;
    Ok(ok(sale))
}

/// Send the invoice: ship the products and post the receivable.
async fn issue_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "sales.write").await?;
    let tenant_id = tenant.tenant_id();
    let user_id = principal.user_id();
    let _guard = services.write_lock().await;
    let now = Utc::now();

    let mut sale = load(&services, tenant_id, &id).await?;
    let events = execute(&mut sale.invoice, &InvoiceCommand::Issue { occurred_at: now })?;

    // Nothing is stored until stock and the posting have both validated.
    let batch = services
        .prepare_stock(tenant_id, sale.stock_issues(user_id, now)?, now)
        .await?;
    let settings = services.accounting_settings(tenant_id).await?;
    let journal = services
        .prepare_posting(tenant_id, sale.sale_posting(&settings), user_id, now)
        .await?;

    if !batch.is_empty() {
        services.commit_stock(tenant_id, &batch, user_id).await?;
    }
    if let Some(prepared) = journal {
        let entry = services.commit_journal(tenant_id, prepared).await?;
        sale.journal_entry_ids.push(entry.id);
    }
    save(&services, &tenant, &principal, &sale, &events).await?;

    tracing::info!(tenant_id = %tenant_id, number = %sale.invoice.number, "sales invoice issued");
    Ok(ok(sale))
}

async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<PaymentRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "sales.write").await?;
    let tenant_id = tenant.tenant_id();
    let user_id = principal.user_id();
    let _guard = services.write_lock().await;
    let now = Utc::now();

    let mut sale = load(&services, tenant_id, &id).await?;
    let events = execute(
        &mut sale.invoice,
        &InvoiceCommand::RecordPayment(body.command(user_id, now)),
    )?;
    let payment = sale
        .invoice
        .payments
        .last()
        .cloned()
        .ok_or_else(|| DomainError::invariant("payment was not recorded"))?;

    let settings = services.accounting_settings(tenant_id).await?;
    let journal = services
        .prepare_posting(tenant_id, sale.receipt_posting(&settings, &payment), user_id, now)
        .await?;
    if let Some(prepared) = journal {
        let entry = services.commit_journal(tenant_id, prepared).await?;
        sale.journal_entry_ids.push(entry.id);
    }
    save(&services, &tenant, &principal, &sale, &events).await?;

    tracing::info!(
        tenant_id = %tenant_id,
        number = %sale.invoice.number,
        amount = %payment.amount,
        status = sale.invoice.status.name(),
        "customer payment recorded"
    );
    Ok(ok(sale))
}

async fn cancel_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<ReasonBody>>,
) -> ApiResult {
    require(&services, &tenant, &principal, "sales.write").await?;
    let reason = body.and_then(|Json(b)| b.optional());
    close_invoice(&services, &tenant, &principal, &id, reason, false).await
}

async fn void_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<ReasonBody>>,
) -> ApiResult {
    require(&services, &tenant, &principal, "sales.write").await?;
    let reason = body.and_then(|Json(b)| b.optional());
    close_invoice(&services, &tenant, &principal, &id, reason, true).await
}

/// Cancel or void, reversing whatever the invoice posted to the ledger.
async fn close_invoice(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    raw_id: &str,
    reason: Option<String>,
    void: bool,
) -> ApiResult {
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;
    let now = Utc::now();

    let mut sale = load(services, tenant_id, raw_id).await?;
    let command = if void {
        InvoiceCommand::Void { reason: reason.clone(), occurred_at: now }
    } else {
        InvoiceCommand::Cancel { reason: reason.clone(), occurred_at: now }
    };
    let events = execute(&mut sale.invoice, &command)?;
    let note = reason.unwrap_or_else(|| {
        format!("Invoice {} {}", sale.invoice.number, sale.invoice.status.name().to_lowercase())
    });
    services
        .reverse_journals(tenant_id, &sale.journal_entry_ids, &note, principal.user_id(), now)
        .await?;
    save(services, tenant, principal, &sale, &events).await?;

    tracing::info!(
        tenant_id = %tenant_id,
        number = %sale.invoice.number,
        status = sale.invoice.status.name(),
        "sales invoice closed"
    );
    Ok(ok(sale))
}

async fn mark_overdue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "sales.write").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;
    let now = Utc::now();
    let today = now.date_naive();

    let mut marked = Vec::new();
    for mut sale in services.sales_invoices.list(tenant_id).await? {
        if !sale.invoice.is_past_due(today) {
            continue;
        }
        let events = execute(&mut sale.invoice, &InvoiceCommand::MarkOverdue { today, occurred_at: now })?;
        save(&services, &tenant, &principal, &sale, &events).await?;
        marked.push(sale.invoice.number);
    }
    marked.sort();

    tracing::info!(tenant_id = %tenant_id, count = marked.len(), "sales invoices marked overdue");
    Ok(ok(json!({
        "updated": marked.len(),
        "invoice_numbers": marked,
    })))
}
