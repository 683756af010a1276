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
use garments_purchasing::{NUMBER_PREFIX, PurchaseInvoice};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{
    InvoiceFilter, PageQuery, PaymentRequest, ReasonBody, created, ok, parse, require, sort_invoices,
};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub const PURCHASE_SUBJECT: &str = "purchase_invoice";

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
pub struct PurchaseInvoiceRequest {
    #[serde(flatten)]
    pub draft: InvoiceDraft,
    #[serde(default)]
    pub supplier_invoice_number: Option<String>,
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
}

async fn load(services: &AppServices, tenant_id: TenantId, raw_id: &str) -> Result<PurchaseInvoice, ApiError> {
    let id: InvoiceId = parse(raw_id)?;
    services
        .purchase_invoices
        .get(tenant_id, &id)
        .await?
        .ok_or_else(|| DomainError::not_found("Purchase invoice").into())
}

/// Supplier, products and warehouse referenced by a draft.
async fn check_draft(
    services: &AppServices,
    tenant_id: TenantId,
    draft: &InvoiceDraft,
    warehouse_id: Option<WarehouseId>,
) -> Result<(), ApiError> {
    let contact = services.contacts.get(tenant_id, &draft.contact_id).await?;
    PurchaseInvoice::check_supplier(draft, contact.as_ref())?;
    services.check_invoice_refs(tenant_id, draft, warehouse_id).await
}

async fn save(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    purchase: &PurchaseInvoice,
    events: &[InvoiceEvent],
) -> Result<(), ApiError> {
    let tenant_id = tenant.tenant_id();
    services.purchase_invoices.upsert(tenant_id, purchase.invoice.id, purchase.clone()).await?;
    services
        .record_events(tenant_id, PURCHASE_SUBJECT, purchase.invoice.id, events, Some(principal.user_id()))
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
    require(&services, &tenant, &principal, "purchasing.read").await?;
    let page = page.request()?;
    let mut invoices: Vec<PurchaseInvoice> = services
        .purchase_invoices
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
    require(&services, &tenant, &principal, "purchasing.read").await?;
    Ok(ok(load(&services, tenant.tenant_id(), &id).await?))
}

async fn create_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<PurchaseInvoiceRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "purchasing.write").await?;
    let tenant_id = tenant.tenant_id();
    check_draft(&services, tenant_id, &body.draft, body.warehouse_id).await?;

    let _guard = services.write_lock().await;
    let now = Utc::now();
    let existing = services.purchase_invoices.list(tenant_id).await?;
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
    let purchase = PurchaseInvoice::new(invoice, body.supplier_invoice_number, body.warehouse_id)?;
    save(&services, &tenant, &principal, &purchase, &events).await?;

    tracing::info!(
        tenant_id = %tenant_id,
        number = %purchase.invoice.number,
        total = %purchase.invoice.totals.total_amount,
        "purchase invoice created"
    );
    Ok(created(purchase))
}

async fn update_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<PurchaseInvoiceRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "purchasing.write").await?;
    let tenant_id = tenant.tenant_id();
    check_draft(&services, tenant_id, &body.draft, body.warehouse_id).await?;

    let _guard = services.write_lock().await;
    let mut purchase = load(&services, tenant_id, &id).await?;
    let events = execute(
        &mut purchase.invoice,
        &InvoiceCommand::UpdateDraft {
            draft: body.draft,
            occurred_at: Utc::now(),
        },
    )?;
    let header = PurchaseInvoice::new(purchase.invoice.clone(), body.supplier_invoice_number, body.warehouse_id)?;
    purchase.supplier_invoice_number = header.supplier_invoice_number;
    purchase.warehouse_id = header.warehouse_id;
    save(&services, &tenant, &principal, &purchase, &events).await?;
    Ok(ok(purchase))
}

/// Accept the bill: receive the products and post the payable.
async fn issue_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "purchasing.write").await?;
    let tenant_id = tenant.tenant_id();
    let user_id = principal.user_id();
    let _guard = services.write_lock().await;
    let now = Utc::now();

    let mut purchase = load(&services, tenant_id, &id).await?;
    let events = execute(&mut purchase.invoice, &InvoiceCommand::Issue { occurred_at: now })?;

    // Nothing is stored until stock and the posting have both validated.
    let batch = services
        .prepare_stock(tenant_id, purchase.stock_receipts(user_id, now)?, now)
        .await?;
    let settings = services.accounting_settings(tenant_id).await?;
    let journal = services
        .prepare_posting(tenant_id, purchase.purchase_posting(&settings), user_id, now)
        .await?;

    if !batch.is_empty() {
        services.commit_stock(tenant_id, &batch, user_id).await?;
    }
    if let Some(prepared) = journal {
        let entry = services.commit_journal(tenant_id, prepared).await?;
        purchase.journal_entry_ids.push(entry.id);
    }
    save(&services, &tenant, &principal, &purchase, &events).await?;

    tracing::info!(tenant_id = %tenant_id, number = %purchase.invoice.number, "purchase invoice issued");
    Ok(ok(purchase))
}

async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<PaymentRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "purchasing.write").await?;
    let tenant_id = tenant.tenant_id();
    let user_id = principal.user_id();
    let _guard = services.write_lock().await;
    let now = Utc::now();

    let mut purchase = load(&services, tenant_id, &id).await?;
    let events = execute(
        &mut purchase.invoice,
        &InvoiceCommand::RecordPayment(body.command(user_id, now)),
    )?;
    let payment = purchase
        .invoice
        .payments
        .last()
        .cloned()
        .ok_or_else(|| DomainError::invariant("payment was not recorded"))?;

    let settings = services.accounting_settings(tenant_id).await?;
    let journal = services
        .prepare_posting(tenant_id, purchase.payment_posting(&settings, &payment), user_id, now)
        .await?;
    if let Some(prepared) = journal {
        let entry = services.commit_journal(tenant_id, prepared).await?;
        purchase.journal_entry_ids.push(entry.id);
    }
    save(&services, &tenant, &principal, &purchase, &events).await?;

    tracing::info!(
        tenant_id = %tenant_id,
        number = %purchase.invoice.number,
        amount = %payment.amount,
        status = purchase.invoice.status.name(),
        "supplier payment recorded"
    );
    Ok(ok(purchase))
}

async fn cancel_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<ReasonBody>>,
) -> ApiResult {
    require(&services, &tenant, &principal, "purchasing.write").await?;
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
    require(&services, &tenant, &principal, "purchasing.write").await?;
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

    let mut purchase = load(services, tenant_id, raw_id).await?;
    let command = if void {
        InvoiceCommand::Void { reason: reason.clone(), occurred_at: now }
    } else {
        InvoiceCommand::Cancel { reason: reason.clone(), occurred_at: now }
    };
    let events = execute(&mut purchase.invoice, &command)?;
    let note = reason.unwrap_or_else(|| {
        format!("Invoice {} {}", purchase.invoice.number, purchase.invoice.status.name().to_lowercase())
    });
    services
        .reverse_journals(tenant_id, &purchase.journal_entry_ids, &note, principal.user_id(), now)
        .await?;
    save(services, tenant, principal, &purchase, &events).await?;

    tracing::info!(
        tenant_id = %tenant_id,
        number = %purchase.invoice.number,
        status = purchase.invoice.status.name(),
        "purchase invoice closed"
    );
    Ok(ok(purchase))
}

async fn mark_overdue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "purchasing.write").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;
    let now = Utc::now();
    let today = now.date_naive();

    let mut marked = Vec::new();
    for mut purchase in services.purchase_invoices.list(tenant_id).await? {
        if !purchase.invoice.is_past_due(today) {
            continue;
        }
        let events = execute(&mut purchase.invoice, &InvoiceCommand::MarkOverdue { today, occurred_at: now })?;
        save(&services, &tenant, &principal, &purchase, &events).await?;
        marked.push(purchase.invoice.number);
    }
    marked.sort();

    tracing::info!(tenant_id = %tenant_id, count = marked.len(), "purchase invoices marked overdue");
    Ok(ok(json!({
        "updated": marked.len(),
        "invoice_numbers": marked,
    })))
}
