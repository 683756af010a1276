use std::str::FromStr;

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use garments_auth::{CommandAuthorization, Permission, Principal};
use garments_core::{DomainError, Money, PageRequest, UserId, parse_id};
use garments_invoicing::{Invoice, InvoiceStatus, PaymentId, RecordPayment};
use garments_parties::ContactId;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::{authorize_command, resolve_principal};
use crate::context::{PrincipalContext, TenantContext};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Permissions a handler needs before it touches any store.
pub struct PermissionGuard {
    pub required: Vec<Permission>,
}

impl CommandAuthorization for PermissionGuard {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Resolve the caller and check one permission.
pub async fn require(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    permission: &'static str,
) -> Result<Principal, ApiError> {
    let resolved = resolve_principal(services, tenant, principal).await?;
    let guard = PermissionGuard {
        required: vec![Permission::new(permission)],
    };
    if let Err(e) = authorize_command(&resolved, &guard) {
        tracing::warn!(
            user_id = %principal.user_id(),
            tenant_id = %tenant.tenant_id(),
            permission,
            "permission denied"
        );
        return Err(e.into());
    }
    Ok(resolved)
}

pub fn parse<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = DomainError>,
{
    Ok(parse_id(raw)?)
}

pub fn ok<T: Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

pub fn created<T: Serialize>(body: T) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

pub fn deleted(what: &str) -> Response {
    ok(serde_json::json!({ "message": format!("{what} deleted successfully") }))
}

/// Serialize rows into a CSV attachment.
pub fn csv_response<I, R>(filename: &str, header_row: &[&str], rows: I) -> Result<Response, ApiError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    let csv_error = |e: &dyn std::fmt::Display| {
        tracing::error!(error = %e, filename, "failed to write csv");
        ApiError::Internal("could not produce the export".to_string())
    };
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header_row).map_err(|e| csv_error(&e))?;
    for row in rows {
        writer.write_record(row).map_err(|e| csv_error(&e))?;
    }
    let body = writer.into_inner().map_err(|e| csv_error(&e))?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        body,
    )
        .into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageQuery {
    pub fn request(&self) -> Result<PageRequest, ApiError> {
        Ok(PageRequest::new(
            self.page.unwrap_or(1),
            self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            u32::MAX,
            MAX_PAGE_SIZE,
        )?)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonBody {
    #[serde(default)]
    pub reason: String,
}

impl ReasonBody {
    /// The trimmed reason, if one was given.
    pub fn optional(&self) -> Option<String> {
        Some(self.reason.trim().to_string()).filter(|r| !r.is_empty())
    }
}

/// Query filters shared by the sales and purchase invoice listings.
#[derive(Debug, Default, Deserialize)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub contact_id: Option<ContactId>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.status.is_none_or(|s| invoice.status == s)
            && self.contact_id.is_none_or(|c| invoice.contact_id == c)
            && self.from_date.is_none_or(|d| invoice.invoice_date >= d)
            && self.to_date.is_none_or(|d| invoice.invoice_date <= d)
    }
}

/// Newest invoices first.
pub fn sort_invoices<T>(invoices: &mut [T], invoice: impl Fn(&T) -> &Invoice) {
    invoices.sort_by(|a, b| {
        let (a, b) = (invoice(a), invoice(b));
        b.invoice_date.cmp(&a.invoice_date).then_with(|| b.number.cmp(&a.number))
    });
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: Money,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

impl PaymentRequest {
    pub fn command(&self, recorded_by: UserId, now: DateTime<Utc>) -> RecordPayment {
        RecordPayment {
            payment_id: PaymentId::new(),
            amount: self.amount,
            payment_date: self.payment_date.unwrap_or_else(|| now.date_naive()),
            method: self.method.clone(),
            reference: self.reference.clone(),
            recorded_by,
            occurred_at: now,
        }
    }
}
