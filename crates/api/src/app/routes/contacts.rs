use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::{get, patch},
};
use chrono::Utc;

use garments_core::{DomainError, Page, TenantId};
use garments_infra::TenantStore;
use garments_parties::{Contact, ContactFilter, ContactId, ContactInput};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{PageQuery, created, deleted, ok, parse, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_contacts).post(create_contact))
        .route("/suppliers", get(suppliers))
        .route("/customers", get(customers))
        .route("/:id", get(get_contact).put(update_contact).delete(delete_contact))
        .route("/:id/activate", patch(activate))
        .route("/:id/deactivate", patch(deactivate))
}

async fn sorted_contacts(
    services: &AppServices,
    tenant_id: TenantId,
    keep: impl Fn(&Contact) -> bool,
) -> Result<Vec<Contact>, ApiError> {
    let mut contacts: Vec<Contact> = services
        .contacts
        .list(tenant_id)
        .await?
        .into_iter()
        .filter(|c| keep(c))
        .collect();
    contacts.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(contacts)
}

async fn load_contact(services: &AppServices, tenant_id: TenantId, raw_id: &str) -> Result<Contact, ApiError> {
    let id: ContactId = parse(raw_id)?;
    services
        .contacts
        .get(tenant_id, &id)
        .await?
        .ok_or_else(|| DomainError::not_found("Contact").into())
}

async fn list_contacts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(filter): Query<ContactFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult {
    require(&services, &tenant, &principal, "contacts.read").await?;
    let page = page.request()?;
    let contacts = sorted_contacts(&services, tenant.tenant_id(), |c| filter.matches(c)).await?;
    Ok(ok(Page::from_vec(contacts, page)))
}

async fn suppliers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "contacts.read").await?;
    let contacts = sorted_contacts(&services, tenant.tenant_id(), |c| {
        c.is_active && c.contact_type.is_supplier()
    })
    .await?;
    Ok(ok(contacts))
}

async fn customers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "contacts.read").await?;
    let contacts = sorted_contacts(&services, tenant.tenant_id(), |c| {
        c.is_active && c.contact_type.is_customer()
    })
    .await?;
    Ok(ok(contacts))
}

async fn get_contact(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "contacts.read").await?;
    Ok(ok(load_contact(&services, tenant.tenant_id(), &id).await?))
}

async fn create_contact(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ContactInput>,
) -> ApiResult {
    require(&services, &tenant, &principal, "contacts.write").await?;
    let contact = Contact::create(&body, Utc::now())?;
    services.contacts.upsert(tenant.tenant_id(), contact.id, contact.clone()).await?;
    tracing::info!(tenant_id = %tenant.tenant_id(), contact_id = %contact.id, name = %contact.name, "contact created");
    Ok(created(contact))
}

async fn update_contact(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ContactInput>,
) -> ApiResult {
    require(&services, &tenant, &principal, "contacts.write").await?;
    let mut contact = load_contact(&services, tenant.tenant_id(), &id).await?;
    contact.update(&body, Utc::now())?;
    services.contacts.upsert(tenant.tenant_id(), contact.id, contact.clone()).await?;
    Ok(ok(contact))
}

async fn set_active(
    services: &AppServices,
    tenant_id: TenantId,
    raw_id: &str,
    active: bool,
) -> Result<Contact, ApiError> {
    let mut contact = load_contact(services, tenant_id, raw_id).await?;
    contact.set_active(active, Utc::now());
    services.contacts.upsert(tenant_id, contact.id, contact.clone()).await?;
    tracing::info!(tenant_id = %tenant_id, contact_id = %contact.id, active, "contact status changed");
    Ok(contact)
}

async fn activate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "contacts.write").await?;
    Ok(ok(set_active(&services, tenant.tenant_id(), &id, true).await?))
}

async fn deactivate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "contacts.write").await?;
    Ok(ok(set_active(&services, tenant.tenant_id(), &id, false).await?))
}

async fn delete_contact(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "contacts.write").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let contact = load_contact(&services, tenant_id, &id).await?;
    let on_sales = services
        .sales_invoices
        .list(tenant_id)
        .await?
        .iter()
        .any(|i| i.invoice.contact_id == contact.id);
    let on_purchases = services
        .purchase_invoices
        .list(tenant_id)
        .await?
        .iter()
        .any(|i| i.invoice.contact_id == contact.id);
    if on_sales || on_purchases {
        return Err(DomainError::invariant(
            "Cannot delete a contact that is referenced by invoices. Consider deactivating instead.",
        )
        .into());
    }
    services.contacts.remove(tenant_id, &contact.id).await?;

    tracing::info!(tenant_id = %tenant_id, contact_id = %contact.id, "contact deleted");
    Ok(deleted("Contact"))
}
