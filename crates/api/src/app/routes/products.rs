use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;

use garments_core::{DomainError, Page};
use garments_infra::TenantStore;
use garments_inventory::{Product, ProductId, ProductInput};

use crate::app::errors::ApiResult;
use crate::app::routes::common::{PageQuery, created, ok, parse, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product).put(update_product))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub active: Option<bool>,
}

impl ProductFilter {
    fn matches(&self, p: &Product) -> bool {
        if self.active.is_some_and(|a| a != p.is_active) {
            return false;
        }
        match self.search.as_deref().map(|s| s.trim().to_lowercase()) {
            Some(term) if !term.is_empty() => {
                p.sku.to_lowercase().contains(&term) || p.name.to_lowercase().contains(&term)
            }
            _ => true,
        }
    }
}

async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(filter): Query<ProductFilter>,
    Query(page): Query<PageQuery>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.read").await?;
    let page = page.request()?;
    let mut products: Vec<Product> = services
        .products
        .list(tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|p| filter.matches(p))
        .collect();
    products.sort_by(|a, b| a.sku.cmp(&b.sku));
    Ok(ok(Page::from_vec(products, page)))
}

async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.read").await?;
    let id: ProductId = parse(&id)?;
    let product = services
        .products
        .get(tenant.tenant_id(), &id)
        .await?
        .ok_or_else(|| DomainError::not_found("Product"))?;
    Ok(ok(product))
}

async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ProductInput>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.write").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let existing = services.products.list(tenant_id).await?;
    let product = Product::create(&body, &existing, Utc::now())?;
    services.products.upsert(tenant_id, product.id, product.clone()).await?;

    tracing::info!(tenant_id = %tenant_id, sku = %product.sku, "product created");
    Ok(created(product))
}

async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ProductInput>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.write").await?;
    let tenant_id = tenant.tenant_id();
    let id: ProductId = parse(&id)?;
    let _guard = services.write_lock().await;

    let existing = services.products.list(tenant_id).await?;
    let mut product = existing
        .iter()
        .find(|p| p.id == id)
        .cloned()
        .ok_or_else(|| DomainError::not_found("Product"))?;
    product.update(&body, &existing, Utc::now())?;
    services.products.upsert(tenant_id, product.id, product.clone()).await?;

    tracing::info!(tenant_id = %tenant_id, sku = %product.sku, "product updated");
    Ok(ok(product))
}
