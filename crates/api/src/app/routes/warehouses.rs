use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    routing::get,
};
use chrono::Utc;

use garments_core::{DomainError, TenantId};
use garments_infra::TenantStore;
use garments_inventory::{Warehouse, WarehouseId, WarehouseInput};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{created, deleted, ok, parse, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_warehouses).post(create_warehouse))
        .route("/active", get(active_warehouses))
        .route(
            "/:id",
            get(get_warehouse).put(update_warehouse).delete(delete_warehouse),
        )
}

async fn sorted(services: &AppServices, tenant_id: TenantId, active_only: bool) -> Result<Vec<Warehouse>, ApiError> {
    let mut warehouses: Vec<Warehouse> = services
        .warehouses
        .list(tenant_id)
        .await?
        .into_iter()
        .filter(|w| !active_only || w.is_active)
        .collect();
    warehouses.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(warehouses)
}

async fn list_warehouses(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.read").await?;
    Ok(ok(sorted(&services, tenant.tenant_id(), false).await?))
}

async fn active_warehouses(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.read").await?;
    Ok(ok(sorted(&services, tenant.tenant_id(), true).await?))
}

async fn get_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.read").await?;
    let id: WarehouseId = parse(&id)?;
    let warehouse = services
        .warehouses
        .get(tenant.tenant_id(), &id)
        .await?
        .ok_or_else(|| DomainError::not_found("Warehouse"))?;
    Ok(ok(warehouse))
}

async fn create_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<WarehouseInput>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.write").await?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let existing = services.warehouses.list(tenant_id).await?;
    let warehouse = Warehouse::create(&body, &existing, Utc::now())?;
    services.warehouses.upsert(tenant_id, warehouse.id, warehouse.clone()).await?;

    tracing::info!(tenant_id = %tenant_id, name = %warehouse.name, "warehouse created");
    Ok(created(warehouse))
}

async fn update_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<WarehouseInput>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.write").await?;
    let tenant_id = tenant.tenant_id();
    let id: WarehouseId = parse(&id)?;
    let _guard = services.write_lock().await;

    let existing = services.warehouses.list(tenant_id).await?;
    let mut warehouse = existing
        .iter()
        .find(|w| w.id == id)
        .cloned()
        .ok_or_else(|| DomainError::not_found("Warehouse"))?;
    warehouse.update(&body, &existing, Utc::now())?;
    services.warehouses.upsert(tenant_id, warehouse.id, warehouse.clone()).await?;
    Ok(ok(warehouse))
}

async fn delete_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.write").await?;
    let tenant_id = tenant.tenant_id();
    let id: WarehouseId = parse(&id)?;
    let _guard = services.write_lock().await;

    let warehouse = services
        .warehouses
        .get(tenant_id, &id)
        .await?
        .ok_or_else(|| DomainError::not_found("Warehouse"))?;
    let units_held: i64 = services
        .stock_items
        .list(tenant_id)
        .await?
        .iter()
        .filter(|s| s.warehouse_id == id)
        .map(|s| s.quantity_in_stock.max(0))
        .sum();
    warehouse.ensure_deletable(units_held)?;
    services.warehouses.remove(tenant_id, &id).await?;

    tracing::info!(tenant_id = %tenant_id, name = %warehouse.name, "warehouse deleted");
    Ok(deleted("Warehouse"))
}
