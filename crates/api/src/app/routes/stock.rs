use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    routing::{get, post, put},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use garments_core::{DomainError, Money, TenantId, UserId, execute};
use garments_infra::TenantStore;
use garments_inventory::{
    MovementDetails, MovementType, ProductId, StockCommand, StockItem, StockItemId, StockMovement, StockRequest,
    WarehouseId, valuation,
};

use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{ok, parse, require};
use crate::app::services::{AppServices, STOCK_SUBJECT};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_stock))
        .route("/low", get(low_stock))
        .route("/valuation", get(stock_valuation))
        .route("/receive", post(receive))
        .route("/issue", post(issue))
        .route("/adjust", post(adjust))
        .route("/transfer", post(transfer))
        .route("/:id/movements", get(movements))
        .route("/:id/levels", put(set_levels))
}

#[derive(Debug, Default, Deserialize)]
pub struct StockFilter {
    pub product_id: Option<ProductId>,
    pub warehouse_id: Option<WarehouseId>,
}

/// Who, when and why, shared by every movement request.
#[derive(Debug, Default, Deserialize)]
pub struct MovementNote {
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub movement_date: Option<NaiveDate>,
}

impl MovementNote {
    fn details(&self, created_by: UserId) -> MovementDetails {
        let now = Utc::now();
        MovementDetails {
            reference: self.reference.clone(),
            description: self.description.clone(),
            movement_date: self.movement_date.unwrap_or_else(|| now.date_naive()),
            created_by,
            invoice_id: None,
            occurred_at: now,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReceiveRequest {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    #[serde(default)]
    pub unit_cost: Money,
    #[serde(default)]
    pub movement_type: Option<MovementType>,
    #[serde(flatten)]
    pub note: MovementNote,
}

#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    #[serde(default)]
    pub movement_type: Option<MovementType>,
    #[serde(flatten)]
    pub note: MovementNote,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub delta: i64,
    #[serde(flatten)]
    pub note: MovementNote,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub product_id: ProductId,
    pub from_warehouse_id: WarehouseId,
    pub to_warehouse_id: WarehouseId,
    pub quantity: i64,
    #[serde(flatten)]
    pub note: MovementNote,
}

#[derive(Debug, Deserialize)]
pub struct LevelsRequest {
    pub reorder_level: i64,
    #[serde(default)]
    pub maximum_level: Option<i64>,
}

async fn list_items(
    services: &AppServices,
    tenant_id: TenantId,
    keep: impl Fn(&StockItem) -> bool,
) -> Result<Vec<StockItem>, ApiError> {
    let mut items: Vec<StockItem> = services
        .stock_items
        .list(tenant_id)
        .await?
        .into_iter()
        .filter(|i| keep(i))
        .collect();
    items.sort_by_key(|i| (i.warehouse_id, i.product_id));
    Ok(items)
}

/// Apply and store a set of stock requests as one unit.
async fn move_stock(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    requests: Vec<StockRequest>,
) -> ApiResult {
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;
    let batch = services.prepare_stock(tenant_id, requests, Utc::now()).await?;
    services.commit_stock(tenant_id, &batch, principal.user_id()).await?;
    let movements: Vec<&StockMovement> = batch.movements().collect();
    Ok(ok(json!({
        "items": batch.items(),
        "movements": movements,
    })))
}

async fn list_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(filter): Query<StockFilter>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.read").await?;
    let items = list_items(&services, tenant.tenant_id(), |i| {
        filter.product_id.is_none_or(|p| i.product_id == p) && filter.warehouse_id.is_none_or(|w| i.warehouse_id == w)
    })
    .await?;
    Ok(ok(items))
}

async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.read").await?;
    Ok(ok(list_items(&services, tenant.tenant_id(), StockItem::is_low).await?))
}

async fn stock_valuation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.read").await?;
    let items = services.stock_items.list(tenant.tenant_id()).await?;
    let by_warehouse = valuation(&items);
    let total_value: Money = by_warehouse.iter().map(|w| w.total_value).sum();
    Ok(ok(json!({
        "warehouses": by_warehouse,
        "total_value": total_value,
    })))
}

async fn receive(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ReceiveRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.write").await?;
    let request = StockRequest {
        product_id: body.product_id,
        warehouse_id: body.warehouse_id,
        command: StockCommand::Receive {
            movement_type: body.movement_type.unwrap_or(MovementType::Purchase),
            quantity: body.quantity,
            unit_cost: body.unit_cost,
            details: body.note.details(principal.user_id()),
        },
    };
    move_stock(&services, &tenant, &principal, vec![request]).await
}

async fn issue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<IssueRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.write").await?;
    let request = StockRequest {
        product_id: body.product_id,
        warehouse_id: body.warehouse_id,
        command: StockCommand::Issue {
            movement_type: body.movement_type.unwrap_or(MovementType::Sale),
            quantity: body.quantity,
            details: body.note.details(principal.user_id()),
        },
    };
    move_stock(&services, &tenant, &principal, vec![request]).await
}

async fn adjust(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<AdjustRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.write").await?;
    let request = StockRequest {
        product_id: body.product_id,
        warehouse_id: body.warehouse_id,
        command: StockCommand::Adjust {
            delta: body.delta,
            details: body.note.details(principal.user_id()),
        },
    };
    move_stock(&services, &tenant, &principal, vec![request]).await
}

async fn transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<TransferRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.write").await?;
    if body.from_warehouse_id == body.to_warehouse_id {
        return Err(DomainError::validation("Source and destination warehouses must differ").into());
    }
    let source = services
        .stock_items
        .list(tenant.tenant_id())
        .await?
        .into_iter()
        .find(|i| i.product_id == body.product_id && i.warehouse_id == body.from_warehouse_id)
        .ok_or_else(|| DomainError::not_found("Stock at the source warehouse"))?;

    let details = body.note.details(principal.user_id());
    let requests = vec![
        StockRequest {
            product_id: body.product_id,
            warehouse_id: body.from_warehouse_id,
            command: StockCommand::Issue {
                movement_type: MovementType::Transfer,
                quantity: body.quantity,
                details: details.clone(),
            },
        },
        StockRequest {
            product_id: body.product_id,
            warehouse_id: body.to_warehouse_id,
            command: StockCommand::Receive {
                movement_type: MovementType::Transfer,
                quantity: body.quantity,
                unit_cost: source.average_cost,
                details,
            },
        },
    ];
    move_stock(&services, &tenant, &principal, requests).await
}

async fn movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.read").await?;
    let id: StockItemId = parse(&id)?;
    let tenant_id = tenant.tenant_id();
    if services.stock_items.get(tenant_id, &id).await?.is_none() {
        return Err(DomainError::not_found("Stock item").into());
    }
    let mut movements: Vec<StockMovement> = services
        .stock_movements
        .list(tenant_id)
        .await?
        .into_iter()
        .filter(|m| m.stock_item_id == id)
        .collect();
    movements.sort_by_key(|m| m.occurred_at);
    Ok(ok(movements))
}

async fn set_levels(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<LevelsRequest>,
) -> ApiResult {
    require(&services, &tenant, &principal, "inventory.write").await?;
    let id: StockItemId = parse(&id)?;
    let tenant_id = tenant.tenant_id();
    let _guard = services.write_lock().await;

    let mut item = services
        .stock_items
        .get(tenant_id, &id)
        .await?
        .ok_or_else(|| DomainError::not_found("Stock item"))?;
    let events = execute(
        &mut item,
        &StockCommand::SetLevels {
            reorder_level: body.reorder_level,
            maximum_level: body.maximum_level,
            occurred_at: Utc::now(),
        },
    )?;
    services.stock_items.upsert(tenant_id, item.id, item.clone()).await?;
    services
        .record_events(tenant_id, STOCK_SUBJECT, item.id, &events, Some(principal.user_id()))
        .await?;
    Ok(ok(item))
}
