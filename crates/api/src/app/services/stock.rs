use chrono::{DateTime, Utc};
use garments_core::{DomainError, TenantId, UserId, execute};
use garments_inventory::{
    OpenStockItem, ProductId, StockCommand, StockEvent, StockItem, StockItemId, StockMovement, StockRequest, WarehouseId,
};

use super::AppServices;
use crate::app::errors::ApiError;

pub const STOCK_SUBJECT: &str = "stock_item";

/// Stock commands applied to working copies; nothing is stored until
/// [`AppServices::commit_stock`].
#[derive(Debug, Default)]
pub struct StockBatch {
    items: Vec<StockItem>,
    events: Vec<(StockItemId, StockEvent)>,
}

impl StockBatch {
    pub fn items(&self) -> &[StockItem] {
        &self.items
    }

    pub fn movements(&self) -> impl Iterator<Item = &StockMovement> {
        self.events.iter().filter_map(|(_, e)| e.movement())
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl AppServices {
    /// Apply every request in order, opening stock items on first use.
    ///
    /// A failing request aborts the whole batch.
    pub async fn prepare_stock(
        &self,
        tenant_id: TenantId,
        requests: Vec<StockRequest>,
        now: DateTime<Utc>,
    ) -> Result<StockBatch, ApiError> {
        let mut stored = self.stock_items.list(tenant_id).await?;
        let mut batch = StockBatch::default();

        for request in requests {
            let touched = batch
                .items
                .iter()
                .position(|i| i.product_id == request.product_id && i.warehouse_id == request.warehouse_id);
            let idx = match touched {
                Some(idx) => idx,
                None => {
                    let found = stored
                        .iter()
                        .position(|i| i.product_id == request.product_id && i.warehouse_id == request.warehouse_id);
                    let item = match found {
                        Some(pos) => stored.swap_remove(pos),
                        None => {
                            let (item, opened) = self
                                .open_stock_item(tenant_id, request.product_id, request.warehouse_id, now)
                                .await?;
                            batch.events.push((item.id, opened));
                            item
                        }
                    };
                    batch.items.push(item);
                    batch.items.len() - 1
                }
            };

            let item = &mut batch.items[idx];
            let events = execute(item, &request.command)?;
            let item_id = item.id;
            batch.events.extend(events.into_iter().map(|e| (item_id, e)));
        }
        Ok(batch)
    }

    async fn open_stock_item(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        now: DateTime<Utc>,
    ) -> Result<(StockItem, StockEvent), ApiError> {
        let product = self
            .products
            .get(tenant_id, &product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Product"))?;
        let warehouse = self
            .warehouses
            .get(tenant_id, &warehouse_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Warehouse"))?;
        if !warehouse.is_active {
            return Err(DomainError::invariant(format!("warehouse '{}' is inactive", warehouse.name)).into());
        }

        let stock_item_id = StockItemId::new();
        let mut item = StockItem::empty(stock_item_id);
        let mut events = execute(
            &mut item,
            &StockCommand::Open(OpenStockItem {
                stock_item_id,
                product_id,
                warehouse_id,
                reorder_level: product.reorder_level,
                maximum_level: None,
                occurred_at: now,
            }),
        )?;
        let opened = events
            .pop()
            .ok_or_else(|| DomainError::invariant("opening a stock item produced no event"))?;
        Ok((item, opened))
    }

    pub async fn commit_stock(&self, tenant_id: TenantId, batch: &StockBatch, actor: UserId) -> Result<(), ApiError> {
        for item in &batch.items {
            self.stock_items.upsert(tenant_id, item.id, item.clone()).await?;
        }
        for (item_id, event) in &batch.events {
            if let Some(movement) = event.movement() {
                self.stock_movements
                    .upsert(tenant_id, movement.id, movement.clone())
                    .await?;
            }
            self.record_events(tenant_id, STOCK_SUBJECT, item_id, std::slice::from_ref(event), Some(actor))
                .await?;
        }
        tracing::info!(
            tenant_id = %tenant_id,
            items = batch.items.len(),
            movements = batch.movements().count(),
            "stock updated"
        );
        Ok(())
    }
}
