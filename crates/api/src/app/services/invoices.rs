use garments_core::{DomainError, TenantId};
use garments_inventory::WarehouseId;
use garments_invoicing::InvoiceDraft;

use super::AppServices;
use crate::app::errors::ApiError;

impl AppServices {
    /// Products on the lines must exist; the warehouse must exist and be active.
    pub async fn check_invoice_refs(
        &self,
        tenant_id: TenantId,
        draft: &InvoiceDraft,
        warehouse_id: Option<WarehouseId>,
    ) -> Result<(), ApiError> {
        if let Some(warehouse_id) = warehouse_id {
            let warehouse = self
                .warehouses
                .get(tenant_id, &warehouse_id)
                .await?
                .ok_or_else(|| DomainError::not_found("Warehouse"))?;
            if !warehouse.is_active {
                return Err(DomainError::validation(format!("Warehouse '{}' is inactive", warehouse.name)).into());
            }
        }

        let mut errors = Vec::new();
        for (idx, line) in draft.lines.iter().enumerate() {
            let Some(product_id) = line.product_id else {
                continue;
            };
            if self.products.get(tenant_id, &product_id).await?.is_none() {
                errors.push(format!("line {}: product {product_id} does not exist", idx + 1));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation_all(errors).into())
        }
    }
}
