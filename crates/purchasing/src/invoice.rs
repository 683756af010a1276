use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garments_accounting::{AccountingSettings, JournalEntryId, Posting, PostingKind};
use garments_core::{DomainError, DomainResult, UserId, check_max_len};
use garments_inventory::{MovementDetails, MovementType, StockCommand, StockRequest, WarehouseId};
use garments_invoicing::{Invoice, InvoiceDraft, Payment};
use garments_parties::Contact;

/// Purchase invoice numbers look like `PINV-2024-0001`.
pub const NUMBER_PREFIX: &str = "PINV";

pub const MAX_SUPPLIER_INVOICE_NUMBER_LEN: usize = 50;

/// A supplier bill, receiving goods into a warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseInvoice {
    #[serde(flatten)]
    pub invoice: Invoice,
    /// The supplier's own reference for the bill.
    pub supplier_invoice_number: Option<String>,
    pub warehouse_id: Option<WarehouseId>,
    #[serde(default)]
    pub journal_entry_ids: Vec<JournalEntryId>,
}

impl PurchaseInvoice {
    pub fn new(
        invoice: Invoice,
        supplier_invoice_number: Option<String>,
        warehouse_id: Option<WarehouseId>,
    ) -> DomainResult<Self> {
        let supplier_invoice_number = supplier_invoice_number
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let mut errors = Vec::new();
        check_max_len(
            "Supplier invoice number",
            supplier_invoice_number.as_deref(),
            MAX_SUPPLIER_INVOICE_NUMBER_LEN,
            &mut errors,
        );
        if !errors.is_empty() {
            return Err(DomainError::validation_all(errors));
        }
        Ok(Self {
            invoice,
            supplier_invoice_number,
            warehouse_id,
            journal_entry_ids: Vec::new(),
        })
    }

    /// The draft's contact must exist and be an active supplier.
    pub fn check_supplier(draft: &InvoiceDraft, contact: Option<&Contact>) -> DomainResult<()> {
        let contact = contact.ok_or_else(|| DomainError::not_found("Supplier"))?;
        if contact.id != draft.contact_id {
            return Err(DomainError::validation("Supplier does not match the invoice"));
        }
        contact.ensure_supplier()
    }

    /// One `Purchase` receipt per product, costed at the net unit price.
    pub fn stock_receipts(&self, received_by: UserId, occurred_at: DateTime<Utc>) -> DomainResult<Vec<StockRequest>> {
        let products = self.invoice.product_quantities();
        if products.is_empty() {
            return Ok(Vec::new());
        }
        let warehouse_id = self.warehouse_id.ok_or_else(|| {
            DomainError::validation("A warehouse is required to receive product lines")
        })?;
        Ok(products
            .into_iter()
            .map(|p| StockRequest {
                product_id: p.product_id,
                warehouse_id,
                command: StockCommand::Receive {
                    movement_type: MovementType::Purchase,
                    quantity: p.quantity,
                    unit_cost: p.unit_cost(),
                    details: MovementDetails {
                        reference: Some(self.reference()),
                        description: Some(format!("Purchase invoice {}", self.invoice.number)),
                        movement_date: self.invoice.invoice_date,
                        created_by: received_by,
                        invoice_id: Some(*self.invoice.id.as_uuid()),
                        occurred_at,
                    },
                },
            })
            .collect())
    }

    /// Supplier reference when known, otherwise our own number.
    fn reference(&self) -> String {
        self.supplier_invoice_number
            .clone()
            .unwrap_or_else(|| self.invoice.number.clone())
    }

    /// Debit purchases, credit payable for the invoice total.
    pub fn purchase_posting(&self, settings: &AccountingSettings) -> Option<Posting> {
        settings.posting(
            PostingKind::Purchase,
            self.invoice.invoice_date,
            &self.reference(),
            &format!("Purchase invoice {}", self.invoice.number),
            self.invoice.totals.total_amount,
        )
    }

    /// Debit payable, credit cash for a payment to the supplier.
    pub fn payment_posting(&self, settings: &AccountingSettings, payment: &Payment) -> Option<Posting> {
        settings.posting(
            PostingKind::SupplierPayment,
            payment.payment_date,
            payment.reference.as_deref().unwrap_or(&self.invoice.number),
            &format!("Payment against {}", self.invoice.number),
            payment.amount,
        )
    }
}
