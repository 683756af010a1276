use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garments_accounting::{AccountingSettings, JournalEntryId, Posting, PostingKind};
use garments_core::{DomainError, DomainResult, UserId};
use garments_inventory::{MovementDetails, MovementType, StockCommand, StockRequest, WarehouseId};
use garments_invoicing::{Invoice, InvoiceDraft, Payment};
use garments_parties::Contact;

/// Sales invoice numbers look like `INV-2024-0001`.
pub const NUMBER_PREFIX: &str = "INV";

/// A customer invoice, optionally shipping from a warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesInvoice {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub warehouse_id: Option<WarehouseId>,
    /// Journal entries posted on behalf of this invoice.
    #[serde(default)]
    pub journal_entry_ids: Vec<JournalEntryId>,
}

impl SalesInvoice {
    pub fn new(invoice: Invoice, warehouse_id: Option<WarehouseId>) -> Self {
        Self {
            invoice,
            warehouse_id,
            journal_entry_ids: Vec::new(),
        }
    }

    /// The draft's contact must exist and be an active customer.
    pub fn check_customer(draft: &InvoiceDraft, contact: Option<&Contact>) -> DomainResult<()> {
        let contact = contact.ok_or_else(|| DomainError::not_found("Customer"))?;
        if contact.id != draft.contact_id {
            return Err(DomainError::validation("Customer does not match the invoice"));
        }
        contact.ensure_customer()
    }

    /// One `Sale` issue per product on the invoice.
    pub fn stock_issues(&self, issued_by: UserId, occurred_at: DateTime<Utc>) -> DomainResult<Vec<StockRequest>> {
        let products = self.invoice.product_quantities();
        if products.is_empty() {
            return Ok(Vec::new());
        }
        let warehouse_id = self.warehouse_id.ok_or_else(|| {
            DomainError::validation("A warehouse is required to issue product lines")
        })?;
        Ok(products
            .into_iter()
            .map(|p| StockRequest {
                product_id: p.product_id,
                warehouse_id,
                command: StockCommand::Issue {
                    movement_type: MovementType::Sale,
                    quantity: p.quantity,
                    details: self.movement_details(issued_by, occurred_at),
                },
            })
            .collect())
    }

    fn movement_details(&self, created_by: UserId, occurred_at: DateTime<Utc>) -> MovementDetails {
        MovementDetails {
            reference: Some(self.invoice.number.clone()),
            description: Some(format!("Sales invoice {}", self.invoice.number)),
            movement_date: self.invoice.invoice_date,
            created_by,
            invoice_id: Some(*self.invoice.id.as_uuid()),
            occurred_at,
        }
    }

    /// Debit receivable, credit revenue for the invoice total.
    pub fn sale_posting(&self, settings: &AccountingSettings) -> Option<Posting> {
        settings.posting(
            PostingKind::Sale,
            self.invoice.invoice_date,
            &self.invoice.number,
            &format!("Sales invoice {}", self.invoice.number),
            self.invoice.totals.total_amount,
        )
    }

    /// Debit cash, credit receivable for a customer payment.
    pub fn receipt_posting(&self, settings: &AccountingSettings, payment: &Payment) -> Option<Posting> {
        settings.posting(
            PostingKind::CustomerReceipt,
            payment.payment_date,
            payment.reference.as_deref().unwrap_or(&self.invoice.number),
            &format!("Receipt against {}", self.invoice.number),
            payment.amount,
        )
    }
}
