//! Invoicing domain module.
//!
//! Invoice lines, totals and the invoice lifecycle shared by sales and
//! purchasing. Pure domain logic: no IO, no HTTP, no storage.

pub mod invoice;
pub mod line;

pub use invoice::{
    CreateInvoice, Invoice, InvoiceCommand, InvoiceCreated, InvoiceDraft, InvoiceEvent, InvoiceId,
    InvoiceStatus, Payment, PaymentId, ProductQuantity, RecordPayment, next_invoice_number,
};
pub use line::{InvoiceLine, InvoiceLineInput, InvoiceTotals, compute_lines};
