//! Sales invoicing module.
//!
//! Customer invoices on top of the shared invoice lifecycle, plus the stock
//! issues and journal postings an issued sale produces. Pure domain logic.

pub mod invoice;

pub use invoice::{NUMBER_PREFIX, SalesInvoice};
