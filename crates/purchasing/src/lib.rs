//! Purchase invoicing module (supplier bills).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod invoice;

pub use invoice::{NUMBER_PREFIX, PurchaseInvoice};
