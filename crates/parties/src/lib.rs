//! Parties module (customers and suppliers).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod contact;

pub use contact::{Contact, ContactFilter, ContactId, ContactInput, ContactType, is_valid_email};
