//! Tenant-isolated record storage.
//!
//! Every API resource lives in a [`TenantStore`] keyed by its id. Two
//! backends exist: [`InMemoryTenantStore`] for tests and single-process
//! deployments, and [`PostgresTenantStore`] which keeps each record as a JSON
//! document in the `documents` table.

pub mod documents;
pub mod postgres;
pub mod tenant_store;

pub use documents::{Document, SETTINGS_KEY};
pub use postgres::{PostgresTenantStore, migrate};
pub use tenant_store::{InMemoryTenantStore, StoreError, TenantStore};
