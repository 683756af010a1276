use axum::{
    Router,
    routing::{get, post},
};

pub mod accounts;
pub mod auth;
pub mod balance;
pub mod cash_book;
pub mod categories;
pub mod common;
pub mod contacts;
pub mod employees;
pub mod journal;
pub mod payroll;
pub mod permissions;
pub mod products;
pub mod purchases;
pub mod roles;
pub mod sales;
pub mod settings;
pub mod stock;
pub mod system;
pub mod trial_balance;
pub mod users;
pub mod warehouses;

/// Endpoints reachable without a token.
pub fn public_router() -> Router {
    Router::new()
        .nest("/health", system::health_router())
        .route("/auth/setup-admin", post(auth::setup_admin))
        .route("/auth/login", post(auth::login))
}

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/role", roles::router())
        .nest("/permission", permissions::router())
        .route("/rbac/explain", get(permissions::explain))
        .nest("/chartofaccounts", accounts::router())
        .nest("/journalentry/journal-entries", journal::router())
        .nest("/cash-book", cash_book::router())
        .nest("/trial-balance", trial_balance::router())
        .nest("/balance", balance::router())
        .nest("/category", categories::router())
        .nest("/contact", contacts::router())
        .nest("/products", products::router())
        .nest("/warehouse", warehouses::router())
        .nest("/stock", stock::router())
        .nest("/sales-invoices", sales::router())
        .nest("/purchase-invoices", purchases::router())
        .nest("/employees", employees::router())
        .nest("/payroll", payroll::router())
        .nest("/settings", settings::router())
}
