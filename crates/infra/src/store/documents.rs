use serde::Serialize;
use serde::de::DeserializeOwned;

use garments_accounting::{AccountingSettings, Category, ChartOfAccount, JournalEntry};
use garments_auth::{RoleAuditLog, RoleDefinition, UserAccount};
use garments_inventory::{Product, StockItem, StockMovement, Warehouse};
use garments_parties::Contact;
use garments_payroll::{Employee, Payroll};
use garments_purchasing::PurchaseInvoice;
use garments_sales::SalesInvoice;

/// Key under which per-tenant singletons (settings) are stored.
pub const SETTINGS_KEY: &str = "default";

/// A record type persisted as a JSON document.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Logical collection name; stable across releases.
    const COLLECTION: &'static str;
}

macro_rules! documents {
    ($($ty:ty => $collection:literal),* $(,)?) => {
        $(
            impl Document for $ty {
                const COLLECTION: &'static str = $collection;
            }
        )*
    };
}

documents! {
    ChartOfAccount => "chart_of_accounts",
    JournalEntry => "journal_entries",
    Category => "categories",
    AccountingSettings => "accounting_settings",
    Contact => "contacts",
    Product => "products",
    Warehouse => "warehouses",
    StockItem => "stock_items",
    StockMovement => "stock_movements",
    SalesInvoice => "sales_invoices",
    PurchaseInvoice => "purchase_invoices",
    Employee => "employees",
    Payroll => "payrolls",
    UserAccount => "users",
    RoleDefinition => "roles",
    RoleAuditLog => "role_audit_logs",
}
