use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque `resource.action` strings (e.g. "journal_entry.read").
/// The wildcard `"*"` grants everything and is reserved for the admin role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: &'static str = "*";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == Self::WILDCARD
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every grantable permission with a short description.
pub const PERMISSION_CATALOGUE: &[(&str, &str)] = &[
    ("journal_entry.read", "View journal entries"),
    ("journal_entry.create", "Create journal entries"),
    ("journal_entry.update", "Edit journal entries"),
    ("journal_entry.delete", "Delete draft journal entries"),
    ("journal_entry.approve", "Approve journal entries"),
    ("journal_entry.reverse", "Reverse journal entries"),
    ("journal_entry.export", "Export journal entries"),
    ("category.view", "View cash-book categories"),
    ("category.create", "Create cash-book categories"),
    ("category.update", "Edit cash-book categories"),
    ("category.delete", "Delete cash-book categories"),
    ("chart_of_accounts.read", "View the chart of accounts"),
    ("chart_of_accounts.write", "Maintain the chart of accounts"),
    ("trial_balance.view", "Generate trial balances"),
    ("trial_balance.compare", "Compare trial balance periods"),
    ("balance.read", "View account balances"),
    ("balance.admin", "Manage the balance cache"),
    ("contacts.read", "View customers and suppliers"),
    ("contacts.write", "Maintain customers and suppliers"),
    ("inventory.read", "View products, warehouses and stock"),
    ("inventory.write", "Maintain products, warehouses and stock"),
    ("sales.read", "View sales invoices"),
    ("sales.write", "Create and manage sales invoices"),
    ("purchasing.read", "View purchase invoices"),
    ("purchasing.write", "Create and manage purchase invoices"),
    ("payroll.read", "View employees and payrolls"),
    ("payroll.write", "Maintain employees and payrolls"),
    ("payroll.approve", "Approve, process and pay payrolls"),
    ("settings.read", "View accounting settings"),
    ("settings.write", "Change accounting settings"),
    ("admin.users.read", "View user accounts"),
    ("admin.users.write", "Register, deactivate and grant users"),
    ("admin.roles.read", "View roles and their audit logs"),
    ("admin.roles.write", "Create, edit and delete roles"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionDefinition {
    pub name: String,
    pub description: String,
    /// Leading segment of the name (`journal_entry`, `admin`, ...).
    pub category: String,
}

impl PermissionDefinition {
    pub fn all() -> Vec<PermissionDefinition> {
        PERMISSION_CATALOGUE
            .iter()
            .map(|(name, description)| PermissionDefinition {
                name: name.to_string(),
                description: description.to_string(),
                category: name.split('.').next().unwrap_or(name).to_string(),
            })
            .collect()
    }
}

pub fn is_known_permission(name: &str) -> bool {
    name == Permission::WILDCARD || PERMISSION_CATALOGUE.iter().any(|(p, _)| *p == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_is_unique_and_categorised() {
        let defs = PermissionDefinition::all();
        let mut names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), PERMISSION_CATALOGUE.len());
        assert!(defs.iter().any(|d| d.name == "admin.roles.write" && d.category == "admin"));
        assert!(is_known_permission("*"));
        assert!(is_known_permission("trial_balance.compare"));
        assert!(!is_known_permission("trial_balance.delete"));
    }
}
