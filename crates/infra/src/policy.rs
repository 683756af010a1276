//! Default role → permission mapping used to seed each tenant's roles.

use chrono::{DateTime, Utc};
use garments_auth::{BUILTIN_ROLES, Permission, RoleDefinition};

const MANAGER: &[&str] = &[
    "journal_entry.read",
    "journal_entry.approve",
    "journal_entry.export",
    "category.view",
    "category.create",
    "category.update",
    "chart_of_accounts.read",
    "trial_balance.view",
    "trial_balance.compare",
    "balance.read",
    "contacts.read",
    "contacts.write",
    "inventory.read",
    "inventory.write",
    "sales.read",
    "sales.write",
    "purchasing.read",
    "purchasing.write",
    "payroll.read",
    "payroll.approve",
    "settings.read",
    "admin.users.read",
    "admin.roles.read",
];

const ACCOUNTANT: &[&str] = &[
    "journal_entry.read",
    "journal_entry.create",
    "journal_entry.update",
    "journal_entry.delete",
    "journal_entry.approve",
    "journal_entry.reverse",
    "journal_entry.export",
    "category.view",
    "category.create",
    "category.update",
    "category.delete",
    "chart_of_accounts.read",
    "chart_of_accounts.write",
    "trial_balance.view",
    "trial_balance.compare",
    "balance.read",
    "balance.admin",
    "contacts.read",
    "sales.read",
    "purchasing.read",
    "payroll.read",
    "settings.read",
    "settings.write",
];

const EMPLOYEE: &[&str] = &["category.view", "inventory.read", "contacts.read"];

const SALES: &[&str] = &[
    "contacts.read",
    "contacts.write",
    "inventory.read",
    "sales.read",
    "sales.write",
];

const PROCUREMENT: &[&str] = &[
    "contacts.read",
    "contacts.write",
    "inventory.read",
    "inventory.write",
    "purchasing.read",
    "purchasing.write",
];

/// Permissions a built-in role starts with; unknown roles get none.
pub fn default_role_permissions(role: &str) -> Vec<String> {
    let perms: &[&str] = match role.to_ascii_lowercase().as_str() {
        "admin" => &[Permission::WILDCARD],
        "manager" => MANAGER,
        "accountant" => ACCOUNTANT,
        "employee" => EMPLOYEE,
        "sales" => SALES,
        "procurement" => PROCUREMENT,
        _ => &[],
    };
    perms.iter().map(|p| p.to_string()).collect()
}

/// The built-in roles with their default permissions.
pub fn seed_roles(now: DateTime<Utc>) -> Vec<RoleDefinition> {
    BUILTIN_ROLES
        .iter()
        .map(|(name, description)| {
            let permissions = default_role_permissions(name).into_iter().map(Permission::new).collect();
            RoleDefinition::builtin(name, description, permissions, now)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use garments_auth::is_known_permission;

    #[test]
    fn defaults_only_name_catalogued_permissions() {
        for (role, _) in BUILTIN_ROLES {
            for perm in default_role_permissions(role) {
                assert!(perm == Permission::WILDCARD || is_known_permission(&perm), "{role}: {perm}");
            }
        }
        assert_eq!(default_role_permissions("Admin"), vec!["*".to_string()]);
        assert!(default_role_permissions("cutter").is_empty());
    }

    #[test]
    fn every_builtin_role_is_seeded() {
        let roles = seed_roles(Utc::now());
        assert_eq!(roles.len(), BUILTIN_ROLES.len());
        assert!(roles.iter().all(|r| r.is_builtin));
        let accountant = roles.iter().find(|r| r.name == "accountant").unwrap();
        assert!(accountant.permission_names().contains(&"trial_balance.view".to_string()));
    }
}
