use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use garments_core::{DomainError, DomainResult, UserId, check_max_len};

use crate::Permission;
use crate::permissions::is_known_permission;

/// Role identifier used for RBAC.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Seeded roles with their descriptions. These cannot be deleted.
pub const BUILTIN_ROLES: &[(&str, &str)] = &[
    ("admin", "Full system administrator with all permissions"),
    ("manager", "Business manager with broad operational permissions"),
    ("accountant", "Financial specialist with journal, ledger and reporting access"),
    ("employee", "Staff member with read-only access to day-to-day records"),
    ("sales", "Sales staff managing customers and sales invoices"),
    ("procurement", "Purchasing staff managing suppliers, bills and receipts"),
];

pub const MAX_ROLE_NAME_LEN: usize = 50;
pub const MAX_ROLE_DESCRIPTION_LEN: usize = 200;

pub fn is_builtin_role(name: &str) -> bool {
    BUILTIN_ROLES.iter().any(|(r, _)| r.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<Permission>,
    pub is_builtin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

fn check_permissions(names: &[String]) -> DomainResult<Vec<Permission>> {
    let unknown: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|p| !is_known_permission(p))
        .collect();
    if !unknown.is_empty() {
        return Err(DomainError::validation(format!(
            "Unknown permission(s): {}",
            unknown.join(", ")
        )));
    }
    let mut perms: Vec<Permission> = names.iter().map(|p| Permission::new(p.clone())).collect();
    perms.sort();
    perms.dedup();
    Ok(perms)
}

fn check_name(name: &str, errors: &mut Vec<String>) {
    if name.is_empty() {
        errors.push("Role name is required".to_string());
        return;
    }
    check_max_len("Role name", Some(name), MAX_ROLE_NAME_LEN, errors);
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        errors.push("Role name may only contain letters, digits, '_' and '-'".to_string());
    }
}

impl RoleDefinition {
    pub fn builtin(name: &str, description: &str, permissions: Vec<Permission>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
            permissions,
            is_builtin: true,
            created_at: now,
            updated_at: None,
        }
    }

    pub fn create(input: &RoleInput, existing: &[RoleDefinition], now: DateTime<Utc>) -> DomainResult<Self> {
        let name = input.name.trim().to_lowercase();
        let mut errors = Vec::new();
        check_name(&name, &mut errors);
        check_max_len(
            "Description",
            input.description.as_deref(),
            MAX_ROLE_DESCRIPTION_LEN,
            &mut errors,
        );
        if !errors.is_empty() {
            return Err(DomainError::validation_all(errors));
        }
        if existing.iter().any(|r| r.name.eq_ignore_ascii_case(&name)) {
            return Err(DomainError::conflict(format!("Role '{name}' already exists")));
        }
        let permissions = check_permissions(&input.permissions)?;
        if permissions.iter().any(Permission::is_wildcard) {
            return Err(DomainError::validation("The wildcard permission is reserved for admin"));
        }
        Ok(Self {
            name,
            description: input.description.clone(),
            permissions,
            is_builtin: false,
            created_at: now,
            updated_at: None,
        })
    }

    /// Description only; names are immutable.
    pub fn update(&mut self, description: Option<String>, now: DateTime<Utc>) -> DomainResult<()> {
        let mut errors = Vec::new();
        check_max_len("Description", description.as_deref(), MAX_ROLE_DESCRIPTION_LEN, &mut errors);
        if !errors.is_empty() {
            return Err(DomainError::validation_all(errors));
        }
        self.description = description;
        self.updated_at = Some(now);
        Ok(())
    }

    pub fn set_permissions(&mut self, names: &[String], now: DateTime<Utc>) -> DomainResult<()> {
        let permissions = check_permissions(names)?;
        if self.name == "admin" {
            return Err(DomainError::invariant("The admin role always holds every permission"));
        }
        if permissions.iter().any(Permission::is_wildcard) {
            return Err(DomainError::validation("The wildcard permission is reserved for admin"));
        }
        tracing::info!(
            role = %self.name,
            before = self.permissions.len(),
            after = permissions.len(),
            "role permissions replaced"
        );
        self.permissions = permissions;
        self.updated_at = Some(now);
        Ok(())
    }

    pub fn ensure_deletable(&self, assigned_users: usize) -> DomainResult<()> {
        if self.is_builtin {
            return Err(DomainError::invariant(format!(
                "Built-in role '{}' cannot be deleted",
                self.name
            )));
        }
        if assigned_users > 0 {
            return Err(DomainError::conflict(format!(
                "Role '{}' is assigned to {assigned_users} user(s)",
                self.name
            )));
        }
        Ok(())
    }

    pub fn permission_names(&self) -> Vec<String> {
        self.permissions.iter().map(|p| p.as_str().to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleAuditAction {
    Create,
    Update,
    Delete,
    AssignPermissions,
}

/// One change to a role, kept for the role audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAuditLog {
    pub id: Uuid,
    pub role_name: String,
    pub action: RoleAuditAction,
    pub details: String,
    pub performed_by: UserId,
    pub performed_at: DateTime<Utc>,
}

impl RoleAuditLog {
    pub fn record(
        role_name: &str,
        action: RoleAuditAction,
        details: impl Into<String>,
        performed_by: UserId,
        performed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            role_name: role_name.to_string(),
            action,
            details: details.into(),
            performed_by,
            performed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PERMISSION_CATALOGUE;
    use proptest::prelude::*;

    fn input(name: &str, perms: &[&str]) -> RoleInput {
        RoleInput {
            name: name.into(),
            description: Some("Cutting floor supervisors".into()),
            permissions: perms.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn custom_roles_validate_name_and_permissions() {
        let role = RoleDefinition::create(
            &input("Supervisor", &["inventory.read", "inventory.read", "payroll.read"]),
            &[],
            Utc::now(),
        )
        .unwrap();
        assert_eq!(role.name, "supervisor");
        assert_eq!(role.permissions.len(), 2);
        assert!(!role.is_builtin);

        assert!(matches!(
            RoleDefinition::create(&input("supervisor", &[]), &[role.clone()], Utc::now()),
            Err(DomainError::Conflict(_))
        ));
        assert!(RoleDefinition::create(&input("bad name!", &[]), &[], Utc::now()).is_err());
        assert!(RoleDefinition::create(&input("x", &["inventory.fly"]), &[], Utc::now()).is_err());
        assert!(RoleDefinition::create(&input("x", &["*"]), &[], Utc::now()).is_err());
    }

    #[test]
    fn builtins_cannot_be_deleted() {
        let admin = RoleDefinition::builtin("admin", "all", vec![Permission::new("*")], Utc::now());
        assert!(admin.ensure_deletable(0).is_err());
        assert!(is_builtin_role("Procurement"));

        let mut custom = RoleDefinition::create(&input("qc", &[]), &[], Utc::now()).unwrap();
        assert!(custom.ensure_deletable(2).is_err());
        assert!(custom.ensure_deletable(0).is_ok());
        custom
            .set_permissions(&["sales.read".to_string()], Utc::now())
            .unwrap();
        assert_eq!(custom.permission_names(), vec!["sales.read".to_string()]);
    }

    #[test]
    fn audit_actions_serialize_upper_case() {
        let json = serde_json::to_string(&RoleAuditAction::AssignPermissions).unwrap();
        assert_eq!(json, "\"ASSIGN_PERMISSIONS\"");
    }

    proptest! {
        #[test]
        fn assigned_permissions_are_sorted_and_deduplicated(
            picks in prop::collection::vec(0..PERMISSION_CATALOGUE.len(), 0..20)
        ) {
            let names: Vec<String> = picks.iter().map(|i| PERMISSION_CATALOGUE[*i].0.to_string()).collect();
            let mut role = RoleDefinition::create(&input("qc", &[]), &[], Utc::now()).unwrap();
            role.set_permissions(&names, Utc::now()).unwrap();

            let mut expected = names.clone();
            expected.sort();
            expected.dedup();
            prop_assert_eq!(role.permission_names(), expected);
        }

        #[test]
        fn names_outside_the_catalogue_are_refused(action in "[a-z]{3,10}") {
            let name = format!("warp_drive.{action}");
            let mut role = RoleDefinition::create(&input("qc", &[]), &[], Utc::now()).unwrap();
            prop_assert!(role.set_permissions(&[name], Utc::now()).is_err());
            prop_assert!(role.permissions.is_empty());
        }
    }
}
