//! User accounts: identity, credentials, roles and direct grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garments_core::{DomainError, DomainResult, Entity, UserId, check_max_len, check_required};

use crate::password::{PasswordError, hash_password, validate_password_strength, verify_password};
use crate::permissions::is_known_permission;
use crate::{Permission, Role};

pub const MAX_USERNAME_LEN: usize = 50;
pub const MAX_EMAIL_LEN: usize = 100;
pub const MAX_FULL_NAME_LEN: usize = 100;
pub const MAX_CONTACT_NUMBER_LEN: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UserStatus {
    #[default]
    Active,
    Deactivated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub contact_number: Option<String>,
    pub password_hash: String,
    pub roles: Vec<Role>,
    /// Direct grants on top of the role mapping.
    pub permissions: Vec<Permission>,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl Entity for UserAccount {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Registration payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub full_name: String,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "employee".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: String,
    #[serde(default)]
    pub contact_number: Option<String>,
}

/// Public view of an account (never includes the password hash).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub contact_number: Option<String>,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

fn password_error(e: PasswordError) -> DomainError {
    match e {
        PasswordError::Weak(msg) => DomainError::validation(msg),
        PasswordError::Hash(msg) => DomainError::invariant(msg),
    }
}

fn check_contact(contact: Option<&str>, errors: &mut Vec<String>) {
    check_max_len("Contact number", contact, MAX_CONTACT_NUMBER_LEN, errors);
}

impl UserAccount {
    /// Validate and hash; `known_roles` is the tenant's role list.
    pub fn register(
        input: &NewUser,
        existing: &[UserAccount],
        known_roles: &[String],
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();
        let mut errors = Vec::new();
        check_required("Username", &username, MAX_USERNAME_LEN, &mut errors);
        check_required("Email", &email, MAX_EMAIL_LEN, &mut errors);
        if !email.is_empty() && !email.contains('@') {
            errors.push("Email is not a valid email address".to_string());
        }
        check_required("Full name", &input.full_name, MAX_FULL_NAME_LEN, &mut errors);
        check_contact(input.contact_number.as_deref(), &mut errors);
        if input.password != input.confirm_password {
            errors.push("Passwords do not match".to_string());
        }
        if let Err(PasswordError::Weak(msg)) = validate_password_strength(&input.password) {
            errors.push(msg);
        }
        let role = input.role.trim().to_lowercase();
        if !known_roles.iter().any(|r| *r == role) {
            errors.push(format!("Unknown role '{role}'"));
        }
        if !errors.is_empty() {
            return Err(DomainError::validation_all(errors));
        }

        if existing.iter().any(|u| u.email.eq_ignore_ascii_case(&email)) {
            return Err(DomainError::conflict(format!("Email '{email}' is already registered")));
        }
        if existing.iter().any(|u| u.username.eq_ignore_ascii_case(&username)) {
            return Err(DomainError::conflict(format!("Username '{username}' is already taken")));
        }

        Ok(Self {
            id: UserId::new(),
            username,
            email,
            full_name: input.full_name.trim().to_string(),
            contact_number: input.contact_number.clone(),
            password_hash: hash_password(&input.password).map_err(password_error)?,
            roles: vec![Role::new(role)],
            permissions: Vec::new(),
            status: UserStatus::Active,
            created_at: now,
            updated_at: None,
            last_login_at: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Email (case-insensitive) or username.
    pub fn matches_login(&self, email_or_username: &str) -> bool {
        let login = email_or_username.trim();
        self.email.eq_ignore_ascii_case(login) || self.username.eq_ignore_ascii_case(login)
    }

    /// Check credentials; deactivated accounts never authenticate.
    pub fn authenticate(&mut self, password: &str, now: DateTime<Utc>) -> DomainResult<()> {
        let ok = verify_password(password, &self.password_hash).map_err(password_error)?;
        if !ok || !self.is_active() {
            tracing::warn!(user_id = %self.id, active = self.is_active(), "authentication failed");
            return Err(DomainError::Unauthorized);
        }
        self.last_login_at = Some(now);
        Ok(())
    }

    pub fn update_profile(&mut self, update: &ProfileUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let mut errors = Vec::new();
        check_required("Full name", &update.full_name, MAX_FULL_NAME_LEN, &mut errors);
        check_contact(update.contact_number.as_deref(), &mut errors);
        if !errors.is_empty() {
            return Err(DomainError::validation_all(errors));
        }
        self.full_name = update.full_name.trim().to_string();
        self.contact_number = update.contact_number.clone();
        self.updated_at = Some(now);
        Ok(())
    }

    pub fn change_password(
        &mut self,
        current: &str,
        new: &str,
        confirm: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !verify_password(current, &self.password_hash).map_err(password_error)? {
            return Err(DomainError::validation("Current password is incorrect"));
        }
        if new != confirm {
            return Err(DomainError::validation("Passwords do not match"));
        }
        validate_password_strength(new).map_err(password_error)?;
        self.password_hash = hash_password(new).map_err(password_error)?;
        self.updated_at = Some(now);
        Ok(())
    }

    /// `acting` may not deactivate themselves.
    pub fn deactivate(&mut self, acting: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        if acting == self.id {
            return Err(DomainError::invariant("You cannot deactivate your own account"));
        }
        if self.status == UserStatus::Deactivated {
            return Err(DomainError::conflict("User is already deactivated"));
        }
        self.status = UserStatus::Deactivated;
        self.updated_at = Some(now);
        Ok(())
    }

    pub fn reactivate(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status == UserStatus::Active {
            return Err(DomainError::conflict("User is already active"));
        }
        self.status = UserStatus::Active;
        self.updated_at = Some(now);
        Ok(())
    }

    /// Replace the direct grants.
    pub fn set_permissions(&mut self, names: &[String], now: DateTime<Utc>) -> DomainResult<()> {
        let unknown: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|p| !is_known_permission(p) || *p == Permission::WILDCARD)
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
        self.permissions = perms;
        self.updated_at = Some(now);
        Ok(())
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.as_str().eq_ignore_ascii_case(role))
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            contact_number: self.contact_number.clone(),
            roles: self.roles.clone(),
            permissions: self.permissions.clone(),
            is_active: self.is_active(),
            created_at: self.created_at,
            last_login_at: self.last_login_at,
        }
    }
}
