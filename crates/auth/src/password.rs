//! Argon2 password hashing and strength rules.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use thiserror::Error;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("{0}")]
    Weak(String),

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// At least six characters with an uppercase letter, a lowercase letter and a digit.
pub fn validate_password_strength(password: &str) -> Result<(), PasswordError> {
    let mut problems = Vec::new();
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        problems.push(format!("Password must be at least {MIN_PASSWORD_LEN} characters"));
    }
    if len > MAX_PASSWORD_LEN {
        problems.push(format!("Password cannot exceed {MAX_PASSWORD_LEN} characters"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("Password must contain a digit".to_string());
    }
    if !password.chars().any(char::is_uppercase) {
        problems.push("Password must contain an uppercase letter".to_string());
    }
    if !password.chars().any(char::is_lowercase) {
        problems.push("Password must contain a lowercase letter".to_string());
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(PasswordError::Weak(problems.join("; ")))
    }
}

pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(password_hash).map_err(|e| PasswordError::Hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_verify_and_are_salted() {
        let a = hash_password("Cutting1").unwrap();
        let b = hash_password("Cutting1").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("Cutting1", &a).unwrap());
        assert!(!verify_password("cutting1", &a).unwrap());
        assert!(verify_password("Cutting1", "garbage").is_err());
    }

    #[test]
    fn strength_rules_are_all_reported() {
        assert!(validate_password_strength("Stitch9").is_ok());
        match validate_password_strength("abc") {
            Err(PasswordError::Weak(msg)) => {
                assert!(msg.contains("at least 6"));
                assert!(msg.contains("digit"));
                assert!(msg.contains("uppercase"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
