//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated (e.g. an unbalanced journal entry).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found.
    #[error("{0} not found")]
    NotFound(String),

    /// A conflict occurred (duplicate name, record still in use, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authorization failure at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Collapse several field-level messages into one validation error.
    pub fn validation_all(messages: Vec<String>) -> Self {
        Self::Validation(messages.join("; "))
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Check an optional text field against a maximum length (in characters).
pub fn check_max_len(field: &str, value: Option<&str>, max: usize, errors: &mut Vec<String>) {
    if let Some(v) = value {
        if v.chars().count() > max {
            errors.push(format!("{field} cannot exceed {max} characters"));
        }
    }
}

/// Check a required text field: non-blank and within `max` characters.
pub fn check_required(field: &str, value: &str, max: usize, errors: &mut Vec<String>) {
    if value.trim().is_empty() {
        errors.push(format!("{field} is required"));
    } else {
        check_max_len(field, Some(value), max, errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_fields_report_blank_and_overlong_values() {
        let mut errors = Vec::new();
        check_required("Name", "   ", 10, &mut errors);
        check_required("Code", "ABCDEFGHIJK", 10, &mut errors);
        check_max_len("Description", Some("ok"), 10, &mut errors);
        assert_eq!(
            errors,
            vec![
                "Name is required".to_string(),
                "Code cannot exceed 10 characters".to_string()
            ]
        );
    }

    #[test]
    fn not_found_names_the_resource() {
        let err = DomainError::not_found("account");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "account not found");
    }
}
