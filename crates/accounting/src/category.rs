//! Cash-book categories (labels for credit and debit cash-book entries).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garments_core::{
    DomainError, DomainResult, Entity, UserId, check_max_len, check_required, define_id,
};

use crate::journal::JournalEntry;

define_id!(CategoryId, "CategoryId");

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 500;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CategoryType {
    Credit,
    Debit,
}

impl CategoryType {
    pub fn name(self) -> &'static str {
        match self {
            CategoryType::Credit => "Credit",
            CategoryType::Debit => "Debit",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "credit" => Ok(CategoryType::Credit),
            "debit" => Ok(CategoryType::Debit),
            _ => Err(DomainError::validation(format!(
                "Invalid category type '{raw}'. Expected Credit or Debit"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub category_type: CategoryType,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<UserId>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<UserId>,
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub category_type: CategoryType,
}

/// A category together with how many journal entries use it.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryView {
    #[serde(flatten)]
    pub category: Category,
    pub usage_count: usize,
}

fn validate_input(input: &CategoryInput) -> DomainResult<(String, Option<String>)> {
    let mut errors = Vec::new();
    check_required("Name", &input.name, MAX_NAME_LEN, &mut errors);
    check_max_len("Description", input.description.as_deref(), MAX_DESCRIPTION_LEN, &mut errors);
    if !errors.is_empty() {
        return Err(DomainError::validation_all(errors));
    }
    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    Ok((input.name.trim().to_string(), description))
}

fn ensure_unique(
    existing: &[Category],
    skip: Option<CategoryId>,
    name: &str,
    category_type: CategoryType,
) -> DomainResult<()> {
    let clash = existing.iter().any(|c| {
        Some(c.id) != skip
            && c.is_active
            && c.category_type == category_type
            && c.name.to_lowercase() == name.to_lowercase()
    });
    if clash {
        return Err(DomainError::conflict(format!(
            "Category name '{name}' already exists for type '{}'",
            category_type.name()
        )));
    }
    Ok(())
}

impl Category {
    pub fn create(
        input: &CategoryInput,
        existing: &[Category],
        by: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let (name, description) = validate_input(input)?;
        ensure_unique(existing, None, &name, input.category_type)?;
        Ok(Self {
            id: CategoryId::new(),
            name,
            description,
            category_type: input.category_type,
            is_active: true,
            created_at: now,
            created_by: Some(by),
            updated_at: None,
            updated_by: None,
        })
    }

    pub fn update(
        &mut self,
        input: &CategoryInput,
        existing: &[Category],
        by: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let (name, description) = validate_input(input)?;
        ensure_unique(existing, Some(self.id), &name, input.category_type)?;
        self.name = name;
        self.description = description;
        self.category_type = input.category_type;
        self.updated_at = Some(now);
        self.updated_by = Some(by);
        Ok(())
    }

    /// Soft delete. Categories still referenced by journal entries stay.
    pub fn deactivate(&mut self, usage_count: usize, by: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        if usage_count > 0 {
            return Err(DomainError::conflict(format!(
                "Cannot delete category '{}' because it is used in existing transactions. Use deactivate instead.",
                self.name
            )));
        }
        self.is_active = false;
        self.updated_at = Some(now);
        self.updated_by = Some(by);
        Ok(())
    }

    pub fn toggle_status(&mut self, usage_count: usize, by: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.is_active && usage_count > 0 {
            return Err(DomainError::conflict(format!(
                "Cannot deactivate category '{}' because it is used in existing transactions.",
                self.name
            )));
        }
        self.is_active = !self.is_active;
        self.updated_at = Some(now);
        self.updated_by = Some(by);
        Ok(())
    }

    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        term.is_empty()
            || self.name.to_lowercase().contains(&term)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&term))
    }

    /// Journal entries referencing this category by name, either on a line
    /// description or as the entry particulars after the `Credit:`/`Debit:` prefix.
    pub fn usage_count(&self, entries: &[JournalEntry]) -> usize {
        let name = self.name.to_lowercase();
        entries
            .iter()
            .filter(|e| {
                let on_line = e
                    .lines
                    .iter()
                    .any(|l| l.description.as_deref().is_some_and(|d| d.trim().to_lowercase() == name));
                let in_particulars = e.description.as_deref().is_some_and(|d| {
                    let d = d.to_lowercase();
                    let rest = d
                        .strip_prefix("credit:")
                        .or_else(|| d.strip_prefix("debit:"))
                        .unwrap_or(d.as_str());
                    rest.trim_start().starts_with(&name)
                });
                on_line || in_particulars
            })
            .count()
    }
}

/// Active categories ordered by type, then name.
pub fn sort_for_listing(categories: &mut [Category]) {
    categories.sort_by(|a, b| {
        a.category_type
            .cmp(&b.category_type)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
}
