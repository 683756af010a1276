use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garments_core::{DomainError, DomainResult, Entity, Money, check_max_len, check_required, define_id};

define_id!(ProductId, "ProductId");

pub const MAX_SKU_LEN: usize = 50;
pub const MAX_NAME_LEN: usize = 200;
pub const MAX_UNIT_LEN: usize = 20;
pub const DEFAULT_UNIT: &str = "Pcs";

/// A sellable / purchasable item (garment, fabric, trim).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub unit_price: Money,
    pub cost_price: Money,
    pub reorder_level: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub unit_price: Money,
    #[serde(default)]
    pub cost_price: Money,
    #[serde(default)]
    pub reorder_level: i64,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl ProductInput {
    fn validate(&self) -> DomainResult<()> {
        let mut errors = Vec::new();
        check_required("SKU", &self.sku, MAX_SKU_LEN, &mut errors);
        check_required("Name", &self.name, MAX_NAME_LEN, &mut errors);
        check_max_len("Unit", self.unit.as_deref(), MAX_UNIT_LEN, &mut errors);
        if self.unit_price.is_negative() {
            errors.push("Unit price cannot be negative".to_string());
        }
        if self.cost_price.is_negative() {
            errors.push("Cost price cannot be negative".to_string());
        }
        if self.reorder_level < 0 {
            errors.push("Reorder level cannot be negative".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation_all(errors))
        }
    }

    fn unit(&self) -> String {
        self.unit
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_UNIT)
            .to_string()
    }
}

fn ensure_unique_sku(existing: &[Product], skip: Option<ProductId>, sku: &str) -> DomainResult<()> {
    if existing
        .iter()
        .any(|p| Some(p.id) != skip && p.sku.eq_ignore_ascii_case(sku))
    {
        return Err(DomainError::conflict(format!("SKU '{sku}' already exists")));
    }
    Ok(())
}

impl Product {
    pub fn create(input: &ProductInput, existing: &[Product], now: DateTime<Utc>) -> DomainResult<Self> {
        input.validate()?;
        let sku = input.sku.trim().to_string();
        ensure_unique_sku(existing, None, &sku)?;
        Ok(Self {
            id: ProductId::new(),
            sku,
            name: input.name.trim().to_string(),
            description: input.description.clone(),
            unit: input.unit(),
            unit_price: input.unit_price,
            cost_price: input.cost_price,
            reorder_level: input.reorder_level,
            is_active: input.is_active.unwrap_or(true),
            created_at: now,
            updated_at: None,
        })
    }

    pub fn update(&mut self, input: &ProductInput, existing: &[Product], now: DateTime<Utc>) -> DomainResult<()> {
        input.validate()?;
        let sku = input.sku.trim().to_string();
        ensure_unique_sku(existing, Some(self.id), &sku)?;
        self.sku = sku;
        self.name = input.name.trim().to_string();
        self.description = input.description.clone();
        self.unit = input.unit();
        self.unit_price = input.unit_price;
        self.cost_price = input.cost_price;
        self.reorder_level = input.reorder_level;
        if let Some(active) = input.is_active {
            self.is_active = active;
        }
        self.updated_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(sku: &str) -> ProductInput {
        ProductInput {
            sku: sku.into(),
            name: "Polo Shirt".into(),
            description: None,
            unit: None,
            unit_price: Money::from_minor(150_000),
            cost_price: Money::from_minor(90_000),
            reorder_level: 20,
            is_active: None,
        }
    }

    #[test]
    fn defaults_unit_and_rejects_duplicate_sku() {
        let p = Product::create(&input("POLO-M"), &[], Utc::now()).unwrap();
        assert_eq!(p.unit, "Pcs");
        assert!(p.is_active);
        let dup = Product::create(&input("polo-m"), &[p.clone()], Utc::now());
        assert!(matches!(dup, Err(DomainError::Conflict(_))));

        let mut same = p.clone();
        assert!(same.update(&input("POLO-M"), &[p], Utc::now()).is_ok());
    }

    #[test]
    fn negative_prices_are_invalid() {
        let mut bad = input("X");
        bad.cost_price = Money::from_minor(-1);
        bad.reorder_level = -5;
        assert!(matches!(
            Product::create(&bad, &[], Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }
}
