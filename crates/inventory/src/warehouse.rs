use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garments_core::{DomainError, DomainResult, Entity, check_max_len, check_required, define_id};

define_id!(WarehouseId, "WarehouseId");

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_ADDRESS_LEN: usize = 500;
pub const MAX_FIELD_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WarehouseInput {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub contact_person: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl WarehouseInput {
    fn validate(&self) -> DomainResult<()> {
        let mut errors = Vec::new();
        check_required("Name", &self.name, MAX_NAME_LEN, &mut errors);
        check_max_len("Address", self.address.as_deref(), MAX_ADDRESS_LEN, &mut errors);
        for (field, value) in [
            ("City", &self.city),
            ("State", &self.state),
            ("Postal code", &self.postal_code),
            ("Contact person", &self.contact_person),
            ("Contact phone", &self.contact_phone),
        ] {
            check_max_len(field, value.as_deref(), MAX_FIELD_LEN, &mut errors);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation_all(errors))
        }
    }
}

fn ensure_unique_name(existing: &[Warehouse], skip: Option<WarehouseId>, name: &str) -> DomainResult<()> {
    let lower = name.to_lowercase();
    if existing
        .iter()
        .any(|w| Some(w.id) != skip && w.name.to_lowercase() == lower)
    {
        return Err(DomainError::conflict(format!("Warehouse '{name}' already exists")));
    }
    Ok(())
}

impl Warehouse {
    pub fn create(input: &WarehouseInput, existing: &[Warehouse], now: DateTime<Utc>) -> DomainResult<Self> {
        input.validate()?;
        let name = input.name.trim().to_string();
        ensure_unique_name(existing, None, &name)?;
        Ok(Self {
            id: WarehouseId::new(),
            name,
            address: input.address.clone(),
            city: input.city.clone(),
            state: input.state.clone(),
            postal_code: input.postal_code.clone(),
            contact_person: input.contact_person.clone(),
            contact_phone: input.contact_phone.clone(),
            is_active: input.is_active.unwrap_or(true),
            created_at: now,
            updated_at: None,
        })
    }

    pub fn update(&mut self, input: &WarehouseInput, existing: &[Warehouse], now: DateTime<Utc>) -> DomainResult<()> {
        input.validate()?;
        let name = input.name.trim().to_string();
        ensure_unique_name(existing, Some(self.id), &name)?;
        self.name = name;
        self.address = input.address.clone();
        self.city = input.city.clone();
        self.state = input.state.clone();
        self.postal_code = input.postal_code.clone();
        self.contact_person = input.contact_person.clone();
        self.contact_phone = input.contact_phone.clone();
        if let Some(active) = input.is_active {
            self.is_active = active;
        }
        self.updated_at = Some(now);
        Ok(())
    }

    /// Deletion is refused while any stock is still held here.
    pub fn ensure_deletable(&self, units_held: i64) -> DomainResult<()> {
        if units_held > 0 {
            return Err(DomainError::conflict(format!(
                "Cannot delete warehouse '{}' while it holds {units_held} unit(s) of stock",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_case_insensitively() {
        let main = Warehouse::create(
            &WarehouseInput {
                name: "Main Store".into(),
                city: Some("Faisalabad".into()),
                ..Default::default()
            },
            &[],
            Utc::now(),
        )
        .unwrap();
        let again = Warehouse::create(
            &WarehouseInput {
                name: "main store ".into(),
                ..Default::default()
            },
            &[main.clone()],
            Utc::now(),
        );
        assert!(matches!(again, Err(DomainError::Conflict(_))));
        assert!(main.ensure_deletable(0).is_ok());
        assert!(main.ensure_deletable(3).is_err());
    }
}
