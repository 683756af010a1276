use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garments_core::{DomainError, DomainResult, Entity, Money, check_max_len, check_required, define_id};

define_id!(
    /// Contact identifier (customer and/or supplier).
    ContactId,
    "ContactId"
);

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_EMAIL_LEN: usize = 100;
pub const MAX_PHONE_LEN: usize = 20;
pub const MAX_TAX_NUMBER_LEN: usize = 50;
pub const DEFAULT_PAYMENT_TERMS_DAYS: u32 = 30;
pub const MAX_PAYMENT_TERMS_DAYS: u32 = 365;

/// Whether a contact buys from us, sells to us, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContactType {
    Customer,
    Supplier,
    Both,
}

impl ContactType {
    pub fn is_customer(self) -> bool {
        matches!(self, ContactType::Customer | ContactType::Both)
    }

    pub fn is_supplier(self) -> bool {
        matches!(self, ContactType::Supplier | ContactType::Both)
    }
}

/// Minimal `local@domain.tld` shape check.
pub fn is_valid_email(raw: &str) -> bool {
    let raw = raw.trim();
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !raw.contains(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub company_name: Option<String>,
    pub contact_type: ContactType,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub address: Option<String>,
    pub tax_number: Option<String>,
    pub credit_limit: Money,
    pub payment_terms_days: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Contact {
    type Id = ContactId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn default_terms() -> u32 {
    DEFAULT_PAYMENT_TERMS_DAYS
}

/// Create/update payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactInput {
    pub name: String,
    #[serde(default)]
    pub company_name: Option<String>,
    pub contact_type: ContactType,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub tax_number: Option<String>,
    #[serde(default)]
    pub credit_limit: Money,
    #[serde(default = "default_terms")]
    pub payment_terms_days: u32,
}

fn clean(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl ContactInput {
    fn validate(&self) -> DomainResult<()> {
        let mut errors = Vec::new();
        check_required("Name", &self.name, MAX_NAME_LEN, &mut errors);
        check_max_len("Company name", self.company_name.as_deref(), MAX_NAME_LEN, &mut errors);
        check_max_len("Email", self.email.as_deref(), MAX_EMAIL_LEN, &mut errors);
        check_max_len("Phone", self.phone.as_deref(), MAX_PHONE_LEN, &mut errors);
        check_max_len("Mobile", self.mobile.as_deref(), MAX_PHONE_LEN, &mut errors);
        check_max_len("Tax number", self.tax_number.as_deref(), MAX_TAX_NUMBER_LEN, &mut errors);
        if let Some(email) = clean(&self.email) {
            if !is_valid_email(&email) {
                errors.push("Email is not a valid email address".to_string());
            }
        }
        if self.credit_limit.is_negative() {
            errors.push("Credit limit cannot be negative".to_string());
        }
        if self.payment_terms_days > MAX_PAYMENT_TERMS_DAYS {
            errors.push(format!(
                "Payment terms must be between 0 and {MAX_PAYMENT_TERMS_DAYS} days"
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation_all(errors))
        }
    }
}

impl Contact {
    pub fn create(input: &ContactInput, now: DateTime<Utc>) -> DomainResult<Self> {
        input.validate()?;
        Ok(Self {
            id: ContactId::new(),
            name: input.name.trim().to_string(),
            company_name: clean(&input.company_name),
            contact_type: input.contact_type,
            email: clean(&input.email),
            phone: clean(&input.phone),
            mobile: clean(&input.mobile),
            address: clean(&input.address),
            tax_number: clean(&input.tax_number),
            credit_limit: input.credit_limit,
            payment_terms_days: input.payment_terms_days,
            is_active: true,
            created_at: now,
            updated_at: None,
        })
    }

    pub fn update(&mut self, input: &ContactInput, now: DateTime<Utc>) -> DomainResult<()> {
        input.validate()?;
        self.name = input.name.trim().to_string();
        self.company_name = clean(&input.company_name);
        self.contact_type = input.contact_type;
        self.email = clean(&input.email);
        self.phone = clean(&input.phone);
        self.mobile = clean(&input.mobile);
        self.address = clean(&input.address);
        self.tax_number = clean(&input.tax_number);
        self.credit_limit = input.credit_limit;
        self.payment_terms_days = input.payment_terms_days;
        self.updated_at = Some(now);
        Ok(())
    }

    pub fn set_active(&mut self, active: bool, now: DateTime<Utc>) {
        self.is_active = active;
        self.updated_at = Some(now);
    }

    /// Invariant helper: only active customers may be invoiced.
    pub fn ensure_customer(&self) -> DomainResult<()> {
        if !self.contact_type.is_customer() {
            return Err(DomainError::validation(format!("{} is not a customer", self.name)));
        }
        if !self.is_active {
            return Err(DomainError::invariant(format!("customer {} is inactive", self.name)));
        }
        Ok(())
    }

    /// Invariant helper: only active suppliers may bill us.
    pub fn ensure_supplier(&self) -> DomainResult<()> {
        if !self.contact_type.is_supplier() {
            return Err(DomainError::validation(format!("{} is not a supplier", self.name)));
        }
        if !self.is_active {
            return Err(DomainError::invariant(format!("supplier {} is inactive", self.name)));
        }
        Ok(())
    }
}

/// List filter (`?contact_type=&active=&search=`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactFilter {
    pub contact_type: Option<ContactType>,
    pub active: Option<bool>,
    pub search: Option<String>,
}

impl ContactFilter {
    pub fn matches(&self, c: &Contact) -> bool {
        if self.contact_type.is_some_and(|t| t != c.contact_type) {
            return false;
        }
        if self.active.is_some_and(|a| a != c.is_active) {
            return false;
        }
        match self.search.as_deref().map(|s| s.trim().to_lowercase()) {
            Some(term) if !term.is_empty() => {
                let hit = |v: Option<&str>| v.is_some_and(|v| v.to_lowercase().contains(&term));
                hit(Some(&c.name)) || hit(c.company_name.as_deref()) || hit(c.email.as_deref())
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn input(name: &str, t: ContactType) -> ContactInput {
        ContactInput {
            name: name.into(),
            company_name: Some("Lahore Textiles".into()),
            contact_type: t,
            email: Some("buyer@lahoretex.pk".into()),
            phone: None,
            mobile: Some("  ".into()),
            address: None,
            tax_number: None,
            credit_limit: Money::from_minor(100_000),
            payment_terms_days: DEFAULT_PAYMENT_TERMS_DAYS,
        }
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email("a@@b.co"));
    }

    #[test]
    fn create_trims_and_validates() {
        let c = Contact::create(&input(" Asif ", ContactType::Both), Utc::now()).unwrap();
        assert_eq!(c.name, "Asif");
        assert_eq!(c.mobile, None);
        assert!(c.ensure_customer().is_ok());
        assert!(c.ensure_supplier().is_ok());

        let mut bad = input("", ContactType::Customer);
        bad.email = Some("nope".into());
        bad.credit_limit = Money::from_minor(-1);
        bad.payment_terms_days = 400;
        match Contact::create(&bad, Utc::now()).unwrap_err() {
            DomainError::Validation(msg) => {
                assert_eq!(msg.split("; ").count(), 4, "{msg}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn role_checks_and_filter() {
        let mut supplier = Contact::create(&input("Yarn Co", ContactType::Supplier), Utc::now()).unwrap();
        assert!(supplier.ensure_customer().is_err());
        supplier.set_active(false, Utc::now());
        assert!(matches!(supplier.ensure_supplier(), Err(DomainError::InvariantViolation(_))));

        let filter = ContactFilter {
            contact_type: None,
            active: Some(false),
            search: Some("LAHORE".into()),
        };
        assert!(filter.matches(&supplier));
        let filter = ContactFilter {
            search: Some("zzz".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&supplier));
    }

    proptest! {
        #[test]
        fn payment_terms_outside_a_year_are_rejected(days in 366u32..100_000) {
            let mut i = input("Denim Mills", ContactType::Supplier);
            i.payment_terms_days = days;
            prop_assert!(Contact::create(&i, Utc::now()).is_err());
        }

        #[test]
        fn emails_containing_spaces_are_never_valid(local in "[a-z]{1,8}", host in "[a-z]{1,8}") {
            let spaced = format!("{local} x@{host}.pk");
            let plain = format!("{local}@{host}.pk");
            prop_assert!(!is_valid_email(&spaced));
            prop_assert!(is_valid_email(&plain));
        }
    }
}
