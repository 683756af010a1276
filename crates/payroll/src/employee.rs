use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use garments_core::{
    DomainError, DomainResult, Entity, Money, UserId, check_max_len, check_required, define_id,
};
use garments_parties::is_valid_email;

define_id!(EmployeeId, "EmployeeId");

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 100;
pub const MAX_PHONE_LEN: usize = 15;
pub const MAX_ADDRESS_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub hire_date: NaiveDate,
    pub termination_date: Option<NaiveDate>,
    /// Monthly gross salary.
    pub salary: Money,
    pub user_id: Option<UserId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Employee {
    type Id = EmployeeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmployeeInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    pub hire_date: NaiveDate,
    pub salary: Money,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

impl EmployeeInput {
    fn validate(&self) -> DomainResult<()> {
        let mut errors = Vec::new();
        check_required("First name", &self.first_name, MAX_NAME_LEN, &mut errors);
        check_required("Last name", &self.last_name, MAX_NAME_LEN, &mut errors);
        check_required("Email", &self.email, MAX_EMAIL_LEN, &mut errors);
        if !self.email.trim().is_empty() && !is_valid_email(self.email.trim()) {
            errors.push("Email is not a valid email address".to_string());
        }
        check_max_len("Phone", self.phone.as_deref(), MAX_PHONE_LEN, &mut errors);
        check_max_len("Address", self.address.as_deref(), MAX_ADDRESS_LEN, &mut errors);
        check_max_len("Department", self.department.as_deref(), MAX_NAME_LEN, &mut errors);
        check_max_len("Position", self.position.as_deref(), MAX_NAME_LEN, &mut errors);
        if self.salary.is_negative() {
            errors.push("Salary cannot be negative".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation_all(errors))
        }
    }
}

fn ensure_unique_email(existing: &[Employee], skip: Option<EmployeeId>, email: &str) -> DomainResult<()> {
    if existing
        .iter()
        .any(|e| Some(e.id) != skip && e.email.eq_ignore_ascii_case(email))
    {
        return Err(DomainError::conflict(format!(
            "An employee with email '{email}' already exists"
        )));
    }
    Ok(())
}

impl Employee {
    pub fn create(input: &EmployeeInput, existing: &[Employee], now: DateTime<Utc>) -> DomainResult<Self> {
        input.validate()?;
        let email = input.email.trim().to_string();
        ensure_unique_email(existing, None, &email)?;
        Ok(Self {
            id: EmployeeId::new(),
            first_name: input.first_name.trim().to_string(),
            last_name: input.last_name.trim().to_string(),
            email,
            phone: input.phone.clone(),
            address: input.address.clone(),
            department: input.department.clone(),
            position: input.position.clone(),
            hire_date: input.hire_date,
            termination_date: None,
            salary: input.salary,
            user_id: input.user_id,
            is_active: true,
            created_at: now,
            updated_at: None,
        })
    }

    pub fn update(&mut self, input: &EmployeeInput, existing: &[Employee], now: DateTime<Utc>) -> DomainResult<()> {
        input.validate()?;
        let email = input.email.trim().to_string();
        ensure_unique_email(existing, Some(self.id), &email)?;
        self.first_name = input.first_name.trim().to_string();
        self.last_name = input.last_name.trim().to_string();
        self.email = email;
        self.phone = input.phone.clone();
        self.address = input.address.clone();
        self.department = input.department.clone();
        self.position = input.position.clone();
        self.hire_date = input.hire_date;
        self.salary = input.salary;
        self.user_id = input.user_id;
        self.updated_at = Some(now);
        Ok(())
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Ends employment; terminated employees are left out of pay runs.
    pub fn terminate(&mut self, on: NaiveDate, now: DateTime<Utc>) -> DomainResult<()> {
        if self.termination_date.is_some() {
            return Err(DomainError::conflict(format!(
                "{} has already been terminated",
                self.full_name()
            )));
        }
        if on < self.hire_date {
            return Err(DomainError::validation("Termination date cannot be before the hire date"));
        }
        self.termination_date = Some(on);
        self.is_active = false;
        self.updated_at = Some(now);
        Ok(())
    }

    /// Active and employed at some point within `[start, end]`.
    pub fn is_payable_for(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.is_active
            && self.hire_date <= end
            && self.termination_date.is_none_or(|t| t >= start)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn input(email: &str) -> EmployeeInput {
        EmployeeInput {
            first_name: "Ayesha".into(),
            last_name: "Khan".into(),
            email: email.into(),
            phone: None,
            address: None,
            department: Some("Stitching".into()),
            position: Some("Supervisor".into()),
            hire_date: NaiveDate::from_ymd_opt(2023, 1, 9).unwrap(),
            salary: Money::from_minor(8_500_000),
            user_id: None,
        }
    }

    #[test]
    fn email_is_validated_and_unique() {
        assert!(Employee::create(&input("not-an-email"), &[], Utc::now()).is_err());
        let e = Employee::create(&input("ayesha@mill.pk"), &[], Utc::now()).unwrap();
        let dup = Employee::create(&input("AYESHA@mill.pk"), &[e], Utc::now());
        assert!(matches!(dup, Err(DomainError::Conflict(_))));
    }

    #[test]
    fn termination_ends_payability() {
        let mut e = Employee::create(&input("ayesha@mill.pk"), &[], Utc::now()).unwrap();
        let jan = (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        assert!(e.is_payable_for(jan.0, jan.1));
        assert!(e.terminate(NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(), Utc::now()).is_err());
        e.terminate(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), Utc::now()).unwrap();
        assert!(!e.is_active);
        assert!(!e.is_payable_for(jan.0, jan.1));
        assert!(e.terminate(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), Utc::now()).is_err());
    }
}
