//! Payroll aggregate: one employee's pay for one period.
//!
//! Status flows Draft → Approved → Processed → Paid. Only drafts can be
//! edited or deleted.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use garments_accounting::{AccountingSettings, Posting, PostingKind};
use garments_core::{Aggregate, AggregateRoot, DomainError, DomainResult, Event, Money, UserId, define_id};

use crate::employee::{Employee, EmployeeId};

define_id!(PayrollId, "PayrollId");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayrollStatus {
    Draft,
    Approved,
    Processed,
    Paid,
}

impl PayrollStatus {
    pub fn name(self) -> &'static str {
        match self {
            PayrollStatus::Draft => "Draft",
            PayrollStatus::Approved => "Approved",
            PayrollStatus::Processed => "Processed",
            PayrollStatus::Paid => "Paid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payroll {
    pub id: PayrollId,
    pub employee_id: EmployeeId,
    pub pay_period_start: NaiveDate,
    pub pay_period_end: NaiveDate,
    pub gross_salary: Money,
    pub deductions: Money,
    pub net_salary: Money,
    pub status: PayrollStatus,
    pub approved_by: Option<UserId>,
    pub processed_at: Option<DateTime<Utc>>,
    pub paid_on: Option<NaiveDate>,
    pub created_by: Option<UserId>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Payroll {
    pub fn empty(id: PayrollId) -> Self {
        Self {
            id,
            employee_id: EmployeeId::from_uuid(uuid::Uuid::nil()),
            pay_period_start: NaiveDate::MIN,
            pay_period_end: NaiveDate::MIN,
            gross_salary: Money::ZERO,
            deductions: Money::ZERO,
            net_salary: Money::ZERO,
            status: PayrollStatus::Draft,
            approved_by: None,
            processed_at: None,
            paid_on: None,
            created_by: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.pay_period_start <= end && start <= self.pay_period_end
    }

    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.status != PayrollStatus::Draft {
            return Err(DomainError::invariant(format!(
                "Only draft payrolls can be deleted (status is {})",
                self.status.name()
            )));
        }
        Ok(())
    }

    /// Debit salary expense, credit cash for the net pay.
    pub fn salary_posting(&self, settings: &AccountingSettings, employee: &Employee) -> Option<Posting> {
        settings.posting(
            PostingKind::Salary,
            self.paid_on.unwrap_or(self.pay_period_end),
            &format!("PAY-{}-{}", self.pay_period_end.format("%Y%m"), employee.id),
            &format!(
                "Salary {} ({} to {})",
                employee.full_name(),
                self.pay_period_start,
                self.pay_period_end
            ),
            self.net_salary,
        )
    }
}

impl AggregateRoot for Payroll {
    type Id = PayrollId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Period and amounts, shared by create and update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollTerms {
    pub pay_period_start: NaiveDate,
    pub pay_period_end: NaiveDate,
    pub gross_salary: Money,
    #[serde(default)]
    pub deductions: Money,
}

impl PayrollTerms {
    fn validate(&self) -> DomainResult<()> {
        let mut errors = Vec::new();
        if self.pay_period_start > self.pay_period_end {
            errors.push("Pay period start must not be after the pay period end".to_string());
        }
        if !self.gross_salary.is_positive() {
            errors.push("Gross salary must be greater than zero".to_string());
        }
        if self.deductions.is_negative() {
            errors.push("Deductions cannot be negative".to_string());
        } else if self.deductions > self.gross_salary {
            errors.push("Deductions cannot exceed the gross salary".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation_all(errors))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePayroll {
    pub payroll_id: PayrollId,
    pub employee_id: EmployeeId,
    pub terms: PayrollTerms,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayrollCommand {
    Create(CreatePayroll),
    Update { terms: PayrollTerms, occurred_at: DateTime<Utc> },
    Approve { approved_by: UserId, occurred_at: DateTime<Utc> },
    Process { occurred_at: DateTime<Utc> },
    Pay { paid_on: NaiveDate, occurred_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayrollEvent {
    Created(CreatePayroll),
    Updated { terms: PayrollTerms, occurred_at: DateTime<Utc> },
    Approved { approved_by: UserId, occurred_at: DateTime<Utc> },
    Processed { occurred_at: DateTime<Utc> },
    Paid { paid_on: NaiveDate, occurred_at: DateTime<Utc> },
}

impl Event for PayrollEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PayrollEvent::Created(_) => "payroll.payroll.created",
            PayrollEvent::Updated { .. } => "payroll.payroll.updated",
            PayrollEvent::Approved { .. } => "payroll.payroll.approved",
            PayrollEvent::Processed { .. } => "payroll.payroll.processed",
            PayrollEvent::Paid { .. } => "payroll.payroll.paid",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PayrollEvent::Created(c) => c.occurred_at,
            PayrollEvent::Updated { occurred_at, .. }
            | PayrollEvent::Approved { occurred_at, .. }
            | PayrollEvent::Processed { occurred_at }
            | PayrollEvent::Paid { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Payroll {
    fn set_terms(&mut self, terms: &PayrollTerms) {
        self.pay_period_start = terms.pay_period_start;
        self.pay_period_end = terms.pay_period_end;
        self.gross_salary = terms.gross_salary;
        self.deductions = terms.deductions;
        self.net_salary = terms.gross_salary - terms.deductions;
    }

    fn require(&self, status: PayrollStatus, action: &str) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::not_found("Payroll"));
        }
        if self.status != status {
            return Err(DomainError::invariant(format!(
                "Only {} payrolls can be {action} (status is {})",
                status.name().to_lowercase(),
                self.status.name()
            )));
        }
        Ok(())
    }
}

impl Aggregate for Payroll {
    type Command = PayrollCommand;
    type Event = PayrollEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PayrollEvent::Created(c) => {
                self.id = c.payroll_id;
                self.employee_id = c.employee_id;
                self.set_terms(&c.terms);
                self.status = PayrollStatus::Draft;
                self.created_by = Some(c.created_by);
                self.created_at = Some(c.occurred_at);
                self.created = true;
            }
            PayrollEvent::Updated { terms, occurred_at } => {
                self.set_terms(terms);
                self.updated_at = Some(*occurred_at);
            }
            PayrollEvent::Approved { approved_by, occurred_at } => {
                self.status = PayrollStatus::Approved;
                self.approved_by = Some(*approved_by);
                self.updated_at = Some(*occurred_at);
            }
            PayrollEvent::Processed { occurred_at } => {
                self.status = PayrollStatus::Processed;
                self.processed_at = Some(*occurred_at);
                self.updated_at = Some(*occurred_at);
            }
            PayrollEvent::Paid { paid_on, occurred_at } => {
                self.status = PayrollStatus::Paid;
                self.paid_on = Some(*paid_on);
                self.updated_at = Some(*occurred_at);
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PayrollCommand::Create(c) => {
                if self.created {
                    return Err(DomainError::conflict("Payroll already exists"));
                }
                c.terms.validate()?;
                Ok(vec![PayrollEvent::Created(c.clone())])
            }
            PayrollCommand::Update { terms, occurred_at } => {
                self.require(PayrollStatus::Draft, "edited")?;
                terms.validate()?;
                Ok(vec![PayrollEvent::Updated {
                    terms: *terms,
                    occurred_at: *occurred_at,
                }])
            }
            PayrollCommand::Approve { approved_by, occurred_at } => {
                self.require(PayrollStatus::Draft, "approved")?;
                Ok(vec![PayrollEvent::Approved {
                    approved_by: *approved_by,
                    occurred_at: *occurred_at,
                }])
            }
            PayrollCommand::Process { occurred_at } => {
                self.require(PayrollStatus::Approved, "processed")?;
                Ok(vec![PayrollEvent::Processed {
                    occurred_at: *occurred_at,
                }])
            }
            PayrollCommand::Pay { paid_on, occurred_at } => {
                self.require(PayrollStatus::Processed, "paid")?;
                Ok(vec![PayrollEvent::Paid {
                    paid_on: *paid_on,
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

/// Draft payrolls for every active employee with no payroll overlapping the period.
///
/// Employees without a positive salary are skipped.
pub fn run_for_period(
    employees: &[Employee],
    existing: &[Payroll],
    start: NaiveDate,
    end: NaiveDate,
    created_by: UserId,
    occurred_at: DateTime<Utc>,
) -> DomainResult<Vec<CreatePayroll>> {
    if start > end {
        return Err(DomainError::validation(
            "Pay period start must not be after the pay period end",
        ));
    }
    Ok(employees
        .iter()
        .filter(|e| e.is_payable_for(start, end) && e.salary.is_positive())
        .filter(|e| {
            !existing
                .iter()
                .any(|p| p.employee_id == e.id && p.overlaps(start, end))
        })
        .map(|e| CreatePayroll {
            payroll_id: PayrollId::new(),
            employee_id: e.id,
            terms: PayrollTerms {
                pay_period_start: start,
                pay_period_end: end,
                gross_salary: e.salary,
                deductions: Money::ZERO,
            },
            created_by,
            occurred_at,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::employee::tests::input;
    use garments_accounting::AccountId;
    use garments_core::execute;
    use proptest::prelude::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn terms(gross: i64, deductions: i64) -> PayrollTerms {
        PayrollTerms {
            pay_period_start: d(3, 1),
            pay_period_end: d(3, 31),
            gross_salary: Money::from_minor(gross),
            deductions: Money::from_minor(deductions),
        }
    }

    fn created(gross: i64, deductions: i64) -> Payroll {
        let p_id = PayrollId::new();
        let mut p = Payroll::empty(p_id);
        execute(
            &mut p,
            &PayrollCommand::Create(CreatePayroll {
                payroll_id: p_id,
                employee_id: EmployeeId::new(),
                terms: terms(gross, deductions),
                created_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        p
    }

    #[test]
    fn deductions_cannot_exceed_gross() {
        let cmd = PayrollCommand::Create(CreatePayroll {
            payroll_id: PayrollId::new(),
            employee_id: EmployeeId::new(),
            terms: terms(1_000, 1_001),
            created_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            Payroll::empty(PayrollId::new()).handle(&cmd),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn status_flow_is_strict() {
        let mut p = created(100_000, 15_000);
        assert_eq!(p.net_salary, Money::from_minor(85_000));

        let pay = PayrollCommand::Pay { paid_on: d(4, 1), occurred_at: Utc::now() };
        assert!(p.handle(&pay).is_err());

        execute(&mut p, &PayrollCommand::Approve { approved_by: UserId::new(), occurred_at: Utc::now() }).unwrap();
        assert!(p.ensure_deletable().is_err());
        let edit = PayrollCommand::Update { terms: terms(90_000, 0), occurred_at: Utc::now() };
        assert!(p.handle(&edit).is_err());

        execute(&mut p, &PayrollCommand::Process { occurred_at: Utc::now() }).unwrap();
        execute(&mut p, &pay).unwrap();
        assert_eq!(p.status, PayrollStatus::Paid);
        assert_eq!(p.paid_on, Some(d(4, 1)));
        assert_eq!(p.version(), 4);
    }

    #[test]
    fn run_skips_covered_and_inactive_employees() {
        let a = Employee::create(&input("a@mill.pk"), &[], Utc::now()).unwrap();
        let b = Employee::create(&input("b@mill.pk"), &[a.clone()], Utc::now()).unwrap();
        let mut c = Employee::create(&input("c@mill.pk"), &[a.clone(), b.clone()], Utc::now()).unwrap();
        c.terminate(d(1, 31), Utc::now()).unwrap();

        let existing_id = PayrollId::new();
        let mut existing = Payroll::empty(existing_id);
        execute(
            &mut existing,
            &PayrollCommand::Create(CreatePayroll {
                payroll_id: existing_id,
                employee_id: a.id,
                terms: PayrollTerms {
                    pay_period_start: d(3, 15),
                    pay_period_end: d(4, 14),
                    gross_salary: a.salary,
                    deductions: Money::ZERO,
                },
                created_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let run = run_for_period(&[a, b.clone(), c], &[existing], d(3, 1), d(3, 31), UserId::new(), Utc::now()).unwrap();
        assert_eq!(run.len(), 1);
        assert_eq!(run[0].employee_id, b.id);
        assert_eq!(run[0].terms.gross_salary, b.salary);

        assert!(run_for_period(&[], &[], d(3, 31), d(3, 1), UserId::new(), Utc::now()).is_err());
    }

    #[test]
    fn salary_posting_uses_net_pay() {
        let employee = Employee::create(&input("a@mill.pk"), &[], Utc::now()).unwrap();
        let mut p = created(100_000, 10_000);
        let settings = AccountingSettings {
            cash_account_id: Some(AccountId::new()),
            salary_expense_account_id: Some(AccountId::new()),
            ..Default::default()
        };
        for cmd in [
            PayrollCommand::Approve { approved_by: UserId::new(), occurred_at: Utc::now() },
            PayrollCommand::Process { occurred_at: Utc::now() },
            PayrollCommand::Pay { paid_on: d(4, 2), occurred_at: Utc::now() },
        ] {
            execute(&mut p, &cmd).unwrap();
        }
        let posting = p.salary_posting(&settings, &employee).unwrap();
        assert_eq!(posting.transaction_date, d(4, 2));
        assert_eq!(posting.lines[0].debit, Money::from_minor(90_000));
        assert!(p.salary_posting(&AccountingSettings::default(), &employee).is_none());
    }

    proptest! {
        #[test]
        fn net_is_gross_minus_deductions(gross in 1i64..10_000_000, pct in 0i64..=100) {
            let deductions = gross * pct / 100;
            let p = created(gross, deductions);
            prop_assert_eq!(p.net_salary + p.deductions, p.gross_salary);
            prop_assert!(!p.net_salary.is_negative());
        }
    }
}
