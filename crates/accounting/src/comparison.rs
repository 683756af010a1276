//! Period-over-period trial balance comparison.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use garments_core::{DomainError, DomainResult, Money};

use crate::account::AccountId;
use crate::trial_balance::{TrialBalanceAccount, TrialBalanceReport, TrialBalanceRequest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRequest {
    pub period1: TrialBalanceRequest,
    pub period2: TrialBalanceRequest,
}

impl ComparisonRequest {
    pub fn validate(&self) -> DomainResult<()> {
        let mut errors: Vec<String> = Vec::new();
        errors.extend(self.period1.errors().into_iter().map(|e| format!("Period 1: {e}")));
        errors.extend(self.period2.errors().into_iter().map(|e| format!("Period 2: {e}")));
        if !errors.is_empty() {
            return Err(DomainError::validation_all(errors));
        }
        if self.period1.overlaps(&self.period2) {
            return Err(DomainError::validation(
                "Comparison periods should not overlap for meaningful analysis",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    Increased,
    Decreased,
    New,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountVariance {
    pub account_id: AccountId,
    pub account_name: String,
    pub category_name: String,
    pub period1_balance: Money,
    pub period2_balance: Money,
    pub absolute_change: Money,
    pub percentage_change: f64,
    pub change_type: ChangeType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalanceComparison {
    pub period1: TrialBalanceReport,
    pub period2: TrialBalanceReport,
    pub variances: Vec<AccountVariance>,
    pub total_variance: Money,
}

pub fn compare(period1: TrialBalanceReport, period2: TrialBalanceReport) -> TrialBalanceComparison {
    let mut joined: BTreeMap<AccountId, (Option<&TrialBalanceAccount>, Option<&TrialBalanceAccount>)> =
        BTreeMap::new();
    for row in period1.account_rows() {
        joined.entry(row.account_id).or_default().0 = Some(row);
    }
    for row in period2.account_rows() {
        joined.entry(row.account_id).or_default().1 = Some(row);
    }

    let mut variances: Vec<AccountVariance> = joined
        .into_iter()
        .filter_map(|(account_id, (before, after))| {
            let b1 = before.map_or(Money::ZERO, |r| r.net_balance);
            let b2 = after.map_or(Money::ZERO, |r| r.net_balance);
            let change = b2 - b1;
            let change_type = match (before, after) {
                (None, _) => ChangeType::New,
                (_, None) => ChangeType::Removed,
                _ if change.is_positive() => ChangeType::Increased,
                _ if change.is_negative() => ChangeType::Decreased,
                _ => return None,
            };
            let label = after.or(before)?;
            let percentage_change = if b1.is_zero() {
                0.0
            } else {
                change.minor() as f64 / b1.abs().minor() as f64 * 100.0
            };
            Some(AccountVariance {
                account_id,
                account_name: label.account_name.clone(),
                category_name: label.category_name.clone(),
                period1_balance: b1,
                period2_balance: b2,
                absolute_change: change,
                percentage_change,
                change_type,
            })
        })
        .collect();

    variances.sort_by(|a, b| {
        b.absolute_change
            .abs()
            .cmp(&a.absolute_change.abs())
            .then_with(|| a.account_name.cmp(&b.account_name))
    });
    let total_variance = variances.iter().map(|v| v.absolute_change.abs()).sum();

    TrialBalanceComparison {
        period1,
        period2,
        variances,
        total_variance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountType;
    use crate::journal::JournalLineInput;
    use crate::trial_balance::generate;
    use crate::trial_balance::tests::{account, date, posted};
    use chrono::Utc;

    #[test]
    fn overlapping_periods_are_rejected() {
        let req = ComparisonRequest {
            period1: TrialBalanceRequest::new(date(2024, 1, 1), date(2024, 1, 31)),
            period2: TrialBalanceRequest::new(date(2024, 1, 31), date(2024, 2, 28)),
        };
        assert!(matches!(req.validate(), Err(DomainError::Validation(_))));

        let inverted = ComparisonRequest {
            period1: TrialBalanceRequest::new(date(2024, 1, 31), date(2024, 1, 1)),
            period2: TrialBalanceRequest::new(date(2024, 2, 1), date(2024, 2, 28)),
        };
        match inverted.validate() {
            Err(DomainError::Validation(msg)) => assert!(msg.starts_with("Period 1:")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn variances_classify_and_sort_by_magnitude() {
        let mut chart = Vec::new();
        let cash = account("1000", "Cash", AccountType::Asset, &mut chart);
        let sales = account("4000", "Sales", AccountType::Revenue, &mut chart);
        let rent = account("5100", "Rent", AccountType::Expense, &mut chart);
        let loan = account("2100", "Bank Loan", AccountType::Liability, &mut chart);

        let entries = vec![
            posted(
                date(2024, 1, 10),
                "jan sale",
                vec![
                    JournalLineInput::debit(cash, Money::from_minor(10_000), ""),
                    JournalLineInput::credit(sales, Money::from_minor(10_000), ""),
                ],
            ),
            posted(
                date(2024, 1, 12),
                "jan loan",
                vec![
                    JournalLineInput::debit(cash, Money::from_minor(1_000), ""),
                    JournalLineInput::credit(loan, Money::from_minor(1_000), ""),
                ],
            ),
            posted(
                date(2024, 2, 10),
                "feb sale",
                vec![
                    JournalLineInput::debit(cash, Money::from_minor(15_000), ""),
                    JournalLineInput::credit(sales, Money::from_minor(15_000), ""),
                ],
            ),
            posted(
                date(2024, 2, 11),
                "feb rent",
                vec![
                    JournalLineInput::debit(rent, Money::from_minor(3_000), ""),
                    JournalLineInput::credit(cash, Money::from_minor(3_000), ""),
                ],
            ),
        ];

        let jan = generate(
            &TrialBalanceRequest::new(date(2024, 1, 1), date(2024, 1, 31)),
            &chart,
            &entries,
            Utc::now(),
        )
        .unwrap();
        let feb = generate(
            &TrialBalanceRequest::new(date(2024, 2, 1), date(2024, 2, 29)),
            &chart,
            &entries,
            Utc::now(),
        )
        .unwrap();

        let cmp = compare(jan, feb);
        let by_name: BTreeMap<&str, &AccountVariance> =
            cmp.variances.iter().map(|v| (v.account_name.as_str(), v)).collect();

        assert_eq!(by_name["Sales"].change_type, ChangeType::Increased);
        assert_eq!(by_name["Sales"].absolute_change, Money::from_minor(5_000));
        assert!((by_name["Sales"].percentage_change - 50.0).abs() < 1e-9);
        assert_eq!(by_name["Rent"].change_type, ChangeType::New);
        assert_eq!(by_name["Bank Loan"].change_type, ChangeType::Removed);
        // cash: -11_000 -> -12_000
        assert_eq!(by_name["Cash"].change_type, ChangeType::Decreased);

        let magnitudes: Vec<i64> = cmp.variances.iter().map(|v| v.absolute_change.abs().minor()).collect();
        let mut sorted = magnitudes.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(magnitudes, sorted);
        assert_eq!(cmp.total_variance.minor(), magnitudes.iter().sum::<i64>());
    }
}
