//! Running account balances (bank, cash, per-type totals).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use garments_core::Money;

use crate::account::{AccountId, AccountType, ChartOfAccount};
use crate::journal::JournalEntry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub account_code: String,
    pub account_name: String,
    pub account_type: AccountType,
    pub balance: Money,
    pub as_of: Option<NaiveDate>,
    pub last_updated: DateTime<Utc>,
    pub is_from_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub bank_balance: Money,
    pub cash_on_hand: Money,
    pub total_assets: Money,
    pub total_liabilities: Money,
    pub total_equity: Money,
    pub total_revenue: Money,
    pub total_expenses: Money,
    pub net_income: Money,
    pub key_accounts: Vec<AccountBalance>,
    pub last_updated: DateTime<Utc>,
    pub is_from_cache: bool,
}

/// Bank accounts: asset codes starting 1010/1011, or "bank" in the name.
pub fn is_bank_account(account: &ChartOfAccount) -> bool {
    account.account_type == AccountType::Asset
        && (account.code.starts_with("1010")
            || account.code.starts_with("1011")
            || account.name.to_lowercase().contains("bank"))
}

/// Cash accounts: asset codes starting 1000/1001, or "cash" in the name.
pub fn is_cash_account(account: &ChartOfAccount) -> bool {
    account.account_type == AccountType::Asset
        && (account.code.starts_with("1000")
            || account.code.starts_with("1001")
            || account.name.to_lowercase().contains("cash"))
}

/// Balance in the account's normal direction, including its opening balance.
///
/// Debit-normal accounts (assets, expenses) report `debits - credits`; the
/// rest report `credits - debits`. Reversed entries are ignored.
pub fn balance_of(account: &ChartOfAccount, entries: &[JournalEntry], as_of: Option<NaiveDate>) -> Money {
    let mut debits = Money::ZERO;
    let mut credits = Money::ZERO;
    let live = entries
        .iter()
        .filter(|e| e.status.affects_balances())
        .filter(|e| as_of.is_none_or(|d| e.transaction_date <= d));
    for entry in live {
        for line in entry.lines.iter().filter(|l| l.account_id == account.id) {
            debits += line.debit;
            credits += line.credit;
        }
    }
    let movement = if account.account_type.is_debit_normal() {
        debits - credits
    } else {
        credits - debits
    };
    account.opening_balance + movement
}

pub fn account_balance(
    account: &ChartOfAccount,
    entries: &[JournalEntry],
    as_of: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> AccountBalance {
    AccountBalance {
        account_id: account.id,
        account_code: account.code.clone(),
        account_name: account.name.clone(),
        account_type: account.account_type,
        balance: balance_of(account, entries, as_of),
        as_of,
        last_updated: now,
        is_from_cache: false,
    }
}

fn total_where(
    accounts: &[ChartOfAccount],
    entries: &[JournalEntry],
    pred: impl Fn(&ChartOfAccount) -> bool,
) -> Money {
    accounts
        .iter()
        .filter(|a| a.is_active && pred(a))
        .map(|a| balance_of(a, entries, None))
        .sum()
}

pub fn bank_balance(accounts: &[ChartOfAccount], entries: &[JournalEntry]) -> Money {
    total_where(accounts, entries, is_bank_account)
}

pub fn cash_balance(accounts: &[ChartOfAccount], entries: &[JournalEntry]) -> Money {
    total_where(accounts, entries, is_cash_account)
}

pub fn summarize(accounts: &[ChartOfAccount], entries: &[JournalEntry], now: DateTime<Utc>) -> BalanceSummary {
    let mut summary = BalanceSummary {
        bank_balance: bank_balance(accounts, entries),
        cash_on_hand: cash_balance(accounts, entries),
        total_assets: Money::ZERO,
        total_liabilities: Money::ZERO,
        total_equity: Money::ZERO,
        total_revenue: Money::ZERO,
        total_expenses: Money::ZERO,
        net_income: Money::ZERO,
        key_accounts: Vec::new(),
        last_updated: now,
        is_from_cache: false,
    };

    for account in accounts.iter().filter(|a| a.is_active) {
        let balance = account_balance(account, entries, None, now);
        let bucket = match account.account_type {
            AccountType::Asset => &mut summary.total_assets,
            AccountType::Liability => &mut summary.total_liabilities,
            AccountType::Equity => &mut summary.total_equity,
            AccountType::Revenue => &mut summary.total_revenue,
            AccountType::Expense => &mut summary.total_expenses,
        };
        *bucket += balance.balance;
        if !balance.balance.is_zero() {
            summary.key_accounts.push(balance);
        }
    }
    summary.net_income = summary.total_revenue - summary.total_expenses;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{JournalLineInput, JournalStatus};
    use crate::trial_balance::tests::{account, date, posted};

    #[test]
    fn balances_follow_the_normal_side() {
        let mut chart = Vec::new();
        let bank = account("1010", "Meezan Current", AccountType::Asset, &mut chart);
        let petty = account("1100", "Petty Cash", AccountType::Asset, &mut chart);
        let sales = account("4000", "Sales", AccountType::Revenue, &mut chart);
        let rent = account("5100", "Rent", AccountType::Expense, &mut chart);

        let mut entries = vec![
            posted(
                date(2024, 1, 1),
                "sale",
                vec![
                    JournalLineInput::debit(bank, Money::from_minor(90_000), ""),
                    JournalLineInput::debit(petty, Money::from_minor(10_000), ""),
                    JournalLineInput::credit(sales, Money::from_minor(100_000), ""),
                ],
            ),
            posted(
                date(2024, 2, 1),
                "rent",
                vec![
                    JournalLineInput::debit(rent, Money::from_minor(30_000), ""),
                    JournalLineInput::credit(bank, Money::from_minor(30_000), ""),
                ],
            ),
        ];
        let mut reversed = posted(
            date(2024, 2, 2),
            "mistake",
            vec![
                JournalLineInput::debit(rent, Money::from_minor(5), ""),
                JournalLineInput::credit(bank, Money::from_minor(5), ""),
            ],
        );
        reversed.status = JournalStatus::Reversed;
        entries.push(reversed);

        let bank_acct = chart.iter().find(|a| a.id == bank).unwrap();
        assert_eq!(balance_of(bank_acct, &entries, None), Money::from_minor(60_000));
        assert_eq!(
            balance_of(bank_acct, &entries, Some(date(2024, 1, 31))),
            Money::from_minor(90_000)
        );

        assert_eq!(bank_balance(&chart, &entries), Money::from_minor(60_000));
        assert_eq!(cash_balance(&chart, &entries), Money::from_minor(10_000));

        let summary = summarize(&chart, &entries, Utc::now());
        assert_eq!(summary.total_assets, Money::from_minor(70_000));
        assert_eq!(summary.total_revenue, Money::from_minor(100_000));
        assert_eq!(summary.total_expenses, Money::from_minor(30_000));
        assert_eq!(summary.net_income, Money::from_minor(70_000));
        assert_eq!(summary.key_accounts.len(), 4);
    }

    #[test]
    fn opening_balance_is_included() {
        let mut chart = Vec::new();
        account("1000", "Cash", AccountType::Asset, &mut chart);
        chart[0].opening_balance = Money::from_minor(1_234);
        assert_eq!(balance_of(&chart[0], &[], None), Money::from_minor(1_234));
        assert!(is_cash_account(&chart[0]));
        assert!(!is_bank_account(&chart[0]));
    }
}
