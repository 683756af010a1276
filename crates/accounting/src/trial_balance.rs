//! Trial balance generation.
//!
//! Sign convention: debits are reported negative and credits positive, so an
//! account's net balance is `credits - debits` and a balanced ledger nets to
//! zero. Only posted entries dated inside the requested window count.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use garments_core::{DomainError, DomainResult, Money};

use crate::account::{AccountId, AccountType, ChartOfAccount};
use crate::classification;
use crate::journal::{JournalEntry, JournalEntryId, JournalStatus, JournalType};

pub const MAX_RANGE_DAYS: i64 = 365;
pub const EXPRESSION_TERMS: usize = 10;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrialBalanceRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_true")]
    pub group_by_category: bool,
    #[serde(default)]
    pub include_zero_balances: bool,
    #[serde(default)]
    pub category_filter: Vec<String>,
}

impl TrialBalanceRequest {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            group_by_category: true,
            include_zero_balances: false,
            category_filter: Vec::new(),
        }
    }

    pub fn errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.start_date > self.end_date {
            errors.push("Start date must not be later than end date".to_string());
        } else if (self.end_date - self.start_date).num_days() > MAX_RANGE_DAYS {
            errors.push("Date range cannot exceed 365 days for performance reasons".to_string());
        }
        errors
    }

    pub fn validate(&self) -> DomainResult<()> {
        let errors = self.errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation_all(errors))
        }
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    pub fn overlaps(&self, other: &TrialBalanceRequest) -> bool {
        self.start_date <= other.end_date && other.start_date <= self.end_date
    }

    /// Stable cache key for this request within a tenant.
    pub fn cache_key(&self) -> String {
        let mut filter = self.category_filter.iter().map(|c| c.to_lowercase()).collect::<Vec<_>>();
        filter.sort();
        format!(
            "{}:{}:{}:{}:{}",
            self.start_date,
            self.end_date,
            self.group_by_category,
            self.include_zero_balances,
            filter.join(",")
        )
    }

    fn category_selected(&self, category: &str) -> bool {
        self.category_filter.is_empty()
            || self
                .category_filter
                .iter()
                .any(|c| c.trim().eq_ignore_ascii_case(category))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceAccount {
    pub account_id: AccountId,
    pub account_code: String,
    pub account_name: String,
    pub category_name: String,
    pub category_description: String,
    pub particulars: String,
    pub debit_amount: Money,
    pub credit_amount: Money,
    pub net_balance: Money,
    pub transaction_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceCategory {
    pub name: String,
    pub accounts: Vec<TrialBalanceAccount>,
    pub subtotal: Money,
}

impl TrialBalanceCategory {
    fn new(name: &str, accounts: Vec<TrialBalanceAccount>) -> Self {
        let subtotal = accounts.iter().map(|a| a.net_balance).sum();
        Self {
            name: name.to_string(),
            accounts,
            subtotal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalanceReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<TrialBalanceCategory>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<TrialBalanceAccount>>,
    pub total_debits: Money,
    pub total_credits: Money,
    pub final_balance: Money,
    pub calculation_expression: String,
    pub total_transactions: usize,
    pub generated_at: DateTime<Utc>,
    pub is_balanced: bool,
}

impl TrialBalanceReport {
    /// Every account row, whether the report is grouped or flat.
    pub fn account_rows(&self) -> Vec<&TrialBalanceAccount> {
        match (&self.categories, &self.accounts) {
            (Some(categories), _) => categories.iter().flat_map(|c| c.accounts.iter()).collect(),
            (None, Some(accounts)) => accounts.iter().collect(),
            (None, None) => Vec::new(),
        }
    }
}

#[derive(Default)]
struct Tally {
    debit: Money,
    credit: Money,
    count: usize,
    particulars: Option<(NaiveDate, Option<DateTime<Utc>>, String)>,
}

impl Tally {
    fn note_particulars(&mut self, date: NaiveDate, created: Option<DateTime<Utc>>, text: Option<&str>) {
        let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
            return;
        };
        let newer = match &self.particulars {
            None => true,
            Some((d, c, _)) => (date, created) >= (*d, *c),
        };
        if newer {
            self.particulars = Some((date, created, text.to_string()));
        }
    }
}

fn tally_posted(request: &TrialBalanceRequest, entries: &[JournalEntry]) -> HashMap<AccountId, Tally> {
    let mut tallies: HashMap<AccountId, Tally> = HashMap::new();
    let posted = entries
        .iter()
        .filter(|e| e.status == JournalStatus::Posted && request.covers(e.transaction_date));
    for entry in posted {
        for line in &entry.lines {
            let t = tallies.entry(line.account_id).or_default();
            t.debit += line.debit;
            t.credit += line.credit;
            t.count += 1;
            let text = line
                .description
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .or(entry.description.as_deref());
            t.note_particulars(entry.transaction_date, entry.created_at, text);
        }
    }
    tallies
}

/// Render `a + b - |c| ... = total` over the first [`EXPRESSION_TERMS`] balances.
pub fn calculation_expression(balances: &[Money], final_balance: Money) -> String {
    if balances.is_empty() {
        return "0 = 0".to_string();
    }
    let mut out = String::new();
    for (idx, value) in balances.iter().take(EXPRESSION_TERMS).enumerate() {
        if idx == 0 {
            out.push_str(&value.to_major_string());
        } else if value.is_negative() {
            out.push_str(&format!(" - {}", value.abs().to_major_string()));
        } else {
            out.push_str(&format!(" + {}", value.to_major_string()));
        }
    }
    if balances.len() > EXPRESSION_TERMS {
        out.push_str(&format!(" + ... ({} more)", balances.len() - EXPRESSION_TERMS));
    }
    out.push_str(&format!(" = {}", final_balance.to_major_string()));
    out
}

/// Build the report from the tenant's chart and journal.
pub fn generate(
    request: &TrialBalanceRequest,
    accounts: &[ChartOfAccount],
    entries: &[JournalEntry],
    now: DateTime<Utc>,
) -> DomainResult<TrialBalanceReport> {
    request.validate()?;
    let mut tallies = tally_posted(request, entries);

    let mut active: Vec<&ChartOfAccount> = accounts.iter().filter(|a| a.is_active).collect();
    active.sort_by(|a, b| a.code.cmp(&b.code));

    let mut by_type: HashMap<AccountType, Vec<TrialBalanceAccount>> = HashMap::new();
    for account in active {
        let tally = tallies.remove(&account.id).unwrap_or_default();
        let net = tally.credit - tally.debit;
        if net.is_zero() && tally.count == 0 && !request.include_zero_balances {
            continue;
        }
        let category = account.account_type.category_name();
        if !request.category_selected(category) {
            continue;
        }
        by_type.entry(account.account_type).or_default().push(TrialBalanceAccount {
            account_id: account.id,
            account_code: account.code.clone(),
            account_name: account.name.clone(),
            category_name: category.to_string(),
            category_description: classification::describe(account).to_string(),
            particulars: tally
                .particulars
                .map(|(_, _, text)| text)
                .unwrap_or_else(|| account.name.clone()),
            debit_amount: -tally.debit,
            credit_amount: tally.credit,
            net_balance: net,
            transaction_count: tally.count,
        });
    }

    let mut categories = Vec::new();
    for account_type in AccountType::ALL {
        let name = account_type.category_name();
        if !request.category_selected(name) {
            continue;
        }
        let rows = by_type.remove(&account_type).unwrap_or_default();
        if rows.is_empty() && !request.include_zero_balances {
            continue;
        }
        categories.push(TrialBalanceCategory::new(name, rows));
    }

    let rows: Vec<&TrialBalanceAccount> = categories.iter().flat_map(|c| c.accounts.iter()).collect();
    let total_debits: Money = rows.iter().map(|r| r.debit_amount.abs()).sum();
    let total_credits: Money = rows.iter().map(|r| r.credit_amount).sum();
    let final_balance: Money = rows.iter().map(|r| r.net_balance).sum();
    let total_transactions = rows.iter().map(|r| r.transaction_count).sum();
    let balances: Vec<Money> = rows.iter().map(|r| r.net_balance).collect();
    let calculation_expression = calculation_expression(&balances, final_balance);

    let (categories, accounts) = if request.group_by_category {
        (Some(categories), None)
    } else {
        let flat = categories.into_iter().flat_map(|c| c.accounts).collect();
        (None, Some(flat))
    };

    Ok(TrialBalanceReport {
        start_date: request.start_date,
        end_date: request.end_date,
        categories,
        accounts,
        total_debits,
        total_credits,
        final_balance,
        calculation_expression,
        total_transactions,
        generated_at: now,
        is_balanced: final_balance.is_zero(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTransaction {
    pub transaction_id: JournalEntryId,
    pub journal_number: String,
    pub transaction_date: NaiveDate,
    pub journal_type: JournalType,
    pub category_description: String,
    pub particulars: String,
    pub reference_number: String,
    pub debit_amount: Money,
    pub credit_amount: Money,
    pub running_balance: Money,
}

/// Posted lines against `account` within the window, oldest first, with a
/// running `credit - debit` balance.
pub fn account_transactions(
    account: &ChartOfAccount,
    entries: &[JournalEntry],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> DomainResult<Vec<AccountTransaction>> {
    if start_date > end_date {
        return Err(DomainError::validation("Start date must not be later than end date"));
    }
    let mut posted: Vec<&JournalEntry> = entries
        .iter()
        .filter(|e| e.status == JournalStatus::Posted)
        .filter(|e| e.transaction_date >= start_date && e.transaction_date <= end_date)
        .filter(|e| e.references_account(account.id))
        .collect();
    posted.sort_by(|a, b| {
        a.transaction_date
            .cmp(&b.transaction_date)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    let description = classification::describe(account).to_string();
    let mut running = Money::ZERO;
    let mut out = Vec::new();
    for entry in posted {
        for line in entry.lines.iter().filter(|l| l.account_id == account.id) {
            running += line.credit - line.debit;
            out.push(AccountTransaction {
                transaction_id: entry.id,
                journal_number: entry.journal_number.clone(),
                transaction_date: entry.transaction_date,
                journal_type: entry.journal_type,
                category_description: description.clone(),
                particulars: entry.description.clone().unwrap_or_default(),
                reference_number: entry.reference_number.clone(),
                debit_amount: -line.debit,
                credit_amount: line.credit,
                running_balance: running,
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::account::NewAccount;
    use crate::journal::{CreateJournalEntry, JournalCommand, JournalLineInput};
    use garments_core::{UserId, execute};
    use proptest::prelude::*;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn account(code: &str, name: &str, account_type: AccountType, chart: &mut Vec<ChartOfAccount>) -> AccountId {
        let a = ChartOfAccount::create(
            NewAccount {
                code: Some(code.into()),
                name: name.into(),
                account_type,
                parent_id: None,
                description: None,
                opening_balance: Money::ZERO,
                category_group: None,
                sort_order: 0,
                allow_transactions: true,
                is_dynamic: false,
            },
            chart,
            Utc::now(),
        )
        .unwrap();
        let id = a.id;
        chart.push(a);
        id
    }

    pub(crate) fn posted(on: NaiveDate, description: &str, lines: Vec<JournalLineInput>) -> JournalEntry {
        let e_id = JournalEntryId::new();
        let mut e = JournalEntry::empty(e_id);
        execute(
            &mut e,
            &JournalCommand::Create(CreateJournalEntry {
                entry_id: e_id,
                journal_number: "JE-TEST".into(),
                transaction_date: on,
                journal_type: JournalType::General,
                reference_number: String::new(),
                description: Some(description.into()),
                lines,
                post_immediately: true,
                created_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        e
    }

    struct Books {
        chart: Vec<ChartOfAccount>,
        cash: AccountId,
        sales: AccountId,
        wages: AccountId,
        entries: Vec<JournalEntry>,
    }

    fn books() -> Books {
        let mut chart = Vec::new();
        let cash = account("1000", "Cash in Hand", AccountType::Asset, &mut chart);
        let sales = account("4000", "Sales Revenue", AccountType::Revenue, &mut chart);
        let wages = account("5000", "Factory Wages", AccountType::Expense, &mut chart);
        account("2000", "Accounts Payable", AccountType::Liability, &mut chart);

        let entries = vec![
            posted(
                date(2024, 1, 5),
                "Shirt order",
                vec![
                    JournalLineInput::debit(cash, Money::from_minor(50_000), ""),
                    JournalLineInput::credit(sales, Money::from_minor(50_000), ""),
                ],
            ),
            posted(
                date(2024, 1, 25),
                "January wages",
                vec![
                    JournalLineInput::debit(wages, Money::from_minor(20_000), ""),
                    JournalLineInput::credit(cash, Money::from_minor(20_000), ""),
                ],
            ),
            posted(
                date(2024, 3, 1),
                "Out of range",
                vec![
                    JournalLineInput::debit(cash, Money::from_minor(999), ""),
                    JournalLineInput::credit(sales, Money::from_minor(999), ""),
                ],
            ),
        ];
        Books { chart, cash, sales, wages, entries }
    }

    fn january() -> TrialBalanceRequest {
        TrialBalanceRequest::new(date(2024, 1, 1), date(2024, 1, 31))
    }

    #[test]
    fn request_validation_messages() {
        let inverted = TrialBalanceRequest::new(date(2024, 2, 1), date(2024, 1, 1));
        assert_eq!(inverted.errors(), vec!["Start date must not be later than end date"]);
        let long = TrialBalanceRequest::new(date(2023, 1, 1), date(2024, 1, 2));
        assert_eq!(
            long.errors(),
            vec!["Date range cannot exceed 365 days for performance reasons"]
        );
        assert!(january().validate().is_ok());
    }

    #[test]
    fn grouped_report_follows_sign_convention() {
        let b = books();
        let report = generate(&january(), &b.chart, &b.entries, Utc::now()).unwrap();
        let categories = report.categories.as_ref().unwrap();
        let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Assets", "Income", "Expenses"]);

        let cash = &categories[0].accounts[0];
        assert_eq!(cash.account_id, b.cash);
        assert_eq!(cash.debit_amount, Money::from_minor(-50_000));
        assert_eq!(cash.credit_amount, Money::from_minor(20_000));
        assert_eq!(cash.net_balance, Money::from_minor(-30_000));
        assert_eq!(cash.transaction_count, 2);
        assert_eq!(cash.particulars, "January wages");
        assert_eq!(cash.category_description, "Current Assets - Cash & Bank");

        assert_eq!(categories[1].accounts[0].account_id, b.sales);
        assert_eq!(categories[2].accounts[0].account_id, b.wages);
        assert_eq!(report.total_debits, Money::from_minor(70_000));
        assert_eq!(report.total_credits, Money::from_minor(70_000));
        assert!(report.is_balanced);
        assert_eq!(report.total_transactions, 4);
        assert_eq!(report.calculation_expression, "-300.00 + 500.00 - 200.00 = 0.00");
    }

    #[test]
    fn zero_balances_and_category_filter() {
        let b = books();
        let mut req = january();
        req.include_zero_balances = true;
        req.category_filter = vec!["liabilities".into(), "Equity".into()];
        let report = generate(&req, &b.chart, &b.entries, Utc::now()).unwrap();
        let categories = report.categories.unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].name, "Liabilities");
        assert_eq!(categories[0].accounts[0].particulars, "Accounts Payable");
        assert!(categories[1].accounts.is_empty());
        assert_eq!(report.calculation_expression, "0.00 = 0.00");
    }

    #[test]
    fn flat_report_lists_accounts_by_code() {
        let b = books();
        let mut req = january();
        req.group_by_category = false;
        let report = generate(&req, &b.chart, &b.entries, Utc::now()).unwrap();
        assert!(report.categories.is_none());
        let codes: Vec<&str> = report
            .accounts
            .as_ref()
            .unwrap()
            .iter()
            .map(|a| a.account_code.as_str())
            .collect();
        assert_eq!(codes, vec!["1000", "4000", "5000"]);
    }

    #[test]
    fn drafts_are_ignored() {
        let mut b = books();
        for e in &mut b.entries {
            e.status = JournalStatus::Draft;
        }
        let report = generate(&january(), &b.chart, &b.entries, Utc::now()).unwrap();
        assert!(report.categories.unwrap().is_empty());
        assert_eq!(report.calculation_expression, "0 = 0");
    }

    #[test]
    fn expression_truncates_after_ten_terms() {
        let balances: Vec<Money> = (1..=12).map(|n| Money::from_minor(n * 100)).collect();
        let total: Money = balances.iter().sum();
        let expr = calculation_expression(&balances, total);
        assert!(expr.starts_with("1.00 + 2.00"));
        assert!(expr.contains("+ 10.00 + ... (2 more) = 78.00"));
    }

    #[test]
    fn drill_down_keeps_a_running_balance() {
        let b = books();
        let cash = b.chart.iter().find(|a| a.id == b.cash).unwrap();
        let rows = account_transactions(cash, &b.entries, date(2024, 1, 1), date(2024, 12, 31)).unwrap();
        let running: Vec<i64> = rows.iter().map(|r| r.running_balance.minor()).collect();
        assert_eq!(running, vec![-50_000, -30_000, -30_999]);
        assert_eq!(rows[1].credit_amount, Money::from_minor(20_000));
    }

    proptest! {
        #[test]
        fn subtotals_and_final_balance_agree_with_rows(amounts in prop::collection::vec((1i64..500_000, 0usize..3), 1..20)) {
            let mut b = books();
            let targets = [b.sales, b.wages, b.cash];
            for (amount, which) in &amounts {
                let other = targets[(*which + 1) % 3];
                b.entries.push(posted(
                    date(2024, 1, 15),
                    "generated",
                    vec![
                        JournalLineInput::debit(targets[*which], Money::from_minor(*amount), ""),
                        JournalLineInput::credit(other, Money::from_minor(*amount), ""),
                    ],
                ));
            }
            let report = generate(&january(), &b.chart, &b.entries, Utc::now()).unwrap();
            let categories = report.categories.clone().unwrap();
            for c in &categories {
                let sum: Money = c.accounts.iter().map(|a| a.net_balance).sum();
                prop_assert_eq!(c.subtotal, sum);
            }
            prop_assert_eq!(report.final_balance, report.total_credits - report.total_debits);
            prop_assert!(report.is_balanced);
        }
    }
}
