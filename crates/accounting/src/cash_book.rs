//! Cash book: single-sided receipts and payments.
//!
//! Each transaction names a category instead of an account. The category
//! resolves to an account of the same name and the entry is balanced against
//! the tenant's cash account, so a receipt reads `Dr Cash / Cr <category>` and
//! a payment `Dr <category> / Cr Cash`.
//!
//! The bulk-import layout is the two-column paper cash book: receipts on the
//! left (`date, category, particulars, amount`) and payments on the right
//! (`date, category, supplier, buyer, particulars, amount`).

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use garments_core::{DomainError, DomainResult, Money, UserId, check_max_len, check_required};

use crate::account::{AccountId, AccountType, ChartOfAccount, NewAccount};
use crate::category::{self, CategoryType};
use crate::journal::{
    CreateJournalEntry, JournalEntry, JournalEntryId, JournalLineInput, JournalType, MAX_DESCRIPTION_LEN,
    MAX_REFERENCE_LEN,
};

pub const MAX_PARTICULARS_LEN: usize = MAX_DESCRIPTION_LEN - "Credit: ".len();
pub const MAX_CONTACT_NAME_LEN: usize = 200;

/// Rows before the data when an import has no recognisable header row.
const DEFAULT_DATA_START: usize = 3;
const CSV_COLUMNS: usize = 10;

/// Who the other side of a cash movement is.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CounterpartyRole {
    Customer,
    Supplier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub name: String,
    pub role: CounterpartyRole,
}

/// One receipt (`Credit`) or payment (`Debit`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashTransaction {
    pub side: CategoryType,
    pub date: NaiveDate,
    pub category_name: String,
    pub particulars: String,
    pub amount: Money,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub counterparty: Option<Counterparty>,
}

/// The two accounts a cash-book entry moves money between.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CashBookAccounts {
    pub cash: AccountId,
    pub category: AccountId,
}

impl CashTransaction {
    pub fn validate(&self) -> DomainResult<()> {
        let mut errors = Vec::new();
        check_required("Category", &self.category_name, category::MAX_NAME_LEN, &mut errors);
        check_required("Particulars", &self.particulars, MAX_PARTICULARS_LEN, &mut errors);
        check_max_len("Reference", self.reference.as_deref(), MAX_REFERENCE_LEN, &mut errors);
        if let Some(party) = &self.counterparty {
            check_required("Contact name", &party.name, MAX_CONTACT_NAME_LEN, &mut errors);
        }
        if !self.amount.is_positive() {
            errors.push("Amount must be greater than zero".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation_all(errors))
        }
    }

    pub fn journal_type(&self) -> JournalType {
        match self.side {
            CategoryType::Credit => JournalType::CashReceipt,
            CategoryType::Debit => JournalType::CashPayment,
        }
    }

    /// `Credit: ...` / `Debit: ...`, which listings read back as the entry direction.
    pub fn description(&self) -> String {
        format!("{}: {}", self.side.name(), self.particulars.trim())
    }

    /// Build the balanced, immediately posted journal for this transaction.
    pub fn command(
        &self,
        accounts: CashBookAccounts,
        contact_id: Option<uuid::Uuid>,
        entry_id: JournalEntryId,
        journal_number: String,
        created_by: UserId,
        occurred_at: DateTime<Utc>,
    ) -> CreateJournalEntry {
        let particulars = self.particulars.trim();
        let mut category_line = match self.side {
            CategoryType::Credit => JournalLineInput::credit(accounts.category, self.amount, particulars),
            CategoryType::Debit => JournalLineInput::debit(accounts.category, self.amount, particulars),
        };
        category_line.contact_id = contact_id;
        category_line.reference = self.counterparty.as_ref().map(|p| p.name.trim().to_string());
        let cash_line = match self.side {
            CategoryType::Credit => {
                JournalLineInput::debit(accounts.cash, self.amount, format!("Cash received - {particulars}"))
            }
            CategoryType::Debit => {
                JournalLineInput::credit(accounts.cash, self.amount, format!("Cash paid - {particulars}"))
            }
        };
        let lines = match self.side {
            CategoryType::Credit => vec![cash_line, category_line],
            CategoryType::Debit => vec![category_line, cash_line],
        };
        let reference_number = self
            .reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| cash_reference(self.date, entry_id));

        CreateJournalEntry {
            entry_id,
            journal_number,
            transaction_date: self.date,
            journal_type: self.journal_type(),
            reference_number,
            description: Some(self.description()),
            lines,
            post_immediately: true,
            created_by,
            occurred_at,
        }
    }
}

/// `CB-<yyyymmdd>-<last 8 hex digits of the entry id>`.
pub fn cash_reference(date: NaiveDate, entry_id: JournalEntryId) -> String {
    let hex = entry_id.as_uuid().simple().to_string();
    let tail = &hex[hex.len() - 8..];
    format!("CB-{}-{tail}", date.format("%Y%m%d"))
}

/// Account type a category auto-creates its account with.
pub fn category_account_type(side: CategoryType) -> AccountType {
    match side {
        CategoryType::Credit => AccountType::Revenue,
        CategoryType::Debit => AccountType::Expense,
    }
}

/// The active account named like the category, of any type.
pub fn find_category_account<'a>(name: &str, accounts: &'a [ChartOfAccount]) -> Option<&'a ChartOfAccount> {
    let name = name.trim();
    accounts
        .iter()
        .find(|a| a.is_active && a.name.eq_ignore_ascii_case(name))
}

/// Input for the account created the first time a category is used.
pub fn new_category_account(side: CategoryType, name: &str) -> NewAccount {
    let name = name.trim();
    NewAccount {
        code: None,
        name: name.to_string(),
        account_type: category_account_type(side),
        parent_id: None,
        description: Some(format!("Auto-created account for category: {name}")),
        opening_balance: Money::ZERO,
        category_group: None,
        sort_order: 0,
        allow_transactions: true,
        is_dynamic: true,
    }
}

/// A row of manually keyed cash-book data: a receipt, a payment, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashBookRow {
    pub date: NaiveDate,
    #[serde(default)]
    pub credit_category: String,
    #[serde(default)]
    pub credit_particulars: String,
    #[serde(default)]
    pub credit_amount: Money,
    #[serde(default)]
    pub debit_category: String,
    #[serde(default)]
    pub debit_particulars: String,
    #[serde(default)]
    pub debit_amount: Money,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub buyer: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Payments name a supplier first, then a buyer.
fn payment_counterparty(supplier: Option<&str>, buyer: Option<&str>) -> Option<Counterparty> {
    non_empty(supplier)
        .map(|name| Counterparty {
            name,
            role: CounterpartyRole::Supplier,
        })
        .or_else(|| {
            non_empty(buyer).map(|name| Counterparty {
                name,
                role: CounterpartyRole::Customer,
            })
        })
}

/// Particulars default to the category name when left blank.
fn particulars_or(particulars: &str, category_name: &str) -> String {
    non_empty(Some(particulars)).unwrap_or_else(|| category_name.trim().to_string())
}

impl CashBookRow {
    /// Split the row into its receipt and payment; sides with no amount are skipped.
    pub fn transactions(&self) -> Vec<CashTransaction> {
        let mut out = Vec::with_capacity(2);
        if !self.credit_amount.is_zero() || !self.credit_category.trim().is_empty() {
            out.push(CashTransaction {
                side: CategoryType::Credit,
                date: self.date,
                category_name: self.credit_category.trim().to_string(),
                particulars: particulars_or(&self.credit_particulars, &self.credit_category),
                amount: self.credit_amount,
                reference: non_empty(self.reference.as_deref()),
                counterparty: None,
            });
        }
        if !self.debit_amount.is_zero() || !self.debit_category.trim().is_empty() {
            out.push(CashTransaction {
                side: CategoryType::Debit,
                date: self.date,
                category_name: self.debit_category.trim().to_string(),
                particulars: particulars_or(&self.debit_particulars, &self.debit_category),
                amount: self.debit_amount,
                reference: non_empty(self.reference.as_deref()),
                counterparty: payment_counterparty(self.supplier.as_deref(), self.buyer.as_deref()),
            });
        }
        out
    }
}

/// Transactions read from a cash-book CSV, plus the rows that were not usable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedCashBook {
    pub transactions: Vec<CashTransaction>,
    pub skipped: Vec<String>,
}

/// `dd-mm-yyyy` or `dd-mm-yy`; two-digit years land in 2000-2099.
pub fn parse_cash_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let short_year = raw.rsplit(['-', '/']).next().is_some_and(|y| y.len() == 2);
    let raw = raw.replace('/', "-");
    if short_year {
        let date = NaiveDate::parse_from_str(&raw, "%d-%m-%y").ok()?;
        if date.year() < 2000 {
            date.with_year(date.year() + 100)
        } else {
            Some(date)
        }
    } else {
        NaiveDate::parse_from_str(&raw, "%d-%m-%Y").ok()
    }
}

fn is_header(record: &csv::StringRecord) -> bool {
    let has = |needle: &str| record.iter().any(|f| f.to_ascii_lowercase().contains(needle));
    has("date") && (has("categories") || has("catagories")) && has("amount")
}

/// Read one side of a data row. `Ok(None)` when the side is blank.
fn read_side(
    row: usize,
    side: CategoryType,
    date: &str,
    amount: &str,
) -> Result<Option<(NaiveDate, Money)>, String> {
    if date.trim().is_empty() || amount.trim().is_empty() {
        return Ok(None);
    }
    let label = side.name().to_ascii_lowercase();
    let date = parse_cash_date(date).ok_or_else(|| format!("row {row}: invalid {label} date '{}'", date.trim()))?;
    let amount = Money::parse_major(amount)
        .filter(|a| a.is_positive())
        .ok_or_else(|| format!("row {row}: invalid {label} amount '{}'", amount.trim()))?;
    Ok(Some((date, amount)))
}

/// Parse the two-column cash-book CSV.
///
/// Everything up to and including the header row (`Date`, `Categories`,
/// `Amount`) is ignored; without a header the data starts at the fourth row.
/// A row yields a receipt from columns 0-3 and a payment from columns 4-9.
pub fn parse_cash_book_csv(input: &str) -> ParsedCashBook {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input.as_bytes());

    let mut parsed = ParsedCashBook::default();
    let mut records = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        match record {
            Ok(record) => records.push((idx + 1, record)),
            Err(err) => parsed.skipped.push(format!("row {}: {err}", idx + 1)),
        }
    }
    let start = records
        .iter()
        .position(|(_, r)| is_header(r))
        .map_or(DEFAULT_DATA_START, |pos| pos + 1);

    for (row, record) in records.iter().skip(start) {
        let row = *row;
        if record.iter().all(str::is_empty) {
            continue;
        }
        if record.len() < CSV_COLUMNS {
            parsed
                .skipped
                .push(format!("row {row}: expected {CSV_COLUMNS} columns, found {}", record.len()));
            continue;
        }
        let field = |i: usize| record.get(i).unwrap_or_default();

        match read_side(row, CategoryType::Credit, field(0), field(3)) {
            Ok(Some((date, amount))) => parsed.transactions.push(CashTransaction {
                side: CategoryType::Credit,
                date,
                category_name: field(1).to_string(),
                particulars: particulars_or(field(2), field(1)),
                amount,
                reference: None,
                counterparty: None,
            }),
            Ok(None) => {}
            Err(reason) => parsed.skipped.push(reason),
        }
        match read_side(row, CategoryType::Debit, field(4), field(9)) {
            Ok(Some((date, amount))) => parsed.transactions.push(CashTransaction {
                side: CategoryType::Debit,
                date,
                category_name: field(5).to_string(),
                particulars: particulars_or(field(8), field(5)),
                amount,
                reference: None,
                counterparty: payment_counterparty(Some(field(6)), Some(field(7))),
            }),
            Ok(None) => {}
            Err(reason) => parsed.skipped.push(reason),
        }
    }
    parsed
}

/// A cash-book entry as shown in the recent-transactions listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CashBookLine {
    pub id: JournalEntryId,
    #[serde(rename = "type")]
    pub side: CategoryType,
    pub date: NaiveDate,
    pub category_name: String,
    pub particulars: String,
    pub amount: Money,
    pub reference_number: String,
    pub contact_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecentCashBook {
    pub transactions: Vec<CashBookLine>,
    pub total_count: usize,
    pub total_credits: Money,
    pub total_debits: Money,
}

/// Newest cash receipts and payments first, at most `limit` of them.
///
/// `account_name` resolves the category account's display name.
pub fn recent_transactions<'a>(
    entries: impl IntoIterator<Item = &'a JournalEntry>,
    cash_account: Option<AccountId>,
    limit: usize,
    account_name: impl Fn(AccountId) -> Option<String>,
) -> RecentCashBook {
    let mut cash_entries: Vec<&JournalEntry> = entries
        .into_iter()
        .filter(|e| e.is_created() && matches!(e.journal_type, JournalType::CashReceipt | JournalType::CashPayment))
        .collect();
    cash_entries.sort_by(|a, b| {
        b.transaction_date
            .cmp(&a.transaction_date)
            .then_with(|| b.journal_number.cmp(&a.journal_number))
    });

    let mut recent = RecentCashBook::default();
    for entry in cash_entries.into_iter().take(limit) {
        let side = match entry.journal_type {
            JournalType::CashReceipt => CategoryType::Credit,
            _ => CategoryType::Debit,
        };
        let category_line = entry
            .lines
            .iter()
            .find(|l| Some(l.account_id) != cash_account)
            .or_else(|| entry.lines.first());
        let Some(line) = category_line else {
            continue;
        };
        let amount = match side {
            CategoryType::Credit => line.credit,
            CategoryType::Debit => line.debit,
        };
        match side {
            CategoryType::Credit => recent.total_credits += amount,
            CategoryType::Debit => recent.total_debits += amount,
        }
        let particulars = entry.description.as_deref().unwrap_or_default();
        let particulars = particulars
            .strip_prefix("Credit: ")
            .or_else(|| particulars.strip_prefix("Debit: "))
            .unwrap_or(particulars);
        recent.transactions.push(CashBookLine {
            id: entry.id,
            side,
            date: entry.transaction_date,
            category_name: account_name(line.account_id).unwrap_or_else(|| "Unknown".to_string()),
            particulars: particulars.to_string(),
            amount,
            reference_number: entry.reference_number.clone(),
            contact_name: line.reference.clone(),
        });
    }
    recent.total_count = recent.transactions.len();
    recent
}

#[cfg(test)]
mod tests {
    use super::*;
    use garments_core::execute;

    use crate::journal::{JournalCommand, JournalStatus, validate_lines};

    fn receipt(amount: i64) -> CashTransaction {
        CashTransaction {
            side: CategoryType::Credit,
            date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            category_name: "Received: Urbo ltd".into(),
            particulars: "Advance for joggers".into(),
            amount: Money::from_minor(amount),
            reference: None,
            counterparty: Some(Counterparty {
                name: "Urbo ltd".into(),
                role: CounterpartyRole::Customer,
            }),
        }
    }

    fn accounts() -> CashBookAccounts {
        CashBookAccounts {
            cash: AccountId::new(),
            category: AccountId::new(),
        }
    }

    fn command(tx: &CashTransaction, accounts: CashBookAccounts) -> CreateJournalEntry {
        tx.command(
            accounts,
            None,
            JournalEntryId::new(),
            "JE-20250201-0001".into(),
            UserId::new(),
            Utc::now(),
        )
    }

    #[test]
    fn receipts_debit_cash_and_credit_the_category() {
        let accounts = accounts();
        let cmd = command(&receipt(50_000), accounts);
        assert_eq!(cmd.journal_type, JournalType::CashReceipt);
        assert_eq!(cmd.description.as_deref(), Some("Credit: Advance for joggers"));
        assert_eq!(cmd.lines[0].account_id, accounts.cash);
        assert_eq!(cmd.lines[0].debit, Money::from_minor(50_000));
        assert_eq!(cmd.lines[1].account_id, accounts.category);
        assert_eq!(cmd.lines[1].credit, Money::from_minor(50_000));
        assert_eq!(cmd.lines[1].reference.as_deref(), Some("Urbo ltd"));
        assert!(cmd.reference_number.starts_with("CB-20250201-"));
        assert!(validate_lines(&cmd.lines).is_valid);
    }

    #[test]
    fn payments_are_posted_and_read_as_debits() {
        let mut tx = receipt(12_000);
        tx.side = CategoryType::Debit;
        tx.category_name = "Fabric- Purchase".into();
        tx.reference = Some("  INV-77 ".into());
        let accounts = accounts();
        let cmd = command(&tx, accounts);
        assert_eq!(cmd.journal_type, JournalType::CashPayment);
        assert_eq!(cmd.reference_number, "INV-77");
        assert_eq!(cmd.lines[0].account_id, accounts.category);
        assert_eq!(cmd.lines[1].credit, Money::from_minor(12_000));

        let mut entry = JournalEntry::empty(cmd.entry_id);
        execute(&mut entry, &JournalCommand::Create(cmd)).unwrap();
        assert_eq!(entry.status, JournalStatus::Posted);
        assert_eq!(entry.direction().name(), "Debit");
        assert_eq!(entry.display_amount(), Money::from_minor(12_000));
    }

    #[test]
    fn invalid_transactions_list_every_problem() {
        let mut tx = receipt(0);
        tx.category_name = " ".into();
        tx.particulars = String::new();
        let DomainError::Validation(msg) = tx.validate().unwrap_err() else {
            panic!("expected validation error");
        };
        assert!(msg.contains("Category is required"));
        assert!(msg.contains("Particulars is required"));
        assert!(msg.contains("Amount must be greater than zero"));
    }

    #[test]
    fn csv_rows_split_into_receipts_and_payments() {
        let csv = "\
MM Fashion,,,,,,,,,
Cash Book,,,,,,,,,
Date,Catagories,Particulars,Amount,Date,Catagories,Supplier,Buyer,Particulars,Amount
01-02-2025,Loan A/C Chairman,,\"261,080\",01-02-25,Subcontract bill,,Brooklyn: Joggers,,\"2,400\"
02-02-2025,Received: Adl,Payment,\"1,000.50\",,,,,,
,,,,03-02-25,Fabric- Purchase,Rahim Textiles,,Denim,abc
short,row
";
        let parsed = parse_cash_book_csv(csv);
        assert_eq!(parsed.transactions.len(), 3);

        let first = &parsed.transactions[0];
        assert_eq!(first.side, CategoryType::Credit);
        assert_eq!(first.category_name, "Loan A/C Chairman");
        assert_eq!(first.particulars, "Loan A/C Chairman");
        assert_eq!(first.amount, Money::from_minor(26_108_000));

        let payment = &parsed.transactions[1];
        assert_eq!(payment.side, CategoryType::Debit);
        assert_eq!(payment.date, NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert_eq!(payment.amount, Money::from_minor(240_000));
        assert_eq!(
            payment.counterparty,
            Some(Counterparty {
                name: "Brooklyn: Joggers".into(),
                role: CounterpartyRole::Customer,
            })
        );

        assert_eq!(parsed.transactions[2].amount, Money::from_minor(100_050));
        assert_eq!(parsed.skipped.len(), 2);
        assert!(parsed.skipped[0].contains("row 6: invalid debit amount"));
        assert!(parsed.skipped[1].contains("row 7: expected 10 columns"));
    }

    #[test]
    fn data_starts_at_the_fourth_row_without_a_header() {
        let csv = "a\nb\nc\n05-03-2025,Received: Urbo ltd,Cheque,500,,,,,,\n";
        let parsed = parse_cash_book_csv(csv);
        assert_eq!(parsed.transactions.len(), 1);
        assert_eq!(parsed.transactions[0].amount, Money::from_minor(50_000));
    }

    #[test]
    fn two_digit_years_are_this_century() {
        assert_eq!(parse_cash_date("01-02-25"), NaiveDate::from_ymd_opt(2025, 2, 1));
        assert_eq!(parse_cash_date("31-12-99"), NaiveDate::from_ymd_opt(2099, 12, 31));
        assert_eq!(parse_cash_date("01/02/2025"), NaiveDate::from_ymd_opt(2025, 2, 1));
        assert_eq!(parse_cash_date("2025-02-01"), None);
    }

    #[test]
    fn manual_rows_name_suppliers_before_buyers() {
        let row = CashBookRow {
            date: NaiveDate::from_ymd_opt(2025, 2, 3).unwrap(),
            credit_category: String::new(),
            credit_particulars: String::new(),
            credit_amount: Money::ZERO,
            debit_category: "Wash bill".into(),
            debit_particulars: String::new(),
            debit_amount: Money::from_minor(9_900),
            supplier: Some("Clean Wash".into()),
            buyer: Some("Urbo ltd".into()),
            reference: None,
        };
        let txs = row.transactions();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].particulars, "Wash bill");
        assert_eq!(txs[0].counterparty.as_ref().map(|p| p.role), Some(CounterpartyRole::Supplier));
    }

    #[test]
    fn recent_listing_reports_category_lines_and_totals() {
        let accounts = accounts();
        let mut entries = Vec::new();
        for (side, amount) in [(CategoryType::Credit, 30_000), (CategoryType::Debit, 4_500)] {
            let mut tx = receipt(amount);
            tx.side = side;
            let cmd = command(&tx, accounts);
            let mut entry = JournalEntry::empty(cmd.entry_id);
            execute(&mut entry, &JournalCommand::Create(cmd)).unwrap();
            entries.push(entry);
        }
        let recent = recent_transactions(&entries, Some(accounts.cash), 10, |id| {
            (id == accounts.category).then(|| "Received: Urbo ltd".to_string())
        });
        assert_eq!(recent.total_count, 2);
        assert_eq!(recent.total_credits, Money::from_minor(30_000));
        assert_eq!(recent.total_debits, Money::from_minor(4_500));
        assert!(recent.transactions.iter().all(|t| t.category_name == "Received: Urbo ltd"));
        assert_eq!(recent.transactions[0].particulars, "Advance for joggers");
        assert_eq!(recent_transactions(&entries, Some(accounts.cash), 1, |_| None).total_count, 1);
    }
}
