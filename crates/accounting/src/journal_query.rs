//! Journal entry listing: filters, display rows, summaries and statistics.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use garments_core::{DomainError, DomainResult, Money, Page, PageRequest};

use crate::account::AccountId;
use crate::journal::{EntryDirection, JournalEntry, JournalEntryId, JournalStatus, JournalType};

pub const MAX_PAGE: u32 = 100;
pub const MAX_LIMIT: u32 = 100;
pub const DEFAULT_LIMIT: u32 = 20;

/// Account names by id, used to label entries by their first line.
pub type AccountNames = HashMap<AccountId, String>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortField {
    TransactionDate,
    Amount,
    Type,
    Category,
    ReferenceNumber,
    CreatedAt,
}

impl SortField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "transactiondate" | "transaction_date" | "date" => Some(SortField::TransactionDate),
            "amount" => Some(SortField::Amount),
            "type" => Some(SortField::Type),
            "category" => Some(SortField::Category),
            "referencenumber" | "reference_number" => Some(SortField::ReferenceNumber),
            "createdat" | "created_at" => Some(SortField::CreatedAt),
            _ => None,
        }
    }
}

/// Raw query-string filter, validated into [`JournalFilter`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JournalFilterParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    pub category: Option<String>,
    pub amount_min: Option<i64>,
    pub amount_max: Option<i64>,
    pub status: Option<String>,
    pub reference_number: Option<String>,
    pub description: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JournalFilter {
    pub page: PageRequest,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub direction: Option<EntryDirection>,
    pub category: Option<String>,
    pub amount_min: Option<Money>,
    pub amount_max: Option<Money>,
    pub status: Option<JournalStatus>,
    pub reference_number: Option<String>,
    pub description: Option<String>,
    pub sort_by: SortField,
    pub descending: bool,
}

fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl JournalFilterParams {
    /// Validate every field, collecting all failures into one error.
    pub fn validate(&self) -> DomainResult<JournalFilter> {
        let mut errors = Vec::new();

        let page = match PageRequest::new(
            self.page.unwrap_or(1),
            self.limit.unwrap_or(DEFAULT_LIMIT),
            MAX_PAGE,
            MAX_LIMIT,
        ) {
            Ok(p) => Some(p),
            Err(DomainError::Validation(msg)) => {
                errors.extend(msg.split("; ").map(str::to_string));
                None
            }
            Err(other) => return Err(other),
        };

        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                errors.push("Date from cannot be after date to".to_string());
            }
        }

        let direction = match non_blank(&self.entry_type) {
            None => None,
            Some(t) if t.eq_ignore_ascii_case("all") => None,
            Some(t) if t.eq_ignore_ascii_case("credit") => Some(EntryDirection::Credit),
            Some(t) if t.eq_ignore_ascii_case("debit") => Some(EntryDirection::Debit),
            Some(_) => {
                errors.push("Type must be one of: All, Credit, Debit".to_string());
                None
            }
        };

        if self.amount_min.is_some_and(|v| v < 0) {
            errors.push("Minimum amount cannot be negative".to_string());
        }
        if self.amount_max.is_some_and(|v| v < 0) {
            errors.push("Maximum amount cannot be negative".to_string());
        }
        if let (Some(min), Some(max)) = (self.amount_min, self.amount_max) {
            if min > max {
                errors.push("Minimum amount cannot be greater than maximum amount".to_string());
            }
        }

        let status = match non_blank(&self.status) {
            None => None,
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => match JournalStatus::parse(s) {
                Some(st) => Some(st),
                None => {
                    errors.push("Status must be one of: All, Draft, Posted, Approved, Reversed".to_string());
                    None
                }
            },
        };

        garments_core::check_max_len("Reference number", self.reference_number.as_deref(), 50, &mut errors);
        garments_core::check_max_len("Description", self.description.as_deref(), 500, &mut errors);
        garments_core::check_max_len("Category", self.category.as_deref(), 200, &mut errors);

        let sort_by = match non_blank(&self.sort_by) {
            None => SortField::TransactionDate,
            Some(raw) => SortField::parse(raw).unwrap_or_else(|| {
                errors.push(
                    "Sort by must be one of: TransactionDate, Amount, Type, Category, ReferenceNumber, CreatedAt"
                        .to_string(),
                );
                SortField::TransactionDate
            }),
        };

        let descending = match non_blank(&self.sort_order) {
            None => true,
            Some(o) if o.eq_ignore_ascii_case("desc") => true,
            Some(o) if o.eq_ignore_ascii_case("asc") => false,
            Some(_) => {
                errors.push("Sort order must be either 'asc' or 'desc'".to_string());
                true
            }
        };

        match page {
            Some(page) if errors.is_empty() => Ok(JournalFilter {
                page,
                date_from: self.date_from,
                date_to: self.date_to,
                direction,
                category: non_blank(&self.category).map(str::to_string),
                amount_min: self.amount_min.map(Money::from_minor),
                amount_max: self.amount_max.map(Money::from_minor),
                status,
                reference_number: non_blank(&self.reference_number).map(str::to_string),
                description: non_blank(&self.description).map(str::to_string),
                sort_by,
                descending,
            }),
            _ => Err(DomainError::validation_all(errors)),
        }
    }
}

/// Name of the account on the entry's first line, or "Unknown".
pub fn category_of(entry: &JournalEntry, names: &AccountNames) -> String {
    entry
        .lines
        .iter()
        .min_by_key(|l| l.line_order)
        .and_then(|l| names.get(&l.account_id))
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string())
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

impl JournalFilter {
    pub fn matches(&self, entry: &JournalEntry, names: &AccountNames) -> bool {
        if self.date_from.is_some_and(|d| entry.transaction_date < d) {
            return false;
        }
        if self.date_to.is_some_and(|d| entry.transaction_date > d) {
            return false;
        }
        if self.direction.is_some_and(|d| entry.direction() != d) {
            return false;
        }
        if let Some(min) = self.amount_min {
            if entry.total_debit < min && entry.total_credit < min {
                return false;
            }
        }
        if let Some(max) = self.amount_max {
            if entry.total_debit > max || entry.total_credit > max {
                return false;
            }
        }
        if self.status.is_some_and(|s| entry.status != s) {
            return false;
        }
        if let Some(r) = &self.reference_number {
            if !contains_ci(Some(&entry.reference_number), r) {
                return false;
            }
        }
        if let Some(d) = &self.description {
            if !contains_ci(entry.description.as_deref(), d) {
                return false;
            }
        }
        if let Some(c) = &self.category {
            if !category_of(entry, names).eq_ignore_ascii_case(c) {
                return false;
            }
        }
        true
    }

    /// Filter and sort `entries` (all of them, before paging).
    pub fn apply<'a>(&self, entries: &'a [JournalEntry], names: &AccountNames) -> Vec<&'a JournalEntry> {
        let mut rows: Vec<&JournalEntry> = entries.iter().filter(|e| self.matches(e, names)).collect();
        rows.sort_by(|a, b| {
            let ord = match self.sort_by {
                SortField::TransactionDate => a.transaction_date.cmp(&b.transaction_date),
                SortField::Amount => a.display_amount().cmp(&b.display_amount()),
                SortField::Type => a.direction().name().cmp(b.direction().name()),
                SortField::Category => category_of(a, names).cmp(&category_of(b, names)),
                SortField::ReferenceNumber => a.reference_number.cmp(&b.reference_number),
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            }
            .then_with(|| a.journal_number.cmp(&b.journal_number));
            if self.descending { ord.reverse() } else { ord }
        });
        rows
    }
}

/// One row of the journal listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryRow {
    pub id: JournalEntryId,
    pub journal_number: String,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub entry_type: EntryDirection,
    pub journal_type: JournalType,
    pub category_name: String,
    pub contact_name: Option<String>,
    pub particulars: Option<String>,
    pub reference_number: String,
    pub amount: Money,
    pub total_debit: Money,
    pub total_credit: Money,
    pub status: JournalStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl JournalEntryRow {
    pub fn from_entry(entry: &JournalEntry, names: &AccountNames) -> Self {
        let first = entry.lines.iter().min_by_key(|l| l.line_order);
        Self {
            id: entry.id,
            journal_number: entry.journal_number.clone(),
            date: entry.transaction_date,
            entry_type: entry.direction(),
            journal_type: entry.journal_type,
            category_name: category_of(entry, names),
            contact_name: first.and_then(|l| l.reference.clone()),
            particulars: entry.description.clone(),
            reference_number: entry.reference_number.clone(),
            amount: entry.display_amount(),
            total_debit: entry.total_debit,
            total_credit: entry.total_credit,
            status: entry.status,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalSummary {
    pub total_entries: usize,
    pub total_debits: Money,
    pub total_credits: Money,
    pub balance: Money,
    pub credit_entries: usize,
    pub debit_entries: usize,
    pub entries_by_status: BTreeMap<String, usize>,
    pub entries_by_type: BTreeMap<String, usize>,
    pub is_balanced: bool,
}

impl JournalSummary {
    pub fn over<'a>(entries: impl IntoIterator<Item = &'a JournalEntry>) -> Self {
        let mut s = JournalSummary::default();
        for e in entries {
            s.total_entries += 1;
            s.total_debits += e.total_debit;
            s.total_credits += e.total_credit;
            if e.total_credit > e.total_debit {
                s.credit_entries += 1;
            }
            if e.total_debit > e.total_credit {
                s.debit_entries += 1;
            }
            *s.entries_by_status.entry(e.status.name().to_string()).or_default() += 1;
            *s.entries_by_type.entry(e.journal_type.name().to_string()).or_default() += 1;
        }
        s.balance = s.total_debits - s.total_credits;
        s.is_balanced = s.balance.is_zero();
        s
    }
}

/// A page of listing rows together with the summary of every filtered entry.
#[derive(Debug, Clone, Serialize)]
pub struct JournalListing {
    pub entries: Vec<JournalEntryRow>,
    pub pagination: garments_core::PageInfo,
    pub summary: JournalSummary,
}

pub fn list_entries(entries: &[JournalEntry], names: &AccountNames, filter: &JournalFilter) -> JournalListing {
    let matched = filter.apply(entries, names);
    let summary = JournalSummary::over(matched.iter().copied());
    let rows: Vec<JournalEntryRow> = matched.iter().map(|e| JournalEntryRow::from_entry(e, names)).collect();
    let page = Page::from_vec(rows, filter.page);
    JournalListing {
        entries: page.items,
        pagination: page.pagination,
        summary,
    }
}

/// Filters accepted by the statistics endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatisticsParams {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub status: Option<String>,
    pub journal_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyStat {
    pub month: String,
    pub count: usize,
    pub total_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStat {
    pub category: String,
    pub count: usize,
    pub amount: Money,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalStatistics {
    pub total_entries: usize,
    pub total_debits: Money,
    pub total_credits: Money,
    pub balance: Money,
    pub average_entry_amount: Money,
    pub largest_entry_amount: Money,
    pub entries_by_type: BTreeMap<String, usize>,
    pub entries_by_status: BTreeMap<String, usize>,
    pub entries_by_month: Vec<MonthlyStat>,
    pub top_categories: Vec<CategoryStat>,
}

pub const TOP_CATEGORY_COUNT: usize = 10;

pub fn statistics(
    entries: &[JournalEntry],
    names: &AccountNames,
    params: &StatisticsParams,
) -> DomainResult<JournalStatistics> {
    if let (Some(from), Some(to)) = (params.date_from, params.date_to) {
        if from > to {
            return Err(DomainError::validation("Date from cannot be after date to"));
        }
    }
    let status = match non_blank(&params.status) {
        Some(s) => Some(
            JournalStatus::parse(s).ok_or_else(|| DomainError::validation(format!("Unknown status: {s}")))?,
        ),
        None => None,
    };
    let journal_type = match non_blank(&params.journal_type) {
        Some(t) => Some(
            JournalType::parse(t).ok_or_else(|| DomainError::validation(format!("Unknown journal type: {t}")))?,
        ),
        None => None,
    };

    let selected: Vec<&JournalEntry> = entries
        .iter()
        .filter(|e| params.date_from.is_none_or(|d| e.transaction_date >= d))
        .filter(|e| params.date_to.is_none_or(|d| e.transaction_date <= d))
        .filter(|e| status.is_none_or(|s| e.status == s))
        .filter(|e| journal_type.is_none_or(|t| e.journal_type == t))
        .collect();

    let summary = JournalSummary::over(selected.iter().copied());
    let entry_amount = |e: &JournalEntry| e.total_debit + e.total_credit;
    let grand_total: Money = selected.iter().map(|e| entry_amount(e)).sum();
    let average = if selected.is_empty() {
        Money::ZERO
    } else {
        grand_total.saturating_scale(1, selected.len() as i64)
    };
    let largest = selected.iter().map(|e| entry_amount(e)).max().unwrap_or(Money::ZERO);

    let mut by_month: BTreeMap<String, (usize, Money)> = BTreeMap::new();
    let mut by_category: HashMap<String, (usize, Money)> = HashMap::new();
    for e in &selected {
        let month = e.transaction_date.format("%Y-%m").to_string();
        let slot = by_month.entry(month).or_insert((0, Money::ZERO));
        slot.0 += 1;
        slot.1 += entry_amount(e);

        let cat = by_category.entry(category_of(e, names)).or_insert((0, Money::ZERO));
        cat.0 += 1;
        cat.1 += entry_amount(e);
    }

    let mut top_categories: Vec<CategoryStat> = by_category
        .into_iter()
        .map(|(category, (count, amount))| CategoryStat {
            percentage: if grand_total.is_zero() {
                0.0
            } else {
                amount.minor() as f64 / grand_total.minor() as f64 * 100.0
            },
            category,
            count,
            amount,
        })
        .collect();
    top_categories.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.category.cmp(&b.category)));
    top_categories.truncate(TOP_CATEGORY_COUNT);

    Ok(JournalStatistics {
        total_entries: summary.total_entries,
        total_debits: summary.total_debits,
        total_credits: summary.total_credits,
        balance: summary.balance,
        average_entry_amount: average,
        largest_entry_amount: largest,
        entries_by_type: summary.entries_by_type,
        entries_by_status: summary.entries_by_status,
        entries_by_month: by_month
            .into_iter()
            .map(|(month, (count, total_amount))| MonthlyStat { month, count, total_amount })
            .collect(),
        top_categories,
    })
}

/// Distinct first-line account names, sorted.
pub fn distinct_categories(entries: &[JournalEntry], names: &AccountNames) -> Vec<String> {
    entries
        .iter()
        .filter(|e| !e.lines.is_empty())
        .map(|e| category_of(e, names))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
