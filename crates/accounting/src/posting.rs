//! Automatic journal postings raised by sales, purchasing and payroll.
//!
//! A posting only happens when both accounts it needs are configured in the
//! tenant's [`AccountingSettings`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use garments_core::{Money, UserId};

use crate::account::AccountId;
use crate::journal::{CreateJournalEntry, JournalEntryId, JournalLineInput, JournalType};

/// Per-tenant account mapping used by integrations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingSettings {
    #[serde(default)]
    pub receivable_account_id: Option<AccountId>,
    #[serde(default)]
    pub revenue_account_id: Option<AccountId>,
    #[serde(default)]
    pub payable_account_id: Option<AccountId>,
    #[serde(default)]
    pub purchase_account_id: Option<AccountId>,
    #[serde(default)]
    pub cash_account_id: Option<AccountId>,
    #[serde(default)]
    pub salary_expense_account_id: Option<AccountId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingKind {
    /// Debit receivable, credit revenue.
    Sale,
    /// Debit cash, credit receivable.
    CustomerReceipt,
    /// Debit purchases, credit payable.
    Purchase,
    /// Debit payable, credit cash.
    SupplierPayment,
    /// Debit salary expense, credit cash.
    Salary,
}

impl PostingKind {
    pub fn journal_type(self) -> JournalType {
        match self {
            PostingKind::Sale => JournalType::Sales,
            PostingKind::Purchase => JournalType::Purchase,
            PostingKind::CustomerReceipt => JournalType::CashReceipt,
            PostingKind::SupplierPayment | PostingKind::Salary => JournalType::CashPayment,
        }
    }
}

/// A balanced two-line journal waiting for a number and an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub journal_type: JournalType,
    pub transaction_date: NaiveDate,
    pub reference_number: String,
    pub description: String,
    pub lines: Vec<JournalLineInput>,
}

impl Posting {
    pub fn into_command(
        self,
        entry_id: JournalEntryId,
        journal_number: String,
        created_by: UserId,
        occurred_at: DateTime<Utc>,
    ) -> CreateJournalEntry {
        CreateJournalEntry {
            entry_id,
            journal_number,
            transaction_date: self.transaction_date,
            journal_type: self.journal_type,
            reference_number: self.reference_number,
            description: Some(self.description),
            lines: self.lines,
            post_immediately: true,
            created_by,
            occurred_at,
        }
    }
}

impl AccountingSettings {
    /// (debit, credit) accounts for a posting, if both are configured.
    pub fn accounts_for(&self, kind: PostingKind) -> Option<(AccountId, AccountId)> {
        let pair = match kind {
            PostingKind::Sale => (self.receivable_account_id, self.revenue_account_id),
            PostingKind::CustomerReceipt => (self.cash_account_id, self.receivable_account_id),
            PostingKind::Purchase => (self.purchase_account_id, self.payable_account_id),
            PostingKind::SupplierPayment => (self.payable_account_id, self.cash_account_id),
            PostingKind::Salary => (self.salary_expense_account_id, self.cash_account_id),
        };
        match pair {
            (Some(debit), Some(credit)) => Some((debit, credit)),
            _ => None,
        }
    }

    /// Build the posting for `amount`, or `None` when unconfigured or zero.
    pub fn posting(
        &self,
        kind: PostingKind,
        transaction_date: NaiveDate,
        reference: &str,
        description: &str,
        amount: Money,
    ) -> Option<Posting> {
        if !amount.is_positive() {
            return None;
        }
        let (debit, credit) = self.accounts_for(kind)?;
        Some(Posting {
            journal_type: kind.journal_type(),
            transaction_date,
            reference_number: reference.to_string(),
            description: description.to_string(),
            lines: vec![
                JournalLineInput::debit(debit, amount, description),
                JournalLineInput::credit(credit, amount, description),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{JournalCommand, JournalEntry, JournalStatus};
    use garments_core::execute;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
    }

    #[test]
    fn unconfigured_postings_are_skipped() {
        let settings = AccountingSettings {
            receivable_account_id: Some(AccountId::new()),
            ..Default::default()
        };
        assert!(
            settings
                .posting(PostingKind::Sale, date(), "INV-2024-0001", "Sale", Money::from_minor(100))
                .is_none()
        );
    }

    #[test]
    fn postings_become_posted_balanced_entries() {
        let cash = AccountId::new();
        let salaries = AccountId::new();
        let settings = AccountingSettings {
            cash_account_id: Some(cash),
            salary_expense_account_id: Some(salaries),
            ..Default::default()
        };
        assert!(
            settings
                .posting(PostingKind::Salary, date(), "PAY-1", "March salary", Money::ZERO)
                .is_none()
        );

        let posting = settings
            .posting(PostingKind::Salary, date(), "PAY-1", "March salary", Money::from_minor(50_000))
            .unwrap();
        assert_eq!(posting.journal_type, JournalType::CashPayment);
        assert_eq!(posting.lines[0].account_id, salaries);
        assert_eq!(posting.lines[1].account_id, cash);

        let id = JournalEntryId::new();
        let cmd = posting.into_command(id, "JE-2024-03-0001".into(), UserId::new(), Utc::now());
        let mut entry = JournalEntry::empty(id);
        execute(&mut entry, &JournalCommand::Create(cmd)).unwrap();
        assert!(entry.is_balanced());
        assert_eq!(entry.status, JournalStatus::Posted);
    }
}
