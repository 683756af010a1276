//! Accounting module (chart of accounts, double-entry journal, cash book, trial balance).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod account;
pub mod balance;
pub mod cash_book;
pub mod category;
pub mod classification;
pub mod comparison;
pub mod journal;
pub mod journal_query;
pub mod posting;
pub mod trial_balance;

pub use account::{
    AccountId, AccountNode, AccountType, AccountUpdate, ChartOfAccount, NewAccount, build_hierarchy,
    next_account_code,
};
pub use balance::{AccountBalance, BalanceSummary};
pub use cash_book::{
    CashBookAccounts, CashBookRow, CashTransaction, Counterparty, CounterpartyRole, ParsedCashBook, RecentCashBook,
    parse_cash_book_csv, recent_transactions,
};
pub use category::{Category, CategoryId, CategoryInput, CategoryType, CategoryView};
pub use comparison::{ChangeType, ComparisonRequest, TrialBalanceComparison, compare};
pub use journal::{
    CreateJournalEntry, EntryDirection, JournalCommand, JournalEntry, JournalEntryId, JournalEntryLine,
    JournalEvent, JournalLineInput, JournalStatus, JournalType, JournalValidation, UpdateJournalEntry,
    next_journal_number, validate_lines,
};
pub use journal_query::{AccountNames, JournalFilter, JournalFilterParams, JournalListing, StatisticsParams};
pub use posting::{AccountingSettings, Posting, PostingKind};
pub use trial_balance::{AccountTransaction, TrialBalanceReport, TrialBalanceRequest};
