//! Journal entries (double-entry bookkeeping records).
//!
//! A journal entry moves through `Draft -> Posted -> Approved`, and any
//! non-reversed entry can be reversed. Account balances count every entry that
//! is not reversed; the trial balance counts posted entries only.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use garments_core::{Aggregate, AggregateRoot, DomainError, Event, Money, UserId, define_id};

use crate::account::AccountId;

define_id!(
    /// Identifier of a journal entry.
    JournalEntryId,
    "JournalEntryId"
);

define_id!(
    /// Identifier of a single journal entry line.
    JournalLineId,
    "JournalLineId"
);

pub const MAX_REFERENCE_LEN: usize = 50;
pub const MAX_DESCRIPTION_LEN: usize = 500;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JournalType {
    General,
    Sales,
    Purchase,
    CashReceipt,
    CashPayment,
    BankTransfer,
    Adjustment,
    Opening,
    Closing,
}

impl JournalType {
    pub const ALL: [JournalType; 9] = [
        JournalType::General,
        JournalType::Sales,
        JournalType::Purchase,
        JournalType::CashReceipt,
        JournalType::CashPayment,
        JournalType::BankTransfer,
        JournalType::Adjustment,
        JournalType::Opening,
        JournalType::Closing,
    ];

    pub fn name(self) -> &'static str {
        match self {
            JournalType::General => "General",
            JournalType::Sales => "Sales",
            JournalType::Purchase => "Purchase",
            JournalType::CashReceipt => "CashReceipt",
            JournalType::CashPayment => "CashPayment",
            JournalType::BankTransfer => "BankTransfer",
            JournalType::Adjustment => "Adjustment",
            JournalType::Opening => "Opening",
            JournalType::Closing => "Closing",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        JournalType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(raw.trim()))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JournalStatus {
    Draft,
    Posted,
    Approved,
    Reversed,
}

impl JournalStatus {
    pub const ALL: [JournalStatus; 4] = [
        JournalStatus::Draft,
        JournalStatus::Posted,
        JournalStatus::Approved,
        JournalStatus::Reversed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            JournalStatus::Draft => "Draft",
            JournalStatus::Posted => "Posted",
            JournalStatus::Approved => "Approved",
            JournalStatus::Reversed => "Reversed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        JournalStatus::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(raw.trim()))
    }

    /// Reversed entries no longer move account balances.
    pub fn affects_balances(self) -> bool {
        self != JournalStatus::Reversed
    }
}

/// Display direction of an entry in cash-book listings.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryDirection {
    Credit,
    Debit,
}

impl EntryDirection {
    pub fn name(self) -> &'static str {
        match self {
            EntryDirection::Credit => "Credit",
            EntryDirection::Debit => "Debit",
        }
    }
}

/// A line as supplied by callers (before numbering).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLineInput {
    pub account_id: AccountId,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub debit: Money,
    #[serde(default)]
    pub credit: Money,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub contact_id: Option<uuid::Uuid>,
}

impl JournalLineInput {
    pub fn debit(account_id: AccountId, amount: Money, description: impl Into<String>) -> Self {
        Self {
            account_id,
            description: Some(description.into()),
            debit: amount,
            credit: Money::ZERO,
            reference: None,
            contact_id: None,
        }
    }

    pub fn credit(account_id: AccountId, amount: Money, description: impl Into<String>) -> Self {
        Self {
            account_id,
            description: Some(description.into()),
            debit: Money::ZERO,
            credit: amount,
            reference: None,
            contact_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryLine {
    pub id: JournalLineId,
    pub account_id: AccountId,
    pub description: Option<String>,
    pub debit: Money,
    pub credit: Money,
    pub reference: Option<String>,
    pub line_order: u32,
    pub contact_id: Option<uuid::Uuid>,
}

impl JournalEntryLine {
    /// Signed trial-balance amount: credits positive, debits negative.
    pub fn signed_amount(&self) -> Money {
        self.credit - self.debit
    }
}

/// Result of validating an entry's lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Check the double-entry rules on a set of lines.
pub fn validate_lines(lines: &[JournalLineInput]) -> JournalValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if lines.is_empty() {
        errors.push("Journal entry must have at least one line".to_string());
    }

    for (idx, line) in lines.iter().enumerate() {
        let n = idx + 1;
        if line.debit.is_negative() || line.credit.is_negative() {
            errors.push(format!("Line {n}: amounts cannot be negative"));
        }
        if line.debit.is_positive() && line.credit.is_positive() {
            errors.push(format!("Line {n}: a line cannot have both debit and credit amounts"));
        }
        if line.debit.is_zero() && line.credit.is_zero() {
            warnings.push(format!("Line {n}: has zero amount"));
        }
    }

    let total_debit = Money::checked_sum(lines.iter().map(|l| l.debit));
    let total_credit = Money::checked_sum(lines.iter().map(|l| l.credit));
    match (total_debit, total_credit) {
        (Some(debit), Some(credit)) if debit != credit => errors.push(format!(
            "Journal entry is not balanced. Debits: {debit}, Credits: {credit}"
        )),
        (Some(_), Some(_)) => {}
        _ => errors.push("Journal entry amount too large".to_string()),
    }

    JournalValidation {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// Next `JE-{yyyy}-{MM}-{nnnn}` number for the month of `today`.
pub fn next_journal_number<'a>(today: NaiveDate, existing: impl IntoIterator<Item = &'a str>) -> String {
    let prefix = format!("JE-{}-{:02}-", today.year(), today.month());
    let highest = existing
        .into_iter()
        .filter_map(|n| n.strip_prefix(prefix.as_str()))
        .filter_map(|seq| seq.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("{prefix}{:04}", highest + 1)
}

/// Aggregate root: JournalEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    pub journal_number: String,
    pub transaction_date: NaiveDate,
    pub journal_type: JournalType,
    pub reference_number: String,
    pub description: Option<String>,
    pub lines: Vec<JournalEntryLine>,
    pub total_debit: Money,
    pub total_credit: Money,
    pub status: JournalStatus,
    pub created_by: Option<UserId>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub reversal_reason: Option<String>,
    version: u64,
    created: bool,
}

impl JournalEntry {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: JournalEntryId) -> Self {
        Self {
            id,
            journal_number: String::new(),
            transaction_date: NaiveDate::MIN,
            journal_type: JournalType::General,
            reference_number: String::new(),
            description: None,
            lines: Vec::new(),
            total_debit: Money::ZERO,
            total_credit: Money::ZERO,
            status: JournalStatus::Draft,
            created_by: None,
            created_at: None,
            updated_at: None,
            approved_by: None,
            approved_at: None,
            reversal_reason: None,
            version: 0,
            created: false,
        }
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debit == self.total_credit
    }

    /// "Credit" when the description starts with `Credit:`, otherwise "Debit".
    pub fn direction(&self) -> EntryDirection {
        match self.description.as_deref() {
            Some(d) if d.starts_with("Credit:") => EntryDirection::Credit,
            _ => EntryDirection::Debit,
        }
    }

    /// Amount shown in listings for the entry's direction.
    pub fn display_amount(&self) -> Money {
        match self.direction() {
            EntryDirection::Credit => self.total_credit,
            EntryDirection::Debit => self.total_debit,
        }
    }

    pub fn references_account(&self, account_id: AccountId) -> bool {
        self.lines.iter().any(|l| l.account_id == account_id)
    }

    pub fn line_inputs(&self) -> Vec<JournalLineInput> {
        self.lines
            .iter()
            .map(|l| JournalLineInput {
                account_id: l.account_id,
                description: l.description.clone(),
                debit: l.debit,
                credit: l.credit,
                reference: l.reference.clone(),
                contact_id: l.contact_id,
            })
            .collect()
    }

    fn number_lines(lines: &[JournalLineInput]) -> Vec<JournalEntryLine> {
        lines
            .iter()
            .enumerate()
            .map(|(idx, l)| JournalEntryLine {
                id: JournalLineId::new(),
                account_id: l.account_id,
                description: l.description.clone(),
                debit: l.debit,
                credit: l.credit,
                reference: l.reference.clone(),
                line_order: idx as u32 + 1,
                contact_id: l.contact_id,
            })
            .collect()
    }
}

impl AggregateRoot for JournalEntry {
    type Id = JournalEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateJournalEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJournalEntry {
    pub entry_id: JournalEntryId,
    pub journal_number: String,
    pub transaction_date: NaiveDate,
    pub journal_type: JournalType,
    pub reference_number: String,
    pub description: Option<String>,
    pub lines: Vec<JournalLineInput>,
    /// Post straight away (system postings from sales, purchasing, payroll).
    pub post_immediately: bool,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateJournalEntry (replaces header and lines).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateJournalEntry {
    pub transaction_date: NaiveDate,
    pub journal_type: JournalType,
    pub reference_number: String,
    pub description: Option<String>,
    pub lines: Vec<JournalLineInput>,
    pub updated_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalCommand {
    Create(CreateJournalEntry),
    Update(UpdateJournalEntry),
    Post { posted_by: UserId, occurred_at: DateTime<Utc> },
    Approve { approved_by: UserId, occurred_at: DateTime<Utc> },
    Reverse { reason: String, reversed_by: UserId, occurred_at: DateTime<Utc> },
}

/// Event: JournalEntryCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryCreated {
    pub entry_id: JournalEntryId,
    pub journal_number: String,
    pub transaction_date: NaiveDate,
    pub journal_type: JournalType,
    pub reference_number: String,
    pub description: Option<String>,
    pub lines: Vec<JournalEntryLine>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: JournalEntryUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryUpdated {
    pub transaction_date: NaiveDate,
    pub journal_type: JournalType,
    pub reference_number: String,
    pub description: Option<String>,
    pub lines: Vec<JournalEntryLine>,
    pub updated_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEvent {
    Created(JournalEntryCreated),
    Updated(JournalEntryUpdated),
    Posted { posted_by: UserId, occurred_at: DateTime<Utc> },
    Approved { approved_by: UserId, occurred_at: DateTime<Utc> },
    Reversed { reason: String, reversed_by: UserId, occurred_at: DateTime<Utc> },
}

impl JournalEvent {
    pub fn actor(&self) -> UserId {
        match self {
            JournalEvent::Created(e) => e.created_by,
            JournalEvent::Updated(e) => e.updated_by,
            JournalEvent::Posted { posted_by, .. } => *posted_by,
            JournalEvent::Approved { approved_by, .. } => *approved_by,
            JournalEvent::Reversed { reversed_by, .. } => *reversed_by,
        }
    }

    /// Short human-readable description for the audit trail.
    pub fn details(&self) -> String {
        match self {
            JournalEvent::Created(e) => format!(
                "Created {} with {} line(s)",
                e.journal_number,
                e.lines.len()
            ),
            JournalEvent::Updated(e) => format!("Updated with {} line(s)", e.lines.len()),
            JournalEvent::Posted { .. } => "Posted".to_string(),
            JournalEvent::Approved { .. } => "Approved".to_string(),
            JournalEvent::Reversed { reason, .. } => format!("Reversed: {reason}"),
        }
    }
}

impl Event for JournalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JournalEvent::Created(_) => "accounting.journal.created",
            JournalEvent::Updated(_) => "accounting.journal.updated",
            JournalEvent::Posted { .. } => "accounting.journal.posted",
            JournalEvent::Approved { .. } => "accounting.journal.approved",
            JournalEvent::Reversed { .. } => "accounting.journal.reversed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JournalEvent::Created(e) => e.occurred_at,
            JournalEvent::Updated(e) => e.occurred_at,
            JournalEvent::Posted { occurred_at, .. }
            | JournalEvent::Approved { occurred_at, .. }
            | JournalEvent::Reversed { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for JournalEntry {
    type Command = JournalCommand;
    type Event = JournalEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            JournalEvent::Created(e) => {
                self.id = e.entry_id;
                self.journal_number = e.journal_number.clone();
                self.transaction_date = e.transaction_date;
                self.journal_type = e.journal_type;
                self.reference_number = e.reference_number.clone();
                self.description = e.description.clone();
                self.lines = e.lines.clone();
                self.total_debit = e.lines.iter().map(|l| l.debit).sum();
                self.total_credit = e.lines.iter().map(|l| l.credit).sum();
                self.status = JournalStatus::Draft;
                self.created_by = Some(e.created_by);
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            JournalEvent::Updated(e) => {
                self.transaction_date = e.transaction_date;
                self.journal_type = e.journal_type;
                self.reference_number = e.reference_number.clone();
                self.description = e.description.clone();
                self.lines = e.lines.clone();
                self.total_debit = e.lines.iter().map(|l| l.debit).sum();
                self.total_credit = e.lines.iter().map(|l| l.credit).sum();
                self.updated_at = Some(e.occurred_at);
            }
            JournalEvent::Posted { occurred_at, .. } => {
                self.status = JournalStatus::Posted;
                self.updated_at = Some(*occurred_at);
            }
            JournalEvent::Approved { approved_by, occurred_at } => {
                self.status = JournalStatus::Approved;
                self.approved_by = Some(*approved_by);
                self.approved_at = Some(*occurred_at);
                self.updated_at = Some(*occurred_at);
            }
            JournalEvent::Reversed { reason, occurred_at, .. } => {
                self.status = JournalStatus::Reversed;
                self.reversal_reason = Some(reason.clone());
                self.updated_at = Some(*occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JournalCommand::Create(cmd) => self.handle_create(cmd),
            JournalCommand::Update(cmd) => self.handle_update(cmd),
            JournalCommand::Post { posted_by, occurred_at } => {
                self.ensure_created()?;
                if self.status != JournalStatus::Draft {
                    return Err(DomainError::invariant(format!(
                        "only draft entries can be posted (current status: {})",
                        self.status.name()
                    )));
                }
                Ok(vec![JournalEvent::Posted {
                    posted_by: *posted_by,
                    occurred_at: *occurred_at,
                }])
            }
            JournalCommand::Approve { approved_by, occurred_at } => {
                self.ensure_created()?;
                match self.status {
                    JournalStatus::Draft | JournalStatus::Posted => Ok(vec![JournalEvent::Approved {
                        approved_by: *approved_by,
                        occurred_at: *occurred_at,
                    }]),
                    JournalStatus::Approved => Err(DomainError::conflict("journal entry is already approved")),
                    JournalStatus::Reversed => {
                        Err(DomainError::invariant("a reversed journal entry cannot be approved"))
                    }
                }
            }
            JournalCommand::Reverse { reason, reversed_by, occurred_at } => {
                self.ensure_created()?;
                if self.status == JournalStatus::Reversed {
                    return Err(DomainError::conflict("journal entry is already reversed"));
                }
                if reason.trim().is_empty() {
                    return Err(DomainError::validation("a reversal reason is required"));
                }
                Ok(vec![JournalEvent::Reversed {
                    reason: reason.trim().to_string(),
                    reversed_by: *reversed_by,
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

impl JournalEntry {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("journal entry"));
        }
        Ok(())
    }

    fn check_header(reference_number: &str, description: Option<&str>) -> Result<(), DomainError> {
        let mut errors = Vec::new();
        garments_core::check_max_len("Reference number", Some(reference_number), MAX_REFERENCE_LEN, &mut errors);
        garments_core::check_max_len("Description", description, MAX_DESCRIPTION_LEN, &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation_all(errors))
        }
    }

    fn check_lines(lines: &[JournalLineInput]) -> Result<(), DomainError> {
        let validation = validate_lines(lines);
        if validation.is_valid {
            Ok(())
        } else {
            Err(DomainError::invariant(validation.errors.join("; ")))
        }
    }

    fn handle_create(&self, cmd: &CreateJournalEntry) -> Result<Vec<JournalEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("journal entry already exists"));
        }
        if cmd.journal_number.trim().is_empty() {
            return Err(DomainError::validation("journal number cannot be empty"));
        }
        Self::check_header(&cmd.reference_number, cmd.description.as_deref())?;
        Self::check_lines(&cmd.lines)?;

        let mut events = vec![JournalEvent::Created(JournalEntryCreated {
            entry_id: cmd.entry_id,
            journal_number: cmd.journal_number.clone(),
            transaction_date: cmd.transaction_date,
            journal_type: cmd.journal_type,
            reference_number: cmd.reference_number.trim().to_string(),
            description: cmd.description.clone(),
            lines: Self::number_lines(&cmd.lines),
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })];
        if cmd.post_immediately {
            events.push(JournalEvent::Posted {
                posted_by: cmd.created_by,
                occurred_at: cmd.occurred_at,
            });
        }
        Ok(events)
    }

    fn handle_update(&self, cmd: &UpdateJournalEntry) -> Result<Vec<JournalEvent>, DomainError> {
        self.ensure_created()?;
        if !matches!(self.status, JournalStatus::Draft | JournalStatus::Posted) {
            return Err(DomainError::invariant(format!(
                "{} journal entries cannot be modified",
                self.status.name().to_lowercase()
            )));
        }
        Self::check_header(&cmd.reference_number, cmd.description.as_deref())?;
        Self::check_lines(&cmd.lines)?;

        Ok(vec![JournalEvent::Updated(JournalEntryUpdated {
            transaction_date: cmd.transaction_date,
            journal_type: cmd.journal_type,
            reference_number: cmd.reference_number.trim().to_string(),
            description: cmd.description.clone(),
            lines: Self::number_lines(&cmd.lines),
            updated_by: cmd.updated_by,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garments_core::execute;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn balanced_lines(amount: i64) -> Vec<JournalLineInput> {
        vec![
            JournalLineInput::debit(AccountId::new(), Money::from_minor(amount), "cash"),
            JournalLineInput::credit(AccountId::new(), Money::from_minor(amount), "sales"),
        ]
    }

    fn create_cmd(lines: Vec<JournalLineInput>) -> JournalCommand {
        JournalCommand::Create(CreateJournalEntry {
            entry_id: JournalEntryId::new(),
            journal_number: "JE-2024-01-0001".into(),
            transaction_date: date(2024, 1, 15),
            journal_type: JournalType::General,
            reference_number: "REF-1".into(),
            description: Some("Credit: fabric sale".into()),
            lines,
            post_immediately: false,
            created_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    fn created_entry(lines: Vec<JournalLineInput>) -> JournalEntry {
        let mut entry = JournalEntry::empty(JournalEntryId::new());
        execute(&mut entry, &create_cmd(lines)).unwrap();
        entry
    }

    #[test]
    fn new_entries_start_as_balanced_drafts() {
        let entry = created_entry(balanced_lines(10_000));
        assert_eq!(entry.status, JournalStatus::Draft);
        assert!(entry.is_balanced());
        assert_eq!(entry.total_debit, Money::from_minor(10_000));
        assert_eq!(entry.lines[1].line_order, 2);
        assert_eq!(entry.direction(), EntryDirection::Credit);
        assert_eq!(entry.display_amount(), Money::from_minor(10_000));
    }

    #[test]
    fn unbalanced_entries_are_rejected() {
        let mut lines = balanced_lines(10_000);
        lines[1].credit = Money::from_minor(9_999);
        let entry = JournalEntry::empty(JournalEntryId::new());
        let err = entry.handle(&create_cmd(lines)).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) => assert!(msg.contains("not balanced")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn a_line_cannot_carry_both_sides() {
        let lines = vec![JournalLineInput {
            account_id: AccountId::new(),
            description: None,
            debit: Money::from_minor(100),
            credit: Money::from_minor(100),
            reference: None,
            contact_id: None,
        }];
        let v = validate_lines(&lines);
        assert!(!v.is_valid);
        assert!(v.errors.iter().any(|e| e.contains("both debit and credit")));
    }

    #[test]
    fn empty_entries_are_invalid_and_zero_lines_warn() {
        assert!(!validate_lines(&[]).is_valid);

        let mut lines = balanced_lines(500);
        lines.push(JournalLineInput::debit(AccountId::new(), Money::ZERO, "memo"));
        let v = validate_lines(&lines);
        assert!(v.is_valid);
        assert_eq!(v.warnings, vec!["Line 3: has zero amount".to_string()]);
    }

    #[test]
    fn overflowing_debit_totals_are_rejected() {
        let account = AccountId::new();
        let lines = vec![
            JournalLineInput::debit(account, Money::from_minor(i64::MAX), "a"),
            JournalLineInput::debit(account, Money::from_minor(i64::MAX), "b"),
            JournalLineInput::debit(account, Money::from_minor(2), "c"),
        ];
        let v = validate_lines(&lines);
        assert!(!v.is_valid);
        assert!(v.errors.iter().any(|e| e.contains("amount too large")));
    }

    #[test]
    fn lifecycle_post_approve_reverse() {
        let mut entry = created_entry(balanced_lines(2_500));
        let user = UserId::new();

        execute(&mut entry, &JournalCommand::Post { posted_by: user, occurred_at: Utc::now() }).unwrap();
        assert_eq!(entry.status, JournalStatus::Posted);

        execute(&mut entry, &JournalCommand::Approve { approved_by: user, occurred_at: Utc::now() }).unwrap();
        assert_eq!(entry.status, JournalStatus::Approved);
        assert_eq!(entry.approved_by, Some(user));
        assert!(entry.approved_at.is_some());

        let update = JournalCommand::Update(UpdateJournalEntry {
            transaction_date: date(2024, 1, 16),
            journal_type: JournalType::Adjustment,
            reference_number: "REF-2".into(),
            description: None,
            lines: balanced_lines(1),
            updated_by: user,
            occurred_at: Utc::now(),
        });
        assert!(entry.handle(&update).is_err());

        let reverse = JournalCommand::Reverse {
            reason: "  duplicate ".into(),
            reversed_by: user,
            occurred_at: Utc::now(),
        };
        execute(&mut entry, &reverse).unwrap();
        assert_eq!(entry.status, JournalStatus::Reversed);
        assert_eq!(entry.reversal_reason.as_deref(), Some("duplicate"));
        assert!(entry.handle(&reverse).is_err());
        assert_eq!(entry.version(), 4);
    }

    #[test]
    fn system_postings_can_be_posted_on_create() {
        let mut entry = JournalEntry::empty(JournalEntryId::new());
        let mut cmd = create_cmd(balanced_lines(700));
        if let JournalCommand::Create(c) = &mut cmd {
            c.post_immediately = true;
        }
        let events = execute(&mut entry, &cmd).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(entry.status, JournalStatus::Posted);
    }

    #[test]
    fn journal_numbers_increment_within_a_month() {
        let today = date(2024, 3, 9);
        assert_eq!(next_journal_number(today, []), "JE-2024-03-0001");
        let existing = ["JE-2024-03-0001", "JE-2024-03-0007", "JE-2024-02-0042", "junk"];
        assert_eq!(next_journal_number(today, existing), "JE-2024-03-0008");
    }

    proptest! {
        #[test]
        fn debits_equal_credits_in_created_entries(amounts in prop::collection::vec(1i64..1_000_000, 1..8)) {
            let mut lines = Vec::new();
            let mut total = 0i64;
            for a in &amounts {
                lines.push(JournalLineInput::debit(AccountId::new(), Money::from_minor(*a), "d"));
                total += a;
            }
            lines.push(JournalLineInput::credit(AccountId::new(), Money::from_minor(total), "c"));

            let entry = created_entry(lines);
            prop_assert_eq!(entry.total_debit, entry.total_credit);
            let signed: Money = entry.lines.iter().map(|l| l.signed_amount()).sum();
            prop_assert!(signed.is_zero());
        }

        #[test]
        fn any_imbalance_is_rejected(amount in 1i64..1_000_000, skew in 1i64..1_000) {
            let mut lines = balanced_lines(amount);
            lines[0].debit = Money::from_minor(amount + skew);
            prop_assert!(!validate_lines(&lines).is_valid);
        }
    }
}
