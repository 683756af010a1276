use std::fmt::Display;

use chrono::{DateTime, Utc};
use garments_accounting::{
    CreateJournalEntry, JournalCommand, JournalEntry, JournalEntryId, JournalEvent, JournalLineInput, JournalStatus,
    Posting, next_journal_number,
};
use garments_core::{DomainError, Event, TenantId, UserId, execute};
use garments_infra::{AuditRecord, StoreError};

use super::AppServices;
use crate::app::errors::ApiError;

pub const JOURNAL_SUBJECT: &str = "journal_entry";

/// A journal entry validated in memory and not yet persisted.
#[derive(Debug, Clone)]
pub struct PreparedJournal {
    pub entry: JournalEntry,
    pub events: Vec<JournalEvent>,
}

impl AppServices {
    /// Every line must reference an existing account that accepts postings.
    pub async fn check_line_accounts(&self, tenant_id: TenantId, lines: &[JournalLineInput]) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            match self.accounts.get(tenant_id, &line.account_id).await? {
                None => errors.push(format!("line {}: account {} does not exist", idx + 1, line.account_id)),
                Some(account) if !account.accepts_postings() => errors.push(format!(
                    "line {}: account {} ({}) does not accept transactions",
                    idx + 1,
                    account.code,
                    account.name
                )),
                Some(_) => {}
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation_all(errors).into())
        }
    }

    /// Allocate the next journal number and run the create command in memory.
    ///
    /// Callers hold the write lock until the entry is committed.
    pub async fn prepare_journal(
        &self,
        tenant_id: TenantId,
        now: DateTime<Utc>,
        build: impl FnOnce(JournalEntryId, String) -> CreateJournalEntry,
    ) -> Result<PreparedJournal, ApiError> {
        let existing = self.journals.list(tenant_id).await?;
        let number = next_journal_number(now.date_naive(), existing.iter().map(|e| e.journal_number.as_str()));
        let id = JournalEntryId::new();
        let command = build(id, number);
        self.check_line_accounts(tenant_id, &command.lines).await?;

        let mut entry = JournalEntry::empty(id);
        let events = execute(&mut entry, &JournalCommand::Create(command))?;
        Ok(PreparedJournal { entry, events })
    }

    /// Prepare an integration posting; `None` when the accounts are unconfigured.
    pub async fn prepare_posting(
        &self,
        tenant_id: TenantId,
        posting: Option<Posting>,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<PreparedJournal>, ApiError> {
        let Some(posting) = posting else {
            return Ok(None);
        };
        let prepared = self
            .prepare_journal(tenant_id, now, |id, number| posting.into_command(id, number, created_by, now))
            .await?;
        Ok(Some(prepared))
    }

    pub async fn commit_journal(&self, tenant_id: TenantId, prepared: PreparedJournal) -> Result<JournalEntry, ApiError> {
        let PreparedJournal { entry, events } = prepared;
        self.journals.upsert(tenant_id, entry.id, entry.clone()).await?;
        self.record_journal_events(tenant_id, &entry, &events).await?;
        self.invalidate_balances(tenant_id).await;
        tracing::info!(
            tenant_id = %tenant_id,
            journal_number = %entry.journal_number,
            status = entry.status.name(),
            "journal entry saved"
        );
        Ok(entry)
    }

    /// Reverse the posted entries an invoice or payroll raised.
    ///
    /// Entries already reversed are skipped.
    pub async fn reverse_journals(
        &self,
        tenant_id: TenantId,
        ids: &[JournalEntryId],
        reason: &str,
        reversed_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        for id in ids {
            let Some(mut entry) = self.journals.get(tenant_id, id).await? else {
                tracing::warn!(tenant_id = %tenant_id, journal_entry_id = %id, "linked journal entry is missing");
                continue;
            };
            if entry.status == JournalStatus::Reversed {
                continue;
            }
            let events = execute(
                &mut entry,
                &JournalCommand::Reverse {
                    reason: reason.to_string(),
                    reversed_by,
                    occurred_at: now,
                },
            )?;
            self.journals.upsert(tenant_id, entry.id, entry.clone()).await?;
            self.record_journal_events(tenant_id, &entry, &events).await?;
        }
        if !ids.is_empty() {
            self.invalidate_balances(tenant_id).await;
        }
        Ok(())
    }

    pub async fn record_journal_events(
        &self,
        tenant_id: TenantId,
        entry: &JournalEntry,
        events: &[JournalEvent],
    ) -> Result<(), StoreError> {
        for event in events {
            let record = AuditRecord::from_event(JOURNAL_SUBJECT, entry.id, event, Some(event.actor()), event.details());
            self.audit.append(tenant_id, record).await?;
        }
        Ok(())
    }

    /// Append one audit record per event of any other aggregate.
    pub async fn record_events<E: Event>(
        &self,
        tenant_id: TenantId,
        subject_type: &str,
        subject_id: impl Display,
        events: &[E],
        actor: Option<UserId>,
    ) -> Result<(), StoreError> {
        let subject_id = subject_id.to_string();
        for event in events {
            let record = AuditRecord::from_event(subject_type, &subject_id, event, actor, event.event_type());
            self.audit.append(tenant_id, record).await?;
        }
        Ok(())
    }
}
