use chrono::{DateTime, Utc};
use serde::Serialize;

use garments_accounting::cash_book::{find_category_account, new_category_account};
use garments_accounting::{
    AccountId, CashBookAccounts, CashTransaction, Category, CategoryInput, CategoryType, ChartOfAccount,
    CounterpartyRole, JournalEntry,
};
use garments_core::{DomainError, Money, TenantId, UserId};
use garments_parties::{Contact, ContactInput, ContactType};

use super::AppServices;
use crate::app::errors::ApiError;

/// What a batch of cash-book transactions created along the way.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CashBookSummary {
    pub transactions_imported: usize,
    pub accounts_created: usize,
    pub categories_created: usize,
    pub contacts_created: usize,
    pub total_received: Money,
    pub total_paid: Money,
    pub skipped: Vec<String>,
    pub entries: Vec<JournalEntry>,
}

impl AppServices {
    async fn cash_account(&self, tenant_id: TenantId) -> Result<AccountId, ApiError> {
        self.accounting_settings(tenant_id)
            .await?
            .cash_account_id
            .ok_or_else(|| DomainError::validation("Cash account is not configured in accounting settings").into())
    }

    /// The category's account, created on first use.
    async fn category_account(
        &self,
        tenant_id: TenantId,
        tx: &CashTransaction,
        now: DateTime<Utc>,
        summary: &mut CashBookSummary,
    ) -> Result<AccountId, ApiError> {
        let accounts = self.accounts.list(tenant_id).await?;
        if let Some(account) = find_category_account(&tx.category_name, &accounts) {
            return Ok(account.id);
        }
        let account = ChartOfAccount::create(new_category_account(tx.side, &tx.category_name), &accounts, now)?;
        self.accounts.upsert(tenant_id, account.id, account.clone()).await?;
        summary.accounts_created += 1;
        tracing::info!(tenant_id = %tenant_id, code = %account.code, name = %account.name, "category account created");
        Ok(account.id)
    }

    async fn ensure_category(
        &self,
        tenant_id: TenantId,
        tx: &CashTransaction,
        by: UserId,
        now: DateTime<Utc>,
        summary: &mut CashBookSummary,
    ) -> Result<(), ApiError> {
        let existing = self.categories.list(tenant_id).await?;
        let name = tx.category_name.trim();
        let known = existing
            .iter()
            .any(|c| c.is_active && c.category_type == tx.side && c.name.eq_ignore_ascii_case(name));
        if known {
            return Ok(());
        }
        let input = CategoryInput {
            name: name.to_string(),
            description: None,
            category_type: tx.side,
        };
        let category = Category::create(&input, &existing, by, now)?;
        self.categories.upsert(tenant_id, category.id, category).await?;
        summary.categories_created += 1;
        Ok(())
    }

    /// Find the counterparty by name or create it.
    async fn counterparty_contact(
        &self,
        tenant_id: TenantId,
        tx: &CashTransaction,
        now: DateTime<Utc>,
        summary: &mut CashBookSummary,
    ) -> Result<Option<uuid::Uuid>, ApiError> {
        let Some(party) = &tx.counterparty else {
            return Ok(None);
        };
        let name = party.name.trim();
        let fits = |c: &Contact| match party.role {
            CounterpartyRole::Customer => c.contact_type.is_customer(),
            CounterpartyRole::Supplier => c.contact_type.is_supplier(),
        };
        let contacts = self.contacts.list(tenant_id).await?;
        if let Some(contact) = contacts
            .iter()
            .find(|c| c.is_active && fits(c) && c.name.eq_ignore_ascii_case(name))
        {
            return Ok(Some(contact.id.into()));
        }
        let input = ContactInput {
            name: name.to_string(),
            company_name: None,
            contact_type: match party.role {
                CounterpartyRole::Customer => ContactType::Customer,
                CounterpartyRole::Supplier => ContactType::Supplier,
            },
            email: None,
            phone: None,
            mobile: None,
            address: None,
            tax_number: None,
            credit_limit: Money::ZERO,
            payment_terms_days: garments_parties::contact::DEFAULT_PAYMENT_TERMS_DAYS,
        };
        let contact = Contact::create(&input, now)?;
        self.contacts.upsert(tenant_id, contact.id, contact.clone()).await?;
        summary.contacts_created += 1;
        tracing::info!(tenant_id = %tenant_id, contact_id = %contact.id, name = %contact.name, "contact created from cash book");
        Ok(Some(contact.id.into()))
    }

    /// Post cash-book transactions as balanced journal entries.
    ///
    /// Every transaction is validated before anything is written. Callers
    /// hold the write lock.
    pub async fn record_cash_transactions(
        &self,
        tenant_id: TenantId,
        transactions: &[CashTransaction],
        by: UserId,
        now: DateTime<Utc>,
    ) -> Result<CashBookSummary, ApiError> {
        let mut errors = Vec::new();
        for (idx, tx) in transactions.iter().enumerate() {
            if let Err(DomainError::Validation(msg)) = tx.validate() {
                errors.push(format!("Transaction {}: {msg}", idx + 1));
            }
        }
        if !errors.is_empty() {
            return Err(DomainError::validation_all(errors).into());
        }
        let total = |side: CategoryType| {
            Money::checked_sum(transactions.iter().filter(|t| t.side == side).map(|t| t.amount))
        };
        let (Some(total_received), Some(total_paid)) = (
            total(CategoryType::Credit),
            total(CategoryType::Debit),
        ) else {
            return Err(DomainError::validation("Cash book amount too large").into());
        };
        let cash = self.cash_account(tenant_id).await?;

        let mut summary = CashBookSummary {
            total_received,
            total_paid,
            ..CashBookSummary::default()
        };
        for tx in transactions {
            let category = self.category_account(tenant_id, tx, now, &mut summary).await?;
            self.ensure_category(tenant_id, tx, by, now, &mut summary).await?;
            let contact_id = self.counterparty_contact(tenant_id, tx, now, &mut summary).await?;
            let accounts = CashBookAccounts { cash, category };
            let prepared = self
                .prepare_journal(tenant_id, now, |id, number| {
                    tx.command(accounts, contact_id, id, number, by, now)
                })
                .await?;
            summary.entries.push(self.commit_journal(tenant_id, prepared).await?);
        }
        summary.transactions_imported = summary.entries.len();
        tracing::info!(
            tenant_id = %tenant_id,
            transactions = summary.transactions_imported,
            accounts_created = summary.accounts_created,
            contacts_created = summary.contacts_created,
            "cash book transactions recorded"
        );
        Ok(summary)
    }
}
