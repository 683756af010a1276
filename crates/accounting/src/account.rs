//! Chart of accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use garments_core::{
    DomainError, DomainResult, Entity, Money, check_max_len, check_required, define_id,
};

define_id!(
    /// Identifier of a ledger account in the chart of accounts.
    AccountId,
    "AccountId"
);

pub const MAX_CODE_LEN: usize = 10;
pub const MAX_NAME_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 500;
pub const MAX_CATEGORY_GROUP_LEN: usize = 100;

/// Account classification (the five elements of accounting).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    pub const ALL: [AccountType; 5] = [
        AccountType::Asset,
        AccountType::Liability,
        AccountType::Equity,
        AccountType::Revenue,
        AccountType::Expense,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AccountType::Asset => "Asset",
            AccountType::Liability => "Liability",
            AccountType::Equity => "Equity",
            AccountType::Revenue => "Revenue",
            AccountType::Expense => "Expense",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AccountType::Asset => "Resources owned by the company",
            AccountType::Liability => "Debts and obligations",
            AccountType::Equity => "Owner's equity and retained earnings",
            AccountType::Revenue => "Income from sales and services",
            AccountType::Expense => "Costs and expenses",
        }
    }

    /// Two-digit prefix used when generating account codes.
    pub fn code_prefix(self) -> &'static str {
        match self {
            AccountType::Asset => "10",
            AccountType::Liability => "20",
            AccountType::Equity => "30",
            AccountType::Revenue => "40",
            AccountType::Expense => "50",
        }
    }

    /// Trial-balance category heading for this type.
    pub fn category_name(self) -> &'static str {
        match self {
            AccountType::Asset => "Assets",
            AccountType::Liability => "Liabilities",
            AccountType::Equity => "Equity",
            AccountType::Revenue => "Income",
            AccountType::Expense => "Expenses",
        }
    }

    /// Assets and expenses carry a natural debit balance.
    pub fn is_debit_normal(self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }

    /// Case-insensitive parse of the type name.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let lower = raw.trim().to_ascii_lowercase();
        AccountType::ALL
            .into_iter()
            .find(|t| t.name().to_ascii_lowercase() == lower)
            .ok_or_else(|| {
                DomainError::validation(
                    "account type must be one of: Asset, Liability, Equity, Revenue, Expense",
                )
            })
    }
}

impl core::fmt::Display for AccountType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// An account in the chart of accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartOfAccount {
    pub id: AccountId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub parent_id: Option<AccountId>,
    pub description: Option<String>,
    pub opening_balance: Money,
    pub current_balance: Money,
    pub is_active: bool,
    pub is_dynamic: bool,
    pub category_group: Option<String>,
    pub sort_order: i32,
    pub allow_transactions: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for ChartOfAccount {
    type Id = AccountId;

    fn id(&self) -> &AccountId {
        &self.id
    }
}

/// Input for creating an account. A missing `code` is generated from the type prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub code: Option<String>,
    pub name: String,
    pub account_type: AccountType,
    #[serde(default)]
    pub parent_id: Option<AccountId>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub opening_balance: Money,
    #[serde(default)]
    pub category_group: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub allow_transactions: bool,
    #[serde(default)]
    pub is_dynamic: bool,
}

/// Input for updating an account. The account type is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<AccountId>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_group: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub allow_transactions: bool,
    #[serde(default)]
    pub is_active: Option<bool>,
}

fn default_true() -> bool {
    true
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ChartOfAccount {
    /// Validate `input` against the existing chart and build a new active account.
    pub fn create(
        input: NewAccount,
        existing: &[ChartOfAccount],
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let code = match input.code.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => next_account_code(input.account_type, existing),
        };

        let mut errors = Vec::new();
        check_required("Account code", &code, MAX_CODE_LEN, &mut errors);
        check_required("Account name", &input.name, MAX_NAME_LEN, &mut errors);
        check_max_len("Description", input.description.as_deref(), MAX_DESCRIPTION_LEN, &mut errors);
        check_max_len(
            "Category group",
            input.category_group.as_deref(),
            MAX_CATEGORY_GROUP_LEN,
            &mut errors,
        );
        if !errors.is_empty() {
            return Err(DomainError::validation_all(errors));
        }

        let id = AccountId::new();
        let name = input.name.trim().to_string();
        ensure_unique(existing, None, &code, &name)?;
        if let Some(parent_id) = input.parent_id {
            ensure_valid_parent(existing, id, parent_id, input.account_type)?;
        }

        Ok(Self {
            id,
            code,
            name,
            account_type: input.account_type,
            parent_id: input.parent_id,
            description: trimmed(input.description),
            opening_balance: input.opening_balance,
            current_balance: input.opening_balance,
            is_active: true,
            is_dynamic: input.is_dynamic,
            category_group: trimmed(input.category_group),
            sort_order: input.sort_order,
            allow_transactions: input.allow_transactions,
            created_at: now,
            updated_at: None,
        })
    }

    /// Apply an update, checking uniqueness against every other account.
    pub fn update(
        &mut self,
        input: AccountUpdate,
        existing: &[ChartOfAccount],
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let code = match input.code.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => self.code.clone(),
        };

        let mut errors = Vec::new();
        check_required("Account code", &code, MAX_CODE_LEN, &mut errors);
        check_required("Account name", &input.name, MAX_NAME_LEN, &mut errors);
        check_max_len("Description", input.description.as_deref(), MAX_DESCRIPTION_LEN, &mut errors);
        check_max_len(
            "Category group",
            input.category_group.as_deref(),
            MAX_CATEGORY_GROUP_LEN,
            &mut errors,
        );
        if !errors.is_empty() {
            return Err(DomainError::validation_all(errors));
        }

        let name = input.name.trim().to_string();
        ensure_unique(existing, Some(self.id), &code, &name)?;
        if let Some(parent_id) = input.parent_id {
            ensure_valid_parent(existing, self.id, parent_id, self.account_type)?;
        }

        self.code = code;
        self.name = name;
        self.parent_id = input.parent_id;
        self.description = trimmed(input.description);
        self.category_group = trimmed(input.category_group);
        self.sort_order = input.sort_order;
        self.allow_transactions = input.allow_transactions;
        if let Some(active) = input.is_active {
            self.is_active = active;
        }
        self.updated_at = Some(now);
        Ok(())
    }

    /// Whether journal lines may be posted against this account.
    pub fn accepts_postings(&self) -> bool {
        self.is_active && self.allow_transactions
    }

    /// Case-insensitive match on name, code or description.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&term)
            || self.code.to_lowercase().contains(&term)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&term))
    }
}

fn ensure_unique(
    existing: &[ChartOfAccount],
    exclude: Option<AccountId>,
    code: &str,
    name: &str,
) -> DomainResult<()> {
    let others = existing.iter().filter(|a| Some(a.id) != exclude);
    for other in others {
        if other.code.eq_ignore_ascii_case(code) {
            return Err(DomainError::conflict("Account code already exists"));
        }
        if other.name.to_lowercase() == name.to_lowercase() {
            return Err(DomainError::conflict("Account name already exists"));
        }
    }
    Ok(())
}

fn ensure_valid_parent(
    existing: &[ChartOfAccount],
    account_id: AccountId,
    parent_id: AccountId,
    account_type: AccountType,
) -> DomainResult<()> {
    if parent_id == account_id {
        return Err(DomainError::validation("An account cannot be its own parent"));
    }
    let parent = existing
        .iter()
        .find(|a| a.id == parent_id)
        .ok_or_else(|| DomainError::validation("Parent account does not exist"))?;
    if parent.account_type != account_type {
        return Err(DomainError::validation(
            "Parent account must have the same account type",
        ));
    }

    // Walk up from the parent; reaching `account_id` would close a cycle.
    let mut cursor = parent.parent_id;
    let mut hops = 0;
    while let Some(current) = cursor {
        if current == account_id {
            return Err(DomainError::invariant("Account hierarchy cannot contain cycles"));
        }
        hops += 1;
        if hops > existing.len() {
            break;
        }
        cursor = existing.iter().find(|a| a.id == current).and_then(|a| a.parent_id);
    }
    Ok(())
}

/// Next free code for `account_type`: prefix + two-digit increment of the
/// highest numeric suffix in use, or `{prefix}01` when none exists.
pub fn next_account_code(account_type: AccountType, existing: &[ChartOfAccount]) -> String {
    let prefix = account_type.code_prefix();
    let highest = existing
        .iter()
        .filter_map(|a| a.code.strip_prefix(prefix))
        .filter_map(|suffix| suffix.parse::<u32>().ok())
        .max();

    match highest {
        Some(n) => format!("{prefix}{:02}", n + 1),
        None => format!("{prefix}01"),
    }
}

/// An account with its children, for hierarchical display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountNode {
    #[serde(flatten)]
    pub account: ChartOfAccount,
    pub children: Vec<AccountNode>,
}

/// Build the account forest. Accounts whose parent is missing become roots.
/// Siblings are ordered by `sort_order`, then code.
pub fn build_hierarchy(accounts: &[ChartOfAccount]) -> Vec<AccountNode> {
    fn children_of(parent: Option<AccountId>, accounts: &[ChartOfAccount], depth: usize) -> Vec<AccountNode> {
        if depth > accounts.len() {
            return Vec::new();
        }
        let mut level: Vec<&ChartOfAccount> = accounts
            .iter()
            .filter(|a| {
                let effective_parent = a
                    .parent_id
                    .filter(|p| accounts.iter().any(|other| other.id == *p));
                effective_parent == parent
            })
            .collect();
        level.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.code.cmp(&b.code)));
        level
            .into_iter()
            .map(|a| AccountNode {
                account: a.clone(),
                children: children_of(Some(a.id), accounts, depth + 1),
            })
            .collect()
    }

    children_of(None, accounts, 0)
}

/// Sort accounts the way listings present them: by code, then name.
pub fn sort_for_listing(accounts: &mut [ChartOfAccount]) {
    accounts.sort_by(|a, b| a.code.cmp(&b.code).then_with(|| a.name.cmp(&b.name)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(code: Option<&str>, name: &str, account_type: AccountType) -> NewAccount {
        NewAccount {
            code: code.map(str::to_string),
            name: name.to_string(),
            account_type,
            parent_id: None,
            description: None,
            opening_balance: Money::ZERO,
            category_group: None,
            sort_order: 0,
            allow_transactions: true,
            is_dynamic: false,
        }
    }

    fn chart(specs: &[(&str, &str, AccountType)]) -> Vec<ChartOfAccount> {
        let mut out: Vec<ChartOfAccount> = Vec::new();
        for (code, name, t) in specs {
            let acc = ChartOfAccount::create(new_account(Some(code), name, *t), &out, Utc::now()).unwrap();
            out.push(acc);
        }
        out
    }

    #[test]
    fn generates_codes_from_type_prefix() {
        let existing = chart(&[
            ("1001", "Cash in Hand", AccountType::Asset),
            ("1009", "Bank", AccountType::Asset),
            ("4001", "Sales", AccountType::Revenue),
        ]);
        assert_eq!(next_account_code(AccountType::Asset, &existing), "1010");
        assert_eq!(next_account_code(AccountType::Revenue, &existing), "4002");
        assert_eq!(next_account_code(AccountType::Expense, &existing), "5001");
    }

    #[test]
    fn missing_code_is_generated_on_create() {
        let existing = chart(&[("1001", "Cash", AccountType::Asset)]);
        let acc =
            ChartOfAccount::create(new_account(None, "Petty Cash", AccountType::Asset), &existing, Utc::now())
                .unwrap();
        assert_eq!(acc.code, "1002");
        assert!(acc.is_active);
    }

    #[test]
    fn duplicate_code_or_name_conflicts() {
        let existing = chart(&[("1001", "Cash", AccountType::Asset)]);
        let err = ChartOfAccount::create(new_account(Some("1001"), "Other", AccountType::Asset), &existing, Utc::now())
            .unwrap_err();
        assert_eq!(err, DomainError::conflict("Account code already exists"));

        let err = ChartOfAccount::create(new_account(Some("1002"), " cash ", AccountType::Asset), &existing, Utc::now())
            .unwrap_err();
        assert_eq!(err, DomainError::conflict("Account name already exists"));
    }

    #[test]
    fn overlong_fields_are_rejected_together() {
        let mut input = new_account(Some("12345678901"), &"x".repeat(201), AccountType::Asset);
        input.description = Some("d".repeat(501));
        let err = ChartOfAccount::create(input, &[], Utc::now()).unwrap_err();
        let DomainError::Validation(msg) = err else {
            panic!("expected validation error");
        };
        assert!(msg.contains("Account code cannot exceed 10 characters"));
        assert!(msg.contains("Account name cannot exceed 200 characters"));
        assert!(msg.contains("Description cannot exceed 500 characters"));
    }

    #[test]
    fn parent_must_share_type_and_not_form_cycles() {
        let mut accounts = chart(&[
            ("1000", "Current Assets", AccountType::Asset),
            ("2000", "Liabilities", AccountType::Liability),
        ]);
        let mut child = new_account(Some("1001"), "Cash", AccountType::Asset);
        child.parent_id = Some(accounts[1].id);
        assert!(ChartOfAccount::create(child.clone(), &accounts, Utc::now()).is_err());

        child.parent_id = Some(accounts[0].id);
        let cash = ChartOfAccount::create(child, &accounts, Utc::now()).unwrap();
        accounts.push(cash.clone());

        // Re-parenting the root under its own child closes a cycle.
        let mut root = accounts[0].clone();
        let update = AccountUpdate {
            code: None,
            name: root.name.clone(),
            parent_id: Some(cash.id),
            description: None,
            category_group: None,
            sort_order: 0,
            allow_transactions: true,
            is_active: None,
        };
        let err = root.update(update, &accounts, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn update_ignores_own_code_and_name() {
        let accounts = chart(&[("1001", "Cash", AccountType::Asset)]);
        let mut acc = accounts[0].clone();
        let update = AccountUpdate {
            code: Some("1001".into()),
            name: "Cash".into(),
            parent_id: None,
            description: Some("  main till ".into()),
            category_group: None,
            sort_order: 3,
            allow_transactions: false,
            is_active: Some(false),
        };
        acc.update(update, &accounts, Utc::now()).unwrap();
        assert_eq!(acc.description.as_deref(), Some("main till"));
        assert!(!acc.accepts_postings());
        assert!(acc.updated_at.is_some());
    }

    #[test]
    fn hierarchy_nests_children_in_sort_order() {
        let mut accounts = chart(&[("1000", "Current Assets", AccountType::Asset)]);
        let parent = accounts[0].id;
        for (code, name, order) in [("1002", "Bank", 2), ("1001", "Cash", 1)] {
            let mut input = new_account(Some(code), name, AccountType::Asset);
            input.parent_id = Some(parent);
            input.sort_order = order;
            let acc = ChartOfAccount::create(input, &accounts, Utc::now()).unwrap();
            accounts.push(acc);
        }

        let tree = build_hierarchy(&accounts);
        assert_eq!(tree.len(), 1);
        let names: Vec<_> = tree[0].children.iter().map(|n| n.account.name.as_str()).collect();
        assert_eq!(names, vec!["Cash", "Bank"]);
    }

    #[test]
    fn parses_type_names_case_insensitively() {
        assert_eq!(AccountType::parse("expense").unwrap(), AccountType::Expense);
        assert!(AccountType::parse("income").is_err());
    }
}
