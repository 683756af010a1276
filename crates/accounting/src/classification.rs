//! Trial-balance sub-classification of accounts by type and name.

use crate::account::{AccountType, ChartOfAccount};

fn mentions(name: &str, words: &[&str]) -> bool {
    words.iter().any(|w| name.contains(w))
}

/// Descriptive sub-heading for an account, e.g. "Current Assets - Inventory".
pub fn category_description(account_type: AccountType, account_name: &str) -> &'static str {
    let name = account_name.to_lowercase();
    let name = name.as_str();
    match account_type {
        AccountType::Asset => {
            if mentions(name, &["cash", "bank"]) {
                "Current Assets - Cash & Bank"
            } else if mentions(name, &["inventory", "stock"]) {
                "Current Assets - Inventory"
            } else if mentions(name, &["receivable", "debtor"]) {
                "Current Assets - Receivables"
            } else if mentions(name, &["equipment", "machinery"]) {
                "Fixed Assets - Equipment"
            } else if mentions(name, &["building", "property"]) {
                "Fixed Assets - Property"
            } else {
                "Assets"
            }
        }
        AccountType::Liability => {
            if mentions(name, &["payable", "creditor"]) {
                "Current Liabilities - Payables"
            } else if mentions(name, &["loan", "borrowing"]) {
                "Long-term Liabilities - Loans"
            } else if mentions(name, &["accrued"]) {
                "Current Liabilities - Accrued"
            } else {
                "Liabilities"
            }
        }
        AccountType::Equity => {
            if mentions(name, &["capital"]) {
                "Equity - Capital"
            } else if mentions(name, &["retained"]) {
                "Equity - Retained Earnings"
            } else if mentions(name, &["drawing"]) {
                "Equity - Drawings"
            } else {
                "Equity"
            }
        }
        AccountType::Revenue => {
            if mentions(name, &["sales", "revenue"]) {
                "Revenue - Sales"
            } else if mentions(name, &["service"]) {
                "Revenue - Services"
            } else if mentions(name, &["interest"]) {
                "Other Income - Interest"
            } else {
                "Income"
            }
        }
        AccountType::Expense => {
            if mentions(name, &["purchase", "cost of goods"]) {
                "Cost of Goods Sold"
            } else if mentions(name, &["salary", "wage", "payroll"]) {
                "Operating Expenses - Payroll"
            } else if mentions(name, &["rent", "utilities", "electricity"]) {
                "Operating Expenses - Facilities"
            } else if mentions(name, &["marketing", "advertising"]) {
                "Operating Expenses - Marketing"
            } else {
                "Operating Expenses"
            }
        }
    }
}

pub fn describe(account: &ChartOfAccount) -> &'static str {
    category_description(account.account_type, &account.name)
}
