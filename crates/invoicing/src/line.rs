//! Invoice line arithmetic and document totals.

use serde::{Deserialize, Serialize};

use garments_core::{DomainError, DomainResult, Money};
use garments_inventory::ProductId;

/// Percentages are applied in basis points so amounts stay exact.
fn basis_points(pct: f64) -> i64 {
    (pct * 100.0).round() as i64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineInput {
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub description: String,
    pub quantity: i64,
    #[serde(default)]
    pub unit: Option<String>,
    pub unit_price: Money,
    #[serde(default)]
    pub discount_percentage: f64,
    #[serde(default)]
    pub tax_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_no: u32,
    pub product_id: Option<ProductId>,
    pub description: String,
    pub quantity: i64,
    pub unit: String,
    pub unit_price: Money,
    pub discount_percentage: f64,
    pub tax_percentage: f64,
    pub discount_amount: Money,
    pub tax_amount: Money,
    pub line_total: Money,
}

impl InvoiceLine {
    /// Price a line: discount on the gross amount, tax on the discounted amount.
    pub fn compute(line_no: u32, input: &InvoiceLineInput) -> DomainResult<Self> {
        let mut errors = Vec::new();
        if input.description.trim().is_empty() {
            errors.push(format!("Line {line_no}: description is required"));
        }
        if input.quantity <= 0 {
            errors.push(format!("Line {line_no}: quantity must be positive"));
        }
        if input.unit_price.is_negative() {
            errors.push(format!("Line {line_no}: unit price cannot be negative"));
        }
        if !(0.0..=100.0).contains(&input.discount_percentage) {
            errors.push(format!("Line {line_no}: discount must be between 0 and 100 percent"));
        }
        if !(0.0..=100.0).contains(&input.tax_percentage) {
            errors.push(format!("Line {line_no}: tax must be between 0 and 100 percent"));
        }
        if !errors.is_empty() {
            return Err(DomainError::validation_all(errors));
        }

        let too_large = || DomainError::validation(format!("Line {line_no}: amount too large"));
        let gross = input.unit_price.scale(input.quantity, 1).ok_or_else(too_large)?;
        let discount_amount = gross
            .scale(basis_points(input.discount_percentage), 10_000)
            .ok_or_else(too_large)?;
        let taxable = gross.checked_sub(discount_amount).ok_or_else(too_large)?;
        let tax_amount = taxable
            .scale(basis_points(input.tax_percentage), 10_000)
            .ok_or_else(too_large)?;
        let line_total = taxable.checked_add(tax_amount).ok_or_else(too_large)?;

        Ok(Self {
            line_no,
            product_id: input.product_id,
            description: input.description.trim().to_string(),
            quantity: input.quantity,
            unit: input
                .unit
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .unwrap_or("Pcs")
                .to_string(),
            unit_price: input.unit_price,
            discount_percentage: input.discount_percentage,
            tax_percentage: input.tax_percentage,
            discount_amount,
            tax_amount,
            line_total,
        })
    }

    pub fn gross_amount(&self) -> Money {
        self.unit_price.saturating_scale(self.quantity, 1)
    }
}

pub fn compute_lines(inputs: &[InvoiceLineInput]) -> DomainResult<Vec<InvoiceLine>> {
    if inputs.is_empty() {
        return Err(DomainError::validation("Invoice must have at least one line"));
    }
    let mut errors = Vec::new();
    let mut lines = Vec::with_capacity(inputs.len());
    for (idx, input) in inputs.iter().enumerate() {
        match InvoiceLine::compute(idx as u32 + 1, input) {
            Ok(line) => lines.push(line),
            Err(DomainError::Validation(msg)) => errors.push(msg),
            Err(other) => return Err(other),
        }
    }
    if !errors.is_empty() {
        return Err(DomainError::validation_all(errors));
    }
    let fits = Money::checked_sum(lines.iter().map(InvoiceLine::gross_amount)).is_some()
        && Money::checked_sum(lines.iter().map(|l| l.line_total)).is_some();
    if !fits {
        return Err(DomainError::validation("Invoice amount too large"));
    }
    Ok(lines)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub sub_total: Money,
    pub discount_amount: Money,
    pub tax_amount: Money,
    pub total_amount: Money,
    pub paid_amount: Money,
    pub balance_amount: Money,
}

impl InvoiceTotals {
    pub fn from_lines(lines: &[InvoiceLine], paid_amount: Money) -> Self {
        let sub_total: Money = lines.iter().map(InvoiceLine::gross_amount).sum();
        let discount_amount: Money = lines.iter().map(|l| l.discount_amount).sum();
        let tax_amount: Money = lines.iter().map(|l| l.tax_amount).sum();
        let total_amount: Money = lines.iter().map(|l| l.line_total).sum();
        Self {
            sub_total,
            discount_amount,
            tax_amount,
            total_amount,
            paid_amount,
            balance_amount: total_amount - paid_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(qty: i64, price: i64, discount: f64, tax: f64) -> InvoiceLineInput {
        InvoiceLineInput {
            product_id: None,
            description: "Denim jacket".into(),
            quantity: qty,
            unit: None,
            unit_price: Money::from_minor(price),
            discount_percentage: discount,
            tax_percentage: tax,
        }
    }

    #[test]
    fn tax_applies_after_discount() {
        let l = InvoiceLine::compute(1, &line(10, 1_000, 10.0, 17.0)).unwrap();
        assert_eq!(l.discount_amount, Money::from_minor(1_000));
        assert_eq!(l.tax_amount, Money::from_minor(1_530));
        assert_eq!(l.line_total, Money::from_minor(10_530));
        assert_eq!(l.unit, "Pcs");
    }

    #[test]
    fn all_line_errors_are_reported() {
        let err = compute_lines(&[line(0, 100, 0.0, 0.0), line(1, -1, 120.0, 0.0)]).unwrap_err();
        match err {
            DomainError::Validation(msg) => {
                assert!(msg.contains("Line 1: quantity"));
                assert!(msg.contains("Line 2: unit price"));
                assert!(msg.contains("Line 2: discount"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(compute_lines(&[]).is_err());
    }

    #[test]
    fn line_amounts_beyond_i64_are_rejected() {
        let err = InvoiceLine::compute(1, &line(4_000_000_000, 4_000_000_000_000, 0.0, 0.0)).unwrap_err();
        assert_eq!(err, DomainError::validation("Line 1: amount too large"));

        let big = line(1, i64::MAX / 2 + 1, 0.0, 0.0);
        match compute_lines(&[big.clone(), big]).unwrap_err() {
            DomainError::Validation(msg) => assert!(msg.contains("amount too large")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn totals_add_up(specs in prop::collection::vec((1i64..100, 0i64..100_000, 0u8..=100, 0u8..=30), 1..6)) {
            let inputs: Vec<InvoiceLineInput> = specs
                .iter()
                .map(|(q, p, d, t)| line(*q, *p, *d as f64, *t as f64))
                .collect();
            let lines = compute_lines(&inputs).unwrap();
            let totals = InvoiceTotals::from_lines(&lines, Money::ZERO);
            prop_assert_eq!(
                totals.total_amount,
                totals.sub_total - totals.discount_amount + totals.tax_amount
            );
            prop_assert_eq!(totals.balance_amount, totals.total_amount);
        }
    }
}
