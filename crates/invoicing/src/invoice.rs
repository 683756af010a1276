use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use garments_core::{Aggregate, AggregateRoot, DomainError, Event, Money, UserId, define_id};
use garments_inventory::ProductId;
use garments_parties::ContactId;

use crate::line::{InvoiceLine, InvoiceLineInput, InvoiceTotals, compute_lines};

define_id!(
    /// Invoice identifier (sales or purchase).
    InvoiceId,
    "InvoiceId"
);

define_id!(PaymentId, "PaymentId");

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    PartiallyPaid,
    Overdue,
    Cancelled,
    Void,
}

impl InvoiceStatus {
    pub fn accepts_payment(self) -> bool {
        matches!(
            self,
            InvoiceStatus::Sent | InvoiceStatus::PartiallyPaid | InvoiceStatus::Overdue
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "Draft",
            InvoiceStatus::Sent => "Sent",
            InvoiceStatus::Paid => "Paid",
            InvoiceStatus::PartiallyPaid => "PartiallyPaid",
            InvoiceStatus::Overdue => "Overdue",
            InvoiceStatus::Cancelled => "Cancelled",
            InvoiceStatus::Void => "Void",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub recorded_by: UserId,
    pub recorded_at: DateTime<Utc>,
}

/// `{prefix}-{yyyy}-{nnnn}`, one past the highest sequence used this year.
pub fn next_invoice_number<'a>(
    prefix: &str,
    today: NaiveDate,
    existing: impl IntoIterator<Item = &'a str>,
) -> String {
    let head = format!("{prefix}-{}-", today.year());
    let highest = existing
        .into_iter()
        .filter_map(|n| n.strip_prefix(head.as_str()))
        .filter_map(|seq| seq.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("{head}{:04}", highest + 1)
}

/// Quantity and net (post-discount) value of one product across an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductQuantity {
    pub product_id: ProductId,
    pub quantity: i64,
    pub net_amount: Money,
}

impl ProductQuantity {
    pub fn unit_cost(&self) -> Money {
        self.net_amount.saturating_scale(1, self.quantity.max(1))
    }
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub number: String,
    pub contact_id: ContactId,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<InvoiceLine>,
    pub totals: InvoiceTotals,
    pub status: InvoiceStatus,
    pub payments: Vec<Payment>,
    pub status_reason: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            number: String::new(),
            contact_id: ContactId::from_uuid(uuid::Uuid::nil()),
            invoice_date: NaiveDate::MIN,
            due_date: NaiveDate::MIN,
            reference: None,
            notes: None,
            lines: Vec::new(),
            totals: InvoiceTotals::default(),
            status: InvoiceStatus::Draft,
            payments: Vec::new(),
            status_reason: None,
            created_by: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn balance(&self) -> Money {
        self.totals.balance_amount
    }

    /// Product lines merged per product, in product id order.
    pub fn product_quantities(&self) -> Vec<ProductQuantity> {
        let mut merged: BTreeMap<ProductId, ProductQuantity> = BTreeMap::new();
        for line in &self.lines {
            let Some(product_id) = line.product_id else {
                continue;
            };
            let entry = merged.entry(product_id).or_insert(ProductQuantity {
                product_id,
                quantity: 0,
                net_amount: Money::ZERO,
            });
            entry.quantity += line.quantity;
            entry.net_amount += line.gross_amount() - line.discount_amount;
        }
        merged.into_values().collect()
    }

    /// Sent (or part-paid) invoices whose due date has passed.
    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        matches!(self.status, InvoiceStatus::Sent | InvoiceStatus::PartiallyPaid) && self.due_date < today
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Header and lines shared by create and draft edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub contact_id: ContactId,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub lines: Vec<InvoiceLineInput>,
}

/// Command: CreateInvoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub invoice_id: InvoiceId,
    pub number: String,
    pub draft: InvoiceDraft,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub payment_id: PaymentId,
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    Create(CreateInvoice),
    UpdateDraft { draft: InvoiceDraft, occurred_at: DateTime<Utc> },
    Issue { occurred_at: DateTime<Utc> },
    RecordPayment(RecordPayment),
    MarkOverdue { today: NaiveDate, occurred_at: DateTime<Utc> },
    Cancel { reason: Option<String>, occurred_at: DateTime<Utc> },
    Void { reason: Option<String>, occurred_at: DateTime<Utc> },
}

/// Event: InvoiceCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub invoice_id: InvoiceId,
    pub number: String,
    pub contact_id: ContactId,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<InvoiceLine>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    Created(InvoiceCreated),
    DraftUpdated {
        contact_id: ContactId,
        invoice_date: NaiveDate,
        due_date: NaiveDate,
        reference: Option<String>,
        notes: Option<String>,
        lines: Vec<InvoiceLine>,
        occurred_at: DateTime<Utc>,
    },
    Issued { occurred_at: DateTime<Utc> },
    PaymentRecorded(Payment),
    MarkedOverdue { occurred_at: DateTime<Utc> },
    Cancelled { reason: Option<String>, occurred_at: DateTime<Utc> },
    Voided { reason: Option<String>, occurred_at: DateTime<Utc> },
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::Created(_) => "invoicing.invoice.created",
            InvoiceEvent::DraftUpdated { .. } => "invoicing.invoice.draft_updated",
            InvoiceEvent::Issued { .. } => "invoicing.invoice.issued",
            InvoiceEvent::PaymentRecorded(_) => "invoicing.invoice.payment_recorded",
            InvoiceEvent::MarkedOverdue { .. } => "invoicing.invoice.marked_overdue",
            InvoiceEvent::Cancelled { .. } => "invoicing.invoice.cancelled",
            InvoiceEvent::Voided { .. } => "invoicing.invoice.voided",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::Created(e) => e.occurred_at,
            InvoiceEvent::PaymentRecorded(p) => p.recorded_at,
            InvoiceEvent::DraftUpdated { occurred_at, .. }
            | InvoiceEvent::Issued { occurred_at }
            | InvoiceEvent::MarkedOverdue { occurred_at }
            | InvoiceEvent::Cancelled { occurred_at, .. }
            | InvoiceEvent::Voided { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::Created(e) => {
                self.id = e.invoice_id;
                self.number = e.number.clone();
                self.contact_id = e.contact_id;
                self.invoice_date = e.invoice_date;
                self.due_date = e.due_date;
                self.reference = e.reference.clone();
                self.notes = e.notes.clone();
                self.lines = e.lines.clone();
                self.totals = InvoiceTotals::from_lines(&e.lines, Money::ZERO);
                self.status = InvoiceStatus::Draft;
                self.created_by = Some(e.created_by);
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            InvoiceEvent::DraftUpdated {
                contact_id,
                invoice_date,
                due_date,
                reference,
                notes,
                lines,
                occurred_at,
            } => {
                self.contact_id = *contact_id;
                self.invoice_date = *invoice_date;
                self.due_date = *due_date;
                self.reference = reference.clone();
                self.notes = notes.clone();
                self.lines = lines.clone();
                self.totals = InvoiceTotals::from_lines(lines, self.totals.paid_amount);
                self.updated_at = Some(*occurred_at);
            }
            InvoiceEvent::Issued { occurred_at } => {
                self.status = InvoiceStatus::Sent;
                self.updated_at = Some(*occurred_at);
            }
            InvoiceEvent::PaymentRecorded(p) => {
                self.payments.push(p.clone());
                let paid = self.totals.paid_amount + p.amount;
                self.totals = InvoiceTotals::from_lines(&self.lines, paid);
                self.status = if self.totals.balance_amount.is_positive() {
                    InvoiceStatus::PartiallyPaid
                } else {
                    InvoiceStatus::Paid
                };
                self.updated_at = Some(p.recorded_at);
            }
            InvoiceEvent::MarkedOverdue { occurred_at } => {
                self.status = InvoiceStatus::Overdue;
                self.updated_at = Some(*occurred_at);
            }
            InvoiceEvent::Cancelled { reason, occurred_at } => {
                self.status = InvoiceStatus::Cancelled;
                self.status_reason = reason.clone();
                self.updated_at = Some(*occurred_at);
            }
            InvoiceEvent::Voided { reason, occurred_at } => {
                self.status = InvoiceStatus::Void;
                self.status_reason = reason.clone();
                self.updated_at = Some(*occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::Create(cmd) => self.handle_create(cmd),
            InvoiceCommand::UpdateDraft { draft, occurred_at } => {
                self.ensure_created()?;
                if self.status != InvoiceStatus::Draft {
                    return Err(DomainError::invariant("only draft invoices can be edited"));
                }
                let lines = check_draft(draft)?;
                Ok(vec![InvoiceEvent::DraftUpdated {
                    contact_id: draft.contact_id,
                    invoice_date: draft.invoice_date,
                    due_date: draft.due_date,
                    reference: draft.reference.clone(),
                    notes: draft.notes.clone(),
                    lines,
                    occurred_at: *occurred_at,
                }])
            }
            InvoiceCommand::Issue { occurred_at } => {
                self.ensure_created()?;
                if self.status != InvoiceStatus::Draft {
                    return Err(self.transition_error("issued"));
                }
                Ok(vec![InvoiceEvent::Issued {
                    occurred_at: *occurred_at,
                }])
            }
            InvoiceCommand::RecordPayment(cmd) => self.handle_payment(cmd),
            InvoiceCommand::MarkOverdue { today, occurred_at } => {
                self.ensure_created()?;
                if !self.is_past_due(*today) {
                    return Err(DomainError::invariant(format!(
                        "invoice {} is not past due",
                        self.number
                    )));
                }
                Ok(vec![InvoiceEvent::MarkedOverdue {
                    occurred_at: *occurred_at,
                }])
            }
            InvoiceCommand::Cancel { reason, occurred_at } => {
                self.ensure_created()?;
                if !matches!(self.status, InvoiceStatus::Draft | InvoiceStatus::Sent) {
                    return Err(self.transition_error("cancelled"));
                }
                Ok(vec![InvoiceEvent::Cancelled {
                    reason: reason.clone(),
                    occurred_at: *occurred_at,
                }])
            }
            InvoiceCommand::Void { reason, occurred_at } => {
                self.ensure_created()?;
                if !matches!(
                    self.status,
                    InvoiceStatus::Sent | InvoiceStatus::PartiallyPaid | InvoiceStatus::Overdue
                ) {
                    return Err(self.transition_error("voided"));
                }
                Ok(vec![InvoiceEvent::Voided {
                    reason: reason.clone(),
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

fn check_draft(draft: &InvoiceDraft) -> Result<Vec<InvoiceLine>, DomainError> {
    if draft.due_date < draft.invoice_date {
        return Err(DomainError::validation("Due date cannot be before the invoice date"));
    }
    compute_lines(&draft.lines)
}

impl Invoice {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("invoice"));
        }
        Ok(())
    }

    fn transition_error(&self, verb: &str) -> DomainError {
        DomainError::invariant(format!(
            "a {} invoice cannot be {verb}",
            self.status.name().to_lowercase()
        ))
    }

    fn handle_create(&self, cmd: &CreateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty"));
        }
        let lines = check_draft(&cmd.draft)?;
        Ok(vec![InvoiceEvent::Created(InvoiceCreated {
            invoice_id: cmd.invoice_id,
            number: cmd.number.clone(),
            contact_id: cmd.draft.contact_id,
            invoice_date: cmd.draft.invoice_date,
            due_date: cmd.draft.due_date,
            reference: cmd.draft.reference.clone(),
            notes: cmd.draft.notes.clone(),
            lines,
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_payment(&self, cmd: &RecordPayment) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_created()?;
        if !self.status.accepts_payment() {
            return Err(DomainError::invariant(format!(
                "cannot record a payment on a {} invoice",
                self.status.name().to_lowercase()
            )));
        }
        if !cmd.amount.is_positive() {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if cmd.amount > self.balance() {
            return Err(DomainError::invariant(format!(
                "payment of {} exceeds the outstanding balance of {}",
                cmd.amount,
                self.balance()
            )));
        }
        Ok(vec![InvoiceEvent::PaymentRecorded(Payment {
            id: cmd.payment_id,
            amount: cmd.amount,
            payment_date: cmd.payment_date,
            method: cmd.method.clone(),
            reference: cmd.reference.clone(),
            recorded_by: cmd.recorded_by,
            recorded_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garments_core::execute;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn draft(qty: i64, price: i64) -> InvoiceDraft {
        InvoiceDraft {
            contact_id: ContactId::new(),
            invoice_date: date(2024, 6, 1),
            due_date: date(2024, 6, 30),
            reference: None,
            notes: None,
            lines: vec![InvoiceLineInput {
                product_id: None,
                description: "T-shirt".into(),
                quantity: qty,
                unit: None,
                unit_price: Money::from_minor(price),
                discount_percentage: 0.0,
                tax_percentage: 0.0,
            }],
        }
    }

    fn created(qty: i64, price: i64) -> Invoice {
        let inv_id = InvoiceId::new();
        let mut inv = Invoice::empty(inv_id);
        execute(
            &mut inv,
            &InvoiceCommand::Create(CreateInvoice {
                invoice_id: inv_id,
                number: "INV-2024-0001".into(),
                draft: draft(qty, price),
                created_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        inv
    }

    fn pay(amount: i64) -> InvoiceCommand {
        InvoiceCommand::RecordPayment(RecordPayment {
            payment_id: PaymentId::new(),
            amount: Money::from_minor(amount),
            payment_date: date(2024, 6, 10),
            method: Some("Cash".into()),
            reference: None,
            recorded_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn numbering_is_per_year() {
        let today = date(2024, 6, 1);
        assert_eq!(next_invoice_number("INV", today, []), "INV-2024-0001");
        assert_eq!(
            next_invoice_number("PINV", today, ["PINV-2024-0009", "PINV-2023-0100", "INV-2024-0500"]),
            "PINV-2024-0010"
        );
    }

    #[test]
    fn due_date_must_not_precede_invoice_date() {
        let mut d = draft(1, 100);
        d.due_date = date(2024, 5, 1);
        let cmd = InvoiceCommand::Create(CreateInvoice {
            invoice_id: InvoiceId::new(),
            number: "INV-2024-0001".into(),
            draft: d,
            created_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            Invoice::empty(InvoiceId::new()).handle(&cmd),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn payments_move_through_partial_to_paid() {
        let mut inv = created(4, 2_500);
        assert!(inv.handle(&pay(100)).is_err(), "drafts cannot be paid");

        execute(&mut inv, &InvoiceCommand::Issue { occurred_at: Utc::now() }).unwrap();
        assert_eq!(inv.status, InvoiceStatus::Sent);

        execute(&mut inv, &pay(4_000)).unwrap();
        assert_eq!(inv.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(inv.balance(), Money::from_minor(6_000));

        assert!(inv.handle(&pay(6_001)).is_err());
        execute(&mut inv, &pay(6_000)).unwrap();
        assert_eq!(inv.status, InvoiceStatus::Paid);
        assert_eq!(inv.payments.len(), 2);

        let void = InvoiceCommand::Void { reason: None, occurred_at: Utc::now() };
        assert!(inv.handle(&void).is_err());
    }

    #[test]
    fn product_lines_are_merged() {
        let product = ProductId::new();
        let mut d = draft(2, 1_000);
        d.lines[0].product_id = Some(product);
        d.lines[0].discount_percentage = 10.0;
        let mut second = d.lines[0].clone();
        second.quantity = 3;
        second.discount_percentage = 0.0;
        d.lines.push(second);
        let mut service = d.lines[0].clone();
        service.product_id = None;
        d.lines.push(service);

        let inv_id = InvoiceId::new();
        let mut inv = Invoice::empty(inv_id);
        execute(
            &mut inv,
            &InvoiceCommand::Create(CreateInvoice {
                invoice_id: inv_id,
                number: "INV-2024-0002".into(),
                draft: d,
                created_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let merged = inv.product_quantities();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].quantity, 5);
        assert_eq!(merged[0].net_amount, Money::from_minor(4_800));
        assert_eq!(merged[0].unit_cost(), Money::from_minor(960));
    }

    #[test]
    fn overdue_cancel_and_void_rules() {
        let mut inv = created(1, 1_000);
        let edit = InvoiceCommand::UpdateDraft { draft: draft(2, 1_000), occurred_at: Utc::now() };
        execute(&mut inv, &edit).unwrap();
        assert_eq!(inv.totals.total_amount, Money::from_minor(2_000));

        execute(&mut inv, &InvoiceCommand::Issue { occurred_at: Utc::now() }).unwrap();
        assert!(inv.handle(&edit).is_err());

        let early = InvoiceCommand::MarkOverdue { today: date(2024, 6, 15), occurred_at: Utc::now() };
        assert!(inv.handle(&early).is_err());
        let late = InvoiceCommand::MarkOverdue { today: date(2024, 7, 1), occurred_at: Utc::now() };
        execute(&mut inv, &late).unwrap();
        assert_eq!(inv.status, InvoiceStatus::Overdue);

        let cancel = InvoiceCommand::Cancel { reason: None, occurred_at: Utc::now() };
        assert!(inv.handle(&cancel).is_err());
        execute(
            &mut inv,
            &InvoiceCommand::Void { reason: Some("duplicate".into()), occurred_at: Utc::now() },
        )
        .unwrap();
        assert_eq!(inv.status, InvoiceStatus::Void);
        assert_eq!(inv.status_reason.as_deref(), Some("duplicate"));
    }
}
