use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use garments_core::{Aggregate, AggregateRoot, DomainError, Event, Money, UserId, define_id};

use crate::product::ProductId;
use crate::warehouse::WarehouseId;

define_id!(
    /// Stock item identifier (one per product and warehouse).
    StockItemId,
    "StockItemId"
);

define_id!(StockMovementId, "StockMovementId");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementType {
    Purchase,
    Sale,
    Adjustment,
    Transfer,
    Opening,
    Closing,
    Scrap,
    Return,
}

impl MovementType {
    pub fn is_inbound(self) -> bool {
        matches!(
            self,
            MovementType::Purchase | MovementType::Opening | MovementType::Return | MovementType::Transfer
        )
    }

    pub fn is_outbound(self) -> bool {
        matches!(
            self,
            MovementType::Sale | MovementType::Scrap | MovementType::Transfer | MovementType::Closing
        )
    }
}

/// Context recorded with every movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementDetails {
    pub reference: Option<String>,
    pub description: Option<String>,
    pub movement_date: NaiveDate,
    pub created_by: UserId,
    pub invoice_id: Option<uuid::Uuid>,
    pub occurred_at: DateTime<Utc>,
}

/// One recorded stock movement. `quantity` is signed (issues are negative).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: StockMovementId,
    pub stock_item_id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub unit_cost: Money,
    pub balance_after: i64,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub movement_date: NaiveDate,
    pub created_by: UserId,
    pub invoice_id: Option<uuid::Uuid>,
    pub occurred_at: DateTime<Utc>,
}

/// Aggregate root: StockItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity_in_stock: i64,
    pub reorder_level: i64,
    pub maximum_level: Option<i64>,
    pub average_cost: Money,
    pub last_updated: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl StockItem {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: StockItemId) -> Self {
        Self {
            id,
            product_id: ProductId::from_uuid(uuid::Uuid::nil()),
            warehouse_id: WarehouseId::from_uuid(uuid::Uuid::nil()),
            quantity_in_stock: 0,
            reorder_level: 0,
            maximum_level: None,
            average_cost: Money::ZERO,
            last_updated: None,
            version: 0,
            created: false,
        }
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_low(&self) -> bool {
        self.quantity_in_stock <= self.reorder_level
    }

    /// `quantity_in_stock * average_cost`.
    pub fn value(&self) -> Money {
        self.average_cost.saturating_scale(self.quantity_in_stock, 1)
    }
}

impl AggregateRoot for StockItem {
    type Id = StockItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenStockItem {
    pub stock_item_id: StockItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub reorder_level: i64,
    pub maximum_level: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    Open(OpenStockItem),
    Receive {
        movement_type: MovementType,
        quantity: i64,
        unit_cost: Money,
        details: MovementDetails,
    },
    Issue {
        movement_type: MovementType,
        quantity: i64,
        details: MovementDetails,
    },
    Adjust {
        delta: i64,
        details: MovementDetails,
    },
    SetLevels {
        reorder_level: i64,
        maximum_level: Option<i64>,
        occurred_at: DateTime<Utc>,
    },
}

/// A stock command addressed by product and warehouse rather than stock item.
///
/// Integrations (invoices) raise these; the caller resolves or opens the
/// matching [`StockItem`] before executing the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRequest {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub command: StockCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    Opened(OpenStockItem),
    Moved {
        movement: StockMovement,
        average_cost: Money,
    },
    LevelsChanged {
        reorder_level: i64,
        maximum_level: Option<i64>,
        occurred_at: DateTime<Utc>,
    },
}

impl StockEvent {
    pub fn movement(&self) -> Option<&StockMovement> {
        match self {
            StockEvent::Moved { movement, .. } => Some(movement),
            _ => None,
        }
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::Opened(_) => "inventory.stock.opened",
            StockEvent::Moved { .. } => "inventory.stock.moved",
            StockEvent::LevelsChanged { .. } => "inventory.stock.levels_changed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::Opened(e) => e.occurred_at,
            StockEvent::Moved { movement, .. } => movement.occurred_at,
            StockEvent::LevelsChanged { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for StockItem {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::Opened(e) => {
                self.id = e.stock_item_id;
                self.product_id = e.product_id;
                self.warehouse_id = e.warehouse_id;
                self.reorder_level = e.reorder_level;
                self.maximum_level = e.maximum_level;
                self.last_updated = Some(e.occurred_at);
                self.created = true;
            }
            StockEvent::Moved { movement, average_cost } => {
                self.quantity_in_stock = movement.balance_after;
                self.average_cost = *average_cost;
                self.last_updated = Some(movement.occurred_at);
            }
            StockEvent::LevelsChanged {
                reorder_level,
                maximum_level,
                occurred_at,
            } => {
                self.reorder_level = *reorder_level;
                self.maximum_level = *maximum_level;
                self.last_updated = Some(*occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::Open(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("stock item already exists"));
                }
                check_levels(cmd.reorder_level, cmd.maximum_level)?;
                Ok(vec![StockEvent::Opened(cmd.clone())])
            }
            StockCommand::Receive {
                movement_type,
                quantity,
                unit_cost,
                details,
            } => {
                self.ensure_created()?;
                if !movement_type.is_inbound() {
                    return Err(DomainError::validation(format!(
                        "{movement_type:?} is not a receiving movement"
                    )));
                }
                if *quantity <= 0 {
                    return Err(DomainError::validation("quantity must be positive"));
                }
                if unit_cost.is_negative() {
                    return Err(DomainError::validation("unit cost cannot be negative"));
                }
                let too_large = || DomainError::validation("amount too large");
                let new_qty = self.quantity_in_stock.checked_add(*quantity).ok_or_else(too_large)?;
                let held = self.quantity_in_stock.max(0);
                let value = self
                    .average_cost
                    .scale(held, 1)
                    .zip(unit_cost.scale(*quantity, 1))
                    .and_then(|(on_hand, received)| on_hand.checked_add(received))
                    .ok_or_else(too_large)?;
                let average_cost = held
                    .checked_add(*quantity)
                    .and_then(|units| value.scale(1, units))
                    .ok_or_else(too_large)?;
                Ok(vec![self.moved(*movement_type, *quantity, *unit_cost, new_qty, average_cost, details)])
            }
            StockCommand::Issue {
                movement_type,
                quantity,
                details,
            } => {
                self.ensure_created()?;
                if !movement_type.is_outbound() {
                    return Err(DomainError::validation(format!(
                        "{movement_type:?} is not an issuing movement"
                    )));
                }
                if *quantity <= 0 {
                    return Err(DomainError::validation("quantity must be positive"));
                }
                let new_qty = self.quantity_in_stock - quantity;
                if new_qty < 0 {
                    return Err(DomainError::invariant(format!(
                        "insufficient stock: {} available, {} requested",
                        self.quantity_in_stock, quantity
                    )));
                }
                Ok(vec![self.moved(
                    *movement_type,
                    -quantity,
                    self.average_cost,
                    new_qty,
                    self.average_cost,
                    details,
                )])
            }
            StockCommand::Adjust { delta, details } => {
                self.ensure_created()?;
                if *delta == 0 {
                    return Err(DomainError::validation("delta cannot be zero"));
                }
                let new_qty = self
                    .quantity_in_stock
                    .checked_add(*delta)
                    .ok_or_else(|| DomainError::validation("quantity too large"))?;
                if new_qty < 0 {
                    return Err(DomainError::invariant("stock cannot go negative"));
                }
                Ok(vec![self.moved(
                    MovementType::Adjustment,
                    *delta,
                    self.average_cost,
                    new_qty,
                    self.average_cost,
                    details,
                )])
            }
            StockCommand::SetLevels {
                reorder_level,
                maximum_level,
                occurred_at,
            } => {
                self.ensure_created()?;
                check_levels(*reorder_level, *maximum_level)?;
                Ok(vec![StockEvent::LevelsChanged {
                    reorder_level: *reorder_level,
                    maximum_level: *maximum_level,
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

fn check_levels(reorder_level: i64, maximum_level: Option<i64>) -> Result<(), DomainError> {
    if reorder_level < 0 {
        return Err(DomainError::validation("reorder level cannot be negative"));
    }
    if maximum_level.is_some_and(|max| max < reorder_level) {
        return Err(DomainError::validation("maximum level cannot be below the reorder level"));
    }
    Ok(())
}

impl StockItem {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("stock item"));
        }
        Ok(())
    }

    fn moved(
        &self,
        movement_type: MovementType,
        quantity: i64,
        unit_cost: Money,
        balance_after: i64,
        average_cost: Money,
        details: &MovementDetails,
    ) -> StockEvent {
        StockEvent::Moved {
            movement: StockMovement {
                id: StockMovementId::new(),
                stock_item_id: self.id,
                product_id: self.product_id,
                warehouse_id: self.warehouse_id,
                movement_type,
                quantity,
                unit_cost,
                balance_after,
                reference: details.reference.clone(),
                description: details.description.clone(),
                movement_date: details.movement_date,
                created_by: details.created_by,
                invoice_id: details.invoice_id,
                occurred_at: details.occurred_at,
            },
            average_cost,
        }
    }
}

/// Stock value held in one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseValuation {
    pub warehouse_id: WarehouseId,
    pub item_count: usize,
    pub total_quantity: i64,
    pub total_value: Money,
}

pub fn valuation<'a>(items: impl IntoIterator<Item = &'a StockItem>) -> Vec<WarehouseValuation> {
    let mut by_warehouse: std::collections::BTreeMap<WarehouseId, WarehouseValuation> = Default::default();
    for item in items {
        let v = by_warehouse
            .entry(item.warehouse_id)
            .or_insert_with(|| WarehouseValuation {
                warehouse_id: item.warehouse_id,
                item_count: 0,
                total_quantity: 0,
                total_value: Money::ZERO,
            });
        v.item_count += 1;
        v.total_quantity += item.quantity_in_stock;
        v.total_value += item.value();
    }
    by_warehouse.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use garments_core::execute;
    use proptest::prelude::*;

    fn details() -> MovementDetails {
        MovementDetails {
            reference: Some("GRN-1".into()),
            description: None,
            movement_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            created_by: UserId::new(),
            invoice_id: None,
            occurred_at: Utc::now(),
        }
    }

    fn opened(warehouse_id: WarehouseId) -> StockItem {
        let mut item = StockItem::empty(StockItemId::new());
        let cmd = StockCommand::Open(OpenStockItem {
            stock_item_id: item.id,
            product_id: ProductId::new(),
            warehouse_id,
            reorder_level: 10,
            maximum_level: Some(500),
            occurred_at: Utc::now(),
        });
        execute(&mut item, &cmd).unwrap();
        item
    }

    fn receive(qty: i64, cost: i64) -> StockCommand {
        StockCommand::Receive {
            movement_type: MovementType::Purchase,
            quantity: qty,
            unit_cost: Money::from_minor(cost),
            details: details(),
        }
    }

    #[test]
    fn receipts_use_moving_average_cost() {
        let mut item = opened(WarehouseId::new());
        execute(&mut item, &receive(100, 250)).unwrap();
        execute(&mut item, &receive(100, 350)).unwrap();
        assert_eq!(item.quantity_in_stock, 200);
        assert_eq!(item.average_cost, Money::from_minor(300));
        assert_eq!(item.value(), Money::from_minor(60_000));
    }

    #[test]
    fn issues_cannot_overdraw() {
        let mut item = opened(WarehouseId::new());
        execute(&mut item, &receive(5, 100)).unwrap();
        let issue = StockCommand::Issue {
            movement_type: MovementType::Sale,
            quantity: 6,
            details: details(),
        };
        assert!(matches!(item.handle(&issue), Err(DomainError::InvariantViolation(_))));

        let events = execute(
            &mut item,
            &StockCommand::Issue {
                movement_type: MovementType::Sale,
                quantity: 5,
                details: details(),
            },
        )
        .unwrap();
        let movement = events[0].movement().unwrap();
        assert_eq!(movement.quantity, -5);
        assert_eq!(movement.balance_after, 0);
        assert!(item.is_low());
    }

    #[test]
    fn adjustments_and_direction_rules() {
        let mut item = opened(WarehouseId::new());
        let zero = StockCommand::Adjust { delta: 0, details: details() };
        assert!(item.handle(&zero).is_err());
        let negative = StockCommand::Adjust { delta: -1, details: details() };
        assert!(item.handle(&negative).is_err());
        let wrong = StockCommand::Receive {
            movement_type: MovementType::Sale,
            quantity: 1,
            unit_cost: Money::ZERO,
            details: details(),
        };
        assert!(item.handle(&wrong).is_err());

        execute(&mut item, &StockCommand::Adjust { delta: 12, details: details() }).unwrap();
        assert_eq!(item.quantity_in_stock, 12);
        assert!(!item.is_low());
    }

    #[test]
    fn receipts_too_large_to_value_are_rejected() {
        let mut item = opened(WarehouseId::new());
        execute(&mut item, &receive(10, 100)).unwrap();

        let huge = receive(4_000_000_000, 4_000_000_000_000);
        assert_eq!(item.handle(&huge), Err(DomainError::validation("amount too large")));

        let past_max = StockCommand::Adjust { delta: i64::MAX, details: details() };
        assert!(matches!(item.handle(&past_max), Err(DomainError::Validation(_))));
        assert_eq!(item.quantity_in_stock, 10);
    }

    #[test]
    fn valuation_groups_by_warehouse() {
        let w1 = WarehouseId::new();
        let w2 = WarehouseId::new();
        let mut a = opened(w1);
        let mut b = opened(w1);
        let mut c = opened(w2);
        execute(&mut a, &receive(10, 100)).unwrap();
        execute(&mut b, &receive(3, 1_000)).unwrap();
        execute(&mut c, &receive(1, 50)).unwrap();
        let v = valuation([&a, &b, &c]);
        let first = v.iter().find(|x| x.warehouse_id == w1).unwrap();
        assert_eq!(first.item_count, 2);
        assert_eq!(first.total_quantity, 13);
        assert_eq!(first.total_value, Money::from_minor(4_000));
    }

    proptest! {
        #[test]
        fn average_cost_stays_within_receipt_costs(receipts in prop::collection::vec((1i64..1_000, 1i64..100_000), 1..10)) {
            let mut item = opened(WarehouseId::new());
            for (qty, cost) in &receipts {
                execute(&mut item, &receive(*qty, *cost)).unwrap();
            }
            let lo = receipts.iter().map(|r| r.1).min().unwrap();
            let hi = receipts.iter().map(|r| r.1).max().unwrap();
            prop_assert!(item.average_cost.minor() >= lo && item.average_cost.minor() <= hi);
            prop_assert_eq!(item.quantity_in_stock, receipts.iter().map(|r| r.0).sum::<i64>());
        }
    }
}
