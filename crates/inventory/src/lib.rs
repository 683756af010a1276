//! Inventory module (products, warehouses, stock levels and movements).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod product;
pub mod stock;
pub mod warehouse;

pub use product::{Product, ProductId, ProductInput};
pub use stock::{
    MovementDetails, MovementType, OpenStockItem, StockCommand, StockEvent, StockItem, StockItemId,
    StockMovement, StockMovementId, StockRequest, WarehouseValuation, valuation,
};
pub use warehouse::{Warehouse, WarehouseId, WarehouseInput};
