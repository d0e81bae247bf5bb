//! Inventory domain module.
//!
//! Ledger rules for branch stock: adjustments and their movement rows,
//! reservations, and low-stock alerts. Pure domain logic (no IO, no storage);
//! transactions and locking live in `stockflow-infra`.

pub mod alert;
pub mod events;
pub mod item;
pub mod movement;
pub mod reservation;

pub use alert::{AlertDecision, AlertSeverity, AlertStatus, StockAlert, StockAlertId};
pub use events::{InventoryEvent, LowStockAlertRaised, StockAdjusted};
pub use item::{AdjustStock, InventoryItem, InventoryItemId, ItemKey, StockThresholds};
pub use movement::{MovementReference, MovementType, StockMovement, StockMovementId};
pub use reservation::{StockReservation, validate_reference};
