use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{BranchId, ProductId, UserId};
use stockflow_events::Event;

use crate::alert::{StockAlert, StockAlertId};
use crate::item::InventoryItemId;
use crate::movement::{MovementType, StockMovement, StockMovementId};

/// Event: StockAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub item_id: InventoryItemId,
    pub movement_id: StockMovementId,
    pub movement_type: MovementType,
    pub delta: i64,
    pub new_quantity: i64,
    pub performed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl From<&StockMovement> for StockAdjusted {
    fn from(m: &StockMovement) -> Self {
        Self {
            item_id: m.item_id,
            movement_id: m.id,
            movement_type: m.movement_type,
            delta: m.quantity,
            new_quantity: m.new_quantity,
            performed_by: m.performed_by,
            occurred_at: m.created_at,
        }
    }
}

/// Event: LowStockAlertRaised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlertRaised {
    pub alert_id: StockAlertId,
    pub product_id: ProductId,
    pub branch_id: BranchId,
    pub current_stock: i64,
    pub reorder_point: i64,
    pub suggested_reorder_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

impl From<&StockAlert> for LowStockAlertRaised {
    fn from(a: &StockAlert) -> Self {
        Self {
            alert_id: a.id,
            product_id: a.product_id,
            branch_id: a.branch_id,
            current_stock: a.current_stock,
            reorder_point: a.reorder_point,
            suggested_reorder_quantity: a.suggested_reorder_quantity,
            occurred_at: a.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum InventoryEvent {
    StockAdjusted(StockAdjusted),
    LowStockAlertRaised(LowStockAlertRaised),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::StockAdjusted(_) => "inventory.stock.adjusted",
            InventoryEvent::LowStockAlertRaised(_) => "inventory.alert.raised",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::StockAdjusted(e) => e.occurred_at,
            InventoryEvent::LowStockAlertRaised(e) => e.occurred_at,
        }
    }

    fn subject_id(&self) -> uuid::Uuid {
        match self {
            InventoryEvent::StockAdjusted(e) => *e.item_id.as_uuid(),
            InventoryEvent::LowStockAlertRaised(e) => *e.alert_id.as_uuid(),
        }
    }
}
