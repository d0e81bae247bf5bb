use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockflow_core::{BranchId, SupplierId, UserId};
use stockflow_events::Event;

use crate::order::{PurchaseOrderId, PurchaseOrderStatus, Urgency};
use crate::receipt::GoodsReceiptId;

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub order_id: PurchaseOrderId,
    pub po_number: String,
    pub supplier_id: SupplierId,
    pub branch_id: BranchId,
    pub urgency: Urgency,
    pub total_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderSubmitted {
    pub order_id: PurchaseOrderId,
    /// Roles that must sign off, by ascending level.
    pub required_roles: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderApproved (every approval row resolved).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderApproved {
    pub order_id: PurchaseOrderId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderRejected {
    pub order_id: PurchaseOrderId,
    pub rejected_by: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderStatusChanged (fulfilment and cancellation moves).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderStatusChanged {
    pub order_id: PurchaseOrderId,
    pub from: PurchaseOrderStatus,
    pub to: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsReceiptRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceiptRecorded {
    pub receipt_id: GoodsReceiptId,
    pub order_id: PurchaseOrderId,
    pub receipt_number: String,
    pub has_discrepancies: bool,
    pub total_received_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum PurchasingEvent {
    OrderCreated(PurchaseOrderCreated),
    OrderSubmitted(PurchaseOrderSubmitted),
    OrderApproved(PurchaseOrderApproved),
    OrderRejected(PurchaseOrderRejected),
    OrderStatusChanged(PurchaseOrderStatusChanged),
    ReceiptRecorded(GoodsReceiptRecorded),
}

impl Event for PurchasingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchasingEvent::OrderCreated(_) => "purchasing.order.created",
            PurchasingEvent::OrderSubmitted(_) => "purchasing.order.submitted",
            PurchasingEvent::OrderApproved(_) => "purchasing.order.approved",
            PurchasingEvent::OrderRejected(_) => "purchasing.order.rejected",
            PurchasingEvent::OrderStatusChanged(_) => "purchasing.order.status_changed",
            PurchasingEvent::ReceiptRecorded(_) => "purchasing.receipt.recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchasingEvent::OrderCreated(e) => e.occurred_at,
            PurchasingEvent::OrderSubmitted(e) => e.occurred_at,
            PurchasingEvent::OrderApproved(e) => e.occurred_at,
            PurchasingEvent::OrderRejected(e) => e.occurred_at,
            PurchasingEvent::OrderStatusChanged(e) => e.occurred_at,
            PurchasingEvent::ReceiptRecorded(e) => e.occurred_at,
        }
    }

    fn subject_id(&self) -> uuid::Uuid {
        match self {
            PurchasingEvent::OrderCreated(e) => e.order_id.into(),
            PurchasingEvent::OrderSubmitted(e) => e.order_id.into(),
            PurchasingEvent::OrderApproved(e) => e.order_id.into(),
            PurchasingEvent::OrderRejected(e) => e.order_id.into(),
            PurchasingEvent::OrderStatusChanged(e) => e.order_id.into(),
            PurchasingEvent::ReceiptRecorded(e) => e.receipt_id.into(),
        }
    }
}
