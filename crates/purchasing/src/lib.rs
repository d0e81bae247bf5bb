//! Purchasing domain module.
//!
//! Purchase orders and their approval workflow, supplier scoring, and goods
//! receipt reconciliation, as deterministic domain logic (no IO, no storage).

pub mod approval;
pub mod events;
pub mod order;
pub mod receipt;
pub mod supplier;

pub use approval::{
    ApprovalAction, ApprovalMatrix, ApprovalTier, PurchaseApproval, PurchaseApprovalId,
};
pub use events::{
    GoodsReceiptRecorded, PurchaseOrderApproved, PurchaseOrderCreated, PurchaseOrderRejected,
    PurchaseOrderStatusChanged, PurchaseOrderSubmitted, PurchasingEvent,
};
pub use order::{
    NewPurchaseOrder, NewPurchaseOrderLine, PricedLine, PurchaseOrder, PurchaseOrderId,
    PurchaseOrderItem, PurchaseOrderItemId, PurchaseOrderStatus, PurchaseTotals, Urgency,
    checked_total, document_number, line_amount,
};
pub use receipt::{
    GoodsReceipt, GoodsReceiptId, GoodsReceiptItem, GoodsReceiptItemId, QualityCheckStatus,
    ReceiveGoods, ReceiveLine, delivery_score,
};
pub use supplier::{
    MAX_RECOMMENDATIONS, RecommendationReason, Supplier, SupplierProduct, SupplierRecommendation,
    recommend_suppliers, supplier_score,
};
