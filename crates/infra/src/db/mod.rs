//! Persistence: transactional storage for the ledger and procurement tables.
//!
//! Every service operation runs inside exactly one [`StoreTx`]. `lock_*`
//! methods take a row write lock held until commit or drop; `find_*` methods
//! read without locking. Dropping a transaction without calling
//! [`StoreTx::commit`] rolls it back.
//!
//! Two adapters implement the traits:
//! - [`InMemoryStore`]: serialised copy-on-write transactions, for tests and dev
//! - [`PgStore`]: Postgres via `sqlx`, `SELECT … FOR UPDATE` row locks

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use stockflow_auth::Role;
use stockflow_core::{BranchId, ProductId, SupplierId};
use stockflow_inventory::{
    InventoryItem, InventoryItemId, ItemKey, StockAlert, StockAlertId, StockMovement,
    StockReservation,
};
use stockflow_purchasing::{
    GoodsReceipt, GoodsReceiptId, GoodsReceiptItem, PurchaseApproval, PurchaseOrder,
    PurchaseOrderId, PurchaseOrderItem, Supplier, SupplierProduct,
};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write (duplicate key, second active alert, ...).
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A persisted row could not be mapped back to a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Counters behind the human-readable document numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentSequence {
    PurchaseOrder,
    GoodsReceipt,
}

impl DocumentSequence {
    pub fn prefix(self) -> &'static str {
        match self {
            DocumentSequence::PurchaseOrder => "PO",
            DocumentSequence::GoodsReceipt => "GR",
        }
    }
}

/// A pending approval row together with its order, for approver queues.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingApproval {
    pub approval: PurchaseApproval,
    pub order: PurchaseOrder,
}

/// Entry point: hands out transactions.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

/// One database transaction.
#[async_trait]
pub trait StoreTx: Send {
    // --- inventory items ---
    async fn lock_item(&mut self, id: InventoryItemId) -> StoreResult<Option<InventoryItem>>;
    async fn find_item(&mut self, id: InventoryItemId) -> StoreResult<Option<InventoryItem>>;
    async fn lock_item_by_key(&mut self, key: &ItemKey) -> StoreResult<Option<InventoryItem>>;
    async fn find_item_by_key(&mut self, key: &ItemKey) -> StoreResult<Option<InventoryItem>>;
    async fn insert_item(&mut self, item: &InventoryItem) -> StoreResult<()>;
    async fn update_item(&mut self, item: &InventoryItem) -> StoreResult<()>;
    /// Active items at or below a configured reorder point, optionally for one branch.
    async fn list_reorder_candidates(
        &mut self,
        branch_id: Option<BranchId>,
    ) -> StoreResult<Vec<InventoryItem>>;
    /// Mean `unit_cost` over this product's items with a non-zero cost.
    async fn average_unit_cost(&mut self, product_id: ProductId) -> StoreResult<Option<Decimal>>;

    // --- movements ---
    async fn insert_movement(&mut self, movement: &StockMovement) -> StoreResult<()>;
    /// Oldest first.
    async fn list_movements(&mut self, item_id: InventoryItemId) -> StoreResult<Vec<StockMovement>>;

    // --- reservations ---
    async fn lock_reservation(
        &mut self,
        item_id: InventoryItemId,
        reference_id: &str,
    ) -> StoreResult<Option<StockReservation>>;
    async fn upsert_reservation(&mut self, reservation: &StockReservation) -> StoreResult<()>;
    async fn delete_reservation(&mut self, item_id: InventoryItemId, reference_id: &str) -> StoreResult<()>;

    // --- alerts ---
    async fn lock_alert(&mut self, id: StockAlertId) -> StoreResult<Option<StockAlert>>;
    async fn find_alert(&mut self, id: StockAlertId) -> StoreResult<Option<StockAlert>>;
    async fn lock_active_alert(
        &mut self,
        product_id: ProductId,
        branch_id: BranchId,
    ) -> StoreResult<Option<StockAlert>>;
    /// Insert unless an active alert for the same product and branch exists.
    /// Returns whether the row was written.
    async fn insert_alert(&mut self, alert: &StockAlert) -> StoreResult<bool>;
    async fn update_alert(&mut self, alert: &StockAlert) -> StoreResult<()>;

    // --- suppliers ---
    async fn find_supplier(&mut self, id: SupplierId) -> StoreResult<Option<Supplier>>;
    async fn lock_supplier(&mut self, id: SupplierId) -> StoreResult<Option<Supplier>>;
    async fn upsert_supplier(&mut self, supplier: &Supplier) -> StoreResult<()>;
    async fn upsert_supplier_product(&mut self, offer: &SupplierProduct) -> StoreResult<()>;
    async fn find_supplier_product(
        &mut self,
        supplier_id: SupplierId,
        product_id: ProductId,
    ) -> StoreResult<Option<SupplierProduct>>;
    /// Every offer for the product, with its supplier.
    async fn list_offers(
        &mut self,
        product_id: ProductId,
    ) -> StoreResult<Vec<(Supplier, SupplierProduct)>>;

    // --- purchase orders ---
    async fn next_sequence(&mut self, sequence: DocumentSequence) -> StoreResult<i64>;
    async fn insert_order(
        &mut self,
        order: &PurchaseOrder,
        items: &[PurchaseOrderItem],
    ) -> StoreResult<()>;
    async fn lock_order(&mut self, id: PurchaseOrderId) -> StoreResult<Option<PurchaseOrder>>;
    async fn find_order(&mut self, id: PurchaseOrderId) -> StoreResult<Option<PurchaseOrder>>;
    async fn update_order(&mut self, order: &PurchaseOrder) -> StoreResult<()>;
    async fn order_items(&mut self, id: PurchaseOrderId) -> StoreResult<Vec<PurchaseOrderItem>>;

    // --- approvals ---
    async fn insert_approvals(&mut self, approvals: &[PurchaseApproval]) -> StoreResult<()>;
    /// Lowest-level unresolved row for `role` (case-insensitive), locked.
    async fn lock_pending_approval(
        &mut self,
        order_id: PurchaseOrderId,
        role: &Role,
    ) -> StoreResult<Option<PurchaseApproval>>;
    async fn update_approval(&mut self, approval: &PurchaseApproval) -> StoreResult<()>;
    async fn count_pending_approvals(&mut self, order_id: PurchaseOrderId) -> StoreResult<i64>;
    /// Ascending by level.
    async fn approvals_for(&mut self, order_id: PurchaseOrderId) -> StoreResult<Vec<PurchaseApproval>>;
    /// Unresolved rows for `role` on orders still pending approval.
    async fn pending_approvals_for_role(&mut self, role: &Role) -> StoreResult<Vec<PendingApproval>>;

    // --- goods receipts ---
    async fn find_receipt_for_order(
        &mut self,
        order_id: PurchaseOrderId,
    ) -> StoreResult<Option<GoodsReceipt>>;
    async fn insert_receipt(
        &mut self,
        receipt: &GoodsReceipt,
        items: &[GoodsReceiptItem],
    ) -> StoreResult<()>;
    async fn lock_receipt(&mut self, id: GoodsReceiptId) -> StoreResult<Option<GoodsReceipt>>;
    async fn find_receipt(&mut self, id: GoodsReceiptId) -> StoreResult<Option<GoodsReceipt>>;
    async fn update_receipt(&mut self, receipt: &GoodsReceipt) -> StoreResult<()>;
    async fn receipt_items(&mut self, id: GoodsReceiptId) -> StoreResult<Vec<GoodsReceiptItem>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
