use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockflow_auth::Role;
use stockflow_core::{BranchId, ProductId, SupplierId};
use stockflow_inventory::{
    AlertStatus, InventoryItem, InventoryItemId, ItemKey, StockAlert, StockAlertId,
    StockMovement, StockReservation,
};
use stockflow_purchasing::{
    GoodsReceipt, GoodsReceiptId, GoodsReceiptItem, PurchaseApproval, PurchaseOrder,
    PurchaseOrderId, PurchaseOrderItem, PurchaseOrderStatus, Supplier, SupplierProduct,
};

use super::{DocumentSequence, PendingApproval, Store, StoreError, StoreResult, StoreTx};

#[derive(Debug, Default, Clone)]
struct Tables {
    items: BTreeMap<InventoryItemId, InventoryItem>,
    movements: Vec<StockMovement>,
    reservations: HashMap<(InventoryItemId, String), StockReservation>,
    alerts: BTreeMap<StockAlertId, StockAlert>,
    suppliers: HashMap<SupplierId, Supplier>,
    supplier_products: HashMap<(SupplierId, ProductId), SupplierProduct>,
    orders: BTreeMap<PurchaseOrderId, PurchaseOrder>,
    order_items: Vec<PurchaseOrderItem>,
    approvals: Vec<PurchaseApproval>,
    receipts: BTreeMap<GoodsReceiptId, GoodsReceipt>,
    receipt_items: Vec<GoodsReceiptItem>,
    sequences: HashMap<DocumentSequence, i64>,
}

/// In-memory store.
///
/// Intended for tests/dev. A transaction holds the single table lock for its
/// whole lifetime and works on a staged copy, so transactions are fully
/// serialised and a dropped transaction leaves nothing behind.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTx { guard, staged }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

fn missing(what: &str, id: impl core::fmt::Display) -> StoreError {
    StoreError::Database(format!("{what} {id} does not exist"))
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn lock_item(&mut self, id: InventoryItemId) -> StoreResult<Option<InventoryItem>> {
        self.find_item(id).await
    }

    async fn find_item(&mut self, id: InventoryItemId) -> StoreResult<Option<InventoryItem>> {
        Ok(self.staged.items.get(&id).cloned())
    }

    async fn lock_item_by_key(&mut self, key: &ItemKey) -> StoreResult<Option<InventoryItem>> {
        self.find_item_by_key(key).await
    }

    async fn find_item_by_key(&mut self, key: &ItemKey) -> StoreResult<Option<InventoryItem>> {
        Ok(self.staged.items.values().find(|i| &i.key == key).cloned())
    }

    async fn insert_item(&mut self, item: &InventoryItem) -> StoreResult<()> {
        if self.staged.items.values().any(|i| i.key == item.key) {
            return Err(StoreError::UniqueViolation(format!(
                "inventory item for product {} at branch {} already exists",
                item.key.product_id, item.key.branch_id
            )));
        }
        if self.staged.items.contains_key(&item.id) {
            return Err(StoreError::UniqueViolation(format!("inventory item {}", item.id)));
        }
        self.staged.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn update_item(&mut self, item: &InventoryItem) -> StoreResult<()> {
        let slot = self
            .staged
            .items
            .get_mut(&item.id)
            .ok_or_else(|| missing("inventory item", item.id))?;
        *slot = item.clone();
        Ok(())
    }

    async fn list_reorder_candidates(
        &mut self,
        branch_id: Option<BranchId>,
    ) -> StoreResult<Vec<InventoryItem>> {
        Ok(self
            .staged
            .items
            .values()
            .filter(|i| branch_id.is_none_or(|b| i.key.branch_id == b))
            .filter(|i| i.needs_reorder())
            .cloned()
            .collect())
    }

    async fn average_unit_cost(&mut self, product_id: ProductId) -> StoreResult<Option<Decimal>> {
        let costs: Vec<Decimal> = self
            .staged
            .items
            .values()
            .filter(|i| i.key.product_id == product_id && i.unit_cost > Decimal::ZERO)
            .map(|i| i.unit_cost)
            .collect();
        if costs.is_empty() {
            return Ok(None);
        }
        let total: Decimal = costs.iter().sum();
        Ok(Some((total / Decimal::from(costs.len())).round_dp(4)))
    }

    async fn insert_movement(&mut self, movement: &StockMovement) -> StoreResult<()> {
        if !self.staged.items.contains_key(&movement.item_id) {
            return Err(missing("inventory item", movement.item_id));
        }
        self.staged.movements.push(movement.clone());
        Ok(())
    }

    async fn list_movements(&mut self, item_id: InventoryItemId) -> StoreResult<Vec<StockMovement>> {
        Ok(self
            .staged
            .movements
            .iter()
            .filter(|m| m.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn lock_reservation(
        &mut self,
        item_id: InventoryItemId,
        reference_id: &str,
    ) -> StoreResult<Option<StockReservation>> {
        Ok(self
            .staged
            .reservations
            .get(&(item_id, reference_id.to_string()))
            .cloned())
    }

    async fn upsert_reservation(&mut self, reservation: &StockReservation) -> StoreResult<()> {
        self.staged.reservations.insert(
            (reservation.item_id, reservation.reference_id.clone()),
            reservation.clone(),
        );
        Ok(())
    }

    async fn delete_reservation(&mut self, item_id: InventoryItemId, reference_id: &str) -> StoreResult<()> {
        self.staged.reservations.remove(&(item_id, reference_id.to_string()));
        Ok(())
    }

    async fn lock_alert(&mut self, id: StockAlertId) -> StoreResult<Option<StockAlert>> {
        Ok(self.staged.alerts.get(&id).cloned())
    }

    async fn find_alert(&mut self, id: StockAlertId) -> StoreResult<Option<StockAlert>> {
        self.lock_alert(id).await
    }

    async fn lock_active_alert(
        &mut self,
        product_id: ProductId,
        branch_id: BranchId,
    ) -> StoreResult<Option<StockAlert>> {
        Ok(self
            .staged
            .alerts
            .values()
            .find(|a| {
                a.status == AlertStatus::Active
                    && a.product_id == product_id
                    && a.branch_id == branch_id
            })
            .cloned())
    }

    async fn insert_alert(&mut self, alert: &StockAlert) -> StoreResult<bool> {
        let duplicate_active = alert.status == AlertStatus::Active
            && self.staged.alerts.values().any(|a| {
                a.status == AlertStatus::Active
                    && a.product_id == alert.product_id
                    && a.branch_id == alert.branch_id
            });
        if duplicate_active {
            return Ok(false);
        }
        self.staged.alerts.insert(alert.id, alert.clone());
        Ok(true)
    }

    async fn update_alert(&mut self, alert: &StockAlert) -> StoreResult<()> {
        let slot = self
            .staged
            .alerts
            .get_mut(&alert.id)
            .ok_or_else(|| missing("stock alert", alert.id))?;
        *slot = alert.clone();
        Ok(())
    }

    async fn find_supplier(&mut self, id: SupplierId) -> StoreResult<Option<Supplier>> {
        Ok(self.staged.suppliers.get(&id).cloned())
    }

    async fn lock_supplier(&mut self, id: SupplierId) -> StoreResult<Option<Supplier>> {
        self.find_supplier(id).await
    }

    async fn upsert_supplier(&mut self, supplier: &Supplier) -> StoreResult<()> {
        self.staged.suppliers.insert(supplier.id, supplier.clone());
        Ok(())
    }

    async fn upsert_supplier_product(&mut self, offer: &SupplierProduct) -> StoreResult<()> {
        if !self.staged.suppliers.contains_key(&offer.supplier_id) {
            return Err(missing("supplier", offer.supplier_id));
        }
        self.staged
            .supplier_products
            .insert((offer.supplier_id, offer.product_id), offer.clone());
        Ok(())
    }

    async fn find_supplier_product(
        &mut self,
        supplier_id: SupplierId,
        product_id: ProductId,
    ) -> StoreResult<Option<SupplierProduct>> {
        Ok(self
            .staged
            .supplier_products
            .get(&(supplier_id, product_id))
            .cloned())
    }

    async fn list_offers(
        &mut self,
        product_id: ProductId,
    ) -> StoreResult<Vec<(Supplier, SupplierProduct)>> {
        Ok(self
            .staged
            .supplier_products
            .values()
            .filter(|o| o.product_id == product_id)
            .filter_map(|o| {
                self.staged
                    .suppliers
                    .get(&o.supplier_id)
                    .map(|s| (s.clone(), o.clone()))
            })
            .collect())
    }

    async fn next_sequence(&mut self, sequence: DocumentSequence) -> StoreResult<i64> {
        let counter = self.staged.sequences.entry(sequence).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn insert_order(
        &mut self,
        order: &PurchaseOrder,
        items: &[PurchaseOrderItem],
    ) -> StoreResult<()> {
        if self.staged.orders.values().any(|o| o.po_number == order.po_number) {
            return Err(StoreError::UniqueViolation(format!(
                "po_number {}",
                order.po_number
            )));
        }
        if !self.staged.suppliers.contains_key(&order.supplier_id) {
            return Err(missing("supplier", order.supplier_id));
        }
        self.staged.orders.insert(order.id, order.clone());
        self.staged.order_items.extend(items.iter().cloned());
        Ok(())
    }

    async fn lock_order(&mut self, id: PurchaseOrderId) -> StoreResult<Option<PurchaseOrder>> {
        self.find_order(id).await
    }

    async fn find_order(&mut self, id: PurchaseOrderId) -> StoreResult<Option<PurchaseOrder>> {
        Ok(self.staged.orders.get(&id).cloned())
    }

    async fn update_order(&mut self, order: &PurchaseOrder) -> StoreResult<()> {
        let slot = self
            .staged
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| missing("purchase order", order.id))?;
        *slot = order.clone();
        Ok(())
    }

    async fn order_items(&mut self, id: PurchaseOrderId) -> StoreResult<Vec<PurchaseOrderItem>> {
        Ok(self
            .staged
            .order_items
            .iter()
            .filter(|i| i.purchase_order_id == id)
            .cloned()
            .collect())
    }

    async fn insert_approvals(&mut self, approvals: &[PurchaseApproval]) -> StoreResult<()> {
        for row in approvals {
            let clash = self.staged.approvals.iter().any(|a| {
                a.purchase_order_id == row.purchase_order_id
                    && a.approval_level == row.approval_level
            });
            if clash {
                return Err(StoreError::UniqueViolation(format!(
                    "approval level {} for order {}",
                    row.approval_level, row.purchase_order_id
                )));
            }
            self.staged.approvals.push(row.clone());
        }
        Ok(())
    }

    async fn lock_pending_approval(
        &mut self,
        order_id: PurchaseOrderId,
        role: &Role,
    ) -> StoreResult<Option<PurchaseApproval>> {
        Ok(self
            .staged
            .approvals
            .iter()
            .filter(|a| a.purchase_order_id == order_id && a.is_pending())
            .filter(|a| a.required_role.matches(role))
            .min_by_key(|a| a.approval_level)
            .cloned())
    }

    async fn update_approval(&mut self, approval: &PurchaseApproval) -> StoreResult<()> {
        let slot = self
            .staged
            .approvals
            .iter_mut()
            .find(|a| a.id == approval.id)
            .ok_or_else(|| missing("approval", approval.id))?;
        *slot = approval.clone();
        Ok(())
    }

    async fn count_pending_approvals(&mut self, order_id: PurchaseOrderId) -> StoreResult<i64> {
        let pending = self
            .staged
            .approvals
            .iter()
            .filter(|a| a.purchase_order_id == order_id && a.is_pending())
            .count();
        Ok(pending as i64)
    }

    async fn approvals_for(&mut self, order_id: PurchaseOrderId) -> StoreResult<Vec<PurchaseApproval>> {
        let mut rows: Vec<PurchaseApproval> = self
            .staged
            .approvals
            .iter()
            .filter(|a| a.purchase_order_id == order_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.approval_level);
        Ok(rows)
    }

    async fn pending_approvals_for_role(&mut self, role: &Role) -> StoreResult<Vec<PendingApproval>> {
        Ok(self
            .staged
            .approvals
            .iter()
            .filter(|a| a.is_pending() && a.required_role.matches(role))
            .filter_map(|a| {
                self.staged
                    .orders
                    .get(&a.purchase_order_id)
                    .filter(|o| o.status == PurchaseOrderStatus::PendingApproval)
                    .map(|o| PendingApproval {
                        approval: a.clone(),
                        order: o.clone(),
                    })
            })
            .collect())
    }

    async fn find_receipt_for_order(
        &mut self,
        order_id: PurchaseOrderId,
    ) -> StoreResult<Option<GoodsReceipt>> {
        Ok(self
            .staged
            .receipts
            .values()
            .find(|r| r.purchase_order_id == order_id)
            .cloned())
    }

    async fn insert_receipt(
        &mut self,
        receipt: &GoodsReceipt,
        items: &[GoodsReceiptItem],
    ) -> StoreResult<()> {
        let clash = self.staged.receipts.values().any(|r| {
            r.purchase_order_id == receipt.purchase_order_id
                || r.receipt_number == receipt.receipt_number
        });
        if clash {
            return Err(StoreError::UniqueViolation(format!(
                "goods receipt for order {}",
                receipt.purchase_order_id
            )));
        }
        self.staged.receipts.insert(receipt.id, receipt.clone());
        self.staged.receipt_items.extend(items.iter().cloned());
        Ok(())
    }

    async fn lock_receipt(&mut self, id: GoodsReceiptId) -> StoreResult<Option<GoodsReceipt>> {
        Ok(self.staged.receipts.get(&id).cloned())
    }

    async fn find_receipt(&mut self, id: GoodsReceiptId) -> StoreResult<Option<GoodsReceipt>> {
        self.lock_receipt(id).await
    }

    async fn update_receipt(&mut self, receipt: &GoodsReceipt) -> StoreResult<()> {
        let slot = self
            .staged
            .receipts
            .get_mut(&receipt.id)
            .ok_or_else(|| missing("goods receipt", receipt.id))?;
        *slot = receipt.clone();
        Ok(())
    }

    async fn receipt_items(&mut self, id: GoodsReceiptId) -> StoreResult<Vec<GoodsReceiptItem>> {
        Ok(self
            .staged
            .receipt_items
            .iter()
            .filter(|i| i.goods_receipt_id == id)
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
