//! Postgres-backed store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` |
//! | Database (other) | any other | `Database` |
//! | PoolClosed / Other | N/A | `Database` |
//!
//! ## Locking
//!
//! `lock_*` methods issue `SELECT … FOR UPDATE`; the row lock lives until the
//! transaction commits or rolls back. Callers lock inventory items in ascending
//! id order and a purchase order before its approval rows.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

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

use super::{DocumentSequence, PendingApproval, Store, StoreError, StoreResult, StoreTx};

mod rows;

use rows::{
    ALERT_COLUMNS, APPROVAL_COLUMNS, AlertRow, ApprovalRow, ITEM_COLUMNS, ItemRow,
    MOVEMENT_COLUMNS, MovementRow, OFFER_COLUMNS, ORDER_COLUMNS, ORDER_ITEM_COLUMNS, OfferRow,
    OrderItemRow, OrderRow, RECEIPT_COLUMNS, RECEIPT_ITEM_COLUMNS, ReceiptItemRow, ReceiptRow,
    ReservationRow, SUPPLIER_COLUMNS, SupplierRow,
};

/// Connection pool handle; cheap to clone.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `url`.
    pub async fn connect(url: &str, min_connections: u32, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("migrations failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PgTx { tx }))
    }
}

/// An open Postgres transaction. Rolls back on drop.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    async fn fetch_item(&mut self, id: InventoryItemId, lock: bool) -> StoreResult<Option<InventoryItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE id = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row: Option<ItemRow> = sqlx::query_as(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("fetch_item", e))?;
        row.map(InventoryItem::try_from).transpose()
    }

    async fn fetch_item_by_key(&mut self, key: &ItemKey, lock: bool) -> StoreResult<Option<InventoryItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items \
             WHERE product_id = $1 AND branch_id = $2 \
               AND COALESCE(batch_number, '') = COALESCE($3, ''){}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row: Option<ItemRow> = sqlx::query_as(&sql)
            .bind(Uuid::from(key.product_id))
            .bind(Uuid::from(key.branch_id))
            .bind(key.batch_number.clone())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("fetch_item_by_key", e))?;
        row.map(InventoryItem::try_from).transpose()
    }

    async fn fetch_supplier(&mut self, id: SupplierId, lock: bool) -> StoreResult<Option<Supplier>> {
        let sql = format!(
            "SELECT {SUPPLIER_COLUMNS} FROM suppliers WHERE id = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row: Option<SupplierRow> = sqlx::query_as(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("fetch_supplier", e))?;
        Ok(row.map(Supplier::from))
    }

    async fn fetch_order(&mut self, id: PurchaseOrderId, lock: bool) -> StoreResult<Option<PurchaseOrder>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM purchase_orders WHERE id = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("fetch_order", e))?;
        row.map(PurchaseOrder::try_from).transpose()
    }

    async fn fetch_alert(&mut self, id: StockAlertId, lock: bool) -> StoreResult<Option<StockAlert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM stock_alerts WHERE id = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row: Option<AlertRow> = sqlx::query_as(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("fetch_alert", e))?;
        row.map(StockAlert::try_from).transpose()
    }

    async fn fetch_receipt(&mut self, id: GoodsReceiptId, lock: bool) -> StoreResult<Option<GoodsReceipt>> {
        let sql = format!(
            "SELECT {RECEIPT_COLUMNS} FROM goods_receipts WHERE id = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row: Option<ReceiptRow> = sqlx::query_as(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("fetch_receipt", e))?;
        row.map(GoodsReceipt::try_from).transpose()
    }
}

#[async_trait]
impl StoreTx for PgTx {
    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn lock_item(&mut self, id: InventoryItemId) -> StoreResult<Option<InventoryItem>> {
        self.fetch_item(id, true).await
    }

    async fn find_item(&mut self, id: InventoryItemId) -> StoreResult<Option<InventoryItem>> {
        self.fetch_item(id, false).await
    }

    #[instrument(skip(self), fields(product_id = %key.product_id, branch_id = %key.branch_id), err)]
    async fn lock_item_by_key(&mut self, key: &ItemKey) -> StoreResult<Option<InventoryItem>> {
        self.fetch_item_by_key(key, true).await
    }

    async fn find_item_by_key(&mut self, key: &ItemKey) -> StoreResult<Option<InventoryItem>> {
        self.fetch_item_by_key(key, false).await
    }

    #[instrument(skip(self, item), fields(item_id = %item.id), err)]
    async fn insert_item(&mut self, item: &InventoryItem) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_items (
                id, product_id, branch_id, batch_number, current_stock, reserved_stock,
                min_stock_level, max_stock_level, reorder_point, reorder_quantity, unit_cost,
                expiration_date, location, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(Uuid::from(item.id))
        .bind(Uuid::from(item.key.product_id))
        .bind(Uuid::from(item.key.branch_id))
        .bind(item.key.batch_number.clone())
        .bind(item.current_stock())
        .bind(item.reserved_stock())
        .bind(item.thresholds.min_stock_level)
        .bind(item.thresholds.max_stock_level)
        .bind(item.thresholds.reorder_point)
        .bind(item.thresholds.reorder_quantity)
        .bind(item.unit_cost)
        .bind(item.expiration_date)
        .bind(item.location.clone())
        .bind(item.is_active)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(())
    }

    #[instrument(skip(self, item), fields(item_id = %item.id), err)]
    async fn update_item(&mut self, item: &InventoryItem) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE inventory_items
            SET current_stock = $2, reserved_stock = $3, min_stock_level = $4,
                max_stock_level = $5, reorder_point = $6, reorder_quantity = $7,
                unit_cost = $8, expiration_date = $9, location = $10, is_active = $11,
                updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(item.id))
        .bind(item.current_stock())
        .bind(item.reserved_stock())
        .bind(item.thresholds.min_stock_level)
        .bind(item.thresholds.max_stock_level)
        .bind(item.thresholds.reorder_point)
        .bind(item.thresholds.reorder_quantity)
        .bind(item.unit_cost)
        .bind(item.expiration_date)
        .bind(item.location.clone())
        .bind(item.is_active)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_item", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_reorder_candidates(
        &mut self,
        branch_id: Option<BranchId>,
    ) -> StoreResult<Vec<InventoryItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items \
             WHERE is_active AND reorder_point > 0 AND current_stock <= reorder_point \
               AND ($1::uuid IS NULL OR branch_id = $1) \
             ORDER BY id"
        );
        let rows: Vec<ItemRow> = sqlx::query_as(&sql)
            .bind(branch_id.map(Uuid::from))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_reorder_candidates", e))?;
        rows.into_iter().map(InventoryItem::try_from).collect()
    }

    async fn average_unit_cost(&mut self, product_id: ProductId) -> StoreResult<Option<Decimal>> {
        let avg: Option<Decimal> = sqlx::query_scalar(
            "SELECT AVG(unit_cost) FROM inventory_items WHERE product_id = $1 AND unit_cost > 0",
        )
        .bind(Uuid::from(product_id))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("average_unit_cost", e))?;
        Ok(avg.map(|a| a.round_dp(4)))
    }

    #[instrument(skip(self, movement), fields(movement_id = %movement.id), err)]
    async fn insert_movement(&mut self, movement: &StockMovement) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, inventory_item_id, movement_type, quantity, previous_quantity, new_quantity,
                reference_type, reference_id, notes, performed_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(Uuid::from(movement.id))
        .bind(Uuid::from(movement.item_id))
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity)
        .bind(movement.previous_quantity)
        .bind(movement.new_quantity)
        .bind(movement.reference.reference_type.clone())
        .bind(movement.reference.reference_id.clone())
        .bind(movement.notes.clone())
        .bind(Uuid::from(movement.performed_by))
        .bind(movement.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;
        Ok(())
    }

    async fn list_movements(&mut self, item_id: InventoryItemId) -> StoreResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE inventory_item_id = $1 ORDER BY created_at, id"
        );
        let rows: Vec<MovementRow> = sqlx::query_as(&sql)
            .bind(Uuid::from(item_id))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_movements", e))?;
        rows.into_iter().map(StockMovement::try_from).collect()
    }

    async fn lock_reservation(
        &mut self,
        item_id: InventoryItemId,
        reference_id: &str,
    ) -> StoreResult<Option<StockReservation>> {
        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            SELECT inventory_item_id, reference_id, quantity, updated_at
            FROM stock_reservations
            WHERE inventory_item_id = $1 AND reference_id = $2
            FOR UPDATE
            "#,
        )
        .bind(Uuid::from(item_id))
        .bind(reference_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_reservation", e))?;
        Ok(row.map(StockReservation::from))
    }

    async fn upsert_reservation(&mut self, reservation: &StockReservation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_reservations (inventory_item_id, reference_id, quantity, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (inventory_item_id, reference_id)
            DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(Uuid::from(reservation.item_id))
        .bind(reservation.reference_id.as_str())
        .bind(reservation.quantity)
        .bind(reservation.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_reservation", e))?;
        Ok(())
    }

    async fn delete_reservation(&mut self, item_id: InventoryItemId, reference_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM stock_reservations WHERE inventory_item_id = $1 AND reference_id = $2")
            .bind(Uuid::from(item_id))
            .bind(reference_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_reservation", e))?;
        Ok(())
    }

    async fn lock_alert(&mut self, id: StockAlertId) -> StoreResult<Option<StockAlert>> {
        self.fetch_alert(id, true).await
    }

    async fn find_alert(&mut self, id: StockAlertId) -> StoreResult<Option<StockAlert>> {
        self.fetch_alert(id, false).await
    }

    async fn lock_active_alert(
        &mut self,
        product_id: ProductId,
        branch_id: BranchId,
    ) -> StoreResult<Option<StockAlert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM stock_alerts \
             WHERE product_id = $1 AND branch_id = $2 AND status = 'active' \
             FOR UPDATE"
        );
        let row: Option<AlertRow> = sqlx::query_as(&sql)
            .bind(Uuid::from(product_id))
            .bind(Uuid::from(branch_id))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_active_alert", e))?;
        row.map(StockAlert::try_from).transpose()
    }

    #[instrument(skip(self, alert), fields(alert_id = %alert.id), err)]
    async fn insert_alert(&mut self, alert: &StockAlert) -> StoreResult<bool> {
        // A concurrent raise for the same product and branch waits on the
        // partial unique index and then skips instead of failing.
        let result = sqlx::query(
            r#"
            INSERT INTO stock_alerts (
                id, product_id, branch_id, inventory_item_id, current_stock, reorder_point,
                suggested_reorder_quantity, status, purchase_order_id, processed_by,
                processed_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (product_id, branch_id) WHERE status = 'active' DO NOTHING
            "#,
        )
        .bind(Uuid::from(alert.id))
        .bind(Uuid::from(alert.product_id))
        .bind(Uuid::from(alert.branch_id))
        .bind(Uuid::from(alert.item_id))
        .bind(alert.current_stock)
        .bind(alert.reorder_point)
        .bind(alert.suggested_reorder_quantity)
        .bind(alert.status.as_str())
        .bind(alert.purchase_order_id)
        .bind(alert.processed_by.map(Uuid::from))
        .bind(alert.processed_at)
        .bind(alert.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_alert", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_alert(&mut self, alert: &StockAlert) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE stock_alerts
            SET current_stock = $2, reorder_point = $3, suggested_reorder_quantity = $4,
                status = $5, purchase_order_id = $6, processed_by = $7, processed_at = $8
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(alert.id))
        .bind(alert.current_stock)
        .bind(alert.reorder_point)
        .bind(alert.suggested_reorder_quantity)
        .bind(alert.status.as_str())
        .bind(alert.purchase_order_id)
        .bind(alert.processed_by.map(Uuid::from))
        .bind(alert.processed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_alert", e))?;
        Ok(())
    }

    async fn find_supplier(&mut self, id: SupplierId) -> StoreResult<Option<Supplier>> {
        self.fetch_supplier(id, false).await
    }

    async fn lock_supplier(&mut self, id: SupplierId) -> StoreResult<Option<Supplier>> {
        self.fetch_supplier(id, true).await
    }

    #[instrument(skip(self, supplier), fields(supplier_id = %supplier.id), err)]
    async fn upsert_supplier(&mut self, supplier: &Supplier) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO suppliers (
                id, name, supplier_type, quality_rating, delivery_rating, price_competitiveness,
                lead_time_days, minimum_order_amount, is_active, rated_deliveries,
                rated_inspections, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                supplier_type = EXCLUDED.supplier_type,
                quality_rating = EXCLUDED.quality_rating,
                delivery_rating = EXCLUDED.delivery_rating,
                price_competitiveness = EXCLUDED.price_competitiveness,
                lead_time_days = EXCLUDED.lead_time_days,
                minimum_order_amount = EXCLUDED.minimum_order_amount,
                is_active = EXCLUDED.is_active,
                rated_deliveries = EXCLUDED.rated_deliveries,
                rated_inspections = EXCLUDED.rated_inspections,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(Uuid::from(supplier.id))
        .bind(supplier.name.as_str())
        .bind(supplier.supplier_type.as_str())
        .bind(supplier.quality_rating)
        .bind(supplier.delivery_rating)
        .bind(supplier.price_competitiveness)
        .bind(supplier.lead_time_days)
        .bind(supplier.minimum_order_amount)
        .bind(supplier.is_active)
        .bind(supplier.rated_deliveries)
        .bind(supplier.rated_inspections)
        .bind(supplier.created_at)
        .bind(supplier.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_supplier", e))?;
        Ok(())
    }

    async fn upsert_supplier_product(&mut self, offer: &SupplierProduct) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO supplier_products (
                supplier_id, product_id, unit_cost, minimum_quantity, lead_time_days, is_preferred
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (supplier_id, product_id) DO UPDATE SET
                unit_cost = EXCLUDED.unit_cost,
                minimum_quantity = EXCLUDED.minimum_quantity,
                lead_time_days = EXCLUDED.lead_time_days,
                is_preferred = EXCLUDED.is_preferred
            "#,
        )
        .bind(Uuid::from(offer.supplier_id))
        .bind(Uuid::from(offer.product_id))
        .bind(offer.unit_cost)
        .bind(offer.minimum_quantity)
        .bind(offer.lead_time_days)
        .bind(offer.is_preferred)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_supplier_product", e))?;
        Ok(())
    }

    async fn find_supplier_product(
        &mut self,
        supplier_id: SupplierId,
        product_id: ProductId,
    ) -> StoreResult<Option<SupplierProduct>> {
        let sql = format!(
            "SELECT {OFFER_COLUMNS} FROM supplier_products WHERE supplier_id = $1 AND product_id = $2"
        );
        let row: Option<OfferRow> = sqlx::query_as(&sql)
            .bind(Uuid::from(supplier_id))
            .bind(Uuid::from(product_id))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_supplier_product", e))?;
        Ok(row.map(SupplierProduct::from))
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn list_offers(
        &mut self,
        product_id: ProductId,
    ) -> StoreResult<Vec<(Supplier, SupplierProduct)>> {
        let sql = format!(
            "SELECT {OFFER_COLUMNS} FROM supplier_products WHERE product_id = $1 ORDER BY supplier_id"
        );
        let offers: Vec<OfferRow> = sqlx::query_as(&sql)
            .bind(Uuid::from(product_id))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_offers", e))?;
        if offers.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = offers.iter().map(|o| o.supplier_id).collect();
        let sql = format!("SELECT {SUPPLIER_COLUMNS} FROM suppliers WHERE id = ANY($1)");
        let suppliers: Vec<SupplierRow> = sqlx::query_as(&sql)
            .bind(&ids[..])
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_offers", e))?;
        let mut by_id: HashMap<SupplierId, Supplier> = suppliers
            .into_iter()
            .map(Supplier::from)
            .map(|s| (s.id, s))
            .collect();

        Ok(offers
            .into_iter()
            .map(SupplierProduct::from)
            .filter_map(|offer| by_id.remove(&offer.supplier_id).map(|s| (s, offer)))
            .collect())
    }

    async fn next_sequence(&mut self, sequence: DocumentSequence) -> StoreResult<i64> {
        let sql = match sequence {
            DocumentSequence::PurchaseOrder => "SELECT nextval('purchase_order_number_seq')",
            DocumentSequence::GoodsReceipt => "SELECT nextval('goods_receipt_number_seq')",
        };
        sqlx::query_scalar(sql)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("next_sequence", e))
    }

    #[instrument(skip(self, order, items), fields(order_id = %order.id, po_number = %order.po_number), err)]
    async fn insert_order(
        &mut self,
        order: &PurchaseOrder,
        items: &[PurchaseOrderItem],
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO purchase_orders (
                id, po_number, supplier_id, branch_id, requested_by, status, urgency,
                subtotal, tax_amount, discount_amount, shipping_cost, total_amount,
                required_date, expected_delivery_date, source_alert_id, notes,
                submitted_at, approved_by, approved_at, sent_by, sent_at, confirmed_at,
                shipped_at, received_at, cancelled_by, cancelled_at, cancelled_reason,
                created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29
            )
            "#,
        )
        .bind(Uuid::from(order.id))
        .bind(order.po_number.as_str())
        .bind(Uuid::from(order.supplier_id))
        .bind(Uuid::from(order.branch_id))
        .bind(Uuid::from(order.requested_by))
        .bind(order.status.as_str())
        .bind(order.urgency.as_str())
        .bind(order.totals.subtotal)
        .bind(order.totals.tax_amount)
        .bind(order.totals.discount_amount)
        .bind(order.totals.shipping_cost)
        .bind(order.totals.total_amount)
        .bind(order.required_date)
        .bind(order.expected_delivery_date)
        .bind(order.source_alert_id.map(Uuid::from))
        .bind(order.notes.clone())
        .bind(order.submitted_at)
        .bind(order.approved_by.map(Uuid::from))
        .bind(order.approved_at)
        .bind(order.sent_by.map(Uuid::from))
        .bind(order.sent_at)
        .bind(order.confirmed_at)
        .bind(order.shipped_at)
        .bind(order.received_at)
        .bind(order.cancelled_by.map(Uuid::from))
        .bind(order.cancelled_at)
        .bind(order.cancelled_reason.clone())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO purchase_order_items (
                    id, purchase_order_id, product_id, quantity_ordered, unit_cost, line_total
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::from(item.id))
            .bind(Uuid::from(item.purchase_order_id))
            .bind(Uuid::from(item.product_id))
            .bind(item.quantity_ordered)
            .bind(item.unit_cost)
            .bind(item.line_total)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_item", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn lock_order(&mut self, id: PurchaseOrderId) -> StoreResult<Option<PurchaseOrder>> {
        self.fetch_order(id, true).await
    }

    async fn find_order(&mut self, id: PurchaseOrderId) -> StoreResult<Option<PurchaseOrder>> {
        self.fetch_order(id, false).await
    }

    #[instrument(skip(self, order), fields(order_id = %order.id, status = %order.status), err)]
    async fn update_order(&mut self, order: &PurchaseOrder) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE purchase_orders
            SET status = $2, urgency = $3, expected_delivery_date = $4, notes = $5,
                submitted_at = $6, approved_by = $7, approved_at = $8, sent_by = $9,
                sent_at = $10, confirmed_at = $11, shipped_at = $12, received_at = $13,
                cancelled_by = $14, cancelled_at = $15, cancelled_reason = $16,
                updated_at = $17
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(order.id))
        .bind(order.status.as_str())
        .bind(order.urgency.as_str())
        .bind(order.expected_delivery_date)
        .bind(order.notes.clone())
        .bind(order.submitted_at)
        .bind(order.approved_by.map(Uuid::from))
        .bind(order.approved_at)
        .bind(order.sent_by.map(Uuid::from))
        .bind(order.sent_at)
        .bind(order.confirmed_at)
        .bind(order.shipped_at)
        .bind(order.received_at)
        .bind(order.cancelled_by.map(Uuid::from))
        .bind(order.cancelled_at)
        .bind(order.cancelled_reason.clone())
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;
        Ok(())
    }

    async fn order_items(&mut self, id: PurchaseOrderId) -> StoreResult<Vec<PurchaseOrderItem>> {
        let sql = format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM purchase_order_items \
             WHERE purchase_order_id = $1 ORDER BY id"
        );
        let rows: Vec<OrderItemRow> = sqlx::query_as(&sql)
            .bind(Uuid::from(id))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("order_items", e))?;
        Ok(rows.into_iter().map(PurchaseOrderItem::from).collect())
    }

    async fn insert_approvals(&mut self, approvals: &[PurchaseApproval]) -> StoreResult<()> {
        for approval in approvals {
            sqlx::query(
                r#"
                INSERT INTO purchase_approvals (
                    id, purchase_order_id, approval_level, required_role, action, approver_id,
                    comments, approved_amount, action_date, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(Uuid::from(approval.id))
            .bind(Uuid::from(approval.purchase_order_id))
            .bind(approval.approval_level)
            .bind(approval.required_role.as_str())
            .bind(approval.action.map(|a| a.as_str()))
            .bind(approval.approver_id.map(Uuid::from))
            .bind(approval.comments.clone())
            .bind(approval.approved_amount)
            .bind(approval.action_date)
            .bind(approval.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_approvals", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %order_id, role = %role), err)]
    async fn lock_pending_approval(
        &mut self,
        order_id: PurchaseOrderId,
        role: &Role,
    ) -> StoreResult<Option<PurchaseApproval>> {
        let sql = format!(
            "SELECT {APPROVAL_COLUMNS} FROM purchase_approvals \
             WHERE purchase_order_id = $1 AND action IS NULL \
               AND LOWER(required_role) = LOWER($2) \
             ORDER BY approval_level \
             LIMIT 1 \
             FOR UPDATE"
        );
        let row: Option<ApprovalRow> = sqlx::query_as(&sql)
            .bind(Uuid::from(order_id))
            .bind(role.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_pending_approval", e))?;
        row.map(PurchaseApproval::try_from).transpose()
    }

    async fn update_approval(&mut self, approval: &PurchaseApproval) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE purchase_approvals
            SET action = $2, approver_id = $3, comments = $4, approved_amount = $5,
                action_date = $6
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(approval.id))
        .bind(approval.action.map(|a| a.as_str()))
        .bind(approval.approver_id.map(Uuid::from))
        .bind(approval.comments.clone())
        .bind(approval.approved_amount)
        .bind(approval.action_date)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_approval", e))?;
        Ok(())
    }

    async fn count_pending_approvals(&mut self, order_id: PurchaseOrderId) -> StoreResult<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM purchase_approvals WHERE purchase_order_id = $1 AND action IS NULL",
        )
        .bind(Uuid::from(order_id))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("count_pending_approvals", e))
    }

    async fn approvals_for(&mut self, order_id: PurchaseOrderId) -> StoreResult<Vec<PurchaseApproval>> {
        let sql = format!(
            "SELECT {APPROVAL_COLUMNS} FROM purchase_approvals \
             WHERE purchase_order_id = $1 ORDER BY approval_level"
        );
        let rows: Vec<ApprovalRow> = sqlx::query_as(&sql)
            .bind(Uuid::from(order_id))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("approvals_for", e))?;
        rows.into_iter().map(PurchaseApproval::try_from).collect()
    }

    #[instrument(skip(self), fields(role = %role), err)]
    async fn pending_approvals_for_role(&mut self, role: &Role) -> StoreResult<Vec<PendingApproval>> {
        let sql = format!(
            "SELECT {APPROVAL_COLUMNS} FROM purchase_approvals \
             WHERE action IS NULL AND LOWER(required_role) = LOWER($1) \
             ORDER BY created_at, approval_level"
        );
        let rows: Vec<ApprovalRow> = sqlx::query_as(&sql)
            .bind(role.as_str())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("pending_approvals_for_role", e))?;
        let approvals = rows
            .into_iter()
            .map(PurchaseApproval::try_from)
            .collect::<StoreResult<Vec<_>>>()?;
        if approvals.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = approvals.iter().map(|a| Uuid::from(a.purchase_order_id)).collect();
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM purchase_orders \
             WHERE id = ANY($1) AND status = 'pending_approval'"
        );
        let orders: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(&ids[..])
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("pending_approvals_for_role", e))?;
        let orders: HashMap<PurchaseOrderId, PurchaseOrder> = orders
            .into_iter()
            .map(PurchaseOrder::try_from)
            .map(|o| o.map(|o| (o.id, o)))
            .collect::<StoreResult<_>>()?;

        Ok(approvals
            .into_iter()
            .filter_map(|approval| {
                orders
                    .get(&approval.purchase_order_id)
                    .cloned()
                    .map(|order| PendingApproval { approval, order })
            })
            .collect())
    }

    async fn find_receipt_for_order(
        &mut self,
        order_id: PurchaseOrderId,
    ) -> StoreResult<Option<GoodsReceipt>> {
        let sql = format!("SELECT {RECEIPT_COLUMNS} FROM goods_receipts WHERE purchase_order_id = $1");
        let row: Option<ReceiptRow> = sqlx::query_as(&sql)
            .bind(Uuid::from(order_id))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_receipt_for_order", e))?;
        row.map(GoodsReceipt::try_from).transpose()
    }

    #[instrument(skip(self, receipt, items), fields(receipt_id = %receipt.id, receipt_number = %receipt.receipt_number), err)]
    async fn insert_receipt(
        &mut self,
        receipt: &GoodsReceipt,
        items: &[GoodsReceiptItem],
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO goods_receipts (
                id, purchase_order_id, receipt_number, received_by, delivery_date,
                total_received_amount, quality_check_status, has_discrepancies, is_complete,
                quality_checked_by, quality_checked_at, quality_notes, notes, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(Uuid::from(receipt.id))
        .bind(Uuid::from(receipt.purchase_order_id))
        .bind(receipt.receipt_number.as_str())
        .bind(Uuid::from(receipt.received_by))
        .bind(receipt.delivery_date)
        .bind(receipt.total_received_amount)
        .bind(receipt.quality_check_status.as_str())
        .bind(receipt.has_discrepancies)
        .bind(receipt.is_complete)
        .bind(receipt.quality_checked_by.map(Uuid::from))
        .bind(receipt.quality_checked_at)
        .bind(receipt.quality_notes.clone())
        .bind(receipt.notes.clone())
        .bind(receipt.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_receipt", e))?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO goods_receipt_items (
                    id, goods_receipt_id, purchase_order_item_id, product_id, ordered_quantity,
                    received_quantity, discrepancy, unit_cost, is_accepted, rejection_reason,
                    batch_number, expiration_date, inventory_item_id
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(Uuid::from(item.id))
            .bind(Uuid::from(item.goods_receipt_id))
            .bind(Uuid::from(item.purchase_order_item_id))
            .bind(Uuid::from(item.product_id))
            .bind(item.ordered_quantity)
            .bind(item.received_quantity)
            .bind(item.discrepancy)
            .bind(item.unit_cost)
            .bind(item.is_accepted)
            .bind(item.rejection_reason.clone())
            .bind(item.batch_number.clone())
            .bind(item.expiration_date)
            .bind(item.inventory_item_id.map(Uuid::from))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_receipt_item", e))?;
        }
        Ok(())
    }

    async fn lock_receipt(&mut self, id: GoodsReceiptId) -> StoreResult<Option<GoodsReceipt>> {
        self.fetch_receipt(id, true).await
    }

    async fn find_receipt(&mut self, id: GoodsReceiptId) -> StoreResult<Option<GoodsReceipt>> {
        self.fetch_receipt(id, false).await
    }

    async fn update_receipt(&mut self, receipt: &GoodsReceipt) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE goods_receipts
            SET quality_check_status = $2, is_complete = $3, quality_checked_by = $4,
                quality_checked_at = $5, quality_notes = $6
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(receipt.id))
        .bind(receipt.quality_check_status.as_str())
        .bind(receipt.is_complete)
        .bind(receipt.quality_checked_by.map(Uuid::from))
        .bind(receipt.quality_checked_at)
        .bind(receipt.quality_notes.clone())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_receipt", e))?;
        Ok(())
    }

    async fn receipt_items(&mut self, id: GoodsReceiptId) -> StoreResult<Vec<GoodsReceiptItem>> {
        let sql = format!(
            "SELECT {RECEIPT_ITEM_COLUMNS} FROM goods_receipt_items \
             WHERE goods_receipt_id = $1 ORDER BY id"
        );
        let rows: Vec<ReceiptItemRow> = sqlx::query_as(&sql)
            .bind(Uuid::from(id))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("receipt_items", e))?;
        Ok(rows.into_iter().map(GoodsReceiptItem::from).collect())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }
}

/// Check whether an error is a unique-constraint violation (`23505`).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        let constraint = match &err {
            sqlx::Error::Database(db) => db.constraint().unwrap_or("unknown").to_string(),
            _ => String::new(),
        };
        return StoreError::UniqueViolation(format!("{operation}: {constraint}"));
    }
    match err {
        sqlx::Error::Database(db_err) => {
            StoreError::Database(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Database(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Database(format!("sqlx error in {operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use stockflow_purchasing::{PurchaseTotals, line_amount};

    const SCHEMA: &str = include_str!("../../../migrations/0001_init.sql");

    fn column_scale(column: &str) -> Option<u32> {
        let line = SCHEMA
            .lines()
            .find(|l| l.split_whitespace().next() == Some(column))?;
        let spec = line.split("NUMERIC(").nth(1)?;
        spec.split(')').next()?.split(',').nth(1)?.trim().parse().ok()
    }

    #[test]
    fn money_columns_hold_every_computed_digit() {
        let line_total = line_amount(dec!(0.3333), 3).unwrap();
        let totals = PurchaseTotals::compute([line_total], dec!(0), dec!(0.0001), dec!(0)).unwrap();
        assert_eq!(totals.total_amount, dec!(1.0000));
        let digits = line_total.scale().max(totals.total_amount.scale());

        for column in [
            "minimum_order_amount",
            "subtotal",
            "tax_amount",
            "discount_amount",
            "shipping_cost",
            "total_amount",
            "line_total",
            "approved_amount",
            "total_received_amount",
        ] {
            let scale = column_scale(column).unwrap_or_else(|| panic!("no NUMERIC column {column}"));
            assert!(scale >= digits, "{column} keeps {scale} decimals, amounts carry {digits}");
        }
    }
}
