//! Typed rows between Postgres and the domain structs.
//!
//! Each row decodes with `try_get` per column and converts into its domain
//! value with `TryFrom`, so enum text or invariant breaks surface as
//! `StoreError::Corrupt` instead of panics.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use stockflow_auth::Role;
use stockflow_core::{BranchId, DomainError, ProductId, SupplierId, UserId};
use stockflow_inventory::{
    InventoryItem, InventoryItemId, ItemKey, MovementReference, StockAlert, StockAlertId,
    StockMovement, StockMovementId, StockReservation, StockThresholds,
};
use stockflow_purchasing::{
    GoodsReceipt, GoodsReceiptId, GoodsReceiptItem, GoodsReceiptItemId, PurchaseApproval,
    PurchaseApprovalId, PurchaseOrder, PurchaseOrderId, PurchaseOrderItem, PurchaseOrderItemId,
    PurchaseTotals, Supplier, SupplierProduct,
};

use crate::db::StoreError;

fn corrupt(table: &str, err: DomainError) -> StoreError {
    StoreError::Corrupt(format!("{table}: {err}"))
}

pub(super) const ITEM_COLUMNS: &str = "id, product_id, branch_id, batch_number, current_stock, \
    reserved_stock, min_stock_level, max_stock_level, reorder_point, reorder_quantity, unit_cost, \
    expiration_date, location, is_active, created_at, updated_at";

#[derive(Debug)]
pub(super) struct ItemRow {
    id: Uuid,
    product_id: Uuid,
    branch_id: Uuid,
    batch_number: Option<String>,
    current_stock: i64,
    reserved_stock: i64,
    min_stock_level: i64,
    max_stock_level: i64,
    reorder_point: i64,
    reorder_quantity: i64,
    unit_cost: Decimal,
    expiration_date: Option<NaiveDate>,
    location: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            branch_id: row.try_get("branch_id")?,
            batch_number: row.try_get("batch_number")?,
            current_stock: row.try_get("current_stock")?,
            reserved_stock: row.try_get("reserved_stock")?,
            min_stock_level: row.try_get("min_stock_level")?,
            max_stock_level: row.try_get("max_stock_level")?,
            reorder_point: row.try_get("reorder_point")?,
            reorder_quantity: row.try_get("reorder_quantity")?,
            unit_cost: row.try_get("unit_cost")?,
            expiration_date: row.try_get("expiration_date")?,
            location: row.try_get("location")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<ItemRow> for InventoryItem {
    type Error = StoreError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        InventoryItem::restore(
            InventoryItemId::from_uuid(row.id),
            ItemKey::new(
                ProductId::from_uuid(row.product_id),
                BranchId::from_uuid(row.branch_id),
                row.batch_number,
            ),
            row.current_stock,
            row.reserved_stock,
            StockThresholds {
                min_stock_level: row.min_stock_level,
                max_stock_level: row.max_stock_level,
                reorder_point: row.reorder_point,
                reorder_quantity: row.reorder_quantity,
            },
            row.unit_cost,
            row.expiration_date,
            row.location,
            row.is_active,
            row.created_at,
            row.updated_at,
        )
        .map_err(|e| corrupt("inventory_items", e))
    }
}

pub(super) const MOVEMENT_COLUMNS: &str = "id, inventory_item_id, movement_type, quantity, \
    previous_quantity, new_quantity, reference_type, reference_id, notes, performed_by, created_at";

#[derive(Debug)]
pub(super) struct MovementRow {
    id: Uuid,
    inventory_item_id: Uuid,
    movement_type: String,
    quantity: i64,
    previous_quantity: i64,
    new_quantity: i64,
    reference_type: String,
    reference_id: Option<String>,
    notes: Option<String>,
    performed_by: Uuid,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            inventory_item_id: row.try_get("inventory_item_id")?,
            movement_type: row.try_get("movement_type")?,
            quantity: row.try_get("quantity")?,
            previous_quantity: row.try_get("previous_quantity")?,
            new_quantity: row.try_get("new_quantity")?,
            reference_type: row.try_get("reference_type")?,
            reference_id: row.try_get("reference_id")?,
            notes: row.try_get("notes")?,
            performed_by: row.try_get("performed_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        Ok(StockMovement {
            id: StockMovementId::from_uuid(row.id),
            item_id: InventoryItemId::from_uuid(row.inventory_item_id),
            movement_type: row
                .movement_type
                .parse()
                .map_err(|e| corrupt("stock_movements", e))?,
            quantity: row.quantity,
            previous_quantity: row.previous_quantity,
            new_quantity: row.new_quantity,
            reference: MovementReference {
                reference_type: row.reference_type,
                reference_id: row.reference_id,
            },
            notes: row.notes,
            performed_by: UserId::from_uuid(row.performed_by),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
pub(super) struct ReservationRow {
    inventory_item_id: Uuid,
    reference_id: String,
    quantity: i64,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ReservationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ReservationRow {
            inventory_item_id: row.try_get("inventory_item_id")?,
            reference_id: row.try_get("reference_id")?,
            quantity: row.try_get("quantity")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<ReservationRow> for StockReservation {
    fn from(row: ReservationRow) -> Self {
        StockReservation {
            item_id: InventoryItemId::from_uuid(row.inventory_item_id),
            reference_id: row.reference_id,
            quantity: row.quantity,
            updated_at: row.updated_at,
        }
    }
}

pub(super) const ALERT_COLUMNS: &str = "id, product_id, branch_id, inventory_item_id, \
    current_stock, reorder_point, suggested_reorder_quantity, status, purchase_order_id, \
    processed_by, processed_at, created_at";

#[derive(Debug)]
pub(super) struct AlertRow {
    id: Uuid,
    product_id: Uuid,
    branch_id: Uuid,
    inventory_item_id: Uuid,
    current_stock: i64,
    reorder_point: i64,
    suggested_reorder_quantity: i64,
    status: String,
    purchase_order_id: Option<Uuid>,
    processed_by: Option<Uuid>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for AlertRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AlertRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            branch_id: row.try_get("branch_id")?,
            inventory_item_id: row.try_get("inventory_item_id")?,
            current_stock: row.try_get("current_stock")?,
            reorder_point: row.try_get("reorder_point")?,
            suggested_reorder_quantity: row.try_get("suggested_reorder_quantity")?,
            status: row.try_get("status")?,
            purchase_order_id: row.try_get("purchase_order_id")?,
            processed_by: row.try_get("processed_by")?,
            processed_at: row.try_get("processed_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<AlertRow> for StockAlert {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(StockAlert {
            id: StockAlertId::from_uuid(row.id),
            product_id: ProductId::from_uuid(row.product_id),
            branch_id: BranchId::from_uuid(row.branch_id),
            item_id: InventoryItemId::from_uuid(row.inventory_item_id),
            current_stock: row.current_stock,
            reorder_point: row.reorder_point,
            suggested_reorder_quantity: row.suggested_reorder_quantity,
            status: row.status.parse().map_err(|e| corrupt("stock_alerts", e))?,
            purchase_order_id: row.purchase_order_id,
            processed_by: row.processed_by.map(UserId::from_uuid),
            processed_at: row.processed_at,
            created_at: row.created_at,
        })
    }
}

pub(super) const SUPPLIER_COLUMNS: &str = "id, name, supplier_type, quality_rating, \
    delivery_rating, price_competitiveness, lead_time_days, minimum_order_amount, is_active, \
    rated_deliveries, rated_inspections, created_at, updated_at";

#[derive(Debug)]
pub(super) struct SupplierRow {
    id: Uuid,
    name: String,
    supplier_type: String,
    quality_rating: f64,
    delivery_rating: f64,
    price_competitiveness: f64,
    lead_time_days: i32,
    minimum_order_amount: Decimal,
    is_active: bool,
    rated_deliveries: i32,
    rated_inspections: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for SupplierRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SupplierRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            supplier_type: row.try_get("supplier_type")?,
            quality_rating: row.try_get("quality_rating")?,
            delivery_rating: row.try_get("delivery_rating")?,
            price_competitiveness: row.try_get("price_competitiveness")?,
            lead_time_days: row.try_get("lead_time_days")?,
            minimum_order_amount: row.try_get("minimum_order_amount")?,
            is_active: row.try_get("is_active")?,
            rated_deliveries: row.try_get("rated_deliveries")?,
            rated_inspections: row.try_get("rated_inspections")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<SupplierRow> for Supplier {
    fn from(row: SupplierRow) -> Self {
        Supplier {
            id: SupplierId::from_uuid(row.id),
            name: row.name,
            supplier_type: row.supplier_type,
            quality_rating: row.quality_rating,
            delivery_rating: row.delivery_rating,
            price_competitiveness: row.price_competitiveness,
            lead_time_days: row.lead_time_days,
            minimum_order_amount: row.minimum_order_amount,
            is_active: row.is_active,
            rated_deliveries: row.rated_deliveries,
            rated_inspections: row.rated_inspections,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(super) const OFFER_COLUMNS: &str =
    "supplier_id, product_id, unit_cost, minimum_quantity, lead_time_days, is_preferred";

#[derive(Debug)]
pub(super) struct OfferRow {
    pub(super) supplier_id: Uuid,
    product_id: Uuid,
    unit_cost: Decimal,
    minimum_quantity: i64,
    lead_time_days: Option<i32>,
    is_preferred: bool,
}

impl<'r> sqlx::FromRow<'r, PgRow> for OfferRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OfferRow {
            supplier_id: row.try_get("supplier_id")?,
            product_id: row.try_get("product_id")?,
            unit_cost: row.try_get("unit_cost")?,
            minimum_quantity: row.try_get("minimum_quantity")?,
            lead_time_days: row.try_get("lead_time_days")?,
            is_preferred: row.try_get("is_preferred")?,
        })
    }
}

impl From<OfferRow> for SupplierProduct {
    fn from(row: OfferRow) -> Self {
        SupplierProduct {
            supplier_id: SupplierId::from_uuid(row.supplier_id),
            product_id: ProductId::from_uuid(row.product_id),
            unit_cost: row.unit_cost,
            minimum_quantity: row.minimum_quantity,
            lead_time_days: row.lead_time_days,
            is_preferred: row.is_preferred,
        }
    }
}

pub(super) const ORDER_COLUMNS: &str = "id, po_number, supplier_id, branch_id, requested_by, \
    status, urgency, subtotal, tax_amount, discount_amount, shipping_cost, total_amount, \
    required_date, expected_delivery_date, source_alert_id, notes, submitted_at, approved_by, \
    approved_at, sent_by, sent_at, confirmed_at, shipped_at, received_at, cancelled_by, \
    cancelled_at, cancelled_reason, created_at, updated_at";

#[derive(Debug)]
pub(super) struct OrderRow {
    id: Uuid,
    po_number: String,
    supplier_id: Uuid,
    branch_id: Uuid,
    requested_by: Uuid,
    status: String,
    urgency: String,
    subtotal: Decimal,
    tax_amount: Decimal,
    discount_amount: Decimal,
    shipping_cost: Decimal,
    total_amount: Decimal,
    required_date: Option<NaiveDate>,
    expected_delivery_date: Option<NaiveDate>,
    source_alert_id: Option<Uuid>,
    notes: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
    approved_by: Option<Uuid>,
    approved_at: Option<DateTime<Utc>>,
    sent_by: Option<Uuid>,
    sent_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    received_at: Option<DateTime<Utc>>,
    cancelled_by: Option<Uuid>,
    cancelled_at: Option<DateTime<Utc>>,
    cancelled_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            po_number: row.try_get("po_number")?,
            supplier_id: row.try_get("supplier_id")?,
            branch_id: row.try_get("branch_id")?,
            requested_by: row.try_get("requested_by")?,
            status: row.try_get("status")?,
            urgency: row.try_get("urgency")?,
            subtotal: row.try_get("subtotal")?,
            tax_amount: row.try_get("tax_amount")?,
            discount_amount: row.try_get("discount_amount")?,
            shipping_cost: row.try_get("shipping_cost")?,
            total_amount: row.try_get("total_amount")?,
            required_date: row.try_get("required_date")?,
            expected_delivery_date: row.try_get("expected_delivery_date")?,
            source_alert_id: row.try_get("source_alert_id")?,
            notes: row.try_get("notes")?,
            submitted_at: row.try_get("submitted_at")?,
            approved_by: row.try_get("approved_by")?,
            approved_at: row.try_get("approved_at")?,
            sent_by: row.try_get("sent_by")?,
            sent_at: row.try_get("sent_at")?,
            confirmed_at: row.try_get("confirmed_at")?,
            shipped_at: row.try_get("shipped_at")?,
            received_at: row.try_get("received_at")?,
            cancelled_by: row.try_get("cancelled_by")?,
            cancelled_at: row.try_get("cancelled_at")?,
            cancelled_reason: row.try_get("cancelled_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<OrderRow> for PurchaseOrder {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(PurchaseOrder {
            id: PurchaseOrderId::from_uuid(row.id),
            po_number: row.po_number,
            supplier_id: SupplierId::from_uuid(row.supplier_id),
            branch_id: BranchId::from_uuid(row.branch_id),
            requested_by: UserId::from_uuid(row.requested_by),
            status: row.status.parse().map_err(|e| corrupt("purchase_orders", e))?,
            urgency: row.urgency.parse().map_err(|e| corrupt("purchase_orders", e))?,
            totals: PurchaseTotals {
                subtotal: row.subtotal,
                tax_amount: row.tax_amount,
                discount_amount: row.discount_amount,
                shipping_cost: row.shipping_cost,
                total_amount: row.total_amount,
            },
            required_date: row.required_date,
            expected_delivery_date: row.expected_delivery_date,
            source_alert_id: row.source_alert_id.map(StockAlertId::from_uuid),
            notes: row.notes,
            submitted_at: row.submitted_at,
            approved_by: row.approved_by.map(UserId::from_uuid),
            approved_at: row.approved_at,
            sent_by: row.sent_by.map(UserId::from_uuid),
            sent_at: row.sent_at,
            confirmed_at: row.confirmed_at,
            shipped_at: row.shipped_at,
            received_at: row.received_at,
            cancelled_by: row.cancelled_by.map(UserId::from_uuid),
            cancelled_at: row.cancelled_at,
            cancelled_reason: row.cancelled_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(super) const ORDER_ITEM_COLUMNS: &str =
    "id, purchase_order_id, product_id, quantity_ordered, unit_cost, line_total";

#[derive(Debug)]
pub(super) struct OrderItemRow {
    id: Uuid,
    purchase_order_id: Uuid,
    product_id: Uuid,
    quantity_ordered: i64,
    unit_cost: Decimal,
    line_total: Decimal,
}

impl<'r> sqlx::FromRow<'r, PgRow> for OrderItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderItemRow {
            id: row.try_get("id")?,
            purchase_order_id: row.try_get("purchase_order_id")?,
            product_id: row.try_get("product_id")?,
            quantity_ordered: row.try_get("quantity_ordered")?,
            unit_cost: row.try_get("unit_cost")?,
            line_total: row.try_get("line_total")?,
        })
    }
}

impl From<OrderItemRow> for PurchaseOrderItem {
    fn from(row: OrderItemRow) -> Self {
        PurchaseOrderItem {
            id: PurchaseOrderItemId::from_uuid(row.id),
            purchase_order_id: PurchaseOrderId::from_uuid(row.purchase_order_id),
            product_id: ProductId::from_uuid(row.product_id),
            quantity_ordered: row.quantity_ordered,
            unit_cost: row.unit_cost,
            line_total: row.line_total,
        }
    }
}

pub(super) const APPROVAL_COLUMNS: &str = "id, purchase_order_id, approval_level, required_role, \
    action, approver_id, comments, approved_amount, action_date, created_at";

#[derive(Debug)]
pub(super) struct ApprovalRow {
    id: Uuid,
    purchase_order_id: Uuid,
    approval_level: i32,
    required_role: String,
    action: Option<String>,
    approver_id: Option<Uuid>,
    comments: Option<String>,
    approved_amount: Option<Decimal>,
    action_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ApprovalRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ApprovalRow {
            id: row.try_get("id")?,
            purchase_order_id: row.try_get("purchase_order_id")?,
            approval_level: row.try_get("approval_level")?,
            required_role: row.try_get("required_role")?,
            action: row.try_get("action")?,
            approver_id: row.try_get("approver_id")?,
            comments: row.try_get("comments")?,
            approved_amount: row.try_get("approved_amount")?,
            action_date: row.try_get("action_date")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<ApprovalRow> for PurchaseApproval {
    type Error = StoreError;

    fn try_from(row: ApprovalRow) -> Result<Self, Self::Error> {
        let action = row
            .action
            .map(|a| a.parse())
            .transpose()
            .map_err(|e| corrupt("purchase_approvals", e))?;
        Ok(PurchaseApproval {
            id: PurchaseApprovalId::from_uuid(row.id),
            purchase_order_id: PurchaseOrderId::from_uuid(row.purchase_order_id),
            approval_level: row.approval_level,
            required_role: Role::from(row.required_role),
            action,
            approver_id: row.approver_id.map(UserId::from_uuid),
            comments: row.comments,
            approved_amount: row.approved_amount,
            action_date: row.action_date,
            created_at: row.created_at,
        })
    }
}

pub(super) const RECEIPT_COLUMNS: &str = "id, purchase_order_id, receipt_number, received_by, \
    delivery_date, total_received_amount, quality_check_status, has_discrepancies, is_complete, \
    quality_checked_by, quality_checked_at, quality_notes, notes, created_at";

#[derive(Debug)]
pub(super) struct ReceiptRow {
    id: Uuid,
    purchase_order_id: Uuid,
    receipt_number: String,
    received_by: Uuid,
    delivery_date: NaiveDate,
    total_received_amount: Decimal,
    quality_check_status: String,
    has_discrepancies: bool,
    is_complete: bool,
    quality_checked_by: Option<Uuid>,
    quality_checked_at: Option<DateTime<Utc>>,
    quality_notes: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ReceiptRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ReceiptRow {
            id: row.try_get("id")?,
            purchase_order_id: row.try_get("purchase_order_id")?,
            receipt_number: row.try_get("receipt_number")?,
            received_by: row.try_get("received_by")?,
            delivery_date: row.try_get("delivery_date")?,
            total_received_amount: row.try_get("total_received_amount")?,
            quality_check_status: row.try_get("quality_check_status")?,
            has_discrepancies: row.try_get("has_discrepancies")?,
            is_complete: row.try_get("is_complete")?,
            quality_checked_by: row.try_get("quality_checked_by")?,
            quality_checked_at: row.try_get("quality_checked_at")?,
            quality_notes: row.try_get("quality_notes")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<ReceiptRow> for GoodsReceipt {
    type Error = StoreError;

    fn try_from(row: ReceiptRow) -> Result<Self, Self::Error> {
        Ok(GoodsReceipt {
            id: GoodsReceiptId::from_uuid(row.id),
            purchase_order_id: PurchaseOrderId::from_uuid(row.purchase_order_id),
            receipt_number: row.receipt_number,
            received_by: UserId::from_uuid(row.received_by),
            delivery_date: row.delivery_date,
            total_received_amount: row.total_received_amount,
            quality_check_status: row
                .quality_check_status
                .parse()
                .map_err(|e| corrupt("goods_receipts", e))?,
            has_discrepancies: row.has_discrepancies,
            is_complete: row.is_complete,
            quality_checked_by: row.quality_checked_by.map(UserId::from_uuid),
            quality_checked_at: row.quality_checked_at,
            quality_notes: row.quality_notes,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

pub(super) const RECEIPT_ITEM_COLUMNS: &str = "id, goods_receipt_id, purchase_order_item_id, \
    product_id, ordered_quantity, received_quantity, discrepancy, unit_cost, is_accepted, \
    rejection_reason, batch_number, expiration_date, inventory_item_id";

#[derive(Debug)]
pub(super) struct ReceiptItemRow {
    id: Uuid,
    goods_receipt_id: Uuid,
    purchase_order_item_id: Uuid,
    product_id: Uuid,
    ordered_quantity: i64,
    received_quantity: i64,
    discrepancy: i64,
    unit_cost: Decimal,
    is_accepted: bool,
    rejection_reason: Option<String>,
    batch_number: Option<String>,
    expiration_date: Option<NaiveDate>,
    inventory_item_id: Option<Uuid>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ReceiptItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ReceiptItemRow {
            id: row.try_get("id")?,
            goods_receipt_id: row.try_get("goods_receipt_id")?,
            purchase_order_item_id: row.try_get("purchase_order_item_id")?,
            product_id: row.try_get("product_id")?,
            ordered_quantity: row.try_get("ordered_quantity")?,
            received_quantity: row.try_get("received_quantity")?,
            discrepancy: row.try_get("discrepancy")?,
            unit_cost: row.try_get("unit_cost")?,
            is_accepted: row.try_get("is_accepted")?,
            rejection_reason: row.try_get("rejection_reason")?,
            batch_number: row.try_get("batch_number")?,
            expiration_date: row.try_get("expiration_date")?,
            inventory_item_id: row.try_get("inventory_item_id")?,
        })
    }
}

impl From<ReceiptItemRow> for GoodsReceiptItem {
    fn from(row: ReceiptItemRow) -> Self {
        GoodsReceiptItem {
            id: GoodsReceiptItemId::from_uuid(row.id),
            goods_receipt_id: GoodsReceiptId::from_uuid(row.goods_receipt_id),
            purchase_order_item_id: PurchaseOrderItemId::from_uuid(row.purchase_order_item_id),
            product_id: ProductId::from_uuid(row.product_id),
            ordered_quantity: row.ordered_quantity,
            received_quantity: row.received_quantity,
            discrepancy: row.discrepancy,
            unit_cost: row.unit_cost,
            is_accepted: row.is_accepted,
            rejection_reason: row.rejection_reason,
            batch_number: row.batch_number,
            expiration_date: row.expiration_date,
            inventory_item_id: row.inventory_item_id.map(InventoryItemId::from_uuid),
        }
    }
}
