//! Goods receipts: reconciling a delivery against what was ordered.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::{DomainError, DomainResult, Entity, ProductId, UserId, impl_uuid_newtype};
use stockflow_inventory::InventoryItemId;

use crate::order::{
    PurchaseOrder, PurchaseOrderId, PurchaseOrderItem, PurchaseOrderItemId, checked_total, line_amount,
};

/// Goods receipt identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoodsReceiptId(Uuid);

impl_uuid_newtype!(GoodsReceiptId, "GoodsReceiptId");

/// Goods receipt line identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoodsReceiptItemId(Uuid);

impl_uuid_newtype!(GoodsReceiptItemId, "GoodsReceiptItemId");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityCheckStatus {
    Pending,
    Passed,
    Partial,
    Failed,
}

impl QualityCheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QualityCheckStatus::Pending => "pending",
            QualityCheckStatus::Passed => "passed",
            QualityCheckStatus::Partial => "partial",
            QualityCheckStatus::Failed => "failed",
        }
    }

    /// Score folded into the supplier's quality rating; `None` for `Pending`.
    pub fn quality_score(self) -> Option<f64> {
        match self {
            QualityCheckStatus::Pending => None,
            QualityCheckStatus::Passed => Some(5.0),
            QualityCheckStatus::Partial => Some(3.0),
            QualityCheckStatus::Failed => Some(1.0),
        }
    }
}

impl core::str::FromStr for QualityCheckStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QualityCheckStatus::Pending),
            "passed" => Ok(QualityCheckStatus::Passed),
            "partial" => Ok(QualityCheckStatus::Partial),
            "failed" => Ok(QualityCheckStatus::Failed),
            other => Err(DomainError::validation(format!(
                "unknown quality check status '{other}'"
            ))),
        }
    }
}

/// One delivered line as reported by the receiving clerk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveLine {
    pub purchase_order_item_id: PurchaseOrderItemId,
    pub received_quantity: i64,
    /// Defaults to accepted.
    pub is_accepted: Option<bool>,
    pub rejection_reason: Option<String>,
    pub batch_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
}

/// Command: record a delivery against a purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveGoods {
    pub purchase_order_id: PurchaseOrderId,
    pub received_by: UserId,
    pub items: Vec<ReceiveLine>,
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl ReceiveGoods {
    pub fn validate(&self) -> DomainResult<()> {
        if self.items.is_empty() {
            return Err(DomainError::validation("goods receipt needs at least one item"));
        }
        let mut seen = HashSet::new();
        for line in &self.items {
            if line.received_quantity < 0 {
                return Err(DomainError::validation("received quantity cannot be negative"));
            }
            if !seen.insert(line.purchase_order_item_id) {
                return Err(DomainError::validation(format!(
                    "purchase order item {} listed twice",
                    line.purchase_order_item_id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceiptItem {
    pub id: GoodsReceiptItemId,
    pub goods_receipt_id: GoodsReceiptId,
    pub purchase_order_item_id: PurchaseOrderItemId,
    pub product_id: ProductId,
    pub ordered_quantity: i64,
    pub received_quantity: i64,
    /// `received_quantity - ordered_quantity`.
    pub discrepancy: i64,
    pub unit_cost: Decimal,
    pub is_accepted: bool,
    pub rejection_reason: Option<String>,
    pub batch_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    /// Ledger record the accepted quantity was posted to.
    pub inventory_item_id: Option<InventoryItemId>,
}

impl GoodsReceiptItem {
    /// Quantity that goes into stock.
    pub fn accepted_quantity(&self) -> i64 {
        if self.is_accepted { self.received_quantity } else { 0 }
    }

    /// A rejected line counts as not received at all.
    pub fn has_discrepancy(&self) -> bool {
        self.discrepancy != 0 || (!self.is_accepted && self.ordered_quantity > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceipt {
    pub id: GoodsReceiptId,
    pub purchase_order_id: PurchaseOrderId,
    pub receipt_number: String,
    pub received_by: UserId,
    pub delivery_date: NaiveDate,
    pub total_received_amount: Decimal,
    pub quality_check_status: QualityCheckStatus,
    pub has_discrepancies: bool,
    pub is_complete: bool,
    pub quality_checked_by: Option<UserId>,
    pub quality_checked_at: Option<DateTime<Utc>>,
    pub quality_notes: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GoodsReceipt {
    /// Reconcile a delivery against the order lines.
    ///
    /// The order must be in a deliverable status. Order lines missing from the
    /// delivery get a zero-quantity receipt line. Ledger posting is left to the
    /// caller; `inventory_item_id` stays empty until then.
    pub fn reconcile(
        order: &PurchaseOrder,
        order_items: &[PurchaseOrderItem],
        cmd: &ReceiveGoods,
        receipt_number: String,
        now: DateTime<Utc>,
    ) -> DomainResult<(Self, Vec<GoodsReceiptItem>)> {
        cmd.validate()?;
        if cmd.purchase_order_id != order.id {
            return Err(DomainError::validation("purchase order mismatch"));
        }
        if !order.status.is_deliverable() {
            return Err(DomainError::conflict(format!(
                "purchase order {} is {} and cannot receive goods",
                order.po_number, order.status
            )));
        }

        let by_id: HashMap<PurchaseOrderItemId, &PurchaseOrderItem> =
            order_items.iter().map(|i| (i.id, i)).collect();

        let id = GoodsReceiptId::new();
        let mut items = Vec::with_capacity(order_items.len().max(cmd.items.len()));
        for line in &cmd.items {
            let ordered = by_id.get(&line.purchase_order_item_id).ok_or_else(|| {
                DomainError::validation(format!(
                    "purchase order item {} does not belong to {}",
                    line.purchase_order_item_id, order.po_number
                ))
            })?;
            let is_accepted = line.is_accepted.unwrap_or(true);
            items.push(GoodsReceiptItem {
                id: GoodsReceiptItemId::new(),
                goods_receipt_id: id,
                purchase_order_item_id: ordered.id,
                product_id: ordered.product_id,
                ordered_quantity: ordered.quantity_ordered,
                received_quantity: line.received_quantity,
                discrepancy: line.received_quantity - ordered.quantity_ordered,
                unit_cost: ordered.unit_cost,
                is_accepted,
                rejection_reason: if is_accepted { None } else { line.rejection_reason.clone() },
                batch_number: line.batch_number.clone(),
                expiration_date: line.expiration_date,
                inventory_item_id: None,
            });
        }
        // Lines absent from the delivery were not received at all.
        let delivered: HashSet<PurchaseOrderItemId> =
            cmd.items.iter().map(|l| l.purchase_order_item_id).collect();
        for ordered in order_items.iter().filter(|i| !delivered.contains(&i.id)) {
            items.push(GoodsReceiptItem {
                id: GoodsReceiptItemId::new(),
                goods_receipt_id: id,
                purchase_order_item_id: ordered.id,
                product_id: ordered.product_id,
                ordered_quantity: ordered.quantity_ordered,
                received_quantity: 0,
                discrepancy: -ordered.quantity_ordered,
                unit_cost: ordered.unit_cost,
                is_accepted: true,
                rejection_reason: None,
                batch_number: None,
                expiration_date: None,
                inventory_item_id: None,
            });
        }

        let total_received_amount = checked_total(
            items
                .iter()
                .map(|i| line_amount(i.unit_cost, i.accepted_quantity()))
                .collect::<DomainResult<Vec<Decimal>>>()?,
        )?;
        let any_rejected = items.iter().any(|i| !i.is_accepted);

        let receipt = Self {
            id,
            purchase_order_id: order.id,
            receipt_number,
            received_by: cmd.received_by,
            delivery_date: cmd.delivery_date.unwrap_or_else(|| now.date_naive()),
            total_received_amount,
            quality_check_status: if any_rejected {
                QualityCheckStatus::Partial
            } else {
                QualityCheckStatus::Passed
            },
            has_discrepancies: items.iter().any(GoodsReceiptItem::has_discrepancy),
            is_complete: false,
            quality_checked_by: None,
            quality_checked_at: None,
            quality_notes: None,
            notes: cmd.notes.clone(),
            created_at: now,
        };
        Ok((receipt, items))
    }

    /// Close the receipt with an explicit quality verdict.
    pub fn complete_quality_check(
        &mut self,
        checked_by: UserId,
        status: QualityCheckStatus,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.is_complete {
            return Err(DomainError::conflict(format!(
                "goods receipt {} is already complete",
                self.receipt_number
            )));
        }
        if status == QualityCheckStatus::Pending {
            return Err(DomainError::validation("quality check must conclude with a verdict"));
        }
        self.quality_check_status = status;
        self.quality_checked_by = Some(checked_by);
        self.quality_checked_at = Some(now);
        self.quality_notes = notes;
        self.is_complete = true;
        Ok(())
    }
}

impl Entity for GoodsReceipt {
    type Id = GoodsReceiptId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Delivery score for a supplier from actual vs expected delivery date.
///
/// `None` when the order never had an expected date.
pub fn delivery_score(expected: Option<NaiveDate>, delivered: NaiveDate) -> Option<f64> {
    let expected = expected?;
    let days_late = (delivered - expected).num_days();
    Some(match days_late {
        d if d < 0 => 5.0,
        0 => 4.5,
        1..=2 => 4.0,
        3..=5 => 3.0,
        6..=10 => 2.0,
        _ => 1.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{NewPurchaseOrder, NewPurchaseOrderLine, PricedLine, PurchaseOrderStatus};
    use crate::supplier::Supplier;
    use rust_decimal_macros::dec;
    use stockflow_core::{BranchId, SupplierId};

    fn sent_order(lines: &[PricedLine]) -> (PurchaseOrder, Vec<PurchaseOrderItem>) {
        let now = Utc::now();
        let supplier = Supplier {
            id: SupplierId::new(),
            name: "s".into(),
            supplier_type: "manufacturer".into(),
            quality_rating: 3.0,
            delivery_rating: 3.0,
            price_competitiveness: 3.0,
            lead_time_days: 5,
            minimum_order_amount: Decimal::ZERO,
            is_active: true,
            rated_deliveries: 0,
            rated_inspections: 0,
            created_at: now,
            updated_at: now,
        };
        let cmd = NewPurchaseOrder {
            supplier_id: supplier.id,
            branch_id: BranchId::new(),
            requested_by: UserId::new(),
            items: lines
                .iter()
                .map(|l| NewPurchaseOrderLine {
                    product_id: l.product_id,
                    quantity: l.quantity,
                    unit_cost: Some(l.unit_cost),
                })
                .collect(),
            urgency: None,
            required_date: None,
            source_alert_id: None,
            shipping_cost: None,
            discount_amount: None,
            notes: None,
        };
        let (mut order, items) =
            PurchaseOrder::draft(&cmd, lines, &supplier, Decimal::ZERO, "PO-R".into(), now).unwrap();
        order.submit(now).unwrap();
        order.mark_approved(UserId::new(), now).unwrap();
        order.send_to_supplier(UserId::new(), now).unwrap();
        (order, items)
    }

    fn line(item: &PurchaseOrderItem, received: i64, accepted: bool) -> ReceiveLine {
        ReceiveLine {
            purchase_order_item_id: item.id,
            received_quantity: received,
            is_accepted: Some(accepted),
            rejection_reason: (!accepted).then(|| "damaged".to_string()),
            batch_number: None,
            expiration_date: None,
        }
    }

    fn priced(quantity: i64) -> PricedLine {
        PricedLine {
            product_id: ProductId::new(),
            quantity,
            unit_cost: dec!(5),
        }
    }

    #[test]
    fn rejected_line_is_a_discrepancy_and_excluded_from_value() {
        let (order, items) = sent_order(&[priced(90), priced(10)]);
        assert_eq!(order.totals.subtotal, dec!(500));

        let cmd = ReceiveGoods {
            purchase_order_id: order.id,
            received_by: UserId::new(),
            items: vec![line(&items[0], 90, true), line(&items[1], 10, false)],
            delivery_date: None,
            notes: None,
        };
        let (receipt, lines) =
            GoodsReceipt::reconcile(&order, &items, &cmd, "GR-1".into(), Utc::now()).unwrap();

        assert!(receipt.has_discrepancies);
        assert_eq!(receipt.total_received_amount, dec!(450));
        assert_eq!(receipt.quality_check_status, QualityCheckStatus::Partial);
        assert_eq!(lines.iter().map(GoodsReceiptItem::accepted_quantity).sum::<i64>(), 90);
        assert_eq!(lines[1].rejection_reason.as_deref(), Some("damaged"));
    }

    #[test]
    fn exact_delivery_has_no_discrepancies() {
        let (order, items) = sent_order(&[priced(4)]);
        let cmd = ReceiveGoods {
            purchase_order_id: order.id,
            received_by: UserId::new(),
            items: vec![ReceiveLine {
                is_accepted: None,
                ..line(&items[0], 4, true)
            }],
            delivery_date: None,
            notes: None,
        };
        let (receipt, lines) =
            GoodsReceipt::reconcile(&order, &items, &cmd, "GR-2".into(), Utc::now()).unwrap();
        assert!(!receipt.has_discrepancies);
        assert!(lines[0].is_accepted);
        assert_eq!(receipt.quality_check_status, QualityCheckStatus::Passed);
    }

    #[test]
    fn short_delivery_records_negative_discrepancy() {
        let (order, items) = sent_order(&[priced(10)]);
        let cmd = ReceiveGoods {
            purchase_order_id: order.id,
            received_by: UserId::new(),
            items: vec![line(&items[0], 7, true)],
            delivery_date: None,
            notes: None,
        };
        let (receipt, lines) =
            GoodsReceipt::reconcile(&order, &items, &cmd, "GR-3".into(), Utc::now()).unwrap();
        assert_eq!(lines[0].discrepancy, -3);
        assert!(receipt.has_discrepancies);
    }

    #[test]
    fn lines_left_out_of_the_delivery_count_as_not_received() {
        let (order, items) = sent_order(&[priced(90), priced(10)]);
        let cmd = ReceiveGoods {
            purchase_order_id: order.id,
            received_by: UserId::new(),
            items: vec![line(&items[0], 90, true)],
            delivery_date: None,
            notes: None,
        };
        let (receipt, lines) =
            GoodsReceipt::reconcile(&order, &items, &cmd, "GR-4".into(), Utc::now()).unwrap();

        assert_eq!(lines.len(), 2);
        let missing = lines
            .iter()
            .find(|l| l.purchase_order_item_id == items[1].id)
            .expect("line for the undelivered item");
        assert_eq!(missing.received_quantity, 0);
        assert_eq!(missing.discrepancy, -10);
        assert_eq!(missing.accepted_quantity(), 0);
        assert!(receipt.has_discrepancies);
        assert_eq!(receipt.total_received_amount, dec!(450));
    }

    #[test]
    fn undeliverable_order_is_a_conflict() {
        let (mut order, items) = sent_order(&[priced(1)]);
        order.complete(Utc::now()).unwrap();
        assert_eq!(order.status, PurchaseOrderStatus::Completed);

        let cmd = ReceiveGoods {
            purchase_order_id: order.id,
            received_by: UserId::new(),
            items: vec![line(&items[0], 1, true)],
            delivery_date: None,
            notes: None,
        };
        assert!(matches!(
            GoodsReceipt::reconcile(&order, &items, &cmd, "GR".into(), Utc::now()),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn unknown_duplicate_or_negative_lines_are_rejected() {
        let (order, items) = sent_order(&[priced(1)]);
        let mut cmd = ReceiveGoods {
            purchase_order_id: order.id,
            received_by: UserId::new(),
            items: vec![ReceiveLine {
                purchase_order_item_id: PurchaseOrderItemId::new(),
                ..line(&items[0], 1, true)
            }],
            delivery_date: None,
            notes: None,
        };
        let reconcile = |cmd: &ReceiveGoods| {
            GoodsReceipt::reconcile(&order, &items, cmd, "GR".into(), Utc::now())
        };
        assert!(matches!(reconcile(&cmd), Err(DomainError::Validation(_))));

        cmd.items = vec![line(&items[0], 1, true), line(&items[0], 1, true)];
        assert!(matches!(reconcile(&cmd), Err(DomainError::Validation(_))));

        cmd.items = vec![line(&items[0], -1, true)];
        assert!(matches!(reconcile(&cmd), Err(DomainError::Validation(_))));

        cmd.items = vec![];
        assert!(matches!(reconcile(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn quality_check_completes_once() {
        let (order, items) = sent_order(&[priced(1)]);
        let cmd = ReceiveGoods {
            purchase_order_id: order.id,
            received_by: UserId::new(),
            items: vec![line(&items[0], 1, true)],
            delivery_date: None,
            notes: None,
        };
        let (mut receipt, _) =
            GoodsReceipt::reconcile(&order, &items, &cmd, "GR".into(), Utc::now()).unwrap();

        assert!(matches!(
            receipt.complete_quality_check(UserId::new(), QualityCheckStatus::Pending, None, Utc::now()),
            Err(DomainError::Validation(_))
        ));
        receipt
            .complete_quality_check(UserId::new(), QualityCheckStatus::Failed, Some("mould".into()), Utc::now())
            .unwrap();
        assert!(receipt.is_complete);
        assert!(matches!(
            receipt.complete_quality_check(UserId::new(), QualityCheckStatus::Passed, None, Utc::now()),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn delivery_score_bands() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let on = |d: u32| delivery_score(Some(expected), NaiveDate::from_ymd_opt(2024, 6, d).unwrap());
        assert_eq!(on(8), Some(5.0));
        assert_eq!(on(10), Some(4.5));
        assert_eq!(on(12), Some(4.0));
        assert_eq!(on(15), Some(3.0));
        assert_eq!(on(20), Some(2.0));
        assert_eq!(on(21), Some(1.0));
        assert_eq!(delivery_score(None, expected), None);
    }
}
