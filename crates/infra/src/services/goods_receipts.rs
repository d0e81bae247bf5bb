//! Goods receipt reconciliation: deliveries posted back into the ledger.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use stockflow_core::{BranchId, UserId, lock_order};
use stockflow_inventory::{
    AdjustStock, InventoryItem, InventoryItemId, ItemKey, MovementReference, MovementType,
    StockThresholds,
};
use stockflow_purchasing::{
    GoodsReceipt, GoodsReceiptId, GoodsReceiptItem, GoodsReceiptRecorded, PurchaseOrderId,
    PurchasingEvent, QualityCheckStatus, ReceiveGoods, delivery_score, document_number,
};

use crate::db::{DocumentSequence, StoreTx};
use crate::error::{ProcurementError, ProcurementResult};

use super::ServiceContext;
use super::alerts::evaluate_in_tx;
use super::ledger::adjust_locked;
use super::purchase_orders::status_changed;

/// A receipt with its lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodsReceiptDetail {
    pub receipt: GoodsReceipt,
    pub items: Vec<GoodsReceiptItem>,
}

#[derive(Clone)]
pub struct GoodsReceipts {
    ctx: ServiceContext,
}

impl GoodsReceipts {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Record a delivery against a sent order and post accepted lines to stock.
    ///
    /// One receipt per order. The order completes, and the supplier's delivery
    /// rating absorbs the punctuality of this delivery.
    #[instrument(skip(self, cmd), fields(order_id = %cmd.purchase_order_id, lines = cmd.items.len()), err)]
    pub async fn receive(&self, cmd: ReceiveGoods) -> ProcurementResult<GoodsReceiptDetail> {
        cmd.validate()?;
        let now = Utc::now();
        let mut events = Vec::new();

        let mut tx = self.ctx.store.begin().await?;
        let mut order = tx
            .lock_order(cmd.purchase_order_id)
            .await?
            .ok_or_else(|| {
                ProcurementError::not_found(format!("purchase order {}", cmd.purchase_order_id))
            })?;
        if let Some(existing) = tx.find_receipt_for_order(order.id).await? {
            return Err(ProcurementError::conflict(format!(
                "purchase order {} already has receipt {}",
                order.po_number, existing.receipt_number
            )));
        }

        let order_items = tx.order_items(order.id).await?;
        let sequence = tx.next_sequence(DocumentSequence::GoodsReceipt).await?;
        let receipt_number = document_number(
            DocumentSequence::GoodsReceipt.prefix(),
            now.date_naive(),
            sequence,
        );
        let (receipt, mut items) =
            GoodsReceipt::reconcile(&order, &order_items, &cmd, receipt_number, now)?;

        let mut ledger = resolve_items(tx.as_mut(), order.branch_id, &items).await?;
        let reference = MovementReference::new("goods_receipt", receipt.id.to_string());
        for line in items.iter_mut().filter(|l| l.accepted_quantity() > 0) {
            let key = ItemKey::new(line.product_id, order.branch_id, line.batch_number.clone());
            let item = ledger
                .get_mut(&key)
                .ok_or_else(|| ProcurementError::Internal(format!("no ledger record resolved for {key:?}")))?;
            item.reactivate(now);
            if line.expiration_date.is_some() {
                item.expiration_date = line.expiration_date;
            }
            let posting = AdjustStock {
                item_id: item.id,
                delta: line.accepted_quantity(),
                movement_type: MovementType::Receipt,
                reference: reference.clone(),
                notes: Some(format!("Received against {}", order.po_number)),
                performed_by: cmd.received_by,
            };
            adjust_locked(tx.as_mut(), item, &posting, now, &mut events).await?;
            line.inventory_item_id = Some(item.id);
        }
        for item in ledger.values() {
            evaluate_in_tx(tx.as_mut(), item, now, &mut events).await?;
        }

        tx.insert_receipt(&receipt, &items).await?;

        let from = order.status;
        order.complete(now)?;
        tx.update_order(&order).await?;

        if let Some(score) = delivery_score(order.expected_delivery_date, receipt.delivery_date) {
            match tx.lock_supplier(order.supplier_id).await? {
                Some(mut supplier) => {
                    supplier.record_delivery_score(score, now);
                    tx.upsert_supplier(&supplier).await?;
                }
                None => warn!(supplier_id = %order.supplier_id, "supplier missing, delivery score dropped"),
            }
        }

        events.push(
            PurchasingEvent::ReceiptRecorded(GoodsReceiptRecorded {
                receipt_id: receipt.id,
                order_id: order.id,
                receipt_number: receipt.receipt_number.clone(),
                has_discrepancies: receipt.has_discrepancies,
                total_received_amount: receipt.total_received_amount,
                occurred_at: now,
            })
            .into(),
        );
        events.push(status_changed(&order, from, now));

        let touched: Vec<InventoryItemId> = ledger.values().map(|i| i.id).collect();
        self.ctx.finish(tx, &touched, events).await?;

        info!(
            receipt_number = %receipt.receipt_number,
            has_discrepancies = receipt.has_discrepancies,
            total = %receipt.total_received_amount,
            "goods received"
        );
        Ok(GoodsReceiptDetail { receipt, items })
    }

    /// Final quality verdict. The ledger is not touched again.
    #[instrument(skip(self, notes), err)]
    pub async fn complete_quality_check(
        &self,
        receipt_id: GoodsReceiptId,
        checked_by: UserId,
        status: QualityCheckStatus,
        notes: Option<String>,
    ) -> ProcurementResult<GoodsReceipt> {
        let now = Utc::now();
        let mut tx = self.ctx.store.begin().await?;
        let mut receipt = tx
            .lock_receipt(receipt_id)
            .await?
            .ok_or_else(|| ProcurementError::not_found(format!("goods receipt {receipt_id}")))?;
        receipt.complete_quality_check(checked_by, status, notes, now)?;
        tx.update_receipt(&receipt).await?;

        if let Some(score) = status.quality_score() {
            let order = tx.find_order(receipt.purchase_order_id).await?.ok_or_else(|| {
                ProcurementError::Internal(format!(
                    "receipt {} points at a missing order",
                    receipt.receipt_number
                ))
            })?;
            if let Some(mut supplier) = tx.lock_supplier(order.supplier_id).await? {
                supplier.record_quality_score(score, now);
                tx.upsert_supplier(&supplier).await?;
            }
        }
        tx.commit().await?;

        info!(receipt_number = %receipt.receipt_number, status = status.as_str(), "quality check completed");
        Ok(receipt)
    }

    pub async fn get(&self, receipt_id: GoodsReceiptId) -> ProcurementResult<GoodsReceiptDetail> {
        let mut tx = self.ctx.store.begin().await?;
        let receipt = tx
            .find_receipt(receipt_id)
            .await?
            .ok_or_else(|| ProcurementError::not_found(format!("goods receipt {receipt_id}")))?;
        let items = tx.receipt_items(receipt_id).await?;
        Ok(GoodsReceiptDetail { receipt, items })
    }

    /// The receipt recorded for an order, if any.
    pub async fn for_order(&self, order_id: PurchaseOrderId) -> ProcurementResult<Option<GoodsReceiptDetail>> {
        let mut tx = self.ctx.store.begin().await?;
        let Some(receipt) = tx.find_receipt_for_order(order_id).await? else {
            return Ok(None);
        };
        let items = tx.receipt_items(receipt.id).await?;
        Ok(Some(GoodsReceiptDetail { receipt, items }))
    }
}

/// Find or create the ledger record for every accepted line, locking existing
/// records in ascending id order.
async fn resolve_items(
    tx: &mut dyn StoreTx,
    branch_id: BranchId,
    lines: &[GoodsReceiptItem],
) -> ProcurementResult<HashMap<ItemKey, InventoryItem>> {
    let now = Utc::now();
    let mut wanted: HashMap<ItemKey, &GoodsReceiptItem> = HashMap::new();
    for line in lines.iter().filter(|l| l.accepted_quantity() > 0) {
        let key = ItemKey::new(line.product_id, branch_id, line.batch_number.clone());
        wanted.entry(key).or_insert(line);
    }

    let mut existing: HashMap<InventoryItemId, ItemKey> = HashMap::new();
    let mut missing = Vec::new();
    for (key, line) in &wanted {
        match tx.find_item_by_key(key).await? {
            Some(item) => {
                existing.insert(item.id, key.clone());
            }
            None => missing.push((key.clone(), *line)),
        }
    }

    let mut resolved = HashMap::with_capacity(wanted.len());
    for id in lock_order(existing.keys().copied()) {
        let item = tx
            .lock_item(id)
            .await?
            .ok_or_else(|| ProcurementError::conflict(format!("inventory item {id} vanished during receipt")))?;
        resolved.insert(item.key.clone(), item);
    }
    for (key, line) in missing {
        let mut item = InventoryItem::provision(key.clone(), StockThresholds::default(), line.unit_cost, now)?;
        item.expiration_date = line.expiration_date;
        tx.insert_item(&item).await?;
        resolved.insert(key, item);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::Harness;
    use rust_decimal_macros::dec;
    use stockflow_purchasing::{PurchaseOrderStatus, ReceiveLine};

    #[tokio::test]
    async fn receipt_posts_accepted_lines_and_completes_the_order() {
        let h = Harness::new();
        let sent = h.sent_order(&[(40, dec!(5)), (10, dec!(5))]).await;

        let detail = h
            .receipts
            .receive(ReceiveGoods {
                purchase_order_id: sent.order.id,
                received_by: h.user,
                items: vec![
                    ReceiveLine {
                        purchase_order_item_id: sent.items[0].id,
                        received_quantity: 38,
                        is_accepted: None,
                        rejection_reason: None,
                        batch_number: Some("LOT-9".into()),
                        expiration_date: None,
                    },
                    ReceiveLine {
                        purchase_order_item_id: sent.items[1].id,
                        received_quantity: 10,
                        is_accepted: Some(false),
                        rejection_reason: Some("damaged".into()),
                        batch_number: None,
                        expiration_date: None,
                    },
                ],
                delivery_date: None,
                notes: None,
            })
            .await
            .unwrap();

        assert!(detail.receipt.receipt_number.starts_with("GR-"));
        assert!(detail.receipt.has_discrepancies);
        assert_eq!(detail.receipt.quality_check_status, QualityCheckStatus::Partial);
        assert_eq!(detail.receipt.total_received_amount, dec!(190));

        let posted = detail.items[0].inventory_item_id.expect("posted to ledger");
        assert!(detail.items[1].inventory_item_id.is_none());
        let item = h.ledger.get(posted).await.unwrap();
        assert_eq!(item.current_stock(), 38);
        assert_eq!(item.key.batch_number.as_deref(), Some("LOT-9"));

        let history = h.ledger.movements(posted).await.unwrap();
        assert_eq!(history[0].movement_type, MovementType::Receipt);
        assert_eq!(history[0].reference.reference_type, "goods_receipt");

        let order = h.orders.get(sent.order.id).await.unwrap().order;
        assert_eq!(order.status, PurchaseOrderStatus::Completed);
        assert!(order.received_at.is_some());
    }

    #[tokio::test]
    async fn short_delivery_records_the_missing_line() {
        let h = Harness::new();
        let sent = h.sent_order(&[(90, dec!(5)), (10, dec!(5))]).await;

        let detail = h
            .receipts
            .receive(ReceiveGoods {
                purchase_order_id: sent.order.id,
                received_by: h.user,
                items: vec![ReceiveLine {
                    purchase_order_item_id: sent.items[0].id,
                    received_quantity: 90,
                    is_accepted: None,
                    rejection_reason: None,
                    batch_number: None,
                    expiration_date: None,
                }],
                delivery_date: None,
                notes: None,
            })
            .await
            .unwrap();

        assert!(detail.receipt.has_discrepancies);
        assert_eq!(detail.receipt.total_received_amount, dec!(450));
        let stored = h.receipts.for_order(sent.order.id).await.unwrap().unwrap();
        assert_eq!(stored.items.len(), 2);
        let missing = stored
            .items
            .iter()
            .find(|l| l.purchase_order_item_id == sent.items[1].id)
            .expect("undelivered line recorded");
        assert_eq!(missing.received_quantity, 0);
        assert_eq!(missing.discrepancy, -10);
        assert!(missing.inventory_item_id.is_none());
    }

    #[tokio::test]
    async fn undelivered_order_cannot_be_received() {
        let h = Harness::new();
        let supplier = h.supplier("s", 4.0, 4.0, 4.0, 3, dec!(0)).await;
        let draft = h.draft_order(&supplier, &[(5, dec!(1))]).await;

        let err = h
            .receipts
            .receive(ReceiveGoods {
                purchase_order_id: draft.order.id,
                received_by: h.user,
                items: vec![ReceiveLine {
                    purchase_order_item_id: draft.items[0].id,
                    received_quantity: 5,
                    is_accepted: None,
                    rejection_reason: None,
                    batch_number: None,
                    expiration_date: None,
                }],
                delivery_date: None,
                notes: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProcurementError::Conflict(_)));
    }

    #[tokio::test]
    async fn quality_check_closes_the_receipt_and_rates_the_supplier() {
        let h = Harness::new();
        let sent = h.sent_order(&[(5, dec!(1))]).await;
        let detail = h
            .receipts
            .receive(ReceiveGoods {
                purchase_order_id: sent.order.id,
                received_by: h.user,
                items: vec![ReceiveLine {
                    purchase_order_item_id: sent.items[0].id,
                    received_quantity: 5,
                    is_accepted: None,
                    rejection_reason: None,
                    batch_number: None,
                    expiration_date: None,
                }],
                delivery_date: None,
                notes: None,
            })
            .await
            .unwrap();

        let checked = h
            .receipts
            .complete_quality_check(detail.receipt.id, h.user, QualityCheckStatus::Failed, Some("mould".into()))
            .await
            .unwrap();
        assert!(checked.is_complete);
        assert_eq!(checked.quality_check_status, QualityCheckStatus::Failed);

        let supplier = h.find_supplier(sent.order.supplier_id).await;
        assert_eq!(supplier.rated_inspections, 1);
        assert_eq!(supplier.quality_rating, 1.0);
        assert_eq!(supplier.rated_deliveries, 1);

        let err = h
            .receipts
            .complete_quality_check(detail.receipt.id, h.user, QualityCheckStatus::Passed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcurementError::Conflict(_)));

        let stored = h.receipts.for_order(sent.order.id).await.unwrap().unwrap();
        assert_eq!(stored.receipt.id, detail.receipt.id);
        assert_eq!(stored.items.len(), 1);
    }
}
