//! Low-stock alerts and the automatic purchase orders drafted from them.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use stockflow_core::{BranchId, SupplierId, UserId};
use stockflow_inventory::{
    AlertDecision, AlertSeverity, InventoryEvent, InventoryItem, InventoryItemId,
    LowStockAlertRaised, StockAlert, StockAlertId,
};
use stockflow_purchasing::{NewPurchaseOrder, NewPurchaseOrderLine, PurchaseOrder, Urgency};

use crate::db::StoreTx;
use crate::error::{ProcurementError, ProcurementResult};
use crate::publisher::DomainEvent;

use super::ServiceContext;
use super::ledger::lock_existing;
use super::purchase_orders::create_in_tx;
use super::supplier_scoring::recommend_in_tx;

/// An alert covering an item's shortage; `created` is false when it already existed.
#[derive(Debug, Clone, PartialEq)]
pub struct RaisedAlert {
    pub alert: StockAlert,
    pub created: bool,
}

/// Caller choices that replace the alert-derived defaults of an auto-order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertOverrides {
    pub supplier_id: Option<SupplierId>,
    pub quantity: Option<i64>,
    pub urgency: Option<Urgency>,
    pub required_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

pub(crate) fn urgency_for(severity: AlertSeverity) -> Urgency {
    match severity {
        AlertSeverity::OutOfStock => Urgency::Urgent,
        AlertSeverity::Critical => Urgency::High,
        AlertSeverity::Low => Urgency::Normal,
    }
}

/// Raise an alert for `item` if it is at or under its reorder point and none is active.
pub(crate) async fn evaluate_in_tx(
    tx: &mut dyn StoreTx,
    item: &InventoryItem,
    now: DateTime<Utc>,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<Option<RaisedAlert>> {
    if !item.is_active || !item.needs_reorder() {
        return Ok(None);
    }
    let active = tx
        .lock_active_alert(item.key.product_id, item.key.branch_id)
        .await?;

    match StockAlert::evaluate(item, active, now) {
        AlertDecision::NotNeeded => Ok(None),
        AlertDecision::Existing(alert) => Ok(Some(RaisedAlert {
            alert,
            created: false,
        })),
        AlertDecision::Raise(alert) => record_raised(tx, alert, events).await.map(Some),
    }
}

/// Persist a freshly raised alert. If a concurrent transaction committed an
/// active alert for the same product and branch first, that one is returned.
async fn record_raised(
    tx: &mut dyn StoreTx,
    alert: StockAlert,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<RaisedAlert> {
    if !tx.insert_alert(&alert).await? {
        let winner = tx
            .lock_active_alert(alert.product_id, alert.branch_id)
            .await?
            .ok_or_else(|| {
                ProcurementError::Internal(format!(
                    "alert insert for product {} skipped but no active alert found",
                    alert.product_id
                ))
            })?;
        debug!(alert_id = %winner.id, "low stock alert raised concurrently, reusing it");
        return Ok(RaisedAlert {
            alert: winner,
            created: false,
        });
    }

    events.push(InventoryEvent::LowStockAlertRaised(LowStockAlertRaised::from(&alert)).into());
    info!(
        alert_id = %alert.id,
        product_id = %alert.product_id,
        branch_id = %alert.branch_id,
        current_stock = alert.current_stock,
        "low stock alert raised"
    );
    Ok(RaisedAlert {
        alert,
        created: true,
    })
}

#[derive(Clone)]
pub struct AlertTrigger {
    ctx: ServiceContext,
}

impl AlertTrigger {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Check one item against its thresholds.
    #[instrument(skip(self), err)]
    pub async fn raise_or_dedupe(&self, item_id: InventoryItemId) -> ProcurementResult<Option<RaisedAlert>> {
        let now = Utc::now();
        let mut events = Vec::new();

        let mut tx = self.ctx.store.begin().await?;
        let item = lock_existing(tx.as_mut(), item_id).await?;
        let raised = evaluate_in_tx(tx.as_mut(), &item, now, &mut events).await?;
        self.ctx.finish(tx, &[], events).await?;
        Ok(raised)
    }

    /// Check every item under its reorder point, optionally within one branch.
    #[instrument(skip(self), err)]
    pub async fn sweep(&self, branch_id: Option<BranchId>) -> ProcurementResult<Vec<RaisedAlert>> {
        let now = Utc::now();
        let mut events = Vec::new();

        let mut tx = self.ctx.store.begin().await?;
        let candidates = tx.list_reorder_candidates(branch_id).await?;
        let mut raised = Vec::with_capacity(candidates.len());
        for item in &candidates {
            if let Some(alert) = evaluate_in_tx(tx.as_mut(), item, now, &mut events).await? {
                raised.push(alert);
            }
        }
        self.ctx.finish(tx, &[], events).await?;

        let created = raised.iter().filter(|r| r.created).count();
        debug!(candidates = candidates.len(), created, "alert sweep finished");
        Ok(raised)
    }

    /// Draft a purchase order for an active alert and mark the alert processed.
    ///
    /// Supplier defaults to the best recommendation, quantity to the alert's
    /// suggestion, urgency to the alert's severity.
    #[instrument(skip(self, overrides), err)]
    pub async fn create_order_from_alert(
        &self,
        alert_id: StockAlertId,
        requested_by: UserId,
        overrides: AlertOverrides,
    ) -> ProcurementResult<PurchaseOrder> {
        if overrides.quantity.is_some_and(|q| q <= 0) {
            return Err(ProcurementError::validation("order quantity must be positive"));
        }
        let now = Utc::now();
        let mut events = Vec::new();

        let mut tx = self.ctx.store.begin().await?;
        let mut alert = tx
            .lock_alert(alert_id)
            .await?
            .ok_or_else(|| ProcurementError::not_found(format!("stock alert {alert_id}")))?;
        alert.ensure_active()?;

        let quantity = overrides.quantity.unwrap_or(alert.suggested_reorder_quantity);
        let supplier_id = match overrides.supplier_id {
            Some(id) => id,
            None => recommend_in_tx(tx.as_mut(), alert.product_id, quantity)
                .await?
                .first()
                .map(|r| r.supplier_id)
                .ok_or_else(|| {
                    ProcurementError::validation(format!(
                        "no supplier offers product {} for {quantity} units",
                        alert.product_id
                    ))
                })?,
        };

        let cmd = NewPurchaseOrder {
            supplier_id,
            branch_id: alert.branch_id,
            requested_by,
            items: vec![NewPurchaseOrderLine {
                product_id: alert.product_id,
                quantity,
                unit_cost: None,
            }],
            urgency: Some(overrides.urgency.unwrap_or_else(|| urgency_for(alert.severity()))),
            required_date: overrides.required_date,
            source_alert_id: Some(alert.id),
            shipping_cost: None,
            discount_amount: None,
            notes: overrides
                .notes
                .or_else(|| Some(format!("Auto-generated from low stock alert {}", alert.id))),
        };
        let (order, _) = create_in_tx(tx.as_mut(), &cmd, self.ctx.config.tax_rate, now, &mut events).await?;

        alert.mark_processed(Uuid::from(order.id), requested_by, now)?;
        tx.update_alert(&alert).await?;
        self.ctx.finish(tx, &[], events).await?;

        info!(po_number = %order.po_number, urgency = %order.urgency, "purchase order drafted from alert");
        Ok(order)
    }

    pub async fn get(&self, alert_id: StockAlertId) -> ProcurementResult<StockAlert> {
        let mut tx = self.ctx.store.begin().await?;
        tx.find_alert(alert_id)
            .await?
            .ok_or_else(|| ProcurementError::not_found(format!("stock alert {alert_id}")))
    }

    /// Close an alert without ordering.
    #[instrument(skip(self), err)]
    pub async fn dismiss(&self, alert_id: StockAlertId, by: UserId) -> ProcurementResult<StockAlert> {
        let now = Utc::now();
        let mut tx = self.ctx.store.begin().await?;
        let mut alert = tx
            .lock_alert(alert_id)
            .await?
            .ok_or_else(|| ProcurementError::not_found(format!("stock alert {alert_id}")))?;
        alert.dismiss(by, now)?;
        tx.update_alert(&alert).await?;
        tx.commit().await?;
        Ok(alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{Harness, manual_adjust};
    use rust_decimal_macros::dec;
    use stockflow_inventory::{AlertStatus, StockThresholds};
    use stockflow_purchasing::PurchaseOrderStatus;

    fn reorder_at(point: i64, quantity: i64) -> StockThresholds {
        StockThresholds {
            reorder_point: point,
            reorder_quantity: quantity,
            ..StockThresholds::default()
        }
    }

    #[test]
    fn severity_drives_urgency() {
        assert_eq!(urgency_for(AlertSeverity::OutOfStock), Urgency::Urgent);
        assert_eq!(urgency_for(AlertSeverity::Critical), Urgency::High);
        assert_eq!(urgency_for(AlertSeverity::Low), Urgency::Normal);
    }

    #[tokio::test]
    async fn losing_a_concurrent_raise_reuses_the_committed_alert() {
        let h = Harness::new();
        let item = h.stocked_item(5, reorder_at(10, 20)).await;
        let committed = h.alerts.raise_or_dedupe(item.id).await.unwrap().unwrap();

        // This transaction checked for an active alert before the other committed.
        let AlertDecision::Raise(late) = StockAlert::evaluate(&item, None, Utc::now()) else {
            panic!("expected a raise decision");
        };
        let mut events = Vec::new();
        let mut tx = h.ctx.store.begin().await.unwrap();
        let outcome = record_raised(tx.as_mut(), late, &mut events).await.unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.alert.id, committed.alert.id);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn crossing_the_reorder_point_raises_one_alert() {
        let h = Harness::new();
        let item = h.stocked_item(12, reorder_at(10, 5)).await;

        let first = h.ledger.adjust(manual_adjust(item.id, -3, h.user)).await.unwrap();
        let raised = first.alert.expect("alert raised");
        assert!(raised.created);
        assert_eq!(raised.alert.current_stock, 9);

        let second = h.ledger.adjust(manual_adjust(item.id, -1, h.user)).await.unwrap();
        let again = second.alert.expect("alert still active");
        assert!(!again.created);
        assert_eq!(again.alert.id, raised.alert.id);
    }

    #[tokio::test]
    async fn sweep_picks_up_items_already_under_threshold() {
        let h = Harness::new();
        let low = h.stocked_item(2, reorder_at(5, 10)).await;
        h.stocked_item(50, reorder_at(5, 10)).await;

        let raised = h.alerts.sweep(None).await.unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].alert.item_id, low.id);

        let repeat = h.alerts.sweep(Some(low.key.branch_id)).await.unwrap();
        assert_eq!(repeat.len(), 1);
        assert!(!repeat[0].created);
    }

    #[tokio::test]
    async fn alert_becomes_a_draft_order_for_the_best_supplier() {
        let h = Harness::new();
        let item = h.stocked_item(0, reorder_at(10, 5)).await;
        let best = h.supplier("best", 5.0, 5.0, 5.0, 2, dec!(0)).await;
        let other = h.supplier("other", 2.0, 2.0, 2.0, 9, dec!(0)).await;
        h.offer(&best, item.key.product_id, dec!(2.00), 1, true).await;
        h.offer(&other, item.key.product_id, dec!(1.50), 1, false).await;

        let raised = h.alerts.raise_or_dedupe(item.id).await.unwrap().unwrap();
        let order = h
            .alerts
            .create_order_from_alert(raised.alert.id, h.user, AlertOverrides::default())
            .await
            .unwrap();

        assert_eq!(order.status, PurchaseOrderStatus::Draft);
        assert_eq!(order.supplier_id, best.id);
        assert_eq!(order.urgency, Urgency::Urgent);
        assert_eq!(order.source_alert_id, Some(raised.alert.id));
        let detail = h.orders.get(order.id).await.unwrap();
        assert_eq!(detail.items[0].quantity_ordered, raised.alert.suggested_reorder_quantity);
        assert_eq!(detail.items[0].unit_cost, dec!(2.00));

        let err = h
            .alerts
            .create_order_from_alert(raised.alert.id, h.user, AlertOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcurementError::Conflict(_)));
    }

    #[tokio::test]
    async fn no_offer_means_no_auto_order() {
        let h = Harness::new();
        let item = h.stocked_item(1, reorder_at(10, 5)).await;
        let raised = h.alerts.raise_or_dedupe(item.id).await.unwrap().unwrap();

        let err = h
            .alerts
            .create_order_from_alert(raised.alert.id, h.user, AlertOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcurementError::Validation(_)));

        let dismissed = h.alerts.dismiss(raised.alert.id, h.user).await.unwrap();
        assert_eq!(dismissed.status, AlertStatus::Dismissed);
    }
}
