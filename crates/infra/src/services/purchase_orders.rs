//! Purchase order lifecycle and its approval chain.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use stockflow_auth::Role;
use stockflow_core::UserId;
use stockflow_purchasing::{
    NewPurchaseOrder, PricedLine, PurchaseApproval, PurchaseOrder, PurchaseOrderApproved,
    PurchaseOrderCreated, PurchaseOrderId, PurchaseOrderItem, PurchaseOrderRejected,
    PurchaseOrderStatus, PurchaseOrderStatusChanged, PurchaseOrderSubmitted, PurchasingEvent,
    document_number,
};

use crate::db::{DocumentSequence, PendingApproval, StoreTx};
use crate::error::{ProcurementError, ProcurementResult};
use crate::publisher::DomainEvent;

use super::ServiceContext;

/// An order with its lines and approval rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderDetail {
    pub order: PurchaseOrder,
    pub items: Vec<PurchaseOrderItem>,
    pub approvals: Vec<PurchaseApproval>,
}

pub(crate) fn status_changed(
    order: &PurchaseOrder,
    from: PurchaseOrderStatus,
    now: DateTime<Utc>,
) -> DomainEvent {
    PurchasingEvent::OrderStatusChanged(PurchaseOrderStatusChanged {
        order_id: order.id,
        from,
        to: order.status,
        occurred_at: now,
    })
    .into()
}

/// Price the lines, number the order and insert it as a draft.
///
/// Unit cost comes from the command, else the supplier's offer, else the
/// average cost of the product's ledger records.
pub(crate) async fn create_in_tx(
    tx: &mut dyn StoreTx,
    cmd: &NewPurchaseOrder,
    tax_rate: Decimal,
    now: DateTime<Utc>,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<(PurchaseOrder, Vec<PurchaseOrderItem>)> {
    cmd.validate()?;
    let supplier = tx
        .find_supplier(cmd.supplier_id)
        .await?
        .ok_or_else(|| ProcurementError::not_found(format!("supplier {}", cmd.supplier_id)))?;

    let mut lines = Vec::with_capacity(cmd.items.len());
    for line in &cmd.items {
        let unit_cost = match line.unit_cost {
            Some(cost) => cost,
            None => price_line(tx, cmd, line.product_id).await?,
        };
        lines.push(PricedLine {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_cost,
        });
    }

    let sequence = tx.next_sequence(DocumentSequence::PurchaseOrder).await?;
    let po_number = document_number(
        DocumentSequence::PurchaseOrder.prefix(),
        now.date_naive(),
        sequence,
    );
    let (order, items) = PurchaseOrder::draft(cmd, &lines, &supplier, tax_rate, po_number, now)?;
    tx.insert_order(&order, &items).await?;

    events.push(
        PurchasingEvent::OrderCreated(PurchaseOrderCreated {
            order_id: order.id,
            po_number: order.po_number.clone(),
            supplier_id: order.supplier_id,
            branch_id: order.branch_id,
            urgency: order.urgency,
            total_amount: order.totals.total_amount,
            occurred_at: now,
        })
        .into(),
    );
    info!(po_number = %order.po_number, total = %order.totals.total_amount, "purchase order created");
    Ok((order, items))
}

async fn price_line(
    tx: &mut dyn StoreTx,
    cmd: &NewPurchaseOrder,
    product_id: stockflow_core::ProductId,
) -> ProcurementResult<Decimal> {
    if let Some(offer) = tx.find_supplier_product(cmd.supplier_id, product_id).await? {
        return Ok(offer.unit_cost);
    }
    match tx.average_unit_cost(product_id).await? {
        Some(cost) if cost > Decimal::ZERO => Ok(cost),
        _ => Err(ProcurementError::validation(format!(
            "no unit cost known for product {product_id}"
        ))),
    }
}

async fn lock_order(tx: &mut dyn StoreTx, id: PurchaseOrderId) -> ProcurementResult<PurchaseOrder> {
    tx.lock_order(id)
        .await?
        .ok_or_else(|| ProcurementError::not_found(format!("purchase order {id}")))
}

#[derive(Clone)]
pub struct PurchaseOrders {
    ctx: ServiceContext,
}

impl PurchaseOrders {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, cmd), fields(supplier_id = %cmd.supplier_id, branch_id = %cmd.branch_id), err)]
    pub async fn create(&self, cmd: NewPurchaseOrder) -> ProcurementResult<PurchaseOrderDetail> {
        cmd.validate()?;
        let now = Utc::now();
        let mut events = Vec::new();

        let mut tx = self.ctx.store.begin().await?;
        let (order, items) =
            create_in_tx(tx.as_mut(), &cmd, self.ctx.config.tax_rate, now, &mut events).await?;
        self.ctx.finish(tx, &[], events).await?;

        Ok(PurchaseOrderDetail {
            order,
            items,
            approvals: Vec::new(),
        })
    }

    /// Draft → pending approval, creating one approval row per required level.
    #[instrument(skip(self), err)]
    pub async fn submit(&self, order_id: PurchaseOrderId) -> ProcurementResult<PurchaseOrderDetail> {
        let now = Utc::now();
        let mut tx = self.ctx.store.begin().await?;
        let mut order = lock_order(tx.as_mut(), order_id).await?;
        let from = order.status;
        order.submit(now)?;

        let approvals = self.ctx.config.approval.required_rows(&order, now);
        tx.update_order(&order).await?;
        tx.insert_approvals(&approvals).await?;
        let items = tx.order_items(order.id).await?;

        let events = vec![
            status_changed(&order, from, now),
            PurchasingEvent::OrderSubmitted(PurchaseOrderSubmitted {
                order_id: order.id,
                required_roles: approvals.iter().map(|a| a.required_role.to_string()).collect(),
                occurred_at: now,
            })
            .into(),
        ];
        self.ctx.finish(tx, &[], events).await?;

        info!(po_number = %order.po_number, levels = approvals.len(), "submitted for approval");
        Ok(PurchaseOrderDetail {
            order,
            items,
            approvals,
        })
    }

    /// Resolve the lowest pending level that `role` may sign.
    ///
    /// The order moves to `Approved` once no level is left pending.
    #[instrument(skip(self, comments), err)]
    pub async fn approve(
        &self,
        order_id: PurchaseOrderId,
        approver: UserId,
        role: &Role,
        comments: Option<String>,
        approved_amount: Option<Decimal>,
    ) -> ProcurementResult<PurchaseOrder> {
        let now = Utc::now();
        let mut tx = self.ctx.store.begin().await?;
        let mut order = lock_order(tx.as_mut(), order_id).await?;
        order.ensure_status(PurchaseOrderStatus::PendingApproval)?;

        let mut approval = tx
            .lock_pending_approval(order.id, role)
            .await?
            .ok_or_else(|| {
                ProcurementError::conflict(format!(
                    "no pending approval for role '{role}' on {}",
                    order.po_number
                ))
            })?;
        approval.approve(approver, comments, approved_amount, now)?;
        tx.update_approval(&approval).await?;

        let mut events = Vec::new();
        if tx.count_pending_approvals(order.id).await? == 0 {
            let from = order.status;
            order.mark_approved(approver, now)?;
            tx.update_order(&order).await?;
            events.push(status_changed(&order, from, now));
            events.push(
                PurchasingEvent::OrderApproved(PurchaseOrderApproved {
                    order_id: order.id,
                    approved_by: approver,
                    occurred_at: now,
                })
                .into(),
            );
        }
        self.ctx.finish(tx, &[], events).await?;

        info!(
            po_number = %order.po_number,
            level = approval.approval_level,
            status = %order.status,
            "approval recorded"
        );
        Ok(order)
    }

    /// Any single rejection rejects the whole order.
    #[instrument(skip(self, reason), err)]
    pub async fn reject(
        &self,
        order_id: PurchaseOrderId,
        approver: UserId,
        role: &Role,
        reason: &str,
    ) -> ProcurementResult<PurchaseOrder> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ProcurementError::validation("rejection reason is required"));
        }
        let now = Utc::now();
        let mut tx = self.ctx.store.begin().await?;
        let mut order = lock_order(tx.as_mut(), order_id).await?;
        order.ensure_status(PurchaseOrderStatus::PendingApproval)?;

        let mut approval = tx
            .lock_pending_approval(order.id, role)
            .await?
            .ok_or_else(|| {
                ProcurementError::conflict(format!(
                    "no pending approval for role '{role}' on {}",
                    order.po_number
                ))
            })?;
        approval.reject(approver, reason, now)?;
        tx.update_approval(&approval).await?;

        let from = order.status;
        order.mark_rejected(approver, reason, now)?;
        tx.update_order(&order).await?;

        let events = vec![
            status_changed(&order, from, now),
            PurchasingEvent::OrderRejected(PurchaseOrderRejected {
                order_id: order.id,
                rejected_by: approver,
                reason: reason.to_string(),
                occurred_at: now,
            })
            .into(),
        ];
        self.ctx.finish(tx, &[], events).await?;

        info!(po_number = %order.po_number, "purchase order rejected");
        Ok(order)
    }

    #[instrument(skip(self), err)]
    pub async fn send_to_supplier(
        &self,
        order_id: PurchaseOrderId,
        by: UserId,
    ) -> ProcurementResult<PurchaseOrder> {
        self.transition(order_id, |order, now| order.send_to_supplier(by, now))
            .await
    }

    #[instrument(skip(self), err)]
    pub async fn confirm_by_supplier(&self, order_id: PurchaseOrderId) -> ProcurementResult<PurchaseOrder> {
        self.transition(order_id, |order, now| order.confirm_by_supplier(now))
            .await
    }

    #[instrument(skip(self), err)]
    pub async fn mark_in_transit(&self, order_id: PurchaseOrderId) -> ProcurementResult<PurchaseOrder> {
        self.transition(order_id, |order, now| order.mark_in_transit(now))
            .await
    }

    #[instrument(skip(self, reason), err)]
    pub async fn cancel(
        &self,
        order_id: PurchaseOrderId,
        by: UserId,
        reason: &str,
    ) -> ProcurementResult<PurchaseOrder> {
        self.transition(order_id, |order, now| order.cancel(by, reason, now))
            .await
    }

    async fn transition<F>(&self, order_id: PurchaseOrderId, apply: F) -> ProcurementResult<PurchaseOrder>
    where
        F: FnOnce(&mut PurchaseOrder, DateTime<Utc>) -> stockflow_core::DomainResult<()>,
    {
        let now = Utc::now();
        let mut tx = self.ctx.store.begin().await?;
        let mut order = lock_order(tx.as_mut(), order_id).await?;
        let from = order.status;
        apply(&mut order, now)?;
        tx.update_order(&order).await?;
        self.ctx
            .finish(tx, &[], vec![status_changed(&order, from, now)])
            .await?;

        info!(po_number = %order.po_number, %from, to = %order.status, "purchase order status changed");
        Ok(order)
    }

    pub async fn get(&self, order_id: PurchaseOrderId) -> ProcurementResult<PurchaseOrderDetail> {
        let mut tx = self.ctx.store.begin().await?;
        let order = tx
            .find_order(order_id)
            .await?
            .ok_or_else(|| ProcurementError::not_found(format!("purchase order {order_id}")))?;
        let items = tx.order_items(order_id).await?;
        let approvals = tx.approvals_for(order_id).await?;
        Ok(PurchaseOrderDetail {
            order,
            items,
            approvals,
        })
    }

    /// Approver queue for `role`: most urgent first, then oldest.
    pub async fn pending_for_role(&self, role: &Role) -> ProcurementResult<Vec<PendingApproval>> {
        let mut tx = self.ctx.store.begin().await?;
        let mut pending = tx.pending_approvals_for_role(role).await?;
        pending.sort_by(|a, b| {
            a.order
                .urgency
                .priority()
                .cmp(&b.order.urgency.priority())
                .then_with(|| a.order.created_at.cmp(&b.order.created_at))
        });
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcurementConfig;
    use crate::services::testing::Harness;
    use rust_decimal_macros::dec;
    use stockflow_core::{BranchId, ProductId};
    use stockflow_purchasing::{
        ApprovalAction, ApprovalMatrix, ApprovalTier, NewPurchaseOrderLine, Urgency,
    };

    fn order_cmd(h: &Harness, supplier: stockflow_core::SupplierId, qty: i64, cost: Option<Decimal>) -> NewPurchaseOrder {
        NewPurchaseOrder {
            supplier_id: supplier,
            branch_id: BranchId::new(),
            requested_by: h.user,
            items: vec![NewPurchaseOrderLine {
                product_id: ProductId::new(),
                quantity: qty,
                unit_cost: cost,
            }],
            urgency: None,
            required_date: None,
            source_alert_id: None,
            shipping_cost: None,
            discount_amount: None,
            notes: None,
        }
    }

    fn two_level_config() -> ProcurementConfig {
        ProcurementConfig {
            tax_rate: dec!(0.10),
            approval: ApprovalMatrix {
                default_role: "branch_manager".into(),
                tiers: vec![ApprovalTier {
                    level: 2,
                    role: "finance_manager".into(),
                    min_total: Some(dec!(1000)),
                    urgencies: Vec::new(),
                }],
            },
        }
    }

    #[tokio::test]
    async fn create_numbers_and_prices_the_draft() {
        let h = Harness::with_config(two_level_config());
        let supplier = h.supplier("s", 4.0, 4.0, 4.0, 3, dec!(0)).await;

        let detail = h.orders.create(order_cmd(&h, supplier.id, 10, Some(dec!(2.50)))).await.unwrap();
        assert_eq!(detail.order.status, PurchaseOrderStatus::Draft);
        assert!(detail.order.po_number.starts_with("PO-"));
        assert_eq!(detail.order.totals.subtotal, dec!(25.00));
        assert_eq!(detail.order.totals.tax_amount, dec!(2.50));
        assert_eq!(detail.items.len(), 1);

        let second = h.orders.create(order_cmd(&h, supplier.id, 1, Some(dec!(1)))).await.unwrap();
        assert_ne!(second.order.po_number, detail.order.po_number);
    }

    #[tokio::test]
    async fn missing_cost_falls_back_to_the_offer() {
        let h = Harness::new();
        let supplier = h.supplier("s", 4.0, 4.0, 4.0, 3, dec!(0)).await;
        let mut cmd = order_cmd(&h, supplier.id, 4, None);
        h.offer(&supplier, cmd.items[0].product_id, dec!(7.25), 1, false).await;

        let detail = h.orders.create(cmd.clone()).await.unwrap();
        assert_eq!(detail.items[0].unit_cost, dec!(7.25));

        cmd.items[0].product_id = ProductId::new();
        let err = h.orders.create(cmd).await.unwrap_err();
        assert!(matches!(err, ProcurementError::Validation(_)));
    }

    #[tokio::test]
    async fn small_order_needs_one_approval() {
        let h = Harness::with_config(two_level_config());
        let supplier = h.supplier("s", 4.0, 4.0, 4.0, 3, dec!(0)).await;
        let draft = h.orders.create(order_cmd(&h, supplier.id, 10, Some(dec!(1)))).await.unwrap();

        let submitted = h.orders.submit(draft.order.id).await.unwrap();
        assert_eq!(submitted.approvals.len(), 1);

        let order = h
            .orders
            .approve(draft.order.id, h.user, &Role::new("Branch_Manager"), None, None)
            .await
            .unwrap();
        assert_eq!(order.status, PurchaseOrderStatus::Approved);
        assert_eq!(order.approved_by, Some(h.user));
    }

    #[tokio::test]
    async fn large_order_waits_for_every_level() {
        let h = Harness::with_config(two_level_config());
        let supplier = h.supplier("s", 4.0, 4.0, 4.0, 3, dec!(0)).await;
        let draft = h.orders.create(order_cmd(&h, supplier.id, 100, Some(dec!(50)))).await.unwrap();
        let submitted = h.orders.submit(draft.order.id).await.unwrap();
        assert_eq!(submitted.approvals.len(), 2);

        let finance = Role::new("finance_manager");
        let after_first = h.orders.approve(draft.order.id, h.user, &finance, None, None).await.unwrap();
        assert_eq!(after_first.status, PurchaseOrderStatus::PendingApproval);

        let err = h.orders.approve(draft.order.id, h.user, &finance, None, None).await.unwrap_err();
        assert!(matches!(err, ProcurementError::Conflict(_)));

        let done = h
            .orders
            .approve(draft.order.id, h.user, &Role::new("branch_manager"), None, None)
            .await
            .unwrap();
        assert_eq!(done.status, PurchaseOrderStatus::Approved);

        let detail = h.orders.get(draft.order.id).await.unwrap();
        assert!(detail.approvals.iter().all(|a| a.action == Some(ApprovalAction::Approve)));
    }

    #[tokio::test]
    async fn rejection_needs_a_reason_and_ends_the_order() {
        let h = Harness::new();
        let supplier = h.supplier("s", 4.0, 4.0, 4.0, 3, dec!(0)).await;
        let draft = h.orders.create(order_cmd(&h, supplier.id, 1, Some(dec!(1)))).await.unwrap();
        h.orders.submit(draft.order.id).await.unwrap();
        let role = Role::new("branch_manager");

        let err = h.orders.reject(draft.order.id, h.user, &role, "   ").await.unwrap_err();
        assert!(matches!(err, ProcurementError::Validation(_)));

        let rejected = h.orders.reject(draft.order.id, h.user, &role, "over budget").await.unwrap();
        assert_eq!(rejected.status, PurchaseOrderStatus::Rejected);
        assert_eq!(rejected.cancelled_reason.as_deref(), Some("over budget"));

        let err = h.orders.send_to_supplier(draft.order.id, h.user).await.unwrap_err();
        assert!(matches!(err, ProcurementError::Conflict(_)));
    }

    #[tokio::test]
    async fn approved_order_walks_to_in_transit() {
        let h = Harness::new();
        let supplier = h.supplier("s", 4.0, 4.0, 4.0, 3, dec!(0)).await;
        let draft = h.orders.create(order_cmd(&h, supplier.id, 1, Some(dec!(1)))).await.unwrap();
        let id = draft.order.id;
        h.orders.submit(id).await.unwrap();
        h.orders
            .approve(id, h.user, &Role::new("branch_manager"), None, None)
            .await
            .unwrap();

        assert_eq!(
            h.orders.send_to_supplier(id, h.user).await.unwrap().status,
            PurchaseOrderStatus::SentToSupplier
        );
        assert_eq!(
            h.orders.confirm_by_supplier(id).await.unwrap().status,
            PurchaseOrderStatus::ConfirmedBySupplier
        );
        assert_eq!(
            h.orders.mark_in_transit(id).await.unwrap().status,
            PurchaseOrderStatus::InTransit
        );
        let err = h.orders.cancel(id, h.user, "changed mind").await.unwrap_err();
        assert!(matches!(err, ProcurementError::Conflict(_)));
    }

    #[tokio::test]
    async fn approver_queue_is_ordered_by_urgency_then_age() {
        let h = Harness::new();
        let supplier = h.supplier("s", 4.0, 4.0, 4.0, 3, dec!(0)).await;

        let mut normal = order_cmd(&h, supplier.id, 1, Some(dec!(1)));
        normal.urgency = Some(Urgency::Normal);
        let mut urgent = order_cmd(&h, supplier.id, 1, Some(dec!(1)));
        urgent.urgency = Some(Urgency::Urgent);

        let n = h.orders.create(normal).await.unwrap();
        let u = h.orders.create(urgent).await.unwrap();
        h.orders.submit(n.order.id).await.unwrap();
        h.orders.submit(u.order.id).await.unwrap();

        let queue = h.orders.pending_for_role(&Role::new("branch_manager")).await.unwrap();
        let ids: Vec<_> = queue.iter().map(|p| p.order.id).collect();
        assert_eq!(ids, vec![u.order.id, n.order.id]);
        assert!(h.orders.pending_for_role(&Role::new("finance_manager")).await.unwrap().is_empty());
    }
}
