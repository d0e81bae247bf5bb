//! `Procurement`: the authorized entry point over the ledger and purchasing services.
//!
//! Every operation takes the caller's [`Principal`] and checks, before any
//! write, that it
//!
//! - holds the permission for the operation (`*` grants everything),
//! - is scoped to the branch owning the item, order, receipt or alert.
//!
//! Approvals and rejections act as the principal's own role. Actor fields on
//! commands (`performed_by`, `requested_by`, `received_by`) are overwritten with
//! the principal's user id.
//!
//! ```text
//! Principal ──authorize──▶ Procurement ──▶ services ──▶ Store (one tx)
//!                                               └──▶ cache invalidation, events
//! ```

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use stockflow_auth::{Principal, authorize, authorize_branch, permissions::known};
use stockflow_core::{BranchId, ProductId};
use stockflow_inventory::{AdjustStock, InventoryItem, InventoryItemId, StockAlert, StockAlertId, StockMovement};
use stockflow_purchasing::{
    GoodsReceipt, GoodsReceiptId, NewPurchaseOrder, PurchaseOrder, PurchaseOrderId,
    QualityCheckStatus, ReceiveGoods, Supplier, SupplierProduct, SupplierRecommendation,
};

use crate::cache::{CacheBackend, InMemoryCache, ItemCache};
use crate::config::AppConfig;
use crate::db::{PendingApproval, PgStore, Store};
use crate::error::ProcurementResult;
use crate::publisher::{EnvelopeSink, EventPublisher};
use crate::services::{
    AdjustmentResult, AlertOverrides, AlertTrigger, GoodsReceiptDetail, GoodsReceipts,
    ProvisionItem, PurchaseOrderDetail, PurchaseOrders, RaisedAlert, Reservations,
    ServiceContext, StockLedger, SupplierScoring, TransferResult,
};

#[derive(Clone)]
pub struct Procurement {
    ledger: StockLedger,
    reservations: Reservations,
    orders: PurchaseOrders,
    receipts: GoodsReceipts,
    scoring: SupplierScoring,
    alerts: AlertTrigger,
}

impl Procurement {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            ledger: StockLedger::new(ctx.clone()),
            reservations: Reservations::new(ctx.clone()),
            orders: PurchaseOrders::new(ctx.clone()),
            receipts: GoodsReceipts::new(ctx.clone()),
            scoring: SupplierScoring::new(ctx.clone()),
            alerts: AlertTrigger::new(ctx),
        }
    }

    /// Wire the Postgres store and the configured cache.
    ///
    /// Redis backs the cache when `redis_url` is set and the `redis` feature is
    /// enabled; otherwise an in-process cache is used.
    pub async fn connect(config: &AppConfig, sink: Arc<dyn EnvelopeSink>) -> ProcurementResult<Self> {
        let store = PgStore::connect(
            &config.database.url,
            config.database.min_connections,
            config.database.max_connections,
        )
        .await?;
        let backend = cache_backend(config).await?;
        let ctx = ServiceContext::new(
            Arc::new(store) as Arc<dyn Store>,
            EventPublisher::new(sink),
            ItemCache::new(backend, config.cache.ttl()),
            config.procurement.clone(),
        );
        info!("procurement services ready");
        Ok(Self::new(ctx))
    }

    // --- stock ledger ---

    pub async fn adjust_stock(
        &self,
        principal: &Principal,
        mut cmd: AdjustStock,
    ) -> ProcurementResult<AdjustmentResult> {
        authorize(principal, &known::inventory_adjust())?;
        self.authorize_item(principal, cmd.item_id).await?;
        cmd.performed_by = principal.user_id;
        self.ledger.adjust(cmd).await
    }

    pub async fn adjust_stock_many(
        &self,
        principal: &Principal,
        mut lines: Vec<AdjustStock>,
    ) -> ProcurementResult<Vec<AdjustmentResult>> {
        authorize(principal, &known::inventory_adjust())?;
        for line in &mut lines {
            self.authorize_item(principal, line.item_id).await?;
            line.performed_by = principal.user_id;
        }
        self.ledger.adjust_many(lines).await
    }

    /// Both branches must be in the principal's scope.
    pub async fn transfer_stock(
        &self,
        principal: &Principal,
        from_item_id: InventoryItemId,
        to_item_id: InventoryItemId,
        quantity: i64,
        notes: Option<String>,
    ) -> ProcurementResult<TransferResult> {
        authorize(principal, &known::inventory_adjust())?;
        self.authorize_item(principal, from_item_id).await?;
        self.authorize_item(principal, to_item_id).await?;
        self.ledger
            .transfer(from_item_id, to_item_id, quantity, principal.user_id, notes)
            .await
    }

    pub async fn provision_item(
        &self,
        principal: &Principal,
        cmd: ProvisionItem,
    ) -> ProcurementResult<InventoryItem> {
        authorize(principal, &known::inventory_manage())?;
        authorize_branch(principal, cmd.branch_id)?;
        self.ledger.provision(cmd).await
    }

    pub async fn deactivate_item(
        &self,
        principal: &Principal,
        item_id: InventoryItemId,
    ) -> ProcurementResult<InventoryItem> {
        authorize(principal, &known::inventory_manage())?;
        self.authorize_item(principal, item_id).await?;
        self.ledger.deactivate(item_id).await
    }

    pub async fn get_item(
        &self,
        principal: &Principal,
        item_id: InventoryItemId,
    ) -> ProcurementResult<InventoryItem> {
        authorize(principal, &known::inventory_read())?;
        self.authorize_item(principal, item_id).await
    }

    pub async fn available(&self, principal: &Principal, item_id: InventoryItemId) -> ProcurementResult<i64> {
        Ok(self.get_item(principal, item_id).await?.available())
    }

    pub async fn list_movements(
        &self,
        principal: &Principal,
        item_id: InventoryItemId,
    ) -> ProcurementResult<Vec<StockMovement>> {
        authorize(principal, &known::inventory_read())?;
        self.authorize_item(principal, item_id).await?;
        self.ledger.movements(item_id).await
    }

    // --- reservations ---

    pub async fn reserve_stock(
        &self,
        principal: &Principal,
        item_id: InventoryItemId,
        quantity: i64,
        reference_id: &str,
    ) -> ProcurementResult<InventoryItem> {
        authorize(principal, &known::inventory_reserve())?;
        self.authorize_item(principal, item_id).await?;
        self.reservations.reserve(item_id, quantity, reference_id).await
    }

    pub async fn release_stock(
        &self,
        principal: &Principal,
        item_id: InventoryItemId,
        quantity: i64,
        reference_id: &str,
    ) -> ProcurementResult<InventoryItem> {
        authorize(principal, &known::inventory_reserve())?;
        self.authorize_item(principal, item_id).await?;
        self.reservations.release(item_id, quantity, reference_id).await
    }

    // --- purchase orders ---

    pub async fn create_purchase_order(
        &self,
        principal: &Principal,
        mut cmd: NewPurchaseOrder,
    ) -> ProcurementResult<PurchaseOrderDetail> {
        authorize(principal, &known::purchasing_create())?;
        authorize_branch(principal, cmd.branch_id)?;
        cmd.requested_by = principal.user_id;
        self.orders.create(cmd).await
    }

    pub async fn submit_for_approval(
        &self,
        principal: &Principal,
        order_id: PurchaseOrderId,
    ) -> ProcurementResult<PurchaseOrderDetail> {
        authorize(principal, &known::purchasing_create())?;
        self.authorize_order(principal, order_id).await?;
        self.orders.submit(order_id).await
    }

    /// Signs the lowest pending level held by the principal's role.
    pub async fn approve_purchase_order(
        &self,
        principal: &Principal,
        order_id: PurchaseOrderId,
        comments: Option<String>,
        approved_amount: Option<Decimal>,
    ) -> ProcurementResult<PurchaseOrder> {
        authorize(principal, &known::purchasing_approve())?;
        self.authorize_order(principal, order_id).await?;
        self.orders
            .approve(order_id, principal.user_id, &principal.role, comments, approved_amount)
            .await
    }

    pub async fn reject_purchase_order(
        &self,
        principal: &Principal,
        order_id: PurchaseOrderId,
        reason: &str,
    ) -> ProcurementResult<PurchaseOrder> {
        authorize(principal, &known::purchasing_approve())?;
        self.authorize_order(principal, order_id).await?;
        self.orders
            .reject(order_id, principal.user_id, &principal.role, reason)
            .await
    }

    pub async fn send_to_supplier(
        &self,
        principal: &Principal,
        order_id: PurchaseOrderId,
    ) -> ProcurementResult<PurchaseOrder> {
        authorize(principal, &known::purchasing_send())?;
        self.authorize_order(principal, order_id).await?;
        self.orders.send_to_supplier(order_id, principal.user_id).await
    }

    pub async fn confirm_by_supplier(
        &self,
        principal: &Principal,
        order_id: PurchaseOrderId,
    ) -> ProcurementResult<PurchaseOrder> {
        authorize(principal, &known::purchasing_send())?;
        self.authorize_order(principal, order_id).await?;
        self.orders.confirm_by_supplier(order_id).await
    }

    pub async fn mark_in_transit(
        &self,
        principal: &Principal,
        order_id: PurchaseOrderId,
    ) -> ProcurementResult<PurchaseOrder> {
        authorize(principal, &known::purchasing_send())?;
        self.authorize_order(principal, order_id).await?;
        self.orders.mark_in_transit(order_id).await
    }

    pub async fn cancel_purchase_order(
        &self,
        principal: &Principal,
        order_id: PurchaseOrderId,
        reason: &str,
    ) -> ProcurementResult<PurchaseOrder> {
        authorize(principal, &known::purchasing_create())?;
        self.authorize_order(principal, order_id).await?;
        self.orders.cancel(order_id, principal.user_id, reason).await
    }

    pub async fn get_purchase_order(
        &self,
        principal: &Principal,
        order_id: PurchaseOrderId,
    ) -> ProcurementResult<PurchaseOrderDetail> {
        authorize(principal, &known::purchasing_read())?;
        let detail = self.orders.get(order_id).await?;
        authorize_branch(principal, detail.order.branch_id)?;
        Ok(detail)
    }

    /// Approver queue for the principal's role, limited to its branches.
    pub async fn get_pending_approvals_for_role(
        &self,
        principal: &Principal,
    ) -> ProcurementResult<Vec<PendingApproval>> {
        authorize(principal, &known::purchasing_approve())?;
        let mut queue = self.orders.pending_for_role(&principal.role).await?;
        queue.retain(|p| authorize_branch(principal, p.order.branch_id).is_ok());
        Ok(queue)
    }

    // --- goods receipts ---

    pub async fn receive_goods(
        &self,
        principal: &Principal,
        mut cmd: ReceiveGoods,
    ) -> ProcurementResult<GoodsReceiptDetail> {
        authorize(principal, &known::purchasing_receive())?;
        self.authorize_order(principal, cmd.purchase_order_id).await?;
        cmd.received_by = principal.user_id;
        self.receipts.receive(cmd).await
    }

    pub async fn complete_quality_check(
        &self,
        principal: &Principal,
        receipt_id: GoodsReceiptId,
        status: QualityCheckStatus,
        notes: Option<String>,
    ) -> ProcurementResult<GoodsReceipt> {
        authorize(principal, &known::purchasing_receive())?;
        let detail = self.receipts.get(receipt_id).await?;
        self.authorize_order(principal, detail.receipt.purchase_order_id).await?;
        self.receipts
            .complete_quality_check(receipt_id, principal.user_id, status, notes)
            .await
    }

    // --- suppliers ---

    pub async fn get_supplier_recommendations(
        &self,
        principal: &Principal,
        product_id: ProductId,
        quantity: i64,
    ) -> ProcurementResult<Vec<SupplierRecommendation>> {
        authorize(principal, &known::suppliers_read())?;
        self.scoring.recommend(product_id, quantity).await
    }

    pub async fn upsert_supplier(&self, principal: &Principal, supplier: Supplier) -> ProcurementResult<Supplier> {
        authorize(principal, &known::suppliers_manage())?;
        self.scoring.upsert_supplier(supplier).await
    }

    pub async fn upsert_supplier_product(
        &self,
        principal: &Principal,
        offer: SupplierProduct,
    ) -> ProcurementResult<SupplierProduct> {
        authorize(principal, &known::suppliers_manage())?;
        self.scoring.upsert_offer(offer).await
    }

    // --- low-stock alerts ---

    pub async fn raise_or_dedupe_alert(
        &self,
        principal: &Principal,
        item_id: InventoryItemId,
    ) -> ProcurementResult<Option<RaisedAlert>> {
        authorize(principal, &known::inventory_adjust())?;
        self.authorize_item(principal, item_id).await?;
        self.alerts.raise_or_dedupe(item_id).await
    }

    /// Sweep one branch, or every branch in the principal's scope when `None`.
    ///
    /// A wildcard principal sweeping `None` covers all branches.
    pub async fn sweep_alerts(
        &self,
        principal: &Principal,
        branch_id: Option<BranchId>,
    ) -> ProcurementResult<Vec<RaisedAlert>> {
        authorize(principal, &known::inventory_adjust())?;
        match branch_id {
            Some(branch_id) => {
                authorize_branch(principal, branch_id)?;
                self.alerts.sweep(Some(branch_id)).await
            }
            None if principal.has_wildcard() => self.alerts.sweep(None).await,
            None => {
                let mut raised = Vec::new();
                for branch_id in &principal.branch_ids {
                    raised.extend(self.alerts.sweep(Some(*branch_id)).await?);
                }
                Ok(raised)
            }
        }
    }

    pub async fn create_order_from_alert(
        &self,
        principal: &Principal,
        alert_id: StockAlertId,
        overrides: AlertOverrides,
    ) -> ProcurementResult<PurchaseOrder> {
        authorize(principal, &known::purchasing_create())?;
        self.authorize_alert(principal, alert_id).await?;
        self.alerts
            .create_order_from_alert(alert_id, principal.user_id, overrides)
            .await
    }

    pub async fn dismiss_alert(
        &self,
        principal: &Principal,
        alert_id: StockAlertId,
    ) -> ProcurementResult<StockAlert> {
        authorize(principal, &known::inventory_adjust())?;
        self.authorize_alert(principal, alert_id).await?;
        self.alerts.dismiss(alert_id, principal.user_id).await
    }

    // --- scope checks ---

    async fn authorize_item(
        &self,
        principal: &Principal,
        item_id: InventoryItemId,
    ) -> ProcurementResult<InventoryItem> {
        let item = self.ledger.get(item_id).await?;
        authorize_branch(principal, item.key.branch_id)?;
        Ok(item)
    }

    async fn authorize_order(&self, principal: &Principal, order_id: PurchaseOrderId) -> ProcurementResult<()> {
        let detail = self.orders.get(order_id).await?;
        authorize_branch(principal, detail.order.branch_id)?;
        Ok(())
    }

    async fn authorize_alert(&self, principal: &Principal, alert_id: StockAlertId) -> ProcurementResult<()> {
        let alert = self.alerts.get(alert_id).await?;
        authorize_branch(principal, alert.branch_id)?;
        Ok(())
    }
}

#[cfg(feature = "redis")]
async fn cache_backend(config: &AppConfig) -> ProcurementResult<Arc<dyn CacheBackend>> {
    match &config.redis_url {
        Some(url) => {
            let cache = crate::cache::RedisCache::connect(url)
                .await
                .map_err(|e| crate::error::ProcurementError::Internal(format!("redis cache: {e}")))?;
            Ok(Arc::new(cache))
        }
        None => Ok(Arc::new(InMemoryCache::new())),
    }
}

#[cfg(not(feature = "redis"))]
async fn cache_backend(config: &AppConfig) -> ProcurementResult<Arc<dyn CacheBackend>> {
    if config.redis_url.is_some() {
        tracing::warn!("redis_url is set but the redis feature is disabled; using the in-process cache");
    }
    Ok(Arc::new(InMemoryCache::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcurementError;
    use crate::services::testing::{Harness, manual_adjust};
    use rust_decimal_macros::dec;
    use stockflow_auth::Permission;
    use stockflow_core::UserId;
    use stockflow_inventory::StockThresholds;
    use stockflow_purchasing::{NewPurchaseOrderLine, PurchaseOrderStatus};

    fn clerk(branch: BranchId) -> Principal {
        Principal::new(UserId::new(), "clerk")
            .with_branch(branch)
            .with_permission(known::inventory_read())
            .with_permission(known::inventory_adjust())
            .with_permission(known::purchasing_create())
    }

    fn admin() -> Principal {
        Principal::new(UserId::new(), "admin").with_permission(Permission::new(Permission::WILDCARD))
    }

    #[tokio::test]
    async fn adjustment_outside_branch_scope_is_denied() {
        let h = Harness::new();
        let p = Procurement::new(h.ctx.clone());
        let item = h.stocked_item(10, StockThresholds::default()).await;

        let outsider = clerk(BranchId::new());
        let err = p.adjust_stock(&outsider, manual_adjust(item.id, -1, outsider.user_id)).await.unwrap_err();
        assert!(matches!(err, ProcurementError::Permission(_)));

        let insider = clerk(item.key.branch_id);
        let result = p.adjust_stock(&insider, manual_adjust(item.id, -1, UserId::new())).await.unwrap();
        assert_eq!(result.movement.performed_by, insider.user_id);
        assert_eq!(p.available(&insider, item.id).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn missing_permission_is_denied_before_any_write() {
        let h = Harness::new();
        let p = Procurement::new(h.ctx.clone());
        let item = h.stocked_item(10, StockThresholds::default()).await;

        let reader = Principal::new(UserId::new(), "auditor")
            .with_branch(item.key.branch_id)
            .with_permission(known::inventory_read());
        let err = p.reserve_stock(&reader, item.id, 1, "order-1").await.unwrap_err();
        assert!(matches!(err, ProcurementError::Permission(_)));
        assert_eq!(p.get_item(&reader, item.id).await.unwrap().reserved_stock(), 0);
    }

    #[tokio::test]
    async fn approvals_act_as_the_principal_role() {
        let h = Harness::new();
        let p = Procurement::new(h.ctx.clone());
        let supplier = h.supplier("s", 4.0, 4.0, 4.0, 3, dec!(0)).await;
        let branch = BranchId::new();
        let requester = clerk(branch);

        let draft = p
            .create_purchase_order(
                &requester,
                NewPurchaseOrder {
                    supplier_id: supplier.id,
                    branch_id: branch,
                    requested_by: UserId::new(),
                    items: vec![NewPurchaseOrderLine {
                        product_id: ProductId::new(),
                        quantity: 2,
                        unit_cost: Some(dec!(3)),
                    }],
                    urgency: None,
                    required_date: None,
                    source_alert_id: None,
                    shipping_cost: None,
                    discount_amount: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(draft.order.requested_by, requester.user_id);
        p.submit_for_approval(&requester, draft.order.id).await.unwrap();

        let finance = Principal::new(UserId::new(), "finance_manager")
            .with_branch(branch)
            .with_permission(known::purchasing_approve());
        let err = p
            .approve_purchase_order(&finance, draft.order.id, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcurementError::Conflict(_)));

        let manager = Principal::new(UserId::new(), "branch_manager")
            .with_branch(branch)
            .with_permission(known::purchasing_approve());
        assert_eq!(p.get_pending_approvals_for_role(&manager).await.unwrap().len(), 1);
        let other_branch = Principal {
            branch_ids: vec![BranchId::new()],
            ..manager.clone()
        };
        assert!(p.get_pending_approvals_for_role(&other_branch).await.unwrap().is_empty());

        let approved = p
            .approve_purchase_order(&manager, draft.order.id, Some("ok".into()), None)
            .await
            .unwrap();
        assert_eq!(approved.status, PurchaseOrderStatus::Approved);
        assert_eq!(approved.approved_by, Some(manager.user_id));
    }

    #[tokio::test]
    async fn wildcard_sweep_covers_every_branch() {
        let h = Harness::new();
        let p = Procurement::new(h.ctx.clone());
        let thresholds = StockThresholds {
            reorder_point: 5,
            reorder_quantity: 1,
            ..StockThresholds::default()
        };
        let a = h.stocked_item(1, thresholds).await;
        let b = h.stocked_item(2, thresholds).await;

        let scoped = clerk(a.key.branch_id);
        let raised = p.sweep_alerts(&scoped, None).await.unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].alert.item_id, a.id);

        let all = p.sweep_alerts(&admin(), None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|r| r.alert.item_id == b.id));

        let err = p.dismiss_alert(&clerk(BranchId::new()), raised[0].alert.id).await.unwrap_err();
        assert!(matches!(err, ProcurementError::Permission(_)));
        p.dismiss_alert(&scoped, raised[0].alert.id).await.unwrap();
    }
}
