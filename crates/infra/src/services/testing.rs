//! Shared fixtures for service tests: in-memory store, cache and bus.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use stockflow_core::{BranchId, ProductId, SupplierId, UserId};
use stockflow_events::{EventEnvelope, InMemoryEventBus};
use stockflow_inventory::{
    AdjustStock, InventoryItem, InventoryItemId, MovementReference, MovementType, StockThresholds,
};
use stockflow_purchasing::{NewPurchaseOrder, NewPurchaseOrderLine, Supplier, SupplierProduct};

use crate::cache::{InMemoryCache, ItemCache};
use crate::config::ProcurementConfig;
use crate::db::{InMemoryStore, Store};
use crate::publisher::{EnvelopeSink, EventPublisher};

use super::{
    AlertTrigger, GoodsReceipts, ProvisionItem, PurchaseOrderDetail, PurchaseOrders, Reservations,
    ServiceContext, StockLedger, SupplierScoring,
};

pub(crate) type TestBus = InMemoryEventBus<EventEnvelope<JsonValue>>;

pub(crate) struct Harness {
    pub store: Arc<InMemoryStore>,
    pub bus: Arc<TestBus>,
    pub ctx: ServiceContext,
    pub ledger: StockLedger,
    pub reservations: Reservations,
    pub orders: PurchaseOrders,
    pub scoring: SupplierScoring,
    pub receipts: GoodsReceipts,
    pub alerts: AlertTrigger,
    pub user: UserId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ProcurementConfig::default())
    }

    pub fn with_config(config: ProcurementConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(TestBus::new());
        let cache = ItemCache::new(Arc::new(InMemoryCache::new()), Duration::from_secs(30));
        let ctx = ServiceContext::new(
            Arc::clone(&store) as Arc<dyn Store>,
            EventPublisher::new(Arc::clone(&bus) as Arc<dyn EnvelopeSink>),
            cache,
            config,
        );
        Self {
            ledger: StockLedger::new(ctx.clone()),
            reservations: Reservations::new(ctx.clone()),
            orders: PurchaseOrders::new(ctx.clone()),
            scoring: SupplierScoring::new(ctx.clone()),
            receipts: GoodsReceipts::new(ctx.clone()),
            alerts: AlertTrigger::new(ctx.clone()),
            store,
            bus,
            ctx,
            user: UserId::new(),
        }
    }

    /// A fresh product/branch record holding `quantity` units.
    pub async fn stocked_item(&self, quantity: i64, thresholds: StockThresholds) -> InventoryItem {
        let item = self
            .ledger
            .provision(ProvisionItem {
                product_id: ProductId::new(),
                branch_id: BranchId::new(),
                batch_number: None,
                thresholds,
                unit_cost: Decimal::ONE,
                location: None,
                expiration_date: None,
            })
            .await
            .expect("provision");
        if quantity == 0 {
            return item;
        }
        let cmd = AdjustStock {
            item_id: item.id,
            delta: quantity,
            movement_type: MovementType::Incoming,
            reference: MovementReference::manual(),
            notes: None,
            performed_by: self.user,
        };
        self.ledger.adjust(cmd).await.expect("opening stock").item
    }

    pub async fn supplier(
        &self,
        name: &str,
        quality: f64,
        delivery: f64,
        price: f64,
        lead_time_days: i32,
        minimum_order_amount: Decimal,
    ) -> Supplier {
        let now = Utc::now();
        self.scoring
            .upsert_supplier(Supplier {
                id: SupplierId::new(),
                name: name.to_string(),
                supplier_type: "distributor".to_string(),
                quality_rating: quality,
                delivery_rating: delivery,
                price_competitiveness: price,
                lead_time_days,
                minimum_order_amount,
                is_active: true,
                rated_deliveries: 0,
                rated_inspections: 0,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("supplier")
    }

    pub async fn offer(
        &self,
        supplier: &Supplier,
        product_id: ProductId,
        unit_cost: Decimal,
        minimum_quantity: i64,
        is_preferred: bool,
    ) -> SupplierProduct {
        self.scoring
            .upsert_offer(SupplierProduct {
                supplier_id: supplier.id,
                product_id,
                unit_cost,
                minimum_quantity,
                lead_time_days: None,
                is_preferred,
            })
            .await
            .expect("offer")
    }

    pub async fn find_supplier(&self, id: SupplierId) -> Supplier {
        let mut tx = self.store.begin().await.expect("begin");
        tx.find_supplier(id).await.expect("read").expect("supplier exists")
    }

    /// A draft order with one fresh product per `(quantity, unit_cost)` line.
    pub async fn draft_order(&self, supplier: &Supplier, lines: &[(i64, Decimal)]) -> PurchaseOrderDetail {
        self.orders
            .create(NewPurchaseOrder {
                supplier_id: supplier.id,
                branch_id: BranchId::new(),
                requested_by: self.user,
                items: lines
                    .iter()
                    .map(|(quantity, cost)| NewPurchaseOrderLine {
                        product_id: ProductId::new(),
                        quantity: *quantity,
                        unit_cost: Some(*cost),
                    })
                    .collect(),
                urgency: None,
                required_date: None,
                source_alert_id: None,
                shipping_cost: None,
                discount_amount: None,
                notes: None,
            })
            .await
            .expect("draft order")
    }

    /// An order approved at every level and sent to its supplier.
    pub async fn sent_order(&self, lines: &[(i64, Decimal)]) -> PurchaseOrderDetail {
        let supplier = self.supplier("sender", 4.0, 4.0, 4.0, 3, Decimal::ZERO).await;
        let draft = self.draft_order(&supplier, lines).await;
        let id = draft.order.id;

        let submitted = self.orders.submit(id).await.expect("submit");
        for approval in &submitted.approvals {
            self.orders
                .approve(id, self.user, &approval.required_role, None, None)
                .await
                .expect("approve");
        }
        self.orders.send_to_supplier(id, self.user).await.expect("send");
        self.orders.get(id).await.expect("reload")
    }
}

pub(crate) fn manual_adjust(item_id: InventoryItemId, delta: i64, performed_by: UserId) -> AdjustStock {
    AdjustStock {
        item_id,
        delta,
        movement_type: MovementType::Adjustment,
        reference: MovementReference::manual(),
        notes: None,
        performed_by,
    }
}
