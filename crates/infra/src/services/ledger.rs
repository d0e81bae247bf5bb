//! Stock ledger service: adjustments, transfers, provisioning, reads.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use stockflow_core::{BranchId, ProductId, UserId, lock_order};
use stockflow_inventory::{
    AdjustStock, InventoryEvent, InventoryItem, InventoryItemId, ItemKey, MovementReference,
    MovementType, StockAdjusted, StockMovement, StockThresholds,
};

use crate::db::StoreTx;
use crate::error::{ProcurementError, ProcurementResult};
use crate::publisher::DomainEvent;

use super::ServiceContext;
use super::alerts::{RaisedAlert, evaluate_in_tx};

/// Outcome of one ledger adjustment.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentResult {
    pub item: InventoryItem,
    pub movement: StockMovement,
    /// Low-stock alert for the item's product/branch, if it is under its reorder point.
    pub alert: Option<RaisedAlert>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferResult {
    pub from: AdjustmentResult,
    pub to: AdjustmentResult,
}

/// Explicit creation of a ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionItem {
    pub product_id: ProductId,
    pub branch_id: BranchId,
    pub batch_number: Option<String>,
    #[serde(default)]
    pub thresholds: StockThresholds,
    #[serde(default)]
    pub unit_cost: Decimal,
    pub location: Option<String>,
    pub expiration_date: Option<NaiveDate>,
}

#[derive(Clone)]
pub struct StockLedger {
    ctx: ServiceContext,
}

impl StockLedger {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Apply one signed adjustment and record its movement.
    #[instrument(skip(self, cmd), fields(item_id = %cmd.item_id, delta = cmd.delta, movement_type = %cmd.movement_type), err)]
    pub async fn adjust(&self, cmd: AdjustStock) -> ProcurementResult<AdjustmentResult> {
        cmd.validate()?;
        let now = Utc::now();
        let mut events = Vec::new();

        let mut tx = self.ctx.store.begin().await?;
        let mut item = lock_existing(tx.as_mut(), cmd.item_id).await?;
        let movement = adjust_locked(tx.as_mut(), &mut item, &cmd, now, &mut events).await?;
        let alert = evaluate_in_tx(tx.as_mut(), &item, now, &mut events).await?;
        self.ctx.finish(tx, &[item.id], events).await?;

        info!(new_quantity = movement.new_quantity, "stock adjusted");
        Ok(AdjustmentResult {
            item,
            movement,
            alert,
        })
    }

    /// Several adjustments as one unit (e.g. a multi-line sale). All or nothing.
    ///
    /// Items are locked in ascending id order; lines apply in input order, so
    /// the same item may appear more than once.
    #[instrument(skip(self, lines), fields(lines = lines.len()), err)]
    pub async fn adjust_many(&self, lines: Vec<AdjustStock>) -> ProcurementResult<Vec<AdjustmentResult>> {
        if lines.is_empty() {
            return Err(ProcurementError::validation("no adjustment lines given"));
        }
        for line in &lines {
            line.validate()?;
        }
        let now = Utc::now();
        let mut events = Vec::new();

        let mut tx = self.ctx.store.begin().await?;
        let mut locked: BTreeMap<InventoryItemId, InventoryItem> = BTreeMap::new();
        for id in lock_order(lines.iter().map(|l| l.item_id)) {
            locked.insert(id, lock_existing(tx.as_mut(), id).await?);
        }

        let mut applied = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = locked
                .get_mut(&line.item_id)
                .ok_or_else(|| ProcurementError::not_found(format!("inventory item {}", line.item_id)))?;
            let movement = adjust_locked(tx.as_mut(), item, line, now, &mut events).await?;
            applied.push((item.clone(), movement));
        }

        let mut alerts = BTreeMap::new();
        for item in locked.values() {
            alerts.insert(item.id, evaluate_in_tx(tx.as_mut(), item, now, &mut events).await?);
        }

        let touched: Vec<InventoryItemId> = locked.keys().copied().collect();
        self.ctx.finish(tx, &touched, events).await?;

        info!(items = touched.len(), "multi-line adjustment committed");
        Ok(applied
            .into_iter()
            .map(|(item, movement)| AdjustmentResult {
                alert: alerts.get(&item.id).cloned().flatten(),
                item,
                movement,
            })
            .collect())
    }

    /// Move `quantity` units of the same product between two ledger records.
    #[instrument(skip(self), err)]
    pub async fn transfer(
        &self,
        from_item_id: InventoryItemId,
        to_item_id: InventoryItemId,
        quantity: i64,
        performed_by: UserId,
        notes: Option<String>,
    ) -> ProcurementResult<TransferResult> {
        if quantity <= 0 {
            return Err(ProcurementError::validation("transfer quantity must be positive"));
        }
        if from_item_id == to_item_id {
            return Err(ProcurementError::validation("cannot transfer an item to itself"));
        }
        let now = Utc::now();
        let reference = MovementReference::new("stock_transfer", Uuid::now_v7().to_string());
        let mut events = Vec::new();

        let mut tx = self.ctx.store.begin().await?;
        let mut locked: BTreeMap<InventoryItemId, InventoryItem> = BTreeMap::new();
        for id in lock_order([from_item_id, to_item_id]) {
            locked.insert(id, lock_existing(tx.as_mut(), id).await?);
        }
        let (mut from, mut to) = match (locked.remove(&from_item_id), locked.remove(&to_item_id)) {
            (Some(from), Some(to)) => (from, to),
            _ => return Err(ProcurementError::Internal("transfer items vanished after locking".into())),
        };
        if from.key.product_id != to.key.product_id {
            return Err(ProcurementError::validation(
                "transfers must stay within one product",
            ));
        }

        let outgoing = AdjustStock {
            item_id: from.id,
            delta: -quantity,
            movement_type: MovementType::Transfer,
            reference: reference.clone(),
            notes: notes.clone(),
            performed_by,
        };
        let incoming = AdjustStock {
            item_id: to.id,
            delta: quantity,
            movement_type: MovementType::Transfer,
            reference,
            notes,
            performed_by,
        };
        let out_movement = adjust_locked(tx.as_mut(), &mut from, &outgoing, now, &mut events).await?;
        let in_movement = adjust_locked(tx.as_mut(), &mut to, &incoming, now, &mut events).await?;
        let from_alert = evaluate_in_tx(tx.as_mut(), &from, now, &mut events).await?;
        let to_alert = evaluate_in_tx(tx.as_mut(), &to, now, &mut events).await?;
        self.ctx.finish(tx, &[from.id, to.id], events).await?;

        info!(from_branch = %from.key.branch_id, to_branch = %to.key.branch_id, quantity, "stock transferred");
        Ok(TransferResult {
            from: AdjustmentResult {
                item: from,
                movement: out_movement,
                alert: from_alert,
            },
            to: AdjustmentResult {
                item: to,
                movement: in_movement,
                alert: to_alert,
            },
        })
    }

    /// Create the ledger record for a (product, branch, batch) key.
    ///
    /// A deactivated record for the same key is brought back with the new
    /// settings; an active one is a conflict.
    #[instrument(skip(self, cmd), fields(product_id = %cmd.product_id, branch_id = %cmd.branch_id), err)]
    pub async fn provision(&self, cmd: ProvisionItem) -> ProcurementResult<InventoryItem> {
        cmd.thresholds.validate()?;
        if cmd.unit_cost.is_sign_negative() {
            return Err(ProcurementError::validation("unit_cost cannot be negative"));
        }
        let now = Utc::now();
        let key = ItemKey::new(cmd.product_id, cmd.branch_id, cmd.batch_number);

        let mut tx = self.ctx.store.begin().await?;
        let item = match tx.lock_item_by_key(&key).await? {
            Some(existing) if existing.is_active => {
                return Err(ProcurementError::conflict(format!(
                    "inventory item {} already exists for this product and branch",
                    existing.id
                )));
            }
            Some(mut existing) => {
                existing.reactivate(now);
                existing.thresholds = cmd.thresholds;
                existing.unit_cost = cmd.unit_cost;
                existing.location = cmd.location;
                existing.expiration_date = cmd.expiration_date;
                tx.update_item(&existing).await?;
                existing
            }
            None => {
                let mut item = InventoryItem::provision(key, cmd.thresholds, cmd.unit_cost, now)?;
                item.location = cmd.location;
                item.expiration_date = cmd.expiration_date;
                tx.insert_item(&item).await?;
                item
            }
        };
        self.ctx.finish(tx, &[item.id], Vec::new()).await?;

        info!(item_id = %item.id, "inventory item provisioned");
        Ok(item)
    }

    /// Soft delete. Movements and history stay.
    #[instrument(skip(self), err)]
    pub async fn deactivate(&self, item_id: InventoryItemId) -> ProcurementResult<InventoryItem> {
        let now = Utc::now();
        let mut tx = self.ctx.store.begin().await?;
        let mut item = lock_existing(tx.as_mut(), item_id).await?;
        item.deactivate(now)?;
        tx.update_item(&item).await?;
        self.ctx.finish(tx, &[item.id], Vec::new()).await?;

        info!("inventory item deactivated");
        Ok(item)
    }

    /// Current snapshot, served from the cache when fresh.
    pub async fn get(&self, item_id: InventoryItemId) -> ProcurementResult<InventoryItem> {
        if let Some(item) = self.ctx.cache.get(item_id).await {
            return Ok(item);
        }
        let ticket = self.ctx.cache.ticket();
        let mut tx = self.ctx.store.begin().await?;
        let item = tx
            .find_item(item_id)
            .await?
            .ok_or_else(|| ProcurementError::not_found(format!("inventory item {item_id}")))?;
        drop(tx);

        self.ctx.cache.fill(&item, ticket).await;
        Ok(item)
    }

    /// `current_stock - reserved_stock`.
    pub async fn available(&self, item_id: InventoryItemId) -> ProcurementResult<i64> {
        Ok(self.get(item_id).await?.available())
    }

    /// Movement history, oldest first.
    pub async fn movements(&self, item_id: InventoryItemId) -> ProcurementResult<Vec<StockMovement>> {
        let mut tx = self.ctx.store.begin().await?;
        if tx.find_item(item_id).await?.is_none() {
            return Err(ProcurementError::not_found(format!("inventory item {item_id}")));
        }
        Ok(tx.list_movements(item_id).await?)
    }
}

/// Lock an item row, or `NotFound`.
pub(crate) async fn lock_existing(
    tx: &mut dyn StoreTx,
    item_id: InventoryItemId,
) -> ProcurementResult<InventoryItem> {
    tx.lock_item(item_id)
        .await?
        .ok_or_else(|| ProcurementError::not_found(format!("inventory item {item_id}")))
}

/// Apply `cmd` to an already locked item and persist the item and its movement.
pub(crate) async fn adjust_locked(
    tx: &mut dyn StoreTx,
    item: &mut InventoryItem,
    cmd: &AdjustStock,
    now: DateTime<Utc>,
    events: &mut Vec<DomainEvent>,
) -> ProcurementResult<StockMovement> {
    let movement = item.apply_adjustment(cmd, now)?;
    tx.update_item(item).await?;
    tx.insert_movement(&movement).await?;
    events.push(InventoryEvent::StockAdjusted(StockAdjusted::from(&movement)).into());
    Ok(movement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{Harness, manual_adjust};

    #[tokio::test]
    async fn adjustment_writes_item_and_movement_together() {
        let h = Harness::new();
        let item = h.stocked_item(10, StockThresholds::default()).await;

        let result = h.ledger.adjust(manual_adjust(item.id, -4, h.user)).await.unwrap();
        assert_eq!(result.item.current_stock(), 6);
        assert_eq!(result.movement.previous_quantity, 10);
        assert_eq!(result.movement.new_quantity, 6);

        let history = h.ledger.movements(item.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].quantity, -4);
    }

    #[tokio::test]
    async fn overdraw_leaves_no_trace() {
        let h = Harness::new();
        let item = h.stocked_item(3, StockThresholds::default()).await;

        let err = h.ledger.adjust(manual_adjust(item.id, -5, h.user)).await.unwrap_err();
        assert_eq!(err, ProcurementError::InsufficientStock { requested: 5, on_hand: 3 });
        assert_eq!(h.ledger.get(item.id).await.unwrap().current_stock(), 3);
        assert_eq!(h.ledger.movements(item.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn zero_delta_is_rejected_before_touching_the_store() {
        let h = Harness::new();
        let err = h
            .ledger
            .adjust(manual_adjust(InventoryItemId::new(), 0, h.user))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcurementError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_item_is_not_found() {
        let h = Harness::new();
        let err = h
            .ledger
            .adjust(manual_adjust(InventoryItemId::new(), 1, h.user))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcurementError::NotFound(_)));
    }

    #[tokio::test]
    async fn multi_line_adjustment_is_all_or_nothing() {
        let h = Harness::new();
        let a = h.stocked_item(5, StockThresholds::default()).await;
        let b = h.stocked_item(1, StockThresholds::default()).await;

        let err = h
            .ledger
            .adjust_many(vec![manual_adjust(a.id, -2, h.user), manual_adjust(b.id, -2, h.user)])
            .await
            .unwrap_err();
        assert!(matches!(err, ProcurementError::InsufficientStock { .. }));
        assert_eq!(h.ledger.get(a.id).await.unwrap().current_stock(), 5);

        let ok = h
            .ledger
            .adjust_many(vec![manual_adjust(a.id, -2, h.user), manual_adjust(a.id, -1, h.user)])
            .await
            .unwrap();
        assert_eq!(ok[1].item.current_stock(), 2);
        assert_eq!(ok[1].movement.previous_quantity, 3);
    }

    #[tokio::test]
    async fn transfer_moves_stock_between_branches() {
        let h = Harness::new();
        let from = h.stocked_item(10, StockThresholds::default()).await;
        let to = h
            .ledger
            .provision(ProvisionItem {
                product_id: from.key.product_id,
                branch_id: BranchId::new(),
                batch_number: None,
                thresholds: StockThresholds::default(),
                unit_cost: Decimal::ONE,
                location: None,
                expiration_date: None,
            })
            .await
            .unwrap();

        let result = h.ledger.transfer(from.id, to.id, 4, h.user, None).await.unwrap();
        assert_eq!(result.from.item.current_stock(), 6);
        assert_eq!(result.to.item.current_stock(), 4);
        assert_eq!(result.from.movement.movement_type, MovementType::Transfer);
        assert_eq!(result.from.movement.reference, result.to.movement.reference);
    }

    #[tokio::test]
    async fn transfer_across_products_is_rejected() {
        let h = Harness::new();
        let a = h.stocked_item(10, StockThresholds::default()).await;
        let b = h.stocked_item(0, StockThresholds::default()).await;
        let err = h.ledger.transfer(a.id, b.id, 1, h.user, None).await.unwrap_err();
        assert!(matches!(err, ProcurementError::Validation(_)));
    }

    #[tokio::test]
    async fn provisioning_twice_conflicts_until_deactivated() {
        let h = Harness::new();
        let cmd = ProvisionItem {
            product_id: ProductId::new(),
            branch_id: BranchId::new(),
            batch_number: Some(" LOT-1 ".into()),
            thresholds: StockThresholds::default(),
            unit_cost: Decimal::ONE,
            location: Some("A-1".into()),
            expiration_date: None,
        };
        let item = h.ledger.provision(cmd.clone()).await.unwrap();
        assert!(matches!(
            h.ledger.provision(cmd.clone()).await.unwrap_err(),
            ProcurementError::Conflict(_)
        ));

        h.ledger.deactivate(item.id).await.unwrap();
        assert!(matches!(
            h.ledger.adjust(manual_adjust(item.id, 1, h.user)).await.unwrap_err(),
            ProcurementError::Conflict(_)
        ));

        let revived = h.ledger.provision(cmd).await.unwrap();
        assert_eq!(revived.id, item.id);
        assert!(revived.is_active);
    }

    #[tokio::test]
    async fn reads_see_fresh_state_after_writes() {
        let h = Harness::new();
        let item = h.stocked_item(8, StockThresholds::default()).await;
        assert_eq!(h.ledger.available(item.id).await.unwrap(), 8);

        h.ledger.adjust(manual_adjust(item.id, -3, h.user)).await.unwrap();
        assert_eq!(h.ledger.available(item.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn snapshot_read_before_a_write_is_not_cached() {
        let h = Harness::new();
        let item = h.stocked_item(8, StockThresholds::default()).await;

        let ticket = h.ctx.cache.ticket();
        let stale = h.ledger.get(item.id).await.unwrap();
        h.ctx.cache.invalidate(&[item.id]).await;
        // withdrawal commits before the earlier reader's fill lands
        h.ledger.adjust(manual_adjust(item.id, -3, h.user)).await.unwrap();
        h.ctx.cache.fill(&stale, ticket).await;

        assert_eq!(h.ledger.available(item.id).await.unwrap(), 5);
    }
}
