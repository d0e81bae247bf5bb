//! Reservation manager: holds on available stock, keyed by caller reference.

use chrono::Utc;
use tracing::{info, instrument};

use stockflow_inventory::{InventoryItem, InventoryItemId, StockReservation, validate_reference};

use crate::error::{ProcurementError, ProcurementResult};

use super::ServiceContext;
use super::ledger::lock_existing;

#[derive(Clone)]
pub struct Reservations {
    ctx: ServiceContext,
}

impl Reservations {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Hold `quantity` units for `reference_id`. No movement is written.
    #[instrument(skip(self), err)]
    pub async fn reserve(
        &self,
        item_id: InventoryItemId,
        quantity: i64,
        reference_id: &str,
    ) -> ProcurementResult<InventoryItem> {
        if quantity <= 0 {
            return Err(ProcurementError::validation("reservation quantity must be positive"));
        }
        validate_reference(reference_id)?;
        let now = Utc::now();

        let mut tx = self.ctx.store.begin().await?;
        let mut item = lock_existing(tx.as_mut(), item_id).await?;
        let mut held = tx
            .lock_reservation(item_id, reference_id)
            .await?
            .unwrap_or_else(|| StockReservation::empty(item_id, reference_id, now));

        item.reserve(quantity, now)?;
        held.hold(quantity, now);
        tx.update_item(&item).await?;
        tx.upsert_reservation(&held).await?;
        self.ctx.finish(tx, &[item.id], Vec::new()).await?;

        info!(reserved = item.reserved_stock(), available = item.available(), "stock reserved");
        Ok(item)
    }

    /// Release part of what `reference_id` holds. A reference left holding
    /// nothing is forgotten.
    #[instrument(skip(self), err)]
    pub async fn release(
        &self,
        item_id: InventoryItemId,
        quantity: i64,
        reference_id: &str,
    ) -> ProcurementResult<InventoryItem> {
        if quantity <= 0 {
            return Err(ProcurementError::validation("release quantity must be positive"));
        }
        validate_reference(reference_id)?;
        let now = Utc::now();

        let mut tx = self.ctx.store.begin().await?;
        let mut item = lock_existing(tx.as_mut(), item_id).await?;
        let mut held = tx
            .lock_reservation(item_id, reference_id)
            .await?
            .unwrap_or_else(|| StockReservation::empty(item_id, reference_id, now));

        let released = item.release(quantity, held.quantity, now)?;
        held.release(quantity, now);
        tx.update_item(&item).await?;
        if held.is_empty() {
            tx.delete_reservation(item_id, reference_id).await?;
        } else {
            tx.upsert_reservation(&held).await?;
        }
        self.ctx.finish(tx, &[item.id], Vec::new()).await?;

        info!(released, reserved = item.reserved_stock(), "reservation released");
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{Harness, manual_adjust};
    use stockflow_inventory::StockThresholds;

    #[tokio::test]
    async fn reserve_holds_without_moving_stock() {
        let h = Harness::new();
        let item = h.stocked_item(10, StockThresholds::default()).await;

        let after = h.reservations.reserve(item.id, 4, "order-1").await.unwrap();
        assert_eq!(after.current_stock(), 10);
        assert_eq!(after.available(), 6);
        assert_eq!(h.ledger.movements(item.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reserve_beyond_available_fails() {
        let h = Harness::new();
        let item = h.stocked_item(5, StockThresholds::default()).await;
        h.reservations.reserve(item.id, 3, "order-1").await.unwrap();

        let err = h.reservations.reserve(item.id, 3, "order-2").await.unwrap_err();
        assert_eq!(
            err,
            ProcurementError::InsufficientAvailable {
                requested: 3,
                available: 2
            }
        );
    }

    #[tokio::test]
    async fn release_is_limited_to_the_reference_hold() {
        let h = Harness::new();
        let item = h.stocked_item(10, StockThresholds::default()).await;
        h.reservations.reserve(item.id, 4, "order-1").await.unwrap();
        h.reservations.reserve(item.id, 2, "order-2").await.unwrap();

        let err = h.reservations.release(item.id, 5, "order-1").await.unwrap_err();
        assert_eq!(err, ProcurementError::OverRelease { requested: 5, held: 4 });

        let after = h.reservations.release(item.id, 4, "order-1").await.unwrap();
        assert_eq!(after.reserved_stock(), 2);

        let err = h.reservations.release(item.id, 1, "order-1").await.unwrap_err();
        assert_eq!(err, ProcurementError::OverRelease { requested: 1, held: 0 });
    }

    #[tokio::test]
    async fn fully_released_reference_leaves_no_row() {
        let h = Harness::new();
        let item = h.stocked_item(10, StockThresholds::default()).await;
        h.reservations.reserve(item.id, 4, "cart-7").await.unwrap();

        h.reservations.release(item.id, 1, "cart-7").await.unwrap();
        let mut tx = h.ctx.store.begin().await.unwrap();
        let partial = tx.lock_reservation(item.id, "cart-7").await.unwrap();
        assert_eq!(partial.map(|r| r.quantity), Some(3));
        drop(tx);

        let after = h.reservations.release(item.id, 3, "cart-7").await.unwrap();
        assert_eq!(after.reserved_stock(), 0);
        let mut tx = h.ctx.store.begin().await.unwrap();
        assert!(tx.lock_reservation(item.id, "cart-7").await.unwrap().is_none());
        drop(tx);

        // the reference can hold again from scratch
        h.reservations.reserve(item.id, 2, "cart-7").await.unwrap();
        let err = h.reservations.release(item.id, 3, "cart-7").await.unwrap_err();
        assert_eq!(err, ProcurementError::OverRelease { requested: 3, held: 2 });
    }

    #[tokio::test]
    async fn reserved_stock_cannot_be_sold() {
        let h = Harness::new();
        let item = h.stocked_item(10, StockThresholds::default()).await;
        h.reservations.reserve(item.id, 8, "order-1").await.unwrap();

        let err = h.ledger.adjust(manual_adjust(item.id, -3, h.user)).await.unwrap_err();
        assert!(matches!(err, ProcurementError::InsufficientStock { .. }));
    }

    #[tokio::test]
    async fn blank_reference_is_rejected() {
        let h = Harness::new();
        let item = h.stocked_item(10, StockThresholds::default()).await;
        let err = h.reservations.reserve(item.id, 1, "  ").await.unwrap_err();
        assert!(matches!(err, ProcurementError::Validation(_)));
    }
}
