//! Application services: one store transaction per operation.
//!
//! ```text
//! validate input → begin → lock rows → domain rules → write rows → commit
//!                                                          ↓
//!                                   invalidate cache, publish events
//! ```
//!
//! Helpers that must share a caller's transaction take `&mut dyn StoreTx`
//! instead of opening their own; the in-memory store serialises transactions,
//! so nesting `begin` would deadlock.

use std::sync::Arc;

use stockflow_inventory::InventoryItemId;

use crate::cache::ItemCache;
use crate::config::ProcurementConfig;
use crate::db::{Store, StoreTx};
use crate::error::ProcurementResult;
use crate::publisher::{DomainEvent, EventPublisher};

pub mod alerts;
pub mod goods_receipts;
pub mod ledger;
pub mod purchase_orders;
pub mod reservations;
pub mod supplier_scoring;

#[cfg(test)]
pub(crate) mod testing;

pub use alerts::{AlertOverrides, AlertTrigger, RaisedAlert};
pub use goods_receipts::{GoodsReceiptDetail, GoodsReceipts};
pub use ledger::{AdjustmentResult, ProvisionItem, StockLedger, TransferResult};
pub use purchase_orders::{PurchaseOrderDetail, PurchaseOrders};
pub use reservations::Reservations;
pub use supplier_scoring::SupplierScoring;

/// Shared handles every service works through.
#[derive(Clone)]
pub struct ServiceContext {
    pub store: Arc<dyn Store>,
    pub publisher: EventPublisher,
    pub cache: ItemCache,
    pub config: ProcurementConfig,
}

impl ServiceContext {
    pub fn new(
        store: Arc<dyn Store>,
        publisher: EventPublisher,
        cache: ItemCache,
        config: ProcurementConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            cache,
            config,
        }
    }

    /// Commit, then run the post-commit side effects.
    pub(crate) async fn finish(
        &self,
        tx: Box<dyn StoreTx>,
        touched: &[InventoryItemId],
        events: Vec<DomainEvent>,
    ) -> ProcurementResult<()> {
        tx.commit().await?;
        self.cache.invalidate(touched).await;
        self.publisher.publish_all(events);
        Ok(())
    }
}
