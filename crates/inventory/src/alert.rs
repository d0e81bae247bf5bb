use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::{BranchId, DomainError, DomainResult, Entity, ProductId, UserId, impl_uuid_newtype};

use crate::item::{InventoryItem, InventoryItemId};

/// Stock alert identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockAlertId(Uuid);

impl_uuid_newtype!(StockAlertId, "StockAlertId");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Processed,
    Dismissed,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Processed => "processed",
            AlertStatus::Dismissed => "dismissed",
        }
    }
}

impl core::str::FromStr for AlertStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "processed" => Ok(AlertStatus::Processed),
            "dismissed" => Ok(AlertStatus::Dismissed),
            other => Err(DomainError::validation(format!("unknown alert status '{other}'"))),
        }
    }
}

/// Low-stock alert for one (product, branch).
///
/// At most one `Active` alert exists per (product, branch). Processing it into a
/// purchase order is what prevents repeated auto-orders for the same shortage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub id: StockAlertId,
    pub product_id: ProductId,
    pub branch_id: BranchId,
    pub item_id: InventoryItemId,
    pub current_stock: i64,
    pub reorder_point: i64,
    pub suggested_reorder_quantity: i64,
    pub status: AlertStatus,
    /// Purchase order drafted from this alert (stored as a raw id; purchasing depends on inventory, not the reverse).
    pub purchase_order_id: Option<Uuid>,
    pub processed_by: Option<UserId>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a threshold check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDecision {
    /// Stock is above the reorder point (or no threshold is configured).
    NotNeeded,
    /// An active alert already covers this shortage.
    Existing(StockAlert),
    /// A new alert must be persisted.
    Raise(StockAlert),
}

impl StockAlert {
    /// Decide whether `item` needs a new alert given the currently active one (if any).
    pub fn evaluate(
        item: &InventoryItem,
        active: Option<StockAlert>,
        now: DateTime<Utc>,
    ) -> AlertDecision {
        if !item.needs_reorder() {
            return AlertDecision::NotNeeded;
        }
        if let Some(existing) = active {
            return AlertDecision::Existing(existing);
        }
        AlertDecision::Raise(StockAlert {
            id: StockAlertId::new(),
            product_id: item.key.product_id,
            branch_id: item.key.branch_id,
            item_id: item.id,
            current_stock: item.current_stock(),
            reorder_point: item.thresholds.reorder_point,
            suggested_reorder_quantity: item.suggested_reorder_quantity(),
            status: AlertStatus::Active,
            purchase_order_id: None,
            processed_by: None,
            processed_at: None,
            created_at: now,
        })
    }

    pub fn ensure_active(&self) -> DomainResult<()> {
        if self.status != AlertStatus::Active {
            return Err(DomainError::conflict(format!(
                "stock alert {} is {}",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    /// Link the alert to the purchase order drafted for it.
    pub fn mark_processed(
        &mut self,
        purchase_order_id: Uuid,
        by: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_active()?;
        self.status = AlertStatus::Processed;
        self.purchase_order_id = Some(purchase_order_id);
        self.processed_by = Some(by);
        self.processed_at = Some(now);
        Ok(())
    }

    pub fn dismiss(&mut self, by: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_active()?;
        self.status = AlertStatus::Dismissed;
        self.processed_by = Some(by);
        self.processed_at = Some(now);
        Ok(())
    }

    /// How pressing the shortage is: out of stock, deep below threshold, or just under it.
    pub fn severity(&self) -> AlertSeverity {
        if self.current_stock <= 0 {
            AlertSeverity::OutOfStock
        } else if self.current_stock * 2 <= self.reorder_point {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Critical,
    OutOfStock,
}

impl Entity for StockAlert {
    type Id = StockAlertId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
