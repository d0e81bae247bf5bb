use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::{BranchId, DomainError, DomainResult, Entity, ProductId, UserId, impl_uuid_newtype};

use crate::movement::{MovementReference, MovementType, StockMovement, StockMovementId};

/// Inventory item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryItemId(Uuid);

impl_uuid_newtype!(InventoryItemId, "InventoryItemId");

/// Natural key of a ledger record: one row per (product, branch, batch).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub product_id: ProductId,
    pub branch_id: BranchId,
    pub batch_number: Option<String>,
}

impl ItemKey {
    pub fn new(product_id: ProductId, branch_id: BranchId, batch_number: Option<String>) -> Self {
        // Blank batch numbers are the same as "no batch".
        let batch_number = batch_number
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty());
        Self {
            product_id,
            branch_id,
            batch_number,
        }
    }
}

/// Replenishment thresholds configured per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockThresholds {
    pub min_stock_level: i64,
    pub max_stock_level: i64,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
}

impl StockThresholds {
    pub fn validate(&self) -> DomainResult<()> {
        if self.min_stock_level < 0
            || self.max_stock_level < 0
            || self.reorder_point < 0
            || self.reorder_quantity < 0
        {
            return Err(DomainError::validation("stock thresholds cannot be negative"));
        }
        if self.max_stock_level > 0 && self.max_stock_level < self.min_stock_level {
            return Err(DomainError::validation(
                "max_stock_level cannot be below min_stock_level",
            ));
        }
        Ok(())
    }
}

/// Authoritative ledger record for one (product, branch, batch).
///
/// Invariants: `current_stock >= 0`, `0 <= reserved_stock <= current_stock`.
/// Stock fields only change through the methods below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: InventoryItemId,
    pub key: ItemKey,
    current_stock: i64,
    reserved_stock: i64,
    pub thresholds: StockThresholds,
    pub unit_cost: Decimal,
    pub expiration_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to move stock on one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub item_id: InventoryItemId,
    pub delta: i64,
    pub movement_type: MovementType,
    pub reference: MovementReference,
    pub notes: Option<String>,
    pub performed_by: UserId,
}

impl AdjustStock {
    /// Input validation that needs no ledger state.
    pub fn validate(&self) -> DomainResult<()> {
        if self.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        if self.movement_type.is_inbound_only() && self.delta < 0 {
            return Err(DomainError::validation(format!(
                "{} movements must add stock",
                self.movement_type
            )));
        }
        if self.movement_type.is_outbound_only() && self.delta > 0 {
            return Err(DomainError::validation(format!(
                "{} movements must remove stock",
                self.movement_type
            )));
        }
        if self.reference.reference_type.trim().is_empty() {
            return Err(DomainError::validation("reference_type cannot be empty"));
        }
        Ok(())
    }
}

impl InventoryItem {
    /// A freshly provisioned, empty ledger record.
    pub fn provision(
        key: ItemKey,
        thresholds: StockThresholds,
        unit_cost: Decimal,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        thresholds.validate()?;
        if unit_cost.is_sign_negative() {
            return Err(DomainError::validation("unit_cost cannot be negative"));
        }
        Ok(Self {
            id: InventoryItemId::new(),
            key,
            current_stock: 0,
            reserved_stock: 0,
            thresholds,
            unit_cost,
            expiration_date: None,
            location: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild an item from persisted columns, re-checking the stock invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: InventoryItemId,
        key: ItemKey,
        current_stock: i64,
        reserved_stock: i64,
        thresholds: StockThresholds,
        unit_cost: Decimal,
        expiration_date: Option<NaiveDate>,
        location: Option<String>,
        is_active: bool,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if current_stock < 0 || reserved_stock < 0 || reserved_stock > current_stock {
            return Err(DomainError::validation(format!(
                "corrupt stock row {id}: current={current_stock} reserved={reserved_stock}"
            )));
        }
        Ok(Self {
            id,
            key,
            current_stock,
            reserved_stock,
            thresholds,
            unit_cost,
            expiration_date,
            location,
            is_active,
            created_at,
            updated_at,
        })
    }

    pub fn current_stock(&self) -> i64 {
        self.current_stock
    }

    pub fn reserved_stock(&self) -> i64 {
        self.reserved_stock
    }

    /// `current_stock - reserved_stock`.
    pub fn available(&self) -> i64 {
        self.current_stock - self.reserved_stock
    }

    fn ensure_active(&self) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::conflict(format!(
                "inventory item {} is deactivated",
                self.id
            )));
        }
        Ok(())
    }

    /// Apply a signed adjustment and produce the matching movement row.
    ///
    /// The caller persists both in the same transaction.
    pub fn apply_adjustment(
        &mut self,
        cmd: &AdjustStock,
        now: DateTime<Utc>,
    ) -> DomainResult<StockMovement> {
        cmd.validate()?;
        if cmd.item_id != self.id {
            return Err(DomainError::validation("item_id mismatch"));
        }
        self.ensure_active()?;

        let previous = self.current_stock;
        let new_quantity = previous
            .checked_add(cmd.delta)
            .ok_or_else(|| DomainError::validation("stock quantity overflow"))?;

        if new_quantity < 0 {
            return Err(DomainError::InsufficientStock {
                requested: -cmd.delta,
                on_hand: previous,
            });
        }
        // Physical stock may never drop under what is already promised.
        if new_quantity < self.reserved_stock {
            return Err(DomainError::InsufficientStock {
                requested: -cmd.delta,
                on_hand: self.available(),
            });
        }

        self.current_stock = new_quantity;
        self.updated_at = now;

        Ok(StockMovement {
            id: StockMovementId::new(),
            item_id: self.id,
            movement_type: cmd.movement_type,
            quantity: cmd.delta,
            previous_quantity: previous,
            new_quantity,
            reference: cmd.reference.clone(),
            notes: cmd.notes.clone(),
            performed_by: cmd.performed_by,
            created_at: now,
        })
    }

    /// Place a hold on available stock. Physical quantity is untouched.
    pub fn reserve(&mut self, quantity: i64, now: DateTime<Utc>) -> DomainResult<()> {
        if quantity <= 0 {
            return Err(DomainError::validation("reservation quantity must be positive"));
        }
        self.ensure_active()?;

        let available = self.available();
        if available < quantity {
            return Err(DomainError::InsufficientAvailable {
                requested: quantity,
                available,
            });
        }

        self.reserved_stock += quantity;
        self.updated_at = now;
        Ok(())
    }

    /// Release part of a hold.
    ///
    /// `held_for_reference` is what the caller's reference currently holds;
    /// asking for more is an over-release. Returns the amount actually released
    /// (`min(quantity, reserved_stock)`).
    pub fn release(
        &mut self,
        quantity: i64,
        held_for_reference: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<i64> {
        if quantity <= 0 {
            return Err(DomainError::validation("release quantity must be positive"));
        }
        if quantity > held_for_reference {
            return Err(DomainError::OverRelease {
                requested: quantity,
                held: held_for_reference,
            });
        }

        let released = quantity.min(self.reserved_stock);
        self.reserved_stock -= released;
        self.updated_at = now;
        Ok(released)
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_active()?;
        self.is_active = false;
        self.updated_at = now;
        Ok(())
    }

    /// Bring a deactivated batch back (e.g. when a receipt restocks it).
    pub fn reactivate(&mut self, now: DateTime<Utc>) {
        if !self.is_active {
            self.is_active = true;
            self.updated_at = now;
        }
    }

    /// Whether stock sits at or below a configured reorder point.
    ///
    /// A reorder point of zero means "no threshold configured".
    pub fn needs_reorder(&self) -> bool {
        self.is_active
            && self.thresholds.reorder_point > 0
            && self.current_stock <= self.thresholds.reorder_point
    }

    /// `max(reorder_quantity, reorder_point * 2)`.
    pub fn suggested_reorder_quantity(&self) -> i64 {
        self.thresholds
            .reorder_quantity
            .max(self.thresholds.reorder_point.saturating_mul(2))
    }
}

impl Entity for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
