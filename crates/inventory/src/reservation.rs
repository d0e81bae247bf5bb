//! Per-reference reservation bookkeeping.
//!
//! `InventoryItem::reserved_stock` is the aggregate hold; this record tracks
//! how much of it belongs to each caller reference (order, cart, transfer
//! request) so one reference cannot release another's hold twice over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult};

use crate::item::InventoryItemId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReservation {
    pub item_id: InventoryItemId,
    pub reference_id: String,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

impl StockReservation {
    pub fn empty(item_id: InventoryItemId, reference_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            item_id,
            reference_id: reference_id.into(),
            quantity: 0,
            updated_at: now,
        }
    }

    pub fn hold(&mut self, quantity: i64, now: DateTime<Utc>) {
        self.quantity += quantity;
        self.updated_at = now;
    }

    pub fn release(&mut self, quantity: i64, now: DateTime<Utc>) {
        self.quantity = (self.quantity - quantity).max(0);
        self.updated_at = now;
    }

    pub fn is_empty(&self) -> bool {
        self.quantity == 0
    }
}

/// Reservation references are caller-supplied strings; keep them sane.
pub fn validate_reference(reference_id: &str) -> DomainResult<()> {
    if reference_id.trim().is_empty() {
        return Err(DomainError::validation("reservation reference cannot be empty"));
    }
    if reference_id.len() > 128 {
        return Err(DomainError::validation("reservation reference is too long"));
    }
    Ok(())
}
