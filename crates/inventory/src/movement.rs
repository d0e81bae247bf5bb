use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::{DomainError, UserId, impl_uuid_newtype};

use crate::item::InventoryItemId;

/// Stock movement identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockMovementId(Uuid);

impl_uuid_newtype!(StockMovementId, "StockMovementId");

/// Why a quantity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Incoming,
    Outgoing,
    Adjustment,
    Transfer,
    Repack,
    Sample,
    Waste,
    Return,
    Receipt,
}

impl MovementType {
    pub const ALL: [MovementType; 9] = [
        MovementType::Incoming,
        MovementType::Outgoing,
        MovementType::Adjustment,
        MovementType::Transfer,
        MovementType::Repack,
        MovementType::Sample,
        MovementType::Waste,
        MovementType::Return,
        MovementType::Receipt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Incoming => "incoming",
            MovementType::Outgoing => "outgoing",
            MovementType::Adjustment => "adjustment",
            MovementType::Transfer => "transfer",
            MovementType::Repack => "repack",
            MovementType::Sample => "sample",
            MovementType::Waste => "waste",
            MovementType::Return => "return",
            MovementType::Receipt => "receipt",
        }
    }

    /// Whether this kind of movement can only ever add stock.
    pub fn is_inbound_only(self) -> bool {
        matches!(self, MovementType::Incoming | MovementType::Receipt | MovementType::Return)
    }

    /// Whether this kind of movement can only ever remove stock.
    pub fn is_outbound_only(self) -> bool {
        matches!(self, MovementType::Outgoing | MovementType::Sample | MovementType::Waste)
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown movement type '{s}'")))
    }
}

/// Link from a movement to the entity that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementReference {
    /// e.g. "sale", "purchase_order", "goods_receipt", "manual".
    pub reference_type: String,
    pub reference_id: Option<String>,
}

impl MovementReference {
    pub fn new(reference_type: impl Into<String>, reference_id: impl Into<String>) -> Self {
        Self {
            reference_type: reference_type.into(),
            reference_id: Some(reference_id.into()),
        }
    }

    pub fn manual() -> Self {
        Self {
            reference_type: "manual".to_string(),
            reference_id: None,
        }
    }
}

/// Immutable, append-only ledger row.
///
/// Never edited or deleted; corrections are new offsetting `adjustment` rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: StockMovementId,
    pub item_id: InventoryItemId,
    pub movement_type: MovementType,
    /// Signed delta applied to `current_stock`.
    pub quantity: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub reference: MovementReference,
    pub notes: Option<String>,
    pub performed_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_type_parses_its_own_names() {
        for t in MovementType::ALL {
            assert_eq!(t.as_str().parse::<MovementType>().unwrap(), t);
        }
    }

    #[test]
    fn unknown_movement_type_is_a_validation_error() {
        assert!(matches!(
            "teleport".parse::<MovementType>(),
            Err(DomainError::Validation(_))
        ));
    }
}
