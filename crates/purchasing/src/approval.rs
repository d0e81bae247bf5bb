use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_auth::Role;
use stockflow_core::{DomainError, DomainResult, Entity, UserId, impl_uuid_newtype};

use crate::order::{PurchaseOrder, PurchaseOrderId, Urgency};

/// Approval row identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseApprovalId(Uuid);

impl_uuid_newtype!(PurchaseApprovalId, "PurchaseApprovalId");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalAction {
    Approve,
    Reject,
}

impl ApprovalAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalAction::Approve => "approve",
            ApprovalAction::Reject => "reject",
        }
    }
}

impl core::str::FromStr for ApprovalAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(ApprovalAction::Approve),
            "reject" => Ok(ApprovalAction::Reject),
            other => Err(DomainError::validation(format!("unknown approval action '{other}'"))),
        }
    }
}

/// One required sign-off on a purchase order.
///
/// `action == None` means the row is still waiting for its role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseApproval {
    pub id: PurchaseApprovalId,
    pub purchase_order_id: PurchaseOrderId,
    pub approval_level: i32,
    pub required_role: Role,
    pub action: Option<ApprovalAction>,
    pub approver_id: Option<UserId>,
    pub comments: Option<String>,
    pub approved_amount: Option<Decimal>,
    pub action_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PurchaseApproval {
    pub fn is_pending(&self) -> bool {
        self.action.is_none()
    }

    fn ensure_pending(&self) -> DomainResult<()> {
        if let Some(action) = self.action {
            return Err(DomainError::conflict(format!(
                "approval level {} already resolved as {}",
                self.approval_level,
                action.as_str()
            )));
        }
        Ok(())
    }

    pub fn approve(
        &mut self,
        approver: UserId,
        comments: Option<String>,
        approved_amount: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_pending()?;
        if approved_amount.is_some_and(|a| a.is_sign_negative()) {
            return Err(DomainError::validation("approved amount cannot be negative"));
        }
        self.action = Some(ApprovalAction::Approve);
        self.approver_id = Some(approver);
        self.comments = comments;
        self.approved_amount = approved_amount;
        self.action_date = Some(now);
        Ok(())
    }

    pub fn reject(&mut self, approver: UserId, reason: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_pending()?;
        if reason.trim().is_empty() {
            return Err(DomainError::validation("rejection reason is required"));
        }
        self.action = Some(ApprovalAction::Reject);
        self.approver_id = Some(approver);
        self.comments = Some(reason.trim().to_string());
        self.action_date = Some(now);
        Ok(())
    }
}

impl Entity for PurchaseApproval {
    type Id = PurchaseApprovalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// An extra sign-off level that applies above a total or for given urgencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalTier {
    pub level: i32,
    pub role: String,
    #[serde(default)]
    pub min_total: Option<Decimal>,
    #[serde(default)]
    pub urgencies: Vec<Urgency>,
}

impl ApprovalTier {
    fn applies_to(&self, order: &PurchaseOrder) -> bool {
        let by_amount = self
            .min_total
            .is_some_and(|min| order.totals.total_amount >= min);
        by_amount || self.urgencies.contains(&order.urgency)
    }
}

/// Who must approve which orders.
///
/// `default_role` always signs at level 1; tiers add higher levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalMatrix {
    pub default_role: String,
    #[serde(default)]
    pub tiers: Vec<ApprovalTier>,
}

impl Default for ApprovalMatrix {
    fn default() -> Self {
        Self {
            default_role: "branch_manager".to_string(),
            tiers: vec![ApprovalTier {
                level: 2,
                role: "finance_manager".to_string(),
                min_total: Some(Decimal::from(10_000)),
                urgencies: Vec::new(),
            }],
        }
    }
}

impl ApprovalMatrix {
    pub fn validate(&self) -> DomainResult<()> {
        if self.default_role.trim().is_empty() {
            return Err(DomainError::validation("approval matrix needs a default role"));
        }
        for tier in &self.tiers {
            if tier.level < 2 {
                return Err(DomainError::validation(format!(
                    "approval tier '{}' must use level 2 or above",
                    tier.role
                )));
            }
            if tier.role.trim().is_empty() {
                return Err(DomainError::validation("approval tier role cannot be empty"));
            }
        }
        Ok(())
    }

    /// Approval rows for `order`, one per distinct level, ascending.
    ///
    /// When several tiers share a level, the first applicable one wins.
    pub fn required_rows(&self, order: &PurchaseOrder, now: DateTime<Utc>) -> Vec<PurchaseApproval> {
        let mut levels: Vec<(i32, &str)> = vec![(1, self.default_role.as_str())];
        for tier in self.tiers.iter().filter(|t| t.applies_to(order)) {
            if !levels.iter().any(|(level, _)| *level == tier.level) {
                levels.push((tier.level, tier.role.as_str()));
            }
        }
        levels.sort_by_key(|(level, _)| *level);

        levels
            .into_iter()
            .map(|(level, role)| PurchaseApproval {
                id: PurchaseApprovalId::new(),
                purchase_order_id: order.id,
                approval_level: level,
                required_role: Role::from(role.to_string()),
                action: None,
                approver_id: None,
                comments: None,
                approved_amount: None,
                action_date: None,
                created_at: now,
            })
            .collect()
    }
}
