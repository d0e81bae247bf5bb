use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::{
    BranchId, DomainError, DomainResult, Entity, ProductId, SupplierId, UserId, ValueObject,
    impl_uuid_newtype,
};
use stockflow_inventory::StockAlertId;

use crate::supplier::Supplier;

/// Purchase order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(Uuid);

impl_uuid_newtype!(PurchaseOrderId, "PurchaseOrderId");

/// Purchase order line identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderItemId(Uuid);

impl_uuid_newtype!(PurchaseOrderItemId, "PurchaseOrderItemId");

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    SentToSupplier,
    ConfirmedBySupplier,
    InTransit,
    Completed,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub const ALL: [PurchaseOrderStatus; 9] = [
        PurchaseOrderStatus::Draft,
        PurchaseOrderStatus::PendingApproval,
        PurchaseOrderStatus::Approved,
        PurchaseOrderStatus::Rejected,
        PurchaseOrderStatus::SentToSupplier,
        PurchaseOrderStatus::ConfirmedBySupplier,
        PurchaseOrderStatus::InTransit,
        PurchaseOrderStatus::Completed,
        PurchaseOrderStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "draft",
            PurchaseOrderStatus::PendingApproval => "pending_approval",
            PurchaseOrderStatus::Approved => "approved",
            PurchaseOrderStatus::Rejected => "rejected",
            PurchaseOrderStatus::SentToSupplier => "sent_to_supplier",
            PurchaseOrderStatus::ConfirmedBySupplier => "confirmed_by_supplier",
            PurchaseOrderStatus::InTransit => "in_transit",
            PurchaseOrderStatus::Completed => "completed",
            PurchaseOrderStatus::Cancelled => "cancelled",
        }
    }

    /// The full transition table. Anything not listed here is illegal.
    pub fn can_transition_to(self, next: PurchaseOrderStatus) -> bool {
        use PurchaseOrderStatus::*;
        matches!(
            (self, next),
            (Draft, PendingApproval)
                | (Draft, Cancelled)
                | (PendingApproval, Approved)
                | (PendingApproval, Rejected)
                | (PendingApproval, Cancelled)
                | (Approved, SentToSupplier)
                | (Approved, Cancelled)
                | (SentToSupplier, ConfirmedBySupplier)
                | (SentToSupplier, InTransit)
                | (SentToSupplier, Completed)
                | (ConfirmedBySupplier, InTransit)
                | (ConfirmedBySupplier, Completed)
                | (InTransit, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Completed
                | PurchaseOrderStatus::Cancelled
                | PurchaseOrderStatus::Rejected
        )
    }

    /// Statuses in which goods may be received against the order.
    pub fn is_deliverable(self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::SentToSupplier
                | PurchaseOrderStatus::ConfirmedBySupplier
                | PurchaseOrderStatus::InTransit
        )
    }
}

impl core::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PurchaseOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PurchaseOrderStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown purchase order status '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
            Urgency::Urgent => "urgent",
        }
    }

    /// Queue position: urgent orders sort first.
    pub fn priority(self) -> u8 {
        match self {
            Urgency::Urgent => 0,
            Urgency::High => 1,
            Urgency::Normal => 2,
            Urgency::Low => 3,
        }
    }
}

impl core::fmt::Display for Urgency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Urgency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Urgency::Low),
            "normal" => Ok(Urgency::Normal),
            "high" => Ok(Urgency::High),
            "urgent" => Ok(Urgency::Urgent),
            other => Err(DomainError::validation(format!("unknown urgency '{other}'"))),
        }
    }
}

/// Purchase order line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub id: PurchaseOrderItemId,
    pub purchase_order_id: PurchaseOrderId,
    pub product_id: ProductId,
    pub quantity_ordered: i64,
    pub unit_cost: Decimal,
    pub line_total: Decimal,
}

fn amount_overflow() -> DomainError {
    DomainError::validation("order amount overflow")
}

/// `unit_cost × quantity`; overflow is a validation error, never a panic.
pub fn line_amount(unit_cost: Decimal, quantity: i64) -> DomainResult<Decimal> {
    unit_cost
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(amount_overflow)
}

/// Sum of money amounts with the same overflow rule as [`line_amount`].
pub fn checked_total(amounts: impl IntoIterator<Item = Decimal>) -> DomainResult<Decimal> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount).ok_or_else(amount_overflow))
}

/// Money totals of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PurchaseTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub shipping_cost: Decimal,
    pub total_amount: Decimal,
}

impl ValueObject for PurchaseTotals {}

impl PurchaseTotals {
    /// `total = subtotal + tax + shipping - discount`, tax rounded to cents.
    pub fn compute(
        line_totals: impl IntoIterator<Item = Decimal>,
        tax_rate: Decimal,
        shipping_cost: Decimal,
        discount_amount: Decimal,
    ) -> DomainResult<Self> {
        if tax_rate.is_sign_negative() {
            return Err(DomainError::validation("tax rate cannot be negative"));
        }
        if shipping_cost.is_sign_negative() || discount_amount.is_sign_negative() {
            return Err(DomainError::validation(
                "shipping cost and discount cannot be negative",
            ));
        }

        let subtotal = checked_total(line_totals)?;
        let tax_amount = subtotal
            .checked_mul(tax_rate)
            .ok_or_else(amount_overflow)?
            .round_dp(2);
        let gross = checked_total([subtotal, tax_amount, shipping_cost])?;
        if discount_amount > gross {
            return Err(DomainError::validation(format!(
                "discount {discount_amount} exceeds order total {gross}"
            )));
        }

        Ok(Self {
            subtotal,
            tax_amount,
            discount_amount,
            shipping_cost,
            total_amount: gross - discount_amount,
        })
    }
}

/// Requested line of a new order; `unit_cost` is resolved from supplier pricing when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseOrderLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_cost: Option<Decimal>,
}

/// Command: create a draft purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    pub supplier_id: SupplierId,
    pub branch_id: BranchId,
    pub requested_by: UserId,
    pub items: Vec<NewPurchaseOrderLine>,
    pub urgency: Option<Urgency>,
    pub required_date: Option<NaiveDate>,
    pub source_alert_id: Option<StockAlertId>,
    pub shipping_cost: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub notes: Option<String>,
}

impl NewPurchaseOrder {
    pub fn validate(&self) -> DomainResult<()> {
        if self.items.is_empty() {
            return Err(DomainError::validation("purchase order needs at least one item"));
        }
        for line in &self.items {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "quantity for product {} must be positive",
                    line.product_id
                )));
            }
            if line.unit_cost.is_some_and(|c| c.is_sign_negative()) {
                return Err(DomainError::validation("unit cost cannot be negative"));
            }
        }
        if self.shipping_cost.is_some_and(|c| c.is_sign_negative())
            || self.discount_amount.is_some_and(|c| c.is_sign_negative())
        {
            return Err(DomainError::validation(
                "shipping cost and discount cannot be negative",
            ));
        }
        Ok(())
    }
}

/// A line whose unit cost has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_cost: Decimal,
}

/// Aggregate root: PurchaseOrder.
///
/// Status changes go through the transition methods, which consult
/// [`PurchaseOrderStatus::can_transition_to`] and stamp the audit fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: PurchaseOrderId,
    pub po_number: String,
    pub supplier_id: SupplierId,
    pub branch_id: BranchId,
    pub requested_by: UserId,
    pub status: PurchaseOrderStatus,
    pub urgency: Urgency,
    pub totals: PurchaseTotals,
    pub required_date: Option<NaiveDate>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub source_alert_id: Option<StockAlertId>,
    pub notes: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub sent_by: Option<UserId>,
    pub sent_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<UserId>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseOrder {
    /// Build a draft order and its lines from already-priced input.
    pub fn draft(
        cmd: &NewPurchaseOrder,
        lines: &[PricedLine],
        supplier: &Supplier,
        tax_rate: Decimal,
        po_number: String,
        now: DateTime<Utc>,
    ) -> DomainResult<(Self, Vec<PurchaseOrderItem>)> {
        cmd.validate()?;
        if supplier.id != cmd.supplier_id {
            return Err(DomainError::validation("supplier mismatch"));
        }
        supplier.ensure_active()?;
        if lines.is_empty() {
            return Err(DomainError::validation("purchase order needs at least one item"));
        }

        let id = PurchaseOrderId::new();
        let items = lines
            .iter()
            .map(|l| {
                Ok(PurchaseOrderItem {
                    id: PurchaseOrderItemId::new(),
                    purchase_order_id: id,
                    product_id: l.product_id,
                    quantity_ordered: l.quantity,
                    unit_cost: l.unit_cost,
                    line_total: line_amount(l.unit_cost, l.quantity)?,
                })
            })
            .collect::<DomainResult<Vec<PurchaseOrderItem>>>()?;

        let totals = PurchaseTotals::compute(
            items.iter().map(|i| i.line_total),
            tax_rate,
            cmd.shipping_cost.unwrap_or_default(),
            cmd.discount_amount.unwrap_or_default(),
        )?;

        if totals.subtotal < supplier.minimum_order_amount {
            return Err(DomainError::validation(format!(
                "subtotal {} is below supplier minimum order amount {}",
                totals.subtotal, supplier.minimum_order_amount
            )));
        }

        let expected_delivery_date = match cmd.required_date {
            Some(date) => Some(date),
            None => now
                .date_naive()
                .checked_add_signed(TimeDelta::days(i64::from(supplier.lead_time_days.max(0)))),
        };

        let order = Self {
            id,
            po_number,
            supplier_id: cmd.supplier_id,
            branch_id: cmd.branch_id,
            requested_by: cmd.requested_by,
            status: PurchaseOrderStatus::Draft,
            urgency: cmd.urgency.unwrap_or_default(),
            totals,
            required_date: cmd.required_date,
            expected_delivery_date,
            source_alert_id: cmd.source_alert_id,
            notes: cmd.notes.clone(),
            submitted_at: None,
            approved_by: None,
            approved_at: None,
            sent_by: None,
            sent_at: None,
            confirmed_at: None,
            shipped_at: None,
            received_at: None,
            cancelled_by: None,
            cancelled_at: None,
            cancelled_reason: None,
            created_at: now,
            updated_at: now,
        };
        Ok((order, items))
    }

    pub fn ensure_status(&self, expected: PurchaseOrderStatus) -> DomainResult<()> {
        if self.status != expected {
            return Err(DomainError::conflict(format!(
                "purchase order {} is {}, expected {}",
                self.po_number, self.status, expected
            )));
        }
        Ok(())
    }

    /// Move to `next` if the table allows it; returns the previous status.
    fn transition(
        &mut self,
        next: PurchaseOrderStatus,
        now: DateTime<Utc>,
    ) -> DomainResult<PurchaseOrderStatus> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::conflict(format!(
                "purchase order {} cannot move from {} to {}",
                self.po_number, self.status, next
            )));
        }
        let previous = self.status;
        self.status = next;
        self.updated_at = now;
        Ok(previous)
    }

    pub fn submit(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(PurchaseOrderStatus::PendingApproval, now)?;
        self.submitted_at = Some(now);
        Ok(())
    }

    /// Final approval, once every approval row has resolved to approve.
    pub fn mark_approved(&mut self, by: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(PurchaseOrderStatus::Approved, now)?;
        self.approved_by = Some(by);
        self.approved_at = Some(now);
        Ok(())
    }

    pub fn mark_rejected(
        &mut self,
        by: UserId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.transition(PurchaseOrderStatus::Rejected, now)?;
        self.cancelled_by = Some(by);
        self.cancelled_at = Some(now);
        self.cancelled_reason = Some(reason.into());
        Ok(())
    }

    pub fn send_to_supplier(&mut self, by: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(PurchaseOrderStatus::SentToSupplier, now)?;
        self.sent_by = Some(by);
        self.sent_at = Some(now);
        Ok(())
    }

    pub fn confirm_by_supplier(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(PurchaseOrderStatus::ConfirmedBySupplier, now)?;
        self.confirmed_at = Some(now);
        Ok(())
    }

    pub fn mark_in_transit(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(PurchaseOrderStatus::InTransit, now)?;
        self.shipped_at = Some(now);
        Ok(())
    }

    /// Goods were received against the order.
    pub fn complete(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(PurchaseOrderStatus::Completed, now)?;
        self.received_at = Some(now);
        Ok(())
    }

    pub fn cancel(&mut self, by: UserId, reason: &str, now: DateTime<Utc>) -> DomainResult<()> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("cancellation reason is required"));
        }
        self.transition(PurchaseOrderStatus::Cancelled, now)?;
        self.cancelled_by = Some(by);
        self.cancelled_at = Some(now);
        self.cancelled_reason = Some(reason.to_string());
        Ok(())
    }
}

impl Entity for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// `PREFIX-YYYYMMDD-NNNNNN`; the sequence wraps at one million.
pub fn document_number(prefix: &str, date: NaiveDate, sequence: i64) -> String {
    format!(
        "{prefix}-{}-{:06}",
        date.format("%Y%m%d"),
        sequence.rem_euclid(1_000_000)
    )
}
