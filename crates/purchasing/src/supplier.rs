//! Suppliers, their per-product offers, and the recommendation score.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, Entity, ProductId, SupplierId};

use crate::order::line_amount;

/// Upper bound on how many suppliers a recommendation returns.
pub const MAX_RECOMMENDATIONS: usize = 5;

/// Ratings live on a 0..=5 scale.
pub const MAX_RATING: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    pub supplier_type: String,
    pub quality_rating: f64,
    pub delivery_rating: f64,
    pub price_competitiveness: f64,
    pub lead_time_days: i32,
    pub minimum_order_amount: Decimal,
    pub is_active: bool,
    /// Deliveries folded into `delivery_rating` so far.
    pub rated_deliveries: i32,
    /// Quality inspections folded into `quality_rating` so far.
    pub rated_inspections: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Supplier {
    pub fn ensure_active(&self) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::validation(format!(
                "supplier {} is inactive",
                self.id
            )));
        }
        Ok(())
    }

    /// Fold one delivery score into the rolling `delivery_rating`.
    pub fn record_delivery_score(&mut self, score: f64, now: DateTime<Utc>) {
        self.delivery_rating = rolling_average(self.delivery_rating, self.rated_deliveries, score);
        self.rated_deliveries += 1;
        self.updated_at = now;
    }

    /// Fold one inspection score into the rolling `quality_rating`.
    pub fn record_quality_score(&mut self, score: f64, now: DateTime<Utc>) {
        self.quality_rating = rolling_average(self.quality_rating, self.rated_inspections, score);
        self.rated_inspections += 1;
        self.updated_at = now;
    }
}

impl Entity for Supplier {
    type Id = SupplierId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

// The seeded rating is replaced by the first observed score.
fn rolling_average(current: f64, samples: i32, score: f64) -> f64 {
    let score = score.clamp(0.0, MAX_RATING);
    if samples <= 0 {
        return score;
    }
    let n = f64::from(samples);
    ((current * n + score) / (n + 1.0)).clamp(0.0, MAX_RATING)
}

/// A supplier's offer for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierProduct {
    pub supplier_id: SupplierId,
    pub product_id: ProductId,
    pub unit_cost: Decimal,
    pub minimum_quantity: i64,
    /// Overrides the supplier-wide lead time when set.
    pub lead_time_days: Option<i32>,
    pub is_preferred: bool,
}

impl SupplierProduct {
    pub fn effective_lead_time(&self, supplier: &Supplier) -> i32 {
        self.lead_time_days.unwrap_or(supplier.lead_time_days)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationReason {
    Preferred,
    HighQuality,
    ReliableDelivery,
    CompetitivePricing,
    FastLeadTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierRecommendation {
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    /// 0..=100.
    pub score: f64,
    pub unit_cost: Decimal,
    pub estimated_cost: Decimal,
    pub lead_time_days: i32,
    pub is_preferred: bool,
    pub reasons: Vec<RecommendationReason>,
}

/// Weighted score on a 0..=100 scale.
///
/// quality 30%, delivery 30%, price 25%, preferred flag 15%.
pub fn supplier_score(supplier: &Supplier, offer: &SupplierProduct) -> f64 {
    let preferred = if offer.is_preferred { 1.0 } else { 0.0 };
    (supplier.quality_rating * 0.30
        + supplier.delivery_rating * 0.30
        + supplier.price_competitiveness * 0.25
        + preferred * 0.15)
        * 20.0
}

fn reasons_for(supplier: &Supplier, offer: &SupplierProduct) -> Vec<RecommendationReason> {
    let mut reasons = Vec::new();
    if offer.is_preferred {
        reasons.push(RecommendationReason::Preferred);
    }
    if supplier.quality_rating >= 4.0 {
        reasons.push(RecommendationReason::HighQuality);
    }
    if supplier.delivery_rating >= 4.0 {
        reasons.push(RecommendationReason::ReliableDelivery);
    }
    if supplier.price_competitiveness >= 4.0 {
        reasons.push(RecommendationReason::CompetitivePricing);
    }
    if offer.effective_lead_time(supplier) <= 3 {
        reasons.push(RecommendationReason::FastLeadTime);
    }
    reasons
}

/// Rank the eligible offers for `quantity` units of one product.
///
/// Inactive suppliers and offers whose minimum quantity exceeds `quantity` are
/// skipped. Ordered by score descending, then unit cost ascending.
pub fn recommend_suppliers(
    candidates: &[(Supplier, SupplierProduct)],
    quantity: i64,
    limit: usize,
) -> DomainResult<Vec<SupplierRecommendation>> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }

    let mut ranked = candidates
        .iter()
        .filter(|(s, o)| s.is_active && s.id == o.supplier_id && o.minimum_quantity <= quantity)
        .map(|(s, o)| {
            Ok(SupplierRecommendation {
                supplier_id: s.id,
                supplier_name: s.name.clone(),
                score: supplier_score(s, o),
                unit_cost: o.unit_cost,
                estimated_cost: line_amount(o.unit_cost, quantity)?,
                lead_time_days: o.effective_lead_time(s),
                is_preferred: o.is_preferred,
                reasons: reasons_for(s, o),
            })
        })
        .collect::<DomainResult<Vec<SupplierRecommendation>>>()?;

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.unit_cost.cmp(&b.unit_cost))
    });
    ranked.truncate(limit.min(MAX_RECOMMENDATIONS));
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn supplier(name: &str, q: f64, d: f64, p: f64, lead: i32) -> Supplier {
        let now = Utc::now();
        Supplier {
            id: SupplierId::new(),
            name: name.to_string(),
            supplier_type: "distributor".to_string(),
            quality_rating: q,
            delivery_rating: d,
            price_competitiveness: p,
            lead_time_days: lead,
            minimum_order_amount: Decimal::ZERO,
            is_active: true,
            rated_deliveries: 0,
            rated_inspections: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn offer(s: &Supplier, cost: Decimal, min_qty: i64, preferred: bool) -> SupplierProduct {
        SupplierProduct {
            supplier_id: s.id,
            product_id: ProductId::new(),
            unit_cost: cost,
            minimum_quantity: min_qty,
            lead_time_days: None,
            is_preferred: preferred,
        }
    }

    #[test]
    fn perfect_preferred_supplier_scores_100() {
        let s = supplier("best", 5.0, 5.0, 5.0, 2);
        let score = supplier_score(&s, &offer(&s, dec!(1), 1, true));
        assert!((score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn ranking_breaks_ties_on_unit_cost() {
        let a = supplier("a", 4.0, 4.0, 4.0, 7);
        let b = supplier("b", 4.0, 4.0, 4.0, 7);
        let candidates = vec![
            (a.clone(), offer(&a, dec!(9.50), 1, false)),
            (b.clone(), offer(&b, dec!(8.75), 1, false)),
        ];

        let ranked = recommend_suppliers(&candidates, 10, 5).unwrap();
        assert_eq!(ranked[0].supplier_id, b.id);
        assert_eq!(ranked[0].estimated_cost, dec!(87.50));
    }

    #[test]
    fn minimum_quantity_and_inactive_suppliers_are_filtered() {
        let bulk = supplier("bulk", 5.0, 5.0, 5.0, 1);
        let mut closed = supplier("closed", 5.0, 5.0, 5.0, 1);
        closed.is_active = false;
        let small = supplier("small", 2.0, 2.0, 2.0, 10);
        let candidates = vec![
            (bulk.clone(), offer(&bulk, dec!(1), 500, true)),
            (closed.clone(), offer(&closed, dec!(1), 1, true)),
            (small.clone(), offer(&small, dec!(3), 1, false)),
        ];

        let ranked = recommend_suppliers(&candidates, 20, 5).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].supplier_id, small.id);
        assert!(ranked[0].reasons.is_empty());
    }

    #[test]
    fn at_most_five_recommendations() {
        let candidates: Vec<_> = (0..8)
            .map(|i| {
                let s = supplier(&format!("s{i}"), 3.0, 3.0, 3.0, 5);
                let o = offer(&s, Decimal::from(10 + i), 1, false);
                (s, o)
            })
            .collect();
        assert_eq!(recommend_suppliers(&candidates, 1, 10).unwrap().len(), 5);
    }

    #[test]
    fn reason_tags_follow_ratings_and_lead_time() {
        let s = supplier("fast", 4.5, 3.0, 4.0, 2);
        let ranked = recommend_suppliers(&[(s.clone(), offer(&s, dec!(1), 1, true))], 1, 5).unwrap();
        assert_eq!(
            ranked[0].reasons,
            vec![
                RecommendationReason::Preferred,
                RecommendationReason::HighQuality,
                RecommendationReason::CompetitivePricing,
                RecommendationReason::FastLeadTime,
            ]
        );
    }

    #[test]
    fn rolling_ratings_average_observed_scores() {
        let mut s = supplier("x", 5.0, 5.0, 3.0, 5);
        let now = Utc::now();
        s.record_delivery_score(3.0, now);
        assert_eq!(s.delivery_rating, 3.0);
        s.record_delivery_score(5.0, now);
        assert_eq!(s.delivery_rating, 4.0);
        assert_eq!(s.rated_deliveries, 2);

        s.record_quality_score(1.0, now);
        assert_eq!(s.quality_rating, 1.0);
        assert_eq!(s.rated_inspections, 1);
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        assert!(matches!(
            recommend_suppliers(&[], 0, 5),
            Err(DomainError::Validation(_))
        ));
    }
}
