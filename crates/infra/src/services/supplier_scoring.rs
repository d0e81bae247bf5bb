//! Supplier ranking and supplier reference data.

use chrono::Utc;
use tracing::{info, instrument};

use stockflow_core::ProductId;
use stockflow_purchasing::{
    MAX_RECOMMENDATIONS, Supplier, SupplierProduct, SupplierRecommendation, recommend_suppliers,
};

use crate::db::StoreTx;
use crate::error::{ProcurementError, ProcurementResult};

use super::ServiceContext;

const RATING_RANGE: std::ops::RangeInclusive<f64> = 0.0..=5.0;

#[derive(Clone)]
pub struct SupplierScoring {
    ctx: ServiceContext,
}

impl SupplierScoring {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Best offers for `quantity` units of `product_id`, at most five.
    #[instrument(skip(self), err)]
    pub async fn recommend(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> ProcurementResult<Vec<SupplierRecommendation>> {
        if quantity <= 0 {
            return Err(ProcurementError::validation("quantity must be positive"));
        }
        let mut tx = self.ctx.store.begin().await?;
        recommend_in_tx(tx.as_mut(), product_id, quantity).await
    }

    /// Create or replace a supplier record.
    ///
    /// The rating sample counters belong to receipt processing; an edit keeps
    /// the stored values whatever the caller sends.
    #[instrument(skip(self, supplier), fields(supplier_id = %supplier.id), err)]
    pub async fn upsert_supplier(&self, mut supplier: Supplier) -> ProcurementResult<Supplier> {
        validate_supplier(&supplier)?;
        supplier.updated_at = Utc::now();

        let mut tx = self.ctx.store.begin().await?;
        if let Some(existing) = tx.lock_supplier(supplier.id).await? {
            supplier.created_at = existing.created_at;
            supplier.rated_deliveries = existing.rated_deliveries;
            supplier.rated_inspections = existing.rated_inspections;
        }
        tx.upsert_supplier(&supplier).await?;
        tx.commit().await?;

        info!(name = %supplier.name, "supplier saved");
        Ok(supplier)
    }

    /// Create or replace a supplier's offer for one product.
    #[instrument(skip(self, offer), fields(supplier_id = %offer.supplier_id, product_id = %offer.product_id), err)]
    pub async fn upsert_offer(&self, offer: SupplierProduct) -> ProcurementResult<SupplierProduct> {
        if offer.unit_cost.is_sign_negative() {
            return Err(ProcurementError::validation("unit cost cannot be negative"));
        }
        if offer.minimum_quantity < 0 {
            return Err(ProcurementError::validation("minimum quantity cannot be negative"));
        }
        if offer.lead_time_days.is_some_and(|d| d < 0) {
            return Err(ProcurementError::validation("lead time cannot be negative"));
        }

        let mut tx = self.ctx.store.begin().await?;
        if tx.find_supplier(offer.supplier_id).await?.is_none() {
            return Err(ProcurementError::not_found(format!("supplier {}", offer.supplier_id)));
        }
        tx.upsert_supplier_product(&offer).await?;
        tx.commit().await?;
        Ok(offer)
    }
}

fn validate_supplier(supplier: &Supplier) -> ProcurementResult<()> {
    if supplier.name.trim().is_empty() {
        return Err(ProcurementError::validation("supplier name cannot be empty"));
    }
    let ratings = [
        supplier.quality_rating,
        supplier.delivery_rating,
        supplier.price_competitiveness,
    ];
    if !ratings.iter().all(|r| RATING_RANGE.contains(r)) {
        return Err(ProcurementError::validation("supplier ratings must be between 0 and 5"));
    }
    if supplier.lead_time_days < 0 {
        return Err(ProcurementError::validation("lead time cannot be negative"));
    }
    if supplier.minimum_order_amount.is_sign_negative() {
        return Err(ProcurementError::validation("minimum order amount cannot be negative"));
    }
    Ok(())
}

pub(crate) async fn recommend_in_tx(
    tx: &mut dyn StoreTx,
    product_id: ProductId,
    quantity: i64,
) -> ProcurementResult<Vec<SupplierRecommendation>> {
    let offers = tx.list_offers(product_id).await?;
    Ok(recommend_suppliers(&offers, quantity, MAX_RECOMMENDATIONS)?)
}
