use serde::{Deserialize, Serialize};

/// The monetary terms of a discount code, detached from its bookkeeping
/// fields so the engine stays free of repository types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountTerms {
    pub percent_off: Option<f64>,
    pub special_price: Option<f64>,
}

/// Apply a discount to the already-marked-up gross. A fixed special price
/// overrides a percentage when both are present; the result floors at zero.
pub fn apply_discount(gross: f64, terms: &DiscountTerms) -> f64 {
    let discounted = match (terms.special_price, terms.percent_off) {
        (Some(special), _) => special,
        (None, Some(pct)) => gross * (1.0 - pct / 100.0),
        (None, None) => gross,
    };
    discounted.max(0.0)
}
