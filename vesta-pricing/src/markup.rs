use serde::{Deserialize, Serialize};

use crate::discount::{apply_discount, DiscountTerms};
use crate::{PricingError, PricingResult};

/// Purchaser role as carried in the auth claims. Unauthenticated requests
/// map to Public.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Public,
    Member,
    Partner,
    Operator,
}

impl Role {
    pub fn parse(s: &str) -> Self {
        match s {
            "MEMBER" => Role::Member,
            "PARTNER" => Role::Partner,
            "OPERATOR" | "ADMIN" => Role::Operator,
            _ => Role::Public,
        }
    }
}

/// One step of the public markup curve: applies up to (and including) the
/// given net ceiling. A band without a ceiling is the open tail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkupBand {
    pub up_to: Option<f64>,
    pub pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkupConfig {
    /// Public-role bands, keyed on supplier net, lowest ceiling first.
    /// Percentages taper as the net price rises.
    pub public_bands: Vec<MarkupBand>,
    pub member_pct: f64,
    pub partner_pct: f64,
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self {
            public_bands: vec![
                MarkupBand { up_to: Some(100.0), pct: 50.0 },
                MarkupBand { up_to: Some(250.0), pct: 40.0 },
                MarkupBand { up_to: Some(500.0), pct: 30.0 },
                MarkupBand { up_to: Some(1000.0), pct: 25.0 },
                MarkupBand { up_to: None, pct: 20.0 },
            ],
            member_pct: 30.0,
            partner_pct: 15.0,
        }
    }
}

/// Snapshot of how a charge was computed, stored on the reservation so the
/// numbers can be audited later without re-running the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingBreakdown {
    pub net: f64,
    pub role: Role,
    pub markup_pct: f64,
    pub gross: f64,
    pub discount: Option<DiscountTerms>,
    pub total: f64,
    pub currency: String,
}

/// Pure markup engine. Given (role, net) the result is deterministic; all
/// configuration is injected, never looked up ambiently.
pub struct MarkupEngine {
    config: MarkupConfig,
}

impl MarkupEngine {
    pub fn new(config: MarkupConfig) -> Self {
        Self { config }
    }

    /// The percentage applied for a role at a given supplier net. Public is
    /// banded on net; authenticated roles are flat; Operator passes through.
    pub fn markup_pct(&self, net: f64, role: Role) -> PricingResult<f64> {
        if !net.is_finite() || net <= 0.0 {
            return Err(PricingError::InvalidAmount(format!(
                "net amount must be finite and positive, got {net}"
            )));
        }

        let pct = match role {
            Role::Operator => 0.0,
            Role::Member => self.config.member_pct,
            Role::Partner => self.config.partner_pct,
            Role::Public => {
                let mut pct = self
                    .config
                    .public_bands
                    .last()
                    .map(|b| b.pct)
                    .unwrap_or(0.0);
                for band in &self.config.public_bands {
                    match band.up_to {
                        Some(ceiling) if net <= ceiling => {
                            pct = band.pct;
                            break;
                        }
                        Some(_) => continue,
                        None => {
                            pct = band.pct;
                            break;
                        }
                    }
                }
                pct
            }
        };

        Ok(pct)
    }

    /// Purchaser-facing gross for a supplier net. Unrounded; rounding
    /// happens once at the minor-unit boundary.
    pub fn charge(&self, net: f64, role: Role) -> PricingResult<f64> {
        let pct = self.markup_pct(net, role)?;
        Ok(net * (1.0 + pct / 100.0))
    }

    /// Full breakdown with an optional discount applied to the marked-up
    /// gross (never to the supplier net).
    pub fn quote(
        &self,
        net: f64,
        role: Role,
        currency: &str,
        discount: Option<&DiscountTerms>,
    ) -> PricingResult<PricingBreakdown> {
        let markup_pct = self.markup_pct(net, role)?;
        let gross = net * (1.0 + markup_pct / 100.0);
        let total = match discount {
            Some(terms) => apply_discount(gross, terms),
            None => gross,
        };

        Ok(PricingBreakdown {
            net,
            role,
            markup_pct,
            gross,
            discount: discount.cloned(),
            total,
            currency: currency.to_string(),
        })
    }
}

impl Default for MarkupEngine {
    fn default() -> Self {
        Self::new(MarkupConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_net_80_usd_gets_50_pct() {
        // Scenario A
        let engine = MarkupEngine::default();
        let gross = engine.charge(80.0, Role::Public).unwrap();
        assert_eq!(gross, 120.0);
        assert_eq!(
            vesta_shared::currency::to_minor_units(gross, "USD"),
            12000
        );
    }

    #[test]
    fn public_pct_is_monotone_non_increasing() {
        let engine = MarkupEngine::default();
        let mut last = f64::INFINITY;
        for net in [1.0, 50.0, 100.0, 100.01, 250.0, 400.0, 500.5, 1000.0, 5000.0] {
            let pct = engine.markup_pct(net, Role::Public).unwrap();
            assert!(pct <= last, "pct rose at net={net}");
            last = pct;
        }
    }

    #[test]
    fn charge_never_below_net_for_public() {
        let engine = MarkupEngine::default();
        for net in [0.5, 10.0, 99.0, 333.0, 12000.0] {
            assert!(engine.charge(net, Role::Public).unwrap() >= net);
        }
    }

    #[test]
    fn operator_passes_through_at_net() {
        let engine = MarkupEngine::default();
        assert_eq!(engine.charge(80.0, Role::Operator).unwrap(), 80.0);
    }

    #[test]
    fn non_finite_net_is_invalid() {
        let engine = MarkupEngine::default();
        assert!(matches!(
            engine.charge(f64::NAN, Role::Public),
            Err(PricingError::InvalidAmount(_))
        ));
        assert!(matches!(
            engine.charge(f64::INFINITY, Role::Member),
            Err(PricingError::InvalidAmount(_))
        ));
        assert!(engine.charge(0.0, Role::Public).is_err());
    }

    #[test]
    fn quote_applies_discount_to_gross_not_net() {
        let engine = MarkupEngine::default();
        let terms = DiscountTerms {
            percent_off: Some(10.0),
            special_price: None,
        };
        let breakdown = engine.quote(80.0, Role::Public, "USD", Some(&terms)).unwrap();
        assert_eq!(breakdown.gross, 120.0);
        assert_eq!(breakdown.total, 108.0);
    }
}
