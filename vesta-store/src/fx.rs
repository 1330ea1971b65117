//! Production implementations of the rate lookup seams: Redis as the
//! short-TTL cache, the config rate table as the market source.

use async_trait::async_trait;
use std::collections::HashMap;
use vesta_pricing::fx::{RateCache, RateSource};
use vesta_pricing::{PricingError, PricingResult};

use crate::redis_repo::RedisClient;

#[async_trait]
impl RateCache for RedisClient {
    async fn get_rate(&self, base: &str, target: &str) -> PricingResult<Option<f64>> {
        self.get_fx_rate(base, target)
            .await
            .map_err(|e| PricingError::RateLookup(e.to_string()))
    }

    async fn put_rate(
        &self,
        base: &str,
        target: &str,
        rate: f64,
        ttl_seconds: u64,
    ) -> PricingResult<()> {
        self.set_fx_rate(base, target, rate, ttl_seconds)
            .await
            .map_err(|e| PricingError::RateLookup(e.to_string()))
    }
}

/// Rate table loaded from configuration, keyed "BASE:TARGET". Stands in for
/// a live market feed; the inverse pair is derived when only one direction
/// is configured.
pub struct ConfigRateSource {
    rates: HashMap<String, f64>,
}

impl ConfigRateSource {
    pub fn new(rates: HashMap<String, f64>) -> Self {
        let rates = rates
            .into_iter()
            .map(|(key, rate)| (key.to_uppercase(), rate))
            .collect();
        Self { rates }
    }
}

#[async_trait]
impl RateSource for ConfigRateSource {
    async fn market_rate(&self, base: &str, target: &str) -> PricingResult<f64> {
        let key = format!("{}:{}", base.to_uppercase(), target.to_uppercase());
        if let Some(rate) = self.rates.get(&key) {
            return Ok(*rate);
        }
        let inverse = format!("{}:{}", target.to_uppercase(), base.to_uppercase());
        if let Some(rate) = self.rates.get(&inverse) {
            if *rate != 0.0 {
                return Ok(1.0 / rate);
            }
        }
        Err(PricingError::NoRate {
            base: base.to_uppercase(),
            target: target.to_uppercase(),
        })
    }
}
