use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use vesta_shared::fx::{FxQuote, FxSource};

use crate::{PricingError, PricingResult};

/// Upstream market-rate feed, hit only on cache miss.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn market_rate(&self, base: &str, target: &str) -> PricingResult<f64>;
}

/// Short-TTL rate cache (Redis in production, a map in tests).
#[async_trait]
pub trait RateCache: Send + Sync {
    async fn get_rate(&self, base: &str, target: &str) -> PricingResult<Option<f64>>;
    async fn put_rate(&self, base: &str, target: &str, rate: f64, ttl_seconds: u64) -> PricingResult<()>;
}

#[derive(Debug, Clone)]
pub struct Converted {
    pub amount: f64,
    pub quote: FxQuote,
}

/// Process-local rate cache for tests and single-node wiring. TTLs are not
/// enforced here; entries simply persist for the life of the process.
#[derive(Default)]
pub struct MemoryRateCache(std::sync::Mutex<std::collections::HashMap<String, f64>>);

impl MemoryRateCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateCache for MemoryRateCache {
    async fn get_rate(&self, base: &str, target: &str) -> PricingResult<Option<f64>> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .get(&format!("{}:{}", base.to_uppercase(), target.to_uppercase()))
            .copied())
    }

    async fn put_rate(&self, base: &str, target: &str, rate: f64, _ttl_seconds: u64) -> PricingResult<()> {
        self.0
            .lock()
            .unwrap()
            .insert(format!("{}:{}", base.to_uppercase(), target.to_uppercase()), rate);
        Ok(())
    }
}

/// Resolves a target-currency amount from a base amount. Resolution order:
/// a still-valid quote already attached to the in-flight flow, then a
/// gateway-issued FX lock, then a short-TTL cached market rate. Expired
/// quotes are treated as absent at every step.
pub struct FxConverter {
    cache: Arc<dyn RateCache>,
    source: Arc<dyn RateSource>,
    cache_ttl_seconds: u64,
}

impl FxConverter {
    pub fn new(cache: Arc<dyn RateCache>, source: Arc<dyn RateSource>, cache_ttl_seconds: u64) -> Self {
        Self { cache, source, cache_ttl_seconds }
    }

    pub async fn resolve(
        &self,
        attached: Option<&FxQuote>,
        gateway_lock: Option<FxQuote>,
        base: &str,
        target: &str,
    ) -> PricingResult<FxQuote> {
        let now = Utc::now();

        // Reusing the quote already bound to this flow avoids rate drift
        // between quote time and charge time.
        if let Some(quote) = attached {
            if !quote.is_expired_at(now)
                && quote.base_currency.eq_ignore_ascii_case(base)
                && quote.target_currency.eq_ignore_ascii_case(target)
            {
                return Ok(quote.clone());
            }
        }

        if let Some(lock) = gateway_lock {
            if !lock.is_expired_at(now) {
                return Ok(lock);
            }
        }

        let rate = match self.cache.get_rate(base, target).await? {
            Some(rate) => rate,
            None => {
                let rate = self.source.market_rate(base, target).await?;
                self.cache
                    .put_rate(base, target, rate, self.cache_ttl_seconds)
                    .await?;
                rate
            }
        };

        Ok(FxQuote {
            base_currency: base.to_uppercase(),
            target_currency: target.to_uppercase(),
            rate,
            source: FxSource::CachedMarket,
            expires_at: now + Duration::seconds(self.cache_ttl_seconds as i64),
        })
    }

    pub async fn convert(
        &self,
        amount: f64,
        attached: Option<&FxQuote>,
        gateway_lock: Option<FxQuote>,
        base: &str,
        target: &str,
    ) -> PricingResult<Converted> {
        if !amount.is_finite() {
            return Err(PricingError::InvalidAmount(format!(
                "cannot convert non-finite amount {amount}"
            )));
        }
        if base.eq_ignore_ascii_case(target) {
            return Ok(Converted {
                amount,
                quote: FxQuote {
                    base_currency: base.to_uppercase(),
                    target_currency: target.to_uppercase(),
                    rate: 1.0,
                    source: FxSource::Attached,
                    expires_at: Utc::now() + Duration::days(1),
                },
            });
        }

        let quote = self.resolve(attached, gateway_lock, base, target).await?;
        Ok(Converted {
            // Intermediate value stays unrounded; callers round once at
            // the minor-unit boundary.
            amount: amount * quote.rate,
            quote,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(f64);

    #[async_trait]
    impl RateSource for FixedSource {
        async fn market_rate(&self, _base: &str, _target: &str) -> PricingResult<f64> {
            Ok(self.0)
        }
    }

    fn converter() -> FxConverter {
        FxConverter::new(Arc::new(MemoryRateCache::new()), Arc::new(FixedSource(0.9)), 300)
    }

    fn quote(rate: f64, source: FxSource, seconds_from_now: i64) -> FxQuote {
        FxQuote {
            base_currency: "USD".into(),
            target_currency: "EUR".into(),
            rate,
            source,
            expires_at: Utc::now() + Duration::seconds(seconds_from_now),
        }
    }

    #[tokio::test]
    async fn attached_quote_wins_while_valid() {
        let fx = converter();
        let attached = quote(0.95, FxSource::Attached, 60);
        let got = fx
            .convert(100.0, Some(&attached), Some(quote(0.93, FxSource::GatewayLock, 60)), "USD", "EUR")
            .await
            .unwrap();
        assert_eq!(got.amount, 95.0);
        assert_eq!(got.quote.source, FxSource::Attached);
    }

    #[tokio::test]
    async fn expired_attached_falls_to_gateway_lock() {
        let fx = converter();
        let attached = quote(0.95, FxSource::Attached, -1);
        let got = fx
            .convert(100.0, Some(&attached), Some(quote(0.93, FxSource::GatewayLock, 60)), "USD", "EUR")
            .await
            .unwrap();
        assert_eq!(got.quote.source, FxSource::GatewayLock);
        assert_eq!(got.amount, 93.0);
    }

    #[tokio::test]
    async fn cache_is_last_resort_and_gets_filled() {
        let fx = converter();
        let got = fx.convert(100.0, None, None, "USD", "EUR").await.unwrap();
        assert_eq!(got.quote.source, FxSource::CachedMarket);
        assert!((got.amount - 90.0).abs() < 1e-9);
        // Second resolution hits the cache, not the source.
        assert_eq!(fx.cache.get_rate("USD", "EUR").await.unwrap(), Some(0.9));
    }

    #[tokio::test]
    async fn same_currency_short_circuits() {
        let fx = converter();
        let got = fx.convert(42.0, None, None, "USD", "usd").await.unwrap();
        assert_eq!(got.amount, 42.0);
        assert_eq!(got.quote.rate, 1.0);
    }
}
