use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an exchange rate came from. Settlement trusts a gateway lock the
/// most; a cached market rate is the fallback of last resort.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FxSource {
    Attached,
    GatewayLock,
    CachedMarket,
}

/// A time-boxed exchange rate. Expired quotes must be treated as absent and
/// re-resolved; they are never applied to a charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxQuote {
    pub base_currency: String,
    pub target_currency: String,
    pub rate: f64,
    pub source: FxSource,
    pub expires_at: DateTime<Utc>,
}

impl FxQuote {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        let quote = FxQuote {
            base_currency: "USD".into(),
            target_currency: "EUR".into(),
            rate: 0.92,
            source: FxSource::CachedMarket,
            expires_at: now,
        };
        assert!(quote.is_expired_at(now));
        assert!(!quote.is_expired_at(now - Duration::seconds(1)));
    }
}
