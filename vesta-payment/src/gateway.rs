use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use vesta_core::payment::{
    CaptureMethod, GatewayIntent, IntentMetadata, IntentStatus, PaymentGateway,
};
use vesta_core::{CoreError, CoreResult};
use vesta_shared::fx::{FxQuote, FxSource};

/// In-memory gateway adapter used in tests and local wiring. Real providers
/// implement the same trait behind an HTTP client.
pub struct MockGateway {
    intents: Mutex<HashMap<String, GatewayIntent>>,
    counter: Mutex<u64>,
    /// Rate table for the optional FX-lock primitive, keyed "BASE:TARGET".
    pub fx_rates: Mutex<HashMap<String, f64>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            intents: Mutex::new(HashMap::new()),
            counter: Mutex::new(0),
            fx_rates: Mutex::new(HashMap::new()),
        }
    }

    fn next_id(&self) -> String {
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        format!("pi_mock_{:06}", *counter)
    }

    fn with_intent<T>(
        &self,
        intent_id: &str,
        f: impl FnOnce(&mut GatewayIntent) -> T,
    ) -> CoreResult<T> {
        let mut intents = self.intents.lock().unwrap();
        let intent = intents
            .get_mut(intent_id)
            .ok_or_else(|| CoreError::NotFound(format!("intent {intent_id}")))?;
        Ok(f(intent))
    }

    /// Test hook: simulate the purchaser completing payment on the gateway.
    pub fn force_status(&self, intent_id: &str, status: IntentStatus) {
        if let Some(intent) = self.intents.lock().unwrap().get_mut(intent_id) {
            intent.status = status;
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        capture_method: CaptureMethod,
        metadata: IntentMetadata,
    ) -> CoreResult<GatewayIntent> {
        let id = self.next_id();
        let intent = GatewayIntent {
            id: id.clone(),
            amount_minor,
            currency: currency.to_lowercase(),
            status: IntentStatus::RequiresPaymentMethod,
            capture_method,
            client_secret: Some(format!("{id}_secret")),
            metadata: Some(metadata),
            created_at: Utc::now(),
        };
        self.intents.lock().unwrap().insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> CoreResult<GatewayIntent> {
        self.with_intent(intent_id, |intent| intent.clone())
    }

    async fn update_intent_amount(
        &self,
        intent_id: &str,
        amount_minor: i64,
    ) -> CoreResult<GatewayIntent> {
        self.with_intent(intent_id, |intent| {
            intent.amount_minor = amount_minor;
            intent.clone()
        })
    }

    async fn cancel_intent(&self, intent_id: &str) -> CoreResult<GatewayIntent> {
        self.with_intent(intent_id, |intent| {
            if intent.is_open() {
                intent.status = IntentStatus::Canceled;
            }
            intent.clone()
        })
    }

    async fn capture_intent(&self, intent_id: &str) -> CoreResult<GatewayIntent> {
        self.with_intent(intent_id, |intent| {
            intent.status = IntentStatus::Succeeded;
            intent.clone()
        })
    }

    async fn fx_lock(&self, base: &str, target: &str) -> CoreResult<Option<FxQuote>> {
        let key = format!("{}:{}", base.to_uppercase(), target.to_uppercase());
        let rate = self.fx_rates.lock().unwrap().get(&key).copied();
        Ok(rate.map(|rate| FxQuote {
            base_currency: base.to_uppercase(),
            target_currency: target.to_uppercase(),
            rate,
            source: FxSource::GatewayLock,
            expires_at: Utc::now() + Duration::minutes(30),
        }))
    }
}
