use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vesta_shared::fx::FxQuote;

use crate::CoreResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresAction,
    Processing,
    RequiresCapture,
    Succeeded,
    Canceled,
    Failed,
}

/// Automatic charges settle on gateway confirmation; manual authorizes now
/// and captures later. A non-zero security deposit always forces manual.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureMethod {
    Automatic,
    Manual,
}

impl CaptureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMethod::Automatic => "AUTOMATIC",
            CaptureMethod::Manual => "MANUAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AUTOMATIC" => Some(CaptureMethod::Automatic),
            "MANUAL" => Some(CaptureMethod::Manual),
            _ => None,
        }
    }
}

/// Attached to every intent so a later webhook event resolves back to
/// exactly one Reservation without a separate lookup table. The guest hint
/// is truncated before it leaves the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntentMetadata {
    pub reservation_id: Uuid,
    pub reference_code: String,
    pub guest_hint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayIntent {
    pub id: String, // Provider's ID (e.g., pi_123)
    pub amount_minor: i64,
    pub currency: String,
    pub status: IntentStatus,
    pub capture_method: CaptureMethod,
    pub client_secret: Option<String>,
    pub metadata: Option<IntentMetadata>,
    pub created_at: DateTime<Utc>,
}

impl GatewayIntent {
    pub fn is_open(&self) -> bool {
        !matches!(
            self.status,
            IntentStatus::Succeeded | IntentStatus::Canceled | IntentStatus::Failed
        )
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent with the provider
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        capture_method: CaptureMethod,
        metadata: IntentMetadata,
    ) -> CoreResult<GatewayIntent>;

    /// Retrieve intent status
    async fn retrieve_intent(&self, intent_id: &str) -> CoreResult<GatewayIntent>;

    /// Update the amount of a still-open intent in place
    async fn update_intent_amount(
        &self,
        intent_id: &str,
        amount_minor: i64,
    ) -> CoreResult<GatewayIntent>;

    /// Cancel an open intent (releases an uncaptured authorization)
    async fn cancel_intent(&self, intent_id: &str) -> CoreResult<GatewayIntent>;

    /// Capture a previously authorized payment
    async fn capture_intent(&self, intent_id: &str) -> CoreResult<GatewayIntent>;

    /// Gateway-issued FX lock, when the provider offers one. The gateway
    /// honors the locked rate at settlement until the quote expires.
    async fn fx_lock(&self, _base: &str, _target: &str) -> CoreResult<Option<FxQuote>> {
        Ok(None)
    }
}
