use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use vesta_core::repository::{CommissionRepository, ReservationRepository};
use vesta_payment::reconciler::{AccountEvent, PaymentEvent, ReconcileOutcome};
use vesta_payment::PaymentError;
use vesta_shared::models::events::{CommissionAccruedEvent, PaymentSettledEvent};
use vesta_store::events::topics;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GatewayWebhook {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: PaymentIntentObject,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub status: Option<String>,
    pub amount: Option<i64>,
    pub amount_received: Option<i64>,
    pub currency: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

fn verify_secret(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let provided = headers
        .get("x-webhook-secret")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if provided != state.webhook_secret {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(())
}

/// The reservation is resolved from intent metadata only; a client-supplied
/// id in the event body is never trusted.
fn reservation_id_from(object: &PaymentIntentObject) -> Option<Uuid> {
    object
        .metadata
        .as_ref()?
        .get("reservation_id")?
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn event_from(payload: &GatewayWebhook) -> Option<PaymentEvent> {
    let object = &payload.data.object;
    match payload.type_.as_str() {
        "payment_intent.succeeded" => Some(PaymentEvent::Settled {
            amount_minor: object.amount_received.or(object.amount).unwrap_or(0),
            currency: object.currency.clone().unwrap_or_default(),
        }),
        "payment_intent.amount_capturable_updated" => Some(PaymentEvent::Authorized),
        "payment_intent.payment_failed" => Some(PaymentEvent::Failed),
        "payment_intent.canceled" => Some(PaymentEvent::Canceled),
        "charge.refunded" => Some(PaymentEvent::Refunded),
        _ => None,
    }
}

/// POST /v1/webhooks/payments
/// At-least-once delivery: replays and races resolve to no-ops inside the
/// reconciler, so a 200 here never depends on being the first delivery.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<GatewayWebhook>,
) -> Result<StatusCode, StatusCode> {
    verify_secret(&state, &headers)?;
    tracing::info!(
        "Received webhook: {} for intent {}",
        payload.type_,
        payload.data.object.id
    );

    let Some(event) = event_from(&payload) else {
        return Ok(StatusCode::OK);
    };

    let Some(reservation_id) = reservation_id_from(&payload.data.object) else {
        tracing::warn!(
            event_id = %payload.id,
            intent_id = %payload.data.object.id,
            "webhook event carries no reservation metadata, ignoring"
        );
        return Ok(StatusCode::OK);
    };

    let settled = matches!(event, PaymentEvent::Settled { .. });
    match state.reconciler.apply(reservation_id, event, "WEBHOOK").await {
        Ok(ReconcileOutcome::Applied { next }) => {
            if settled {
                state
                    .kafka
                    .emit(
                        topics::PAYMENT_SETTLED,
                        &reservation_id.to_string(),
                        &PaymentSettledEvent {
                            reservation_id,
                            intent_id: payload.data.object.id.clone(),
                            amount_minor: payload
                                .data
                                .object
                                .amount_received
                                .or(payload.data.object.amount)
                                .unwrap_or(0),
                            currency: payload.data.object.currency.clone().unwrap_or_default(),
                            timestamp: Utc::now().timestamp(),
                        },
                    )
                    .await;
                emit_commission_accrued(&state, reservation_id).await;
            }
            tracing::info!(%reservation_id, ?next, "webhook applied");
            Ok(StatusCode::OK)
        }
        // Replays and mismatches both ack with 200: redelivering the same
        // event cannot change either outcome.
        Ok(ReconcileOutcome::NoOp) | Ok(ReconcileOutcome::Mismatch) => Ok(StatusCode::OK),
        Err(PaymentError::NotFound(_)) => {
            tracing::warn!(%reservation_id, "webhook names an unknown reservation");
            Ok(StatusCode::OK)
        }
        Err(err) => {
            // A transient failure; non-2xx makes the gateway redeliver.
            tracing::error!(%reservation_id, "webhook reconciliation failed: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Settlement may have accrued a referrer commission; surface it as a
/// telemetry event. Best effort, never blocks the acknowledgement.
async fn emit_commission_accrued(state: &AppState, reservation_id: Uuid) {
    let referrer_id = match state.repo.get(reservation_id).await {
        Ok(Some(reservation)) => reservation
            .metadata
            .get("referrer_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok()),
        _ => None,
    };
    let Some(referrer_id) = referrer_id else {
        return;
    };
    if let Ok(Some(commission)) = state.commissions.get(reservation_id, referrer_id).await {
        state
            .kafka
            .emit(
                topics::COMMISSION_ACCRUED,
                &reservation_id.to_string(),
                &CommissionAccruedEvent {
                    reservation_id,
                    referrer_id,
                    amount_minor: commission.amount_minor,
                    currency: commission.currency.clone(),
                    timestamp: Utc::now().timestamp(),
                },
            )
            .await;
    }
}

#[derive(Debug, Deserialize)]
pub struct AccountWebhook {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub account: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// POST /v1/webhooks/accounts
/// Connected-account events update payout bookkeeping only; they never
/// touch a reservation's payment status.
pub async fn handle_account_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AccountWebhook>,
) -> Result<StatusCode, StatusCode> {
    verify_secret(&state, &headers)?;

    let event = match payload.type_.as_str() {
        "transfer.paid" => {
            let referrer_id = payload
                .metadata
                .as_ref()
                .and_then(|m| m.get("referrer_id"))
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok());
            match referrer_id {
                Some(referrer_id) => AccountEvent::TransferSettled { referrer_id },
                None => {
                    tracing::warn!(event_id = %payload.id, "transfer event without referrer metadata");
                    return Ok(StatusCode::OK);
                }
            }
        }
        "account.updated" => AccountEvent::AccountUpdated {
            account_ref: payload.account.clone().unwrap_or_default(),
        },
        _ => return Ok(StatusCode::OK),
    };

    state
        .payouts
        .apply(event)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::OK)
}
