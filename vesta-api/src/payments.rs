use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use vesta_core::payment::{CaptureMethod, IntentStatus};
use vesta_core::repository::ReservationRepository;
use vesta_payment::reconciler::{PaymentEvent, ReconcileOutcome};

use crate::error::{booking_error, payment_error, AppError};
use crate::middleware::auth::Claims;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct EnsureIntentRequest {
    /// "AUTOMATIC" (default) or "MANUAL".
    pub capture_method: Option<String>,
}

/// POST /v1/reservations/{id}/payment-intent
/// Idempotent: repeated calls return the same open intent, repairing
/// amount or capture drift along the way.
pub async fn ensure_payment_intent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(request): Json<EnsureIntentRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let reservation = state
        .repo
        .get(id)
        .await
        .map_err(|e| booking_error(e.into()))?
        .ok_or_else(|| AppError::NotFoundError(format!("reservation {id}")))?;

    let is_operator = claims.role == "OPERATOR" || claims.role == "ADMIN";
    if !is_operator && reservation.purchaser_id.as_deref() != Some(claims.sub.as_str()) {
        return Err(AppError::AuthorizationError(
            "reservation belongs to another purchaser".into(),
        ));
    }

    let requested = match request.capture_method.as_deref() {
        Some(raw) => CaptureMethod::parse(raw)
            .ok_or_else(|| AppError::ValidationError(format!("unknown capture method {raw}")))?,
        None => CaptureMethod::Automatic,
    };

    let ensured = state
        .intents
        .ensure_intent(&reservation, requested)
        .await
        .map_err(payment_error)?;

    Ok(Json(json!({
        "intent_id": ensured.intent_id,
        "client_secret": ensured.client_secret,
        "status": ensured.status,
        "capture_method": ensured.capture_method,
    })))
}

/// POST /v1/reservations/{id}/capture (operator)
/// Captures a manual authorization and feeds the settlement through the
/// same reconciler the webhook path uses.
pub async fn capture_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let reservation = state
        .repo
        .get(id)
        .await
        .map_err(|e| booking_error(e.into()))?
        .ok_or_else(|| AppError::NotFoundError(format!("reservation {id}")))?;

    let captured = state
        .intents
        .capture(&reservation)
        .await
        .map_err(payment_error)?;

    if captured.status != IntentStatus::Succeeded {
        return Err(AppError::ConflictError(format!(
            "capture left intent {} in {:?}",
            captured.intent_id, captured.status
        )));
    }

    let outcome = state
        .reconciler
        .apply(
            id,
            PaymentEvent::Settled {
                amount_minor: reservation.gross_minor + reservation.deposit_minor,
                currency: reservation.currency.clone(),
            },
            &claims.sub,
        )
        .await
        .map_err(payment_error)?;

    Ok(Json(json!({
        "intent_id": captured.intent_id,
        "status": captured.status,
        "applied": matches!(outcome, ReconcileOutcome::Applied { .. }),
    })))
}

/// POST /v1/reservations/{id}/payment/cancel (operator)
/// Releases an uncaptured authorization.
pub async fn cancel_payment(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let reservation = state
        .repo
        .get(id)
        .await
        .map_err(|e| booking_error(e.into()))?
        .ok_or_else(|| AppError::NotFoundError(format!("reservation {id}")))?;

    let cancelled = state
        .intents
        .cancel(&reservation)
        .await
        .map_err(payment_error)?;

    Ok(Json(json!({
        "intent_id": cancelled.intent_id,
        "status": cancelled.status,
    })))
}
