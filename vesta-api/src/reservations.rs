use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use vesta_booking::builder::CreateReservationRequest;
use vesta_core::repository::ReservationRepository;
use vesta_core::reservation::{InventoryAttachment, Reservation};
use vesta_pricing::markup::Role;
use vesta_shared::models::events::{ReservationConfirmedEvent, ReservationCreatedEvent};
use vesta_store::events::topics;

use crate::error::{booking_error, AppError};
use crate::middleware::auth::{optional_claims, Claims};
use crate::state::AppState;

fn reservation_json(reservation: &Reservation, attachment: Option<&InventoryAttachment>) -> serde_json::Value {
    json!({
        "id": reservation.id,
        "reference_code": reservation.reference_code,
        "status": reservation.status,
        "payment_status": reservation.payment_status,
        "inventory_kind": reservation.inventory_kind,
        "inventory_id": reservation.inventory_id,
        "guest": reservation.guest,
        "check_in": reservation.check_in,
        "check_out": reservation.check_out,
        "nights": reservation.nights,
        "adults": reservation.adults,
        "children": reservation.children,
        "gross_minor": reservation.gross_minor,
        "deposit_minor": reservation.deposit_minor,
        "currency": reservation.currency,
        "pricing_snapshot": reservation.pricing_snapshot,
        "attachment": attachment,
        "created_at": reservation.created_at,
        "updated_at": reservation.updated_at,
    })
}

/// POST /v1/reservations
/// Anonymous guests book at the Public rate; a valid token prices at the
/// caller's role.
pub async fn create_reservation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let claims = optional_claims(&state, &headers);
    let purchaser_id = claims.as_ref().map(|c| c.sub.as_str());
    let role = claims.as_ref().map(|c| c.pricing_role()).unwrap_or(Role::Public);

    let reservation = state
        .builder
        .create(purchaser_id, role, request)
        .await
        .map_err(booking_error)?;

    state
        .kafka
        .emit(
            topics::RESERVATION_CREATED,
            &reservation.id.to_string(),
            &ReservationCreatedEvent {
                reservation_id: reservation.id,
                reference_code: reservation.reference_code.clone(),
                inventory_kind: reservation.inventory_kind.as_str().to_string(),
                gross_minor: reservation.gross_minor,
                currency: reservation.currency.clone(),
                timestamp: Utc::now().timestamp(),
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(reservation_json(&reservation, None))))
}

/// GET /v1/reservations/{id}
pub async fn get_reservation(
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

    let is_operator = claims.role == "OPERATOR" || claims.role == "ADMIN";
    if !is_operator && reservation.purchaser_id.as_deref() != Some(claims.sub.as_str()) {
        return Err(AppError::AuthorizationError(
            "reservation belongs to another purchaser".into(),
        ));
    }

    let attachment = state
        .repo
        .get_attachment(id)
        .await
        .map_err(|e| booking_error(e.into()))?;
    Ok(Json(reservation_json(&reservation, attachment.as_ref())))
}

/// GET /v1/reservations
/// Shares its path with the anonymous create route, so it authenticates
/// inline rather than through the purchaser middleware group.
pub async fn list_reservations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let claims = optional_claims(&state, &headers)
        .ok_or_else(|| AppError::AuthenticationError("missing or invalid token".into()))?;
    let reservations = state
        .repo
        .list_for_purchaser(&claims.sub)
        .await
        .map_err(|e| booking_error(e.into()))?;

    let items: Vec<serde_json::Value> =
        reservations.iter().map(|r| reservation_json(r, None)).collect();
    Ok(Json(json!({ "reservations": items })))
}

/// POST /v1/reservations/{id}/confirm (operator)
pub async fn confirm_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let reservation = state
        .confirmations
        .confirm(id, &claims.sub)
        .await
        .map_err(booking_error)?;

    state
        .kafka
        .emit(
            topics::RESERVATION_CONFIRMED,
            &reservation.id.to_string(),
            &ReservationConfirmedEvent {
                reservation_id: reservation.id,
                reference_code: reservation.reference_code.clone(),
                timestamp: Utc::now().timestamp(),
            },
        )
        .await;

    Ok(Json(reservation_json(&reservation, None)))
}

/// POST /v1/reservations/{id}/cancel (operator)
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let reservation = state
        .confirmations
        .cancel(id, &claims.sub)
        .await
        .map_err(booking_error)?;
    Ok(Json(reservation_json(&reservation, None)))
}
