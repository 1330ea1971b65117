use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use vesta_booking::BookingError;
use vesta_core::CoreError;
use vesta_payment::PaymentError;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    UpstreamError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UpstreamError(msg) => {
                tracing::error!("Upstream failure: {}", msg);
                (StatusCode::BAD_GATEWAY, "Upstream service failed".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}

fn core_error(err: CoreError) -> AppError {
    match err {
        CoreError::Validation(msg) => AppError::ValidationError(msg),
        CoreError::Conflict(msg) => AppError::ConflictError(msg),
        CoreError::NotFound(msg) => AppError::NotFoundError(msg),
        CoreError::External(msg) => AppError::UpstreamError(msg),
        CoreError::Internal(msg) => AppError::Anyhow(anyhow::anyhow!(msg)),
    }
}

pub fn booking_error(err: BookingError) -> AppError {
    match err {
        BookingError::Validation(msg) => AppError::ValidationError(msg),
        BookingError::Conflict(msg) => AppError::ConflictError(msg),
        BookingError::NotFound(msg) => AppError::NotFoundError(msg),
        BookingError::Supplier(msg) => AppError::UpstreamError(msg),
        BookingError::Lifecycle(err) => AppError::ConflictError(err.to_string()),
        BookingError::Pricing(err) => AppError::ValidationError(err.to_string()),
        BookingError::Core(err) => core_error(err),
    }
}

pub fn payment_error(err: PaymentError) -> AppError {
    match err {
        PaymentError::Gateway(msg) => AppError::UpstreamError(msg),
        PaymentError::NotFound(id) => AppError::NotFoundError(format!("reservation {id}")),
        PaymentError::MissingMetadata => {
            AppError::ValidationError("event carries no reservation metadata".into())
        }
        PaymentError::Core(err) => core_error(err),
    }
}
