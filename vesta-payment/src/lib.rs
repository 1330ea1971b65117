pub mod gateway;
pub mod intent;
pub mod reconciler;

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Gateway call failed: {0}")]
    Gateway(String),
    #[error("Reservation not found: {0}")]
    NotFound(Uuid),
    #[error("Event carries no reservation metadata")]
    MissingMetadata,
    #[error(transparent)]
    Core(#[from] vesta_core::CoreError),
}

pub type PaymentResult<T> = Result<T, PaymentError>;
