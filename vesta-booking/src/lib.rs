pub mod builder;
pub mod confirm;
pub mod dispatcher;
pub mod finalizer;
pub mod lifecycle;
pub mod supplier;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Supplier call failed: {0}")]
    Supplier(String),
    #[error(transparent)]
    Lifecycle(#[from] lifecycle::LifecycleError),
    #[error(transparent)]
    Pricing(#[from] vesta_pricing::PricingError),
    #[error(transparent)]
    Core(#[from] vesta_core::CoreError),
}

pub type BookingResult<T> = Result<T, BookingError>;
