pub mod discount;
pub mod fx;
pub mod markup;

pub use discount::{apply_discount, DiscountTerms};
pub use fx::{FxConverter, RateCache, RateSource};
pub use markup::{MarkupConfig, MarkupEngine, PricingBreakdown, Role};

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("No exchange rate available for {base}->{target}")]
    NoRate { base: String, target: String },
    #[error("Rate lookup failed: {0}")]
    RateLookup(String),
}

pub type PricingResult<T> = Result<T, PricingError>;
