use async_trait::async_trait;

use crate::reservation::GuestContact;
use crate::CoreResult;

/// Re-priced offer returned by a supplier. The net price here is
/// authoritative over whatever the search cache quoted earlier.
#[derive(Debug, Clone)]
pub struct SupplierQuote {
    pub offer_id: String,
    pub option_id: String,
    pub net_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct SupplierBooking {
    pub booking_id: String,
    pub price_minor: i64,
    pub currency: String,
    pub cancellation_policy: Option<String>,
}

#[async_trait]
pub trait InventorySupplier: Send + Sync {
    /// Re-price an offer, returning the authoritative net and a fresh option id
    async fn quote(&self, offer_id: &str) -> CoreResult<SupplierQuote>;

    /// Commit the booking with the supplier
    async fn book(&self, offer_id: &str, guest: &GuestContact) -> CoreResult<SupplierBooking>;

    /// Cancel a previously committed booking
    async fn cancel(&self, booking_id: &str) -> CoreResult<()>;
}
