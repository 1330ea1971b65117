use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use vesta_core::reservation::{GuestContact, InventoryKind};
use vesta_core::supplier::{InventorySupplier, SupplierBooking, SupplierQuote};
use vesta_core::{CoreError, CoreResult};

/// Resolves the outbound supplier client for a supplier-backed inventory
/// kind. Owned and outside inventory have no supplier.
pub trait SupplierDirectory: Send + Sync {
    fn supplier_for(&self, kind: InventoryKind) -> Option<Arc<dyn InventorySupplier>>;
}

pub struct StaticDirectory {
    suppliers: HashMap<InventoryKind, Arc<dyn InventorySupplier>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self { suppliers: HashMap::new() }
    }

    pub fn with(mut self, kind: InventoryKind, supplier: Arc<dyn InventorySupplier>) -> Self {
        self.suppliers.insert(kind, supplier);
        self
    }
}

impl Default for StaticDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl SupplierDirectory for StaticDirectory {
    fn supplier_for(&self, kind: InventoryKind) -> Option<Arc<dyn InventorySupplier>> {
        self.suppliers.get(&kind).cloned()
    }
}

/// In-memory supplier used in tests and local wiring. Quotes come from a
/// seeded table; bookings get sequential confirmation references.
pub struct MockSupplier {
    quotes: Mutex<HashMap<String, SupplierQuote>>,
    counter: Mutex<u64>,
    /// When set, book() fails with this message.
    pub fail_booking: Mutex<Option<String>>,
    cancelled: Mutex<Vec<String>>,
}

impl MockSupplier {
    pub fn new() -> Self {
        Self {
            quotes: Mutex::new(HashMap::new()),
            counter: Mutex::new(0),
            fail_booking: Mutex::new(None),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    pub fn seed_quote(&self, offer_id: &str, net_minor: i64, currency: &str) {
        self.quotes.lock().unwrap().insert(
            offer_id.to_string(),
            SupplierQuote {
                offer_id: offer_id.to_string(),
                option_id: format!("{offer_id}-opt-1"),
                net_minor,
                currency: currency.to_string(),
            },
        );
    }

    pub fn cancelled_bookings(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

impl Default for MockSupplier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl InventorySupplier for MockSupplier {
    async fn quote(&self, offer_id: &str) -> CoreResult<SupplierQuote> {
        self.quotes
            .lock()
            .unwrap()
            .get(offer_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("offer {offer_id}")))
    }

    async fn book(&self, offer_id: &str, _guest: &GuestContact) -> CoreResult<SupplierBooking> {
        if let Some(message) = self.fail_booking.lock().unwrap().clone() {
            return Err(CoreError::External(message));
        }
        let quote = self.quote(offer_id).await?;
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        Ok(SupplierBooking {
            booking_id: format!("SUP-{}-{:06}", Uuid::new_v4().simple(), *counter),
            price_minor: quote.net_minor,
            currency: quote.currency,
            cancellation_policy: None,
        })
    }

    async fn cancel(&self, booking_id: &str) -> CoreResult<()> {
        self.cancelled.lock().unwrap().push(booking_id.to_string());
        Ok(())
    }
}
