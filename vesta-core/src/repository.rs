use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::commission::Commission;
use crate::discount::DiscountCode;
use crate::payment::CaptureMethod;
use crate::reservation::{InventoryAttachment, InventoryKind, PaymentStatus, Reservation, ReservationStatus};
use crate::CoreResult;

/// Repository trait for the reservation aggregate. All mutual exclusion
/// (calendar rows, payment-status flips, the finalize/dispatch markers) is
/// expressed through these methods transactionally; no in-process lock is
/// assumed across requests.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Persist the reservation, its attachment and (for owned inventory)
    /// its calendar night rows in one transaction. An overlapping
    /// non-cancelled reservation makes the whole transaction fail with a
    /// Conflict; nothing partial is ever visible.
    async fn create(
        &self,
        reservation: &Reservation,
        attachment: &InventoryAttachment,
    ) -> CoreResult<()>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<Reservation>>;

    async fn get_attachment(&self, reservation_id: Uuid) -> CoreResult<Option<InventoryAttachment>>;

    async fn list_for_purchaser(&self, purchaser_id: &str) -> CoreResult<Vec<Reservation>>;

    /// Record the gateway linkage after the intent call returned. Runs in
    /// its own short transaction, never across the network hop.
    async fn link_intent(
        &self,
        id: Uuid,
        provider: &str,
        intent_id: &str,
        capture_method: CaptureMethod,
    ) -> CoreResult<()>;

    /// Compare-and-swap on payment status. Returns false when the current
    /// status no longer matches `from`, which callers treat as "someone
    /// else already applied this transition".
    async fn transition_payment(
        &self,
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> CoreResult<bool>;

    async fn set_status(&self, id: Uuid, status: ReservationStatus) -> CoreResult<()>;

    /// Release the calendar rows of a cancelled reservation so the dates
    /// become bookable again.
    async fn release_nights(&self, id: Uuid) -> CoreResult<()>;

    /// Claim the finalize marker. True exactly once per reservation.
    async fn try_mark_finalized(&self, id: Uuid) -> CoreResult<bool>;

    /// Claim the post-confirmation dispatch marker. True exactly once.
    async fn try_mark_dispatched(&self, id: Uuid) -> CoreResult<bool>;

    /// Attach the supplier confirmation reference to the attachment row.
    async fn attach_booking_ref(&self, reservation_id: Uuid, booking_ref: &str) -> CoreResult<()>;

    async fn add_change(
        &self,
        reservation_id: Uuid,
        change_type: &str,
        before: Option<Value>,
        after: Option<Value>,
        actor: &str,
        note: Option<&str>,
    ) -> CoreResult<()>;

    async fn inventory_exists(&self, kind: InventoryKind, inventory_id: Uuid) -> CoreResult<bool>;
}

#[async_trait]
pub trait DiscountRepository: Send + Sync {
    async fn get_by_code(&self, code: &str) -> CoreResult<Option<DiscountCode>>;

    /// Increment the usage counter and backlink the finalizing reservation.
    /// Guarded so a capped code is never over-counted; returns false when
    /// the cap was already reached.
    async fn increment_usage(&self, id: Uuid, reservation_id: Uuid) -> CoreResult<bool>;
}

#[async_trait]
pub trait CommissionRepository: Send + Sync {
    /// Insert keyed by (reservation, referrer); a retry that finds the row
    /// already present returns false and writes nothing.
    async fn find_or_create(&self, commission: &Commission) -> CoreResult<bool>;

    async fn get(&self, reservation_id: Uuid, referrer_id: Uuid) -> CoreResult<Option<Commission>>;

    /// Reverse (never delete) all non-paid-out commissions of a reservation.
    /// Returns the number of rows flipped.
    async fn reverse_for_reservation(&self, reservation_id: Uuid) -> CoreResult<u64>;

    /// Pay out a referrer's commissions after a transfer settles on the
    /// connected account: every ELIGIBLE row plus any HOLD row whose hold
    /// window has lapsed. Returns the number of rows flipped to PAID.
    async fn settle_for_referrer(&self, referrer_id: Uuid) -> CoreResult<u64>;
}
