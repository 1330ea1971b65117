use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;
use vesta_core::payment::PaymentGateway;
use vesta_core::repository::{CommissionRepository, ReservationRepository};
use vesta_core::reservation::{PaymentStatus, Reservation, ReservationStatus};

use crate::lifecycle::ensure_transition;
use crate::supplier::SupplierDirectory;
use crate::{BookingError, BookingResult};

/// Drives the operator-facing confirm and cancel flows. Confirmation is
/// idempotent; cancellation unwinds calendar, commissions, the open gateway
/// authorization and any supplier booking.
pub struct ConfirmationService {
    repo: Arc<dyn ReservationRepository>,
    commissions: Arc<dyn CommissionRepository>,
    suppliers: Arc<dyn SupplierDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    supplier_timeout: Duration,
}

impl ConfirmationService {
    pub fn new(
        repo: Arc<dyn ReservationRepository>,
        commissions: Arc<dyn CommissionRepository>,
        suppliers: Arc<dyn SupplierDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        supplier_timeout: Duration,
    ) -> Self {
        Self { repo, commissions, suppliers, gateway, supplier_timeout }
    }

    async fn load(&self, id: Uuid) -> BookingResult<Reservation> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("reservation {id}")))
    }

    /// Confirm a paid reservation. For supplier inventory the outbound
    /// booking is committed first; only a stored confirmation reference
    /// makes the supplier leg durable.
    pub async fn confirm(&self, id: Uuid, actor: &str) -> BookingResult<Reservation> {
        let reservation = self.load(id).await?;

        if reservation.status == ReservationStatus::Confirmed {
            return Ok(reservation);
        }
        ensure_transition(reservation.status, ReservationStatus::Confirmed)?;

        if reservation.payment_status != PaymentStatus::Paid {
            return Err(BookingError::Conflict(format!(
                "reservation {id} cannot be confirmed before payment settles"
            )));
        }

        if reservation.inventory_kind.is_supplier() {
            self.ensure_supplier_booking(&reservation, actor).await?;
        }

        self.repo.set_status(id, ReservationStatus::Confirmed).await?;
        self.repo
            .add_change(
                id,
                "CONFIRMED",
                Some(serde_json::json!({ "status": reservation.status })),
                Some(serde_json::json!({ "status": ReservationStatus::Confirmed })),
                actor,
                None,
            )
            .await?;

        info!(reservation_id = %id, reference = %reservation.reference_code, "reservation confirmed");
        self.load(id).await
    }

    async fn ensure_supplier_booking(
        &self,
        reservation: &Reservation,
        actor: &str,
    ) -> BookingResult<()> {
        let attachment = self
            .repo
            .get_attachment(reservation.id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("attachment for {}", reservation.id)))?;
        if attachment.booking_ref().is_some() {
            // A prior attempt already committed the supplier leg.
            return Ok(());
        }

        let supplier = self
            .suppliers
            .supplier_for(reservation.inventory_kind)
            .ok_or_else(|| {
                BookingError::Supplier(format!(
                    "no supplier wired for {}",
                    reservation.inventory_kind.as_str()
                ))
            })?;
        let offer_id = match &attachment {
            vesta_core::reservation::InventoryAttachment::SupplierAlfa { offer_id, .. }
            | vesta_core::reservation::InventoryAttachment::SupplierBravo { offer_id, .. } => {
                offer_id.clone()
            }
            _ => {
                return Err(BookingError::Supplier(
                    "supplier reservation carries a non-supplier attachment".into(),
                ))
            }
        };

        let booked = tokio::time::timeout(
            self.supplier_timeout,
            supplier.book(&offer_id, &reservation.guest),
        )
        .await;

        match booked {
            Ok(Ok(booking)) => {
                self.repo
                    .attach_booking_ref(reservation.id, &booking.booking_id)
                    .await?;
                self.repo
                    .add_change(
                        reservation.id,
                        "SUPPLIER_BOOKED",
                        None,
                        Some(serde_json::json!({ "booking_ref": booking.booking_id })),
                        actor,
                        None,
                    )
                    .await?;
                Ok(())
            }
            Ok(Err(err)) => Err(BookingError::Supplier(err.to_string())),
            Err(_) => Err(BookingError::Supplier(format!(
                "supplier booking timed out after {:?}",
                self.supplier_timeout
            ))),
        }
    }

    /// Cancel from PENDING or CONFIRMED. Each unwind step is attempted even
    /// when an earlier one fails softly; calendar release and commission
    /// reversal are mandatory, the outbound legs are best-effort.
    pub async fn cancel(&self, id: Uuid, actor: &str) -> BookingResult<Reservation> {
        let reservation = self.load(id).await?;

        if reservation.status == ReservationStatus::Cancelled {
            return Ok(reservation);
        }
        ensure_transition(reservation.status, ReservationStatus::Cancelled)?;

        self.repo.set_status(id, ReservationStatus::Cancelled).await?;
        self.repo.release_nights(id).await?;
        let reversed = self.commissions.reverse_for_reservation(id).await?;
        if reversed > 0 {
            info!(reservation_id = %id, reversed, "commissions reversed on cancellation");
        }

        if reservation.payment_status != PaymentStatus::Paid {
            if let Some(intent_id) = &reservation.gateway_intent_id {
                if let Err(err) = self.gateway.cancel_intent(intent_id).await {
                    warn!(reservation_id = %id, intent_id = %intent_id,
                        "failed to cancel gateway intent: {err}");
                }
            }
        }

        if reservation.inventory_kind.is_supplier() {
            if let Some(attachment) = self.repo.get_attachment(id).await? {
                if let Some(booking_ref) = attachment.booking_ref() {
                    if let Some(supplier) = self.suppliers.supplier_for(reservation.inventory_kind) {
                        if let Err(err) = supplier.cancel(booking_ref).await {
                            warn!(reservation_id = %id, booking_ref,
                                "supplier cancellation failed, flagging for manual follow-up: {err}");
                        }
                    }
                }
            }
        }

        self.repo
            .add_change(
                id,
                "CANCELLED",
                Some(serde_json::json!({ "status": reservation.status })),
                Some(serde_json::json!({ "status": ReservationStatus::Cancelled })),
                actor,
                None,
            )
            .await?;

        self.load(id).await
    }
}
