use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};
use vesta_core::notify::{Notifier, PostConfirmationHook};
use vesta_core::repository::ReservationRepository;
use vesta_core::reservation::Reservation;
use vesta_core::CoreResult;
use vesta_shared::pii::truncate_identity;

use crate::finalizer::Finalizer;
use crate::BookingResult;

/// Sends the guest-facing confirmation exactly once per reservation. The
/// send itself is best-effort: once the marker is claimed a failed delivery
/// is logged for manual follow-up rather than retried by the caller.
pub struct Dispatcher {
    repo: Arc<dyn ReservationRepository>,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(repo: Arc<dyn ReservationRepository>, notifier: Arc<dyn Notifier>) -> Self {
        Self { repo, notifier }
    }

    /// Returns true when this call claimed the dispatch, false on replay.
    pub async fn dispatch(&self, reservation: &Reservation) -> BookingResult<bool> {
        if !self.repo.try_mark_dispatched(reservation.id).await? {
            return Ok(false);
        }
        if let Err(err) = self.notifier.dispatch_confirmation(reservation).await {
            warn!(
                reservation_id = %reservation.id,
                reference = %reservation.reference_code,
                "confirmation dispatch failed: {err}"
            );
        }
        Ok(true)
    }
}

/// Stand-in delivery channel: writes the confirmation to the log. Real
/// deployments put an email/SMS provider behind the same trait.
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn dispatch_confirmation(&self, reservation: &Reservation) -> CoreResult<()> {
        info!(
            reservation_id = %reservation.id,
            reference = %reservation.reference_code,
            guest = %truncate_identity(&reservation.guest.email.0),
            "confirmation sent"
        );
        Ok(())
    }
}

/// Everything that runs after a payment settles: financial finalization,
/// then the guest confirmation. The steps are independent; one failing is
/// logged and never blocks the other, and each keeps its own
/// exactly-once marker.
pub struct ConfirmationPipeline {
    finalizer: Finalizer,
    dispatcher: Dispatcher,
}

impl ConfirmationPipeline {
    pub fn new(finalizer: Finalizer, dispatcher: Dispatcher) -> Self {
        Self { finalizer, dispatcher }
    }
}

#[async_trait]
impl PostConfirmationHook for ConfirmationPipeline {
    async fn on_confirmed(&self, reservation: &Reservation) -> CoreResult<()> {
        if let Err(err) = self.finalizer.finalize(reservation).await {
            error!(reservation_id = %reservation.id, "finalization failed: {err}");
        }
        if let Err(err) = self.dispatcher.dispatch(reservation).await {
            error!(reservation_id = %reservation.id, "dispatch failed: {err}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;
    use vesta_core::reservation::{
        GuestContact, InventoryAttachment, InventoryKind, PaymentStatus, ReservationStatus,
    };
    use vesta_shared::pii::Masked;
    use vesta_store::memory::MemoryStore;

    struct CountingNotifier(AtomicUsize);

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn dispatch_confirmation(&self, _reservation: &Reservation) -> CoreResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn reservation() -> Reservation {
        let id = Uuid::new_v4();
        Reservation {
            id,
            reference_code: Reservation::reference_code_for(id),
            purchaser_id: Some("guest-1".into()),
            guest: GuestContact {
                full_name: "Ada Guest".into(),
                email: Masked("ada@example.com".into()),
                phone: None,
            },
            inventory_kind: InventoryKind::LocalHotel,
            inventory_id: Uuid::new_v4(),
            check_in: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(),
            nights: 2,
            adults: 2,
            children: 0,
            gross_minor: 18000,
            net_minor: Some(12000),
            deposit_minor: 0,
            currency: "USD".into(),
            pricing_snapshot: serde_json::json!({}),
            status: ReservationStatus::Confirmed,
            payment_status: PaymentStatus::Paid,
            gateway_provider: Some("mockpay".into()),
            gateway_intent_id: Some("pi_mock_1".into()),
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn dispatch_claims_the_marker_once() {
        let store = Arc::new(MemoryStore::new());
        let res = reservation();
        let attachment = InventoryAttachment::LocalHotel {
            room_name: "Standard Double".into(),
            board: None,
            rate_plan: None,
            cancellation_policy: None,
        };
        store.create(&res, &attachment).await.unwrap();

        let notifier = Arc::new(CountingNotifier(AtomicUsize::new(0)));
        let dispatcher = Dispatcher::new(store.clone(), notifier.clone());

        assert!(dispatcher.dispatch(&res).await.unwrap());
        assert!(!dispatcher.dispatch(&res).await.unwrap());
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
    }
}
