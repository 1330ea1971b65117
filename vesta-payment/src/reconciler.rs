use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use vesta_core::notify::PostConfirmationHook;
use vesta_core::repository::{CommissionRepository, ReservationRepository};
use vesta_core::reservation::{InventoryKind, PaymentStatus, Reservation, ReservationStatus};

use crate::{PaymentError, PaymentResult};

/// Normalized gateway event, produced by both the webhook endpoint and the
/// synchronous confirm path. Whichever arrives first wins the
/// compare-and-swap; the other resolves to a no-op.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    /// Authorized but not yet captured (manual capture flow).
    Authorized,
    /// Settled on the gateway; amount/currency as reported by the event.
    Settled { amount_minor: i64, currency: String },
    Failed,
    Canceled,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ConfirmReservation,
    RunPostConfirmation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: PaymentStatus,
    pub effects: Vec<Effect>,
}

/// The payment state machine as a pure function of (state, event).
/// `None` means the event does not move this state: replays, out-of-order
/// deliveries and the losing side of a race all land here structurally.
pub fn transition(state: PaymentStatus, event: &PaymentEvent) -> Option<Transition> {
    use PaymentStatus::*;

    match (state, event) {
        (Unpaid, PaymentEvent::Authorized) => Some(Transition {
            next: Pending,
            effects: vec![],
        }),
        (Unpaid | Pending, PaymentEvent::Settled { .. }) => Some(Transition {
            next: Paid,
            // The lifecycle flip runs last: once a reservation reads
            // CONFIRMED its settlement effects are known complete, which
            // is how a redelivery decides whether anything is left to do.
            effects: vec![Effect::RunPostConfirmation, Effect::ConfirmReservation],
        }),
        (Pending, PaymentEvent::Failed | PaymentEvent::Canceled) => Some(Transition {
            next: Unpaid,
            effects: vec![],
        }),
        // PAID is never downgraded by a failure event, only by an explicit refund.
        (Paid, PaymentEvent::Refunded) => Some(Transition {
            next: Refunded,
            effects: vec![],
        }),
        _ => None,
    }
}

/// Per-inventory-type policy: which kinds hold at PENDING lifecycle after
/// capture until an operator confirms manually.
#[derive(Debug, Clone, Default)]
pub struct ConfirmationPolicy {
    manual_gate: HashSet<InventoryKind>,
}

impl ConfirmationPolicy {
    pub fn with_manual_gate(kinds: impl IntoIterator<Item = InventoryKind>) -> Self {
        Self { manual_gate: kinds.into_iter().collect() }
    }

    pub fn requires_manual_gate(&self, kind: InventoryKind) -> bool {
        self.manual_gate.contains(&kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied { next: PaymentStatus },
    /// Replay, out-of-order delivery or lost race; success with no effects.
    NoOp,
    /// Amount/currency verification failed; nothing mutated, discrepancy
    /// logged for manual reconciliation.
    Mismatch,
}

/// Advances reservation payment state from gateway events. Safe under
/// at-least-once, duplicate and out-of-order delivery: every call re-reads
/// current state and the transition table plus the repository
/// compare-and-swap make "already paid" a structural no-op.
pub struct Reconciler {
    repo: Arc<dyn ReservationRepository>,
    hook: Arc<dyn PostConfirmationHook>,
    policy: ConfirmationPolicy,
    tolerance_minor: i64,
}

impl Reconciler {
    pub fn new(
        repo: Arc<dyn ReservationRepository>,
        hook: Arc<dyn PostConfirmationHook>,
        policy: ConfirmationPolicy,
        tolerance_minor: i64,
    ) -> Self {
        Self { repo, hook, policy, tolerance_minor }
    }

    /// Expected settlement total: purchaser charge plus deposit component.
    fn expected_minor(reservation: &Reservation) -> i64 {
        reservation.gross_minor + reservation.deposit_minor
    }

    fn settlement_matches(&self, reservation: &Reservation, amount_minor: i64, currency: &str) -> bool {
        if !currency.eq_ignore_ascii_case(&reservation.currency) {
            return false;
        }
        (amount_minor - Self::expected_minor(reservation)).abs() <= self.tolerance_minor
    }

    /// Apply one gateway event to the reservation it names. The reservation
    /// id must come from intent metadata, never from a client-supplied body.
    pub async fn apply(
        &self,
        reservation_id: Uuid,
        event: PaymentEvent,
        actor: &str,
    ) -> PaymentResult<ReconcileOutcome> {
        let reservation = self
            .repo
            .get(reservation_id)
            .await?
            .ok_or(PaymentError::NotFound(reservation_id))?;

        if let PaymentEvent::Settled { amount_minor, currency } = &event {
            if !self.settlement_matches(&reservation, *amount_minor, currency) {
                warn!(
                    reservation_id = %reservation.id,
                    reference = %reservation.reference_code,
                    reported_minor = amount_minor,
                    reported_currency = %currency,
                    expected_minor = Self::expected_minor(&reservation),
                    expected_currency = %reservation.currency,
                    "settlement mismatch, leaving reservation for manual reconciliation"
                );
                return Ok(ReconcileOutcome::Mismatch);
            }
        }

        let Some(step) = transition(reservation.payment_status, &event) else {
            // A settlement replay may be chasing an earlier delivery that
            // flipped the payment state and then died before its effects
            // finished. While the lifecycle still reads PENDING those
            // effects are incomplete, so re-run them here; the finalize
            // and dispatch markers keep the downstream work exactly-once.
            if reservation.payment_status == PaymentStatus::Paid
                && reservation.status == ReservationStatus::Pending
                && matches!(event, PaymentEvent::Settled { .. })
            {
                self.run_effects(
                    &[Effect::RunPostConfirmation, Effect::ConfirmReservation],
                    &reservation,
                    actor,
                )
                .await?;
            }
            return Ok(ReconcileOutcome::NoOp);
        };

        let won = self
            .repo
            .transition_payment(reservation.id, reservation.payment_status, step.next)
            .await?;
        if !won {
            // Someone else applied this transition first; same terminal
            // outcome, so this delivery succeeds as a no-op. Should the
            // winner die mid-effects, the next redelivery lands in the
            // recovery branch above.
            return Ok(ReconcileOutcome::NoOp);
        }

        self.repo
            .add_change(
                reservation.id,
                "PAYMENT_STATUS",
                Some(serde_json::json!({ "payment_status": reservation.payment_status })),
                Some(serde_json::json!({ "payment_status": step.next })),
                actor,
                None,
            )
            .await?;

        self.run_effects(&step.effects, &reservation, actor).await?;

        Ok(ReconcileOutcome::Applied { next: step.next })
    }

    async fn run_effects(
        &self,
        effects: &[Effect],
        reservation: &Reservation,
        actor: &str,
    ) -> PaymentResult<()> {
        for effect in effects {
            match effect {
                Effect::ConfirmReservation => {
                    if self.policy.requires_manual_gate(reservation.inventory_kind) {
                        info!(reservation_id = %reservation.id,
                            "captured but held for manual confirmation gate");
                        continue;
                    }
                    if reservation.status == ReservationStatus::Pending {
                        self.repo
                            .set_status(reservation.id, ReservationStatus::Confirmed)
                            .await?;
                        self.repo
                            .add_change(
                                reservation.id,
                                "CONFIRMED",
                                Some(serde_json::json!({ "status": reservation.status })),
                                Some(serde_json::json!({ "status": ReservationStatus::Confirmed })),
                                actor,
                                None,
                            )
                            .await?;
                    }
                }
                Effect::RunPostConfirmation => {
                    let fresh = self
                        .repo
                        .get(reservation.id)
                        .await?
                        .ok_or(PaymentError::NotFound(reservation.id))?;
                    self.hook.on_confirmed(&fresh).await?;
                }
            }
        }
        Ok(())
    }
}

/// Connected-account event stream: updates payout records only, never a
/// reservation's payment status.
#[derive(Debug, Clone)]
pub enum AccountEvent {
    TransferSettled { referrer_id: Uuid },
    AccountUpdated { account_ref: String },
}

pub struct PayoutReconciler {
    commissions: Arc<dyn CommissionRepository>,
}

impl PayoutReconciler {
    pub fn new(commissions: Arc<dyn CommissionRepository>) -> Self {
        Self { commissions }
    }

    pub async fn apply(&self, event: AccountEvent) -> PaymentResult<u64> {
        match event {
            AccountEvent::TransferSettled { referrer_id } => {
                let settled = self.commissions.settle_for_referrer(referrer_id).await?;
                info!(%referrer_id, settled, "transfer settled, commissions marked paid");
                Ok(settled)
            }
            AccountEvent::AccountUpdated { account_ref } => {
                info!(%account_ref, "connected account updated");
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use vesta_core::payment::CaptureMethod;
    use vesta_core::reservation::{GuestContact, InventoryAttachment};
    use vesta_core::{CoreError, CoreResult};
    use vesta_shared::pii::Masked;
    use vesta_store::memory::MemoryStore;

    #[test]
    fn settled_from_unpaid_confirms() {
        let step = transition(
            PaymentStatus::Unpaid,
            &PaymentEvent::Settled { amount_minor: 18000, currency: "usd".into() },
        )
        .unwrap();
        assert_eq!(step.next, PaymentStatus::Paid);
        assert!(step.effects.contains(&Effect::ConfirmReservation));
        assert!(step.effects.contains(&Effect::RunPostConfirmation));
    }

    #[test]
    fn paid_is_never_downgraded_by_failure() {
        assert!(transition(PaymentStatus::Paid, &PaymentEvent::Failed).is_none());
        assert!(transition(PaymentStatus::Paid, &PaymentEvent::Canceled).is_none());
        assert!(transition(
            PaymentStatus::Paid,
            &PaymentEvent::Settled { amount_minor: 1, currency: "usd".into() }
        )
        .is_none());
    }

    #[test]
    fn refund_is_the_only_exit_from_paid() {
        let step = transition(PaymentStatus::Paid, &PaymentEvent::Refunded).unwrap();
        assert_eq!(step.next, PaymentStatus::Refunded);
        assert!(transition(PaymentStatus::Unpaid, &PaymentEvent::Refunded).is_none());
    }

    #[test]
    fn authorization_moves_to_pending_once() {
        let step = transition(PaymentStatus::Unpaid, &PaymentEvent::Authorized).unwrap();
        assert_eq!(step.next, PaymentStatus::Pending);
        assert!(transition(PaymentStatus::Pending, &PaymentEvent::Authorized).is_none());
    }

    struct CountingHook(AtomicUsize);

    #[async_trait]
    impl PostConfirmationHook for CountingHook {
        async fn on_confirmed(&self, _reservation: &Reservation) -> CoreResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn reservation() -> (Reservation, InventoryAttachment) {
        let id = Uuid::new_v4();
        let res = Reservation {
            id,
            reference_code: Reservation::reference_code_for(id),
            purchaser_id: None,
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
            status: ReservationStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            gateway_provider: Some("mockpay".into()),
            gateway_intent_id: Some("pi_mock_1".into()),
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let attachment = InventoryAttachment::LocalHotel {
            room_name: "Standard Double".into(),
            board: None,
            rate_plan: None,
            cancellation_policy: None,
        };
        (res, attachment)
    }

    async fn reconciler_with(
        policy: ConfirmationPolicy,
    ) -> (Arc<MemoryStore>, Arc<CountingHook>, Reconciler, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let hook = Arc::new(CountingHook(AtomicUsize::new(0)));
        let (res, attachment) = reservation();
        store.create(&res, &attachment).await.unwrap();
        let reconciler = Reconciler::new(
            store.clone() as Arc<dyn ReservationRepository>,
            hook.clone() as Arc<dyn PostConfirmationHook>,
            policy,
            1,
        );
        (store, hook, reconciler, res.id)
    }

    fn settled(amount_minor: i64, currency: &str) -> PaymentEvent {
        PaymentEvent::Settled { amount_minor, currency: currency.into() }
    }

    #[tokio::test]
    async fn duplicate_settlement_confirms_exactly_once() {
        let (store, hook, reconciler, id) = reconciler_with(ConfirmationPolicy::default()).await;

        let first = reconciler.apply(id, settled(18000, "usd"), "WEBHOOK").await.unwrap();
        assert_eq!(first, ReconcileOutcome::Applied { next: PaymentStatus::Paid });

        let second = reconciler.apply(id, settled(18000, "usd"), "WEBHOOK").await.unwrap();
        assert_eq!(second, ReconcileOutcome::NoOp);

        let res = ReservationRepository::get(store.as_ref(), id).await.unwrap().unwrap();
        assert_eq!(res.payment_status, PaymentStatus::Paid);
        assert_eq!(res.status, ReservationStatus::Confirmed);
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn amount_outside_tolerance_is_rejected() {
        // Scenario D
        let (store, _hook, reconciler, id) = reconciler_with(ConfirmationPolicy::default()).await;

        let outcome = reconciler.apply(id, settled(17950, "usd"), "WEBHOOK").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Mismatch);
        let res = ReservationRepository::get(store.as_ref(), id).await.unwrap().unwrap();
        assert_eq!(res.payment_status, PaymentStatus::Unpaid);

        let within = reconciler.apply(id, settled(18000, "usd"), "WEBHOOK").await.unwrap();
        assert_eq!(within, ReconcileOutcome::Applied { next: PaymentStatus::Paid });
    }

    #[tokio::test]
    async fn currency_mismatch_is_rejected() {
        let (store, _hook, reconciler, id) = reconciler_with(ConfirmationPolicy::default()).await;
        let outcome = reconciler.apply(id, settled(18000, "eur"), "WEBHOOK").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Mismatch);
        assert_eq!(
            ReservationRepository::get(store.as_ref(), id).await.unwrap().unwrap().payment_status,
            PaymentStatus::Unpaid
        );
    }

    #[tokio::test]
    async fn manual_gate_holds_lifecycle_at_pending() {
        let policy = ConfirmationPolicy::with_manual_gate([InventoryKind::LocalHotel]);
        let (store, hook, reconciler, id) = reconciler_with(policy).await;

        let outcome = reconciler.apply(id, settled(18000, "usd"), "WEBHOOK").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied { next: PaymentStatus::Paid });

        let res = ReservationRepository::get(store.as_ref(), id).await.unwrap().unwrap();
        assert_eq!(res.payment_status, PaymentStatus::Paid);
        assert_eq!(res.status, ReservationStatus::Pending);
        // Post-confirmation effects still run; only the lifecycle flip waits.
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
    }

    /// Delegates to the in-memory store but fails the next audit write,
    /// standing in for a database that drops out mid-settlement.
    struct FlakyAuditStore {
        inner: Arc<MemoryStore>,
        fail_next_add_change: AtomicBool,
    }

    #[async_trait]
    impl ReservationRepository for FlakyAuditStore {
        async fn create(
            &self,
            reservation: &Reservation,
            attachment: &InventoryAttachment,
        ) -> CoreResult<()> {
            self.inner.create(reservation, attachment).await
        }

        async fn get(&self, id: Uuid) -> CoreResult<Option<Reservation>> {
            ReservationRepository::get(self.inner.as_ref(), id).await
        }

        async fn get_attachment(
            &self,
            reservation_id: Uuid,
        ) -> CoreResult<Option<InventoryAttachment>> {
            self.inner.get_attachment(reservation_id).await
        }

        async fn list_for_purchaser(&self, purchaser_id: &str) -> CoreResult<Vec<Reservation>> {
            self.inner.list_for_purchaser(purchaser_id).await
        }

        async fn link_intent(
            &self,
            id: Uuid,
            provider: &str,
            intent_id: &str,
            capture_method: CaptureMethod,
        ) -> CoreResult<()> {
            self.inner.link_intent(id, provider, intent_id, capture_method).await
        }

        async fn transition_payment(
            &self,
            id: Uuid,
            from: PaymentStatus,
            to: PaymentStatus,
        ) -> CoreResult<bool> {
            self.inner.transition_payment(id, from, to).await
        }

        async fn set_status(&self, id: Uuid, status: ReservationStatus) -> CoreResult<()> {
            self.inner.set_status(id, status).await
        }

        async fn release_nights(&self, id: Uuid) -> CoreResult<()> {
            self.inner.release_nights(id).await
        }

        async fn try_mark_finalized(&self, id: Uuid) -> CoreResult<bool> {
            self.inner.try_mark_finalized(id).await
        }

        async fn try_mark_dispatched(&self, id: Uuid) -> CoreResult<bool> {
            self.inner.try_mark_dispatched(id).await
        }

        async fn attach_booking_ref(&self, reservation_id: Uuid, booking_ref: &str) -> CoreResult<()> {
            self.inner.attach_booking_ref(reservation_id, booking_ref).await
        }

        async fn add_change(
            &self,
            reservation_id: Uuid,
            change_type: &str,
            before: Option<serde_json::Value>,
            after: Option<serde_json::Value>,
            actor: &str,
            note: Option<&str>,
        ) -> CoreResult<()> {
            if self.fail_next_add_change.swap(false, Ordering::SeqCst) {
                return Err(CoreError::Internal("audit log unavailable".into()));
            }
            self.inner
                .add_change(reservation_id, change_type, before, after, actor, note)
                .await
        }

        async fn inventory_exists(&self, kind: InventoryKind, inventory_id: Uuid) -> CoreResult<bool> {
            self.inner.inventory_exists(kind, inventory_id).await
        }
    }

    #[tokio::test]
    async fn interrupted_settlement_recovers_on_redelivery() {
        let store = Arc::new(MemoryStore::new());
        let (res, attachment) = reservation();
        store.create(&res, &attachment).await.unwrap();
        let flaky = Arc::new(FlakyAuditStore {
            inner: store.clone(),
            fail_next_add_change: AtomicBool::new(true),
        });
        let hook = Arc::new(CountingHook(AtomicUsize::new(0)));
        let reconciler = Reconciler::new(
            flaky as Arc<dyn ReservationRepository>,
            hook.clone() as Arc<dyn PostConfirmationHook>,
            ConfirmationPolicy::default(),
            1,
        );

        // First delivery flips the payment state, then dies on the audit
        // write before any confirmation effect ran.
        assert!(reconciler.apply(res.id, settled(18000, "usd"), "WEBHOOK").await.is_err());
        let after = ReservationRepository::get(store.as_ref(), res.id).await.unwrap().unwrap();
        assert_eq!(after.payment_status, PaymentStatus::Paid);
        assert_eq!(after.status, ReservationStatus::Pending);
        assert_eq!(hook.0.load(Ordering::SeqCst), 0);

        // Redelivery finds the half-applied settlement and completes it.
        let outcome = reconciler.apply(res.id, settled(18000, "usd"), "WEBHOOK").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::NoOp);
        let recovered = ReservationRepository::get(store.as_ref(), res.id).await.unwrap().unwrap();
        assert_eq!(recovered.status, ReservationStatus::Confirmed);
        assert_eq!(recovered.payment_status, PaymentStatus::Paid);
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);

        // Once complete, further replays change nothing.
        let replay = reconciler.apply(res.id, settled(18000, "usd"), "WEBHOOK").await.unwrap();
        assert_eq!(replay, ReconcileOutcome::NoOp);
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_after_paid_is_a_noop() {
        let (store, _hook, reconciler, id) = reconciler_with(ConfirmationPolicy::default()).await;
        reconciler.apply(id, settled(18000, "usd"), "WEBHOOK").await.unwrap();

        let outcome = reconciler.apply(id, PaymentEvent::Failed, "WEBHOOK").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::NoOp);
        assert_eq!(
            ReservationRepository::get(store.as_ref(), id).await.unwrap().unwrap().payment_status,
            PaymentStatus::Paid
        );
    }
}
