use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use vesta_core::commission::{Commission, CommissionBasis, CommissionStatus};
use vesta_core::payment::PaymentGateway;
use vesta_core::repository::{CommissionRepository, DiscountRepository, ReservationRepository};
use vesta_core::reservation::Reservation;
use vesta_pricing::fx::FxConverter;
use vesta_shared::currency::{from_minor_units, to_minor_units};

use crate::BookingResult;

#[derive(Debug, Clone)]
pub struct CommissionRules {
    pub rate_pct: f64,
    /// Per-reservation ceiling, in `cap_currency` major units.
    pub cap_amount: f64,
    pub cap_currency: String,
    /// Days after checkout before the held commission becomes eligible.
    pub hold_days: i64,
}

/// Settlement-time bookkeeping, run once per reservation: count the
/// discount code and accrue the referrer commission. The finalize marker
/// makes re-entry from duplicate webhooks a no-op.
pub struct Finalizer {
    repo: Arc<dyn ReservationRepository>,
    discounts: Arc<dyn DiscountRepository>,
    commissions: Arc<dyn CommissionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    fx: Arc<FxConverter>,
    rules: CommissionRules,
}

impl Finalizer {
    pub fn new(
        repo: Arc<dyn ReservationRepository>,
        discounts: Arc<dyn DiscountRepository>,
        commissions: Arc<dyn CommissionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        fx: Arc<FxConverter>,
        rules: CommissionRules,
    ) -> Self {
        Self { repo, discounts, commissions, gateway, fx, rules }
    }

    /// Returns true when this call did the work, false when a previous one
    /// already had.
    pub async fn finalize(&self, reservation: &Reservation) -> BookingResult<bool> {
        if !self.repo.try_mark_finalized(reservation.id).await? {
            return Ok(false);
        }

        if let Some(discount_id) = Self::uuid_field(&reservation.metadata, "discount_code_id") {
            let counted = self.discounts.increment_usage(discount_id, reservation.id).await?;
            if !counted {
                // The cap was consumed between booking and settlement; the
                // guest keeps the price they were quoted.
                warn!(reservation_id = %reservation.id, %discount_id,
                    "discount cap reached before settlement, usage not counted");
            }
        }

        if let Some(referrer_id) = Self::uuid_field(&reservation.metadata, "referrer_id") {
            self.accrue_commission(reservation, referrer_id).await?;
        }

        Ok(true)
    }

    async fn accrue_commission(
        &self,
        reservation: &Reservation,
        referrer_id: Uuid,
    ) -> BookingResult<()> {
        // Commission is earned on our margin when the supplier net is
        // known; otherwise on the full charge.
        let (base_minor, basis) = match reservation.markup_minor() {
            Some(markup) if markup > 0 => (markup, CommissionBasis::Markup),
            _ => (reservation.gross_minor, CommissionBasis::Gross),
        };

        let uncapped_minor =
            (base_minor as f64 * self.rules.rate_pct / 100.0).round() as i64;

        let lock = match self
            .gateway
            .fx_lock(&self.rules.cap_currency, &reservation.currency)
            .await
        {
            Ok(lock) => lock,
            Err(err) => {
                warn!("gateway fx lock unavailable, using market rate: {err}");
                None
            }
        };
        let cap_converted = self
            .fx
            .convert(
                self.rules.cap_amount,
                None,
                lock,
                &self.rules.cap_currency,
                &reservation.currency,
            )
            .await?;
        let cap_minor = to_minor_units(cap_converted.amount, &reservation.currency);
        let amount_minor = uncapped_minor.min(cap_minor);

        let eligible_at = reservation
            .check_out
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc() + Duration::days(self.rules.hold_days));

        let commission = Commission {
            id: Uuid::new_v4(),
            reservation_id: reservation.id,
            referrer_id,
            amount_minor,
            currency: reservation.currency.clone(),
            basis,
            rate_pct: self.rules.rate_pct,
            status: CommissionStatus::Hold,
            eligible_at,
            created_at: Utc::now(),
        };

        if self.commissions.find_or_create(&commission).await? {
            self.repo
                .add_change(
                    reservation.id,
                    "COMMISSION_ACCRUED",
                    None,
                    Some(serde_json::json!({
                        "referrer_id": referrer_id,
                        "amount_minor": amount_minor,
                        "basis": basis,
                    })),
                    "SYSTEM",
                    None,
                )
                .await?;
            info!(
                reservation_id = %reservation.id,
                %referrer_id,
                amount_minor,
                amount = from_minor_units(amount_minor, &reservation.currency),
                "commission accrued on hold"
            );
        }
        Ok(())
    }

    fn uuid_field(metadata: &serde_json::Value, key: &str) -> Option<Uuid> {
        metadata
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use vesta_core::reservation::{
        GuestContact, InventoryAttachment, InventoryKind, PaymentStatus, ReservationStatus,
    };
    use vesta_payment::gateway::MockGateway;
    use vesta_pricing::fx::MemoryRateCache;
    use vesta_shared::pii::Masked;
    use vesta_store::fx::ConfigRateSource;
    use vesta_store::memory::MemoryStore;

    fn rules() -> CommissionRules {
        CommissionRules {
            rate_pct: 10.0,
            cap_amount: 50.0,
            cap_currency: "EUR".into(),
            hold_days: 7,
        }
    }

    fn fx() -> Arc<FxConverter> {
        Arc::new(FxConverter::new(
            Arc::new(MemoryRateCache::new()),
            Arc::new(ConfigRateSource::new(HashMap::from([("EUR:USD".to_string(), 1.2)]))),
            300,
        ))
    }

    fn finalizer(store: Arc<MemoryStore>) -> Finalizer {
        finalizer_with_gateway(store, Arc::new(MockGateway::new()))
    }

    fn finalizer_with_gateway(store: Arc<MemoryStore>, gateway: Arc<MockGateway>) -> Finalizer {
        Finalizer::new(store.clone(), store.clone(), store, gateway, fx(), rules())
    }

    fn paid_reservation(referrer_id: Option<Uuid>, gross_minor: i64, net_minor: Option<i64>) -> Reservation {
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
            gross_minor,
            net_minor,
            deposit_minor: 0,
            currency: "USD".into(),
            pricing_snapshot: serde_json::json!({}),
            status: ReservationStatus::Confirmed,
            payment_status: PaymentStatus::Paid,
            gateway_provider: Some("mockpay".into()),
            gateway_intent_id: Some("pi_mock_1".into()),
            metadata: serde_json::json!({ "referrer_id": referrer_id }),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn seed(store: &MemoryStore, reservation: &Reservation) {
        let attachment = InventoryAttachment::LocalHotel {
            room_name: "Standard Double".into(),
            board: None,
            rate_plan: None,
            cancellation_policy: None,
        };
        store.create(reservation, &attachment).await.unwrap();
    }

    #[tokio::test]
    async fn finalize_runs_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let referrer = Uuid::new_v4();
        let reservation = paid_reservation(Some(referrer), 18000, Some(12000));
        seed(&store, &reservation).await;
        let finalizer = finalizer(store.clone());

        assert!(finalizer.finalize(&reservation).await.unwrap());
        assert!(!finalizer.finalize(&reservation).await.unwrap());
        assert_eq!(store.commissions_for_referrer(referrer).len(), 1);
    }

    #[tokio::test]
    async fn commission_on_markup_when_net_known() {
        let store = Arc::new(MemoryStore::new());
        let referrer = Uuid::new_v4();
        let reservation = paid_reservation(Some(referrer), 18000, Some(12000));
        seed(&store, &reservation).await;
        finalizer(store.clone()).finalize(&reservation).await.unwrap();

        let commission = &store.commissions_for_referrer(referrer)[0];
        // 10% of the 60.00 markup.
        assert_eq!(commission.amount_minor, 600);
        assert_eq!(commission.basis, CommissionBasis::Markup);
        assert_eq!(commission.status, CommissionStatus::Hold);
        let eligible = commission.eligible_at.unwrap();
        assert_eq!(eligible.date_naive(), NaiveDate::from_ymd_opt(2025, 3, 19).unwrap());
    }

    #[tokio::test]
    async fn commission_falls_back_to_gross_without_net() {
        let store = Arc::new(MemoryStore::new());
        let referrer = Uuid::new_v4();
        let reservation = paid_reservation(Some(referrer), 18000, None);
        seed(&store, &reservation).await;
        finalizer(store.clone()).finalize(&reservation).await.unwrap();

        let commission = &store.commissions_for_referrer(referrer)[0];
        assert_eq!(commission.amount_minor, 1800);
        assert_eq!(commission.basis, CommissionBasis::Gross);
    }

    #[tokio::test]
    async fn commission_is_capped_in_reservation_currency() {
        let store = Arc::new(MemoryStore::new());
        let referrer = Uuid::new_v4();
        // Markup of 2000.00 USD gives an uncapped 200.00 commission; the
        // EUR 50 cap converts to USD 60.
        let reservation = paid_reservation(Some(referrer), 500000, Some(300000));
        seed(&store, &reservation).await;
        finalizer(store.clone()).finalize(&reservation).await.unwrap();

        let commission = &store.commissions_for_referrer(referrer)[0];
        assert_eq!(commission.amount_minor, 6000);
    }

    #[tokio::test]
    async fn cap_conversion_prefers_gateway_fx_lock() {
        let store = Arc::new(MemoryStore::new());
        let referrer = Uuid::new_v4();
        let gateway = Arc::new(MockGateway::new());
        gateway.fx_rates.lock().unwrap().insert("EUR:USD".into(), 1.1);
        // Uncapped commission would be 200.00; the EUR 50 cap converts at
        // the locked 1.10 rather than the 1.20 market rate.
        let reservation = paid_reservation(Some(referrer), 500000, Some(300000));
        seed(&store, &reservation).await;
        finalizer_with_gateway(store.clone(), gateway)
            .finalize(&reservation)
            .await
            .unwrap();

        let commission = &store.commissions_for_referrer(referrer)[0];
        assert_eq!(commission.amount_minor, 5500);
    }

    #[tokio::test]
    async fn discount_usage_counts_on_finalize() {
        let store = Arc::new(MemoryStore::new());
        let discount_id = Uuid::new_v4();
        store.add_discount(vesta_core::discount::DiscountCode {
            id: discount_id,
            code: "SPRING10".into(),
            percent_off: Some(10.0),
            special_price: None,
            owner_id: None,
            used_count: 0,
            usage_cap: Some(5),
            valid_from: None,
            valid_until: None,
            reservation_id: None,
            created_at: Utc::now(),
        });
        let mut reservation = paid_reservation(None, 10800, Some(8000));
        reservation.metadata = serde_json::json!({ "discount_code_id": discount_id });
        seed(&store, &reservation).await;

        finalizer(store.clone()).finalize(&reservation).await.unwrap();
        let discount = store.get_by_code("SPRING10").await.unwrap().unwrap();
        assert_eq!(discount.used_count, 1);
        assert_eq!(discount.reservation_id, Some(reservation.id));
    }
}
