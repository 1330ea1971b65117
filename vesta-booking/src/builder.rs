use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use vesta_core::discount::DiscountCode;
use vesta_core::payment::PaymentGateway;
use vesta_core::repository::{DiscountRepository, ReservationRepository};
use vesta_core::reservation::{
    GuestContact, InventoryAttachment, PaymentStatus, Reservation, ReservationStatus,
};
use vesta_pricing::discount::DiscountTerms;
use vesta_pricing::fx::FxConverter;
use vesta_pricing::markup::{MarkupEngine, Role};
use vesta_shared::currency::{from_minor_units, to_minor_units};
use vesta_shared::pii::Masked;

use crate::supplier::SupplierDirectory;
use crate::{BookingError, BookingResult};

const DATE_FORMAT: &str = "%Y-%m-%d";
/// Maximum minor-unit gap tolerated between the client-displayed total and
/// the server-side recomputation.
const CLIENT_TOTAL_SLACK_MINOR: i64 = 1;

#[derive(Debug, Clone, Deserialize)]
pub struct GuestInput {
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReservationRequest {
    pub guest: GuestInput,
    pub inventory_id: Uuid,
    pub attachment: InventoryAttachment,
    pub check_in: String,
    pub check_out: String,
    pub adults: i32,
    #[serde(default)]
    pub children: i32,
    pub currency: String,
    /// Supplier net in major units. Required for owned and outside
    /// inventory; ignored for supplier kinds, whose re-quote is
    /// authoritative.
    pub net_amount: Option<f64>,
    #[serde(default)]
    pub deposit_amount: Option<f64>,
    pub discount_code: Option<String>,
    pub referrer_id: Option<Uuid>,
    /// Total the client displayed to the guest, for stale-pricing detection.
    pub client_total: Option<f64>,
}

/// Assembles and persists a PENDING/UNPAID reservation: validates the stay,
/// re-prices supplier inventory, runs the markup engine and discount rules,
/// and writes the aggregate in one transaction.
pub struct ReservationBuilder {
    repo: Arc<dyn ReservationRepository>,
    discounts: Arc<dyn DiscountRepository>,
    suppliers: Arc<dyn SupplierDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    engine: MarkupEngine,
    fx: Arc<FxConverter>,
    referral_first_booking_pct: f64,
}

impl ReservationBuilder {
    pub fn new(
        repo: Arc<dyn ReservationRepository>,
        discounts: Arc<dyn DiscountRepository>,
        suppliers: Arc<dyn SupplierDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        engine: MarkupEngine,
        fx: Arc<FxConverter>,
        referral_first_booking_pct: f64,
    ) -> Self {
        Self { repo, discounts, suppliers, gateway, engine, fx, referral_first_booking_pct }
    }

    pub async fn create(
        &self,
        purchaser_id: Option<&str>,
        role: Role,
        request: CreateReservationRequest,
    ) -> BookingResult<Reservation> {
        let (check_in, check_out, nights) = Self::validate_stay(&request)?;
        let kind = request.attachment.kind();
        let mut attachment = request.attachment.clone();

        if kind.is_owned() && !self.repo.inventory_exists(kind, request.inventory_id).await? {
            return Err(BookingError::NotFound(format!(
                "inventory {} of kind {}",
                request.inventory_id,
                kind.as_str()
            )));
        }

        // Supplier inventory gets re-priced before anything is charged; the
        // fresh quote overrides whatever the search cache showed.
        let net = if kind.is_supplier() {
            let supplier = self.suppliers.supplier_for(kind).ok_or_else(|| {
                BookingError::Supplier(format!("no supplier wired for {}", kind.as_str()))
            })?;
            let offer_id = Self::offer_id(&attachment)?;
            let quote = supplier
                .quote(&offer_id)
                .await
                .map_err(|e| BookingError::Supplier(e.to_string()))?;
            if let InventoryAttachment::SupplierAlfa { option_id, .. } = &mut attachment {
                *option_id = quote.option_id.clone();
            }
            let net_major = from_minor_units(quote.net_minor, &quote.currency);
            // A gateway rate lock, when offered, pins the conversion to
            // what the purchaser will actually be charged at.
            let lock = match self.gateway.fx_lock(&quote.currency, &request.currency).await {
                Ok(lock) => lock,
                Err(err) => {
                    warn!("gateway fx lock unavailable, using market rate: {err}");
                    None
                }
            };
            let converted = self
                .fx
                .convert(net_major, None, lock, &quote.currency, &request.currency)
                .await?;
            converted.amount
        } else {
            request.net_amount.ok_or_else(|| {
                BookingError::Validation("net_amount is required for non-supplier inventory".into())
            })?
        };

        let discount = match &request.discount_code {
            Some(code) => Some(self.usable_discount(code).await?),
            None => None,
        };
        let terms = discount.as_ref().map(|d| DiscountTerms {
            percent_off: d.percent_off,
            special_price: d.special_price,
        });

        let breakdown = self.engine.quote(net, role, &request.currency, terms.as_ref())?;

        let referral_pct = self.referral_pct_for(purchaser_id, request.referrer_id).await?;
        let total = breakdown.total * (1.0 - referral_pct / 100.0);

        let gross_minor = to_minor_units(total, &request.currency);
        let net_minor = to_minor_units(net, &request.currency);
        let deposit_minor = request
            .deposit_amount
            .map(|amount| to_minor_units(amount, &request.currency))
            .unwrap_or(0);

        if let Some(client_total) = request.client_total {
            let client_minor = to_minor_units(client_total, &request.currency);
            if (client_minor - gross_minor).abs() > CLIENT_TOTAL_SLACK_MINOR {
                return Err(BookingError::Conflict(format!(
                    "price changed: displayed {client_minor}, current {gross_minor} minor units"
                )));
            }
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let reservation = Reservation {
            id,
            reference_code: Reservation::reference_code_for(id),
            purchaser_id: purchaser_id.map(str::to_string),
            guest: GuestContact {
                full_name: request.guest.full_name,
                email: Masked(request.guest.email),
                phone: request.guest.phone,
            },
            inventory_kind: kind,
            inventory_id: request.inventory_id,
            check_in,
            check_out,
            nights,
            adults: request.adults,
            children: request.children,
            gross_minor,
            net_minor: Some(net_minor),
            deposit_minor,
            currency: request.currency.to_uppercase(),
            pricing_snapshot: serde_json::json!({
                "breakdown": breakdown,
                "referral_pct": referral_pct,
            }),
            status: ReservationStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            gateway_provider: None,
            gateway_intent_id: None,
            metadata: serde_json::json!({
                "discount_code_id": discount.as_ref().map(|d| d.id),
                "referrer_id": request.referrer_id,
            }),
            created_at: now,
            updated_at: now,
        };

        self.repo.create(&reservation, &attachment).await?;
        self.repo
            .add_change(
                reservation.id,
                "CREATED",
                None,
                Some(serde_json::json!({
                    "status": reservation.status,
                    "gross_minor": gross_minor,
                    "currency": reservation.currency,
                })),
                purchaser_id.unwrap_or("ANONYMOUS"),
                None,
            )
            .await?;

        info!(
            reservation_id = %reservation.id,
            reference = %reservation.reference_code,
            kind = kind.as_str(),
            gross_minor,
            "reservation created"
        );
        Ok(reservation)
    }

    fn validate_stay(request: &CreateReservationRequest) -> BookingResult<(NaiveDate, NaiveDate, i64)> {
        let check_in = NaiveDate::parse_from_str(&request.check_in, DATE_FORMAT)
            .map_err(|_| BookingError::Validation(format!("invalid check_in {}", request.check_in)))?;
        let check_out = NaiveDate::parse_from_str(&request.check_out, DATE_FORMAT)
            .map_err(|_| BookingError::Validation(format!("invalid check_out {}", request.check_out)))?;

        let nights = (check_out - check_in).num_days();
        if nights < 1 {
            return Err(BookingError::Validation(
                "check_out must be after check_in".into(),
            ));
        }
        if request.adults < 1 {
            return Err(BookingError::Validation("at least one adult is required".into()));
        }
        if request.children < 0 {
            return Err(BookingError::Validation("children cannot be negative".into()));
        }
        Ok((check_in, check_out, nights))
    }

    fn offer_id(attachment: &InventoryAttachment) -> BookingResult<String> {
        match attachment {
            InventoryAttachment::SupplierAlfa { offer_id, .. }
            | InventoryAttachment::SupplierBravo { offer_id, .. } => Ok(offer_id.clone()),
            _ => Err(BookingError::Validation(
                "supplier attachment is missing an offer id".into(),
            )),
        }
    }

    async fn usable_discount(&self, code: &str) -> BookingResult<DiscountCode> {
        let discount = self
            .discounts
            .get_by_code(code)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("discount code {code}")))?;
        if discount.at_cap() {
            return Err(BookingError::Conflict(format!(
                "discount code {code} has reached its usage cap"
            )));
        }
        if !discount.within_window(Utc::now()) {
            return Err(BookingError::Validation(format!(
                "discount code {code} is not currently valid"
            )));
        }
        Ok(discount)
    }

    /// Referral bonus applies only to the referred purchaser's first
    /// booking; self-referral never counts.
    async fn referral_pct_for(
        &self,
        purchaser_id: Option<&str>,
        referrer_id: Option<Uuid>,
    ) -> BookingResult<f64> {
        let (Some(purchaser), Some(referrer)) = (purchaser_id, referrer_id) else {
            return Ok(0.0);
        };
        if purchaser == referrer.to_string() {
            return Ok(0.0);
        }
        let previous = self.repo.list_for_purchaser(purchaser).await?;
        if previous.is_empty() {
            Ok(self.referral_first_booking_pct)
        } else {
            Ok(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supplier::{MockSupplier, StaticDirectory};
    use std::collections::HashMap;
    use vesta_core::reservation::InventoryKind;
    use vesta_payment::gateway::MockGateway;
    use vesta_pricing::fx::MemoryRateCache;
    use vesta_store::fx::ConfigRateSource;
    use vesta_store::memory::MemoryStore;

    fn fx() -> Arc<FxConverter> {
        Arc::new(FxConverter::new(
            Arc::new(MemoryRateCache::new()),
            Arc::new(ConfigRateSource::new(HashMap::from([("EUR:USD".to_string(), 1.25)]))),
            300,
        ))
    }

    fn builder_with(
        store: Arc<MemoryStore>,
        supplier: Option<Arc<MockSupplier>>,
        referral_pct: f64,
    ) -> ReservationBuilder {
        builder_with_gateway(store, supplier, Arc::new(MockGateway::new()), referral_pct)
    }

    fn builder_with_gateway(
        store: Arc<MemoryStore>,
        supplier: Option<Arc<MockSupplier>>,
        gateway: Arc<MockGateway>,
        referral_pct: f64,
    ) -> ReservationBuilder {
        let mut directory = StaticDirectory::new();
        if let Some(supplier) = supplier {
            directory = directory.with(InventoryKind::SupplierAlfa, supplier);
        }
        ReservationBuilder::new(
            store.clone(),
            store,
            Arc::new(directory),
            gateway,
            MarkupEngine::default(),
            fx(),
            referral_pct,
        )
    }

    fn hotel_request(inventory_id: Uuid, net: f64) -> CreateReservationRequest {
        CreateReservationRequest {
            guest: GuestInput {
                full_name: "Ada Guest".into(),
                email: "ada@example.com".into(),
                phone: None,
            },
            inventory_id,
            attachment: InventoryAttachment::LocalHotel {
                room_name: "Standard Double".into(),
                board: Some("BB".into()),
                rate_plan: None,
                cancellation_policy: None,
            },
            check_in: "2025-03-10".into(),
            check_out: "2025-03-12".into(),
            adults: 2,
            children: 0,
            currency: "USD".into(),
            net_amount: Some(net),
            deposit_amount: None,
            discount_code: None,
            referrer_id: None,
            client_total: None,
        }
    }

    #[tokio::test]
    async fn public_booking_at_net_80_charges_120() {
        let store = Arc::new(MemoryStore::new());
        let inventory_id = Uuid::new_v4();
        store.add_inventory(InventoryKind::LocalHotel, inventory_id);
        let builder = builder_with(store.clone(), None, 0.0);

        let reservation = builder
            .create(Some("guest-1"), Role::Public, hotel_request(inventory_id, 80.0))
            .await
            .unwrap();

        assert_eq!(reservation.gross_minor, 12000);
        assert_eq!(reservation.net_minor, Some(8000));
        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(reservation.payment_status, PaymentStatus::Unpaid);
        assert_eq!(reservation.nights, 2);
        assert!(reservation.reference_code.starts_with("VES-"));
        assert_eq!(store.changes_for(reservation.id).len(), 1);
    }

    #[tokio::test]
    async fn zero_night_stay_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let inventory_id = Uuid::new_v4();
        store.add_inventory(InventoryKind::LocalHotel, inventory_id);
        let builder = builder_with(store, None, 0.0);

        let mut request = hotel_request(inventory_id, 80.0);
        request.check_out = request.check_in.clone();
        let err = builder.create(None, Role::Public, request).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_owned_inventory_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let builder = builder_with(store, None, 0.0);
        let err = builder
            .create(None, Role::Public, hotel_request(Uuid::new_v4(), 80.0))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::NotFound(_)));
    }

    #[tokio::test]
    async fn supplier_requote_overrides_requested_net() {
        let store = Arc::new(MemoryStore::new());
        let supplier = Arc::new(MockSupplier::new());
        supplier.seed_quote("off-1", 10000, "EUR");
        let builder = builder_with(store.clone(), Some(supplier), 0.0);

        let mut request = hotel_request(Uuid::new_v4(), 1.0);
        request.attachment = InventoryAttachment::SupplierAlfa {
            offer_id: "off-1".into(),
            option_id: "stale-option".into(),
            room_name: "Sea View".into(),
            board: None,
            cancellation_policy: None,
            booking_ref: None,
        };
        let reservation = builder.create(Some("guest-1"), Role::Public, request).await.unwrap();

        // EUR 100 net at 1.25 is USD 125; the 250-ceiling band applies 40%.
        assert_eq!(reservation.net_minor, Some(12500));
        assert_eq!(reservation.gross_minor, 17500);

        let attachment = store.get_attachment(reservation.id).await.unwrap().unwrap();
        match attachment {
            InventoryAttachment::SupplierAlfa { option_id, .. } => {
                assert_eq!(option_id, "off-1-opt-1");
            }
            other => panic!("unexpected attachment {other:?}"),
        }
    }

    #[tokio::test]
    async fn gateway_fx_lock_overrides_market_rate() {
        let store = Arc::new(MemoryStore::new());
        let supplier = Arc::new(MockSupplier::new());
        supplier.seed_quote("off-1", 10000, "EUR");
        let gateway = Arc::new(MockGateway::new());
        gateway.fx_rates.lock().unwrap().insert("EUR:USD".into(), 1.1);
        let builder = builder_with_gateway(store, Some(supplier), gateway, 0.0);

        let mut request = hotel_request(Uuid::new_v4(), 1.0);
        request.attachment = InventoryAttachment::SupplierAlfa {
            offer_id: "off-1".into(),
            option_id: "stale-option".into(),
            room_name: "Sea View".into(),
            board: None,
            cancellation_policy: None,
            booking_ref: None,
        };
        let reservation = builder.create(Some("guest-1"), Role::Public, request).await.unwrap();

        // The gateway locked EUR:USD at 1.10, beating the 1.25 market
        // rate: EUR 100 net is USD 110, and the 250-ceiling band adds 40%.
        assert_eq!(reservation.net_minor, Some(11000));
        assert_eq!(reservation.gross_minor, 15400);
    }

    #[tokio::test]
    async fn discount_code_applies_to_gross() {
        let store = Arc::new(MemoryStore::new());
        let inventory_id = Uuid::new_v4();
        store.add_inventory(InventoryKind::LocalHotel, inventory_id);
        store.add_discount(DiscountCode {
            id: Uuid::new_v4(),
            code: "SPRING10".into(),
            percent_off: Some(10.0),
            special_price: None,
            owner_id: None,
            used_count: 0,
            usage_cap: None,
            valid_from: None,
            valid_until: None,
            reservation_id: None,
            created_at: Utc::now(),
        });
        let builder = builder_with(store, None, 0.0);

        let mut request = hotel_request(inventory_id, 80.0);
        request.discount_code = Some("SPRING10".into());
        let reservation = builder.create(None, Role::Public, request).await.unwrap();

        // 80 -> 120 gross, minus 10% = 108.
        assert_eq!(reservation.gross_minor, 10800);
    }

    #[tokio::test]
    async fn capped_out_discount_conflicts() {
        let store = Arc::new(MemoryStore::new());
        let inventory_id = Uuid::new_v4();
        store.add_inventory(InventoryKind::LocalHotel, inventory_id);
        store.add_discount(DiscountCode {
            id: Uuid::new_v4(),
            code: "ONCE".into(),
            percent_off: Some(10.0),
            special_price: None,
            owner_id: None,
            used_count: 1,
            usage_cap: Some(1),
            valid_from: None,
            valid_until: None,
            reservation_id: None,
            created_at: Utc::now(),
        });
        let builder = builder_with(store, None, 0.0);

        let mut request = hotel_request(inventory_id, 80.0);
        request.discount_code = Some("ONCE".into());
        let err = builder.create(None, Role::Public, request).await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
    }

    #[tokio::test]
    async fn stale_client_total_conflicts() {
        let store = Arc::new(MemoryStore::new());
        let inventory_id = Uuid::new_v4();
        store.add_inventory(InventoryKind::LocalHotel, inventory_id);
        let builder = builder_with(store, None, 0.0);

        let mut request = hotel_request(inventory_id, 80.0);
        request.client_total = Some(110.0);
        let err = builder.create(None, Role::Public, request).await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
    }

    #[tokio::test]
    async fn referral_discount_only_on_first_booking() {
        let store = Arc::new(MemoryStore::new());
        let inventory_id = Uuid::new_v4();
        store.add_inventory(InventoryKind::LocalHotel, inventory_id);
        let builder = builder_with(store.clone(), None, 5.0);
        let referrer = Uuid::new_v4();

        let mut request = hotel_request(inventory_id, 80.0);
        request.referrer_id = Some(referrer);
        let first = builder.create(Some("guest-1"), Role::Public, request).await.unwrap();
        // 120 minus the 5% first-booking referral bonus.
        assert_eq!(first.gross_minor, 11400);

        let mut request = hotel_request(inventory_id, 80.0);
        request.check_in = "2025-04-01".into();
        request.check_out = "2025-04-03".into();
        request.referrer_id = Some(referrer);
        let second = builder.create(Some("guest-1"), Role::Public, request).await.unwrap();
        assert_eq!(second.gross_minor, 12000);
    }

    #[tokio::test]
    async fn overlapping_dates_surface_as_conflict() {
        let store = Arc::new(MemoryStore::new());
        let inventory_id = Uuid::new_v4();
        store.add_inventory(InventoryKind::LocalHotel, inventory_id);
        let builder = builder_with(store, None, 0.0);

        builder
            .create(Some("guest-1"), Role::Public, hotel_request(inventory_id, 80.0))
            .await
            .unwrap();
        let err = builder
            .create(Some("guest-2"), Role::Public, hotel_request(inventory_id, 80.0))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Core(vesta_core::CoreError::Conflict(_))));
    }
}
