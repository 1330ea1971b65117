//! In-memory store used by tests and local wiring. Implements the same
//! repository traits as the Postgres store with the same conflict and
//! compare-and-swap semantics, backed by a single mutex.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;
use vesta_core::commission::{Commission, CommissionStatus};
use vesta_core::discount::DiscountCode;
use vesta_core::payment::CaptureMethod;
use vesta_core::repository::{CommissionRepository, DiscountRepository, ReservationRepository};
use vesta_core::reservation::{
    InventoryAttachment, InventoryKind, PaymentStatus, Reservation, ReservationStatus,
};
use vesta_core::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct ChangeEntry {
    pub reservation_id: Uuid,
    pub change_type: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub actor: String,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    reservations: HashMap<Uuid, Reservation>,
    attachments: HashMap<Uuid, InventoryAttachment>,
    /// (inventory_id, night) -> holding reservation. Mirrors the unique
    /// calendar constraint of the Postgres store.
    nights: HashMap<(Uuid, NaiveDate), Uuid>,
    changes: Vec<ChangeEntry>,
    discounts: HashMap<Uuid, DiscountCode>,
    commissions: HashMap<(Uuid, Uuid), Commission>,
    finalized: HashSet<Uuid>,
    dispatched: HashSet<Uuid>,
    inventory: HashSet<(InventoryKind, Uuid)>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    pub fn add_inventory(&self, kind: InventoryKind, inventory_id: Uuid) {
        self.inner.lock().unwrap().inventory.insert((kind, inventory_id));
    }

    pub fn add_discount(&self, code: DiscountCode) {
        self.inner.lock().unwrap().discounts.insert(code.id, code);
    }

    pub fn changes_for(&self, reservation_id: Uuid) -> Vec<ChangeEntry> {
        self.inner
            .lock()
            .unwrap()
            .changes
            .iter()
            .filter(|c| c.reservation_id == reservation_id)
            .cloned()
            .collect()
    }

    pub fn commissions_for_referrer(&self, referrer_id: Uuid) -> Vec<Commission> {
        self.inner
            .lock()
            .unwrap()
            .commissions
            .values()
            .filter(|c| c.referrer_id == referrer_id)
            .cloned()
            .collect()
    }

    fn night_range(check_in: NaiveDate, check_out: NaiveDate) -> Vec<NaiveDate> {
        let mut nights = Vec::new();
        let mut night = check_in;
        while night < check_out {
            nights.push(night);
            night += Duration::days(1);
        }
        nights
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReservationRepository for MemoryStore {
    async fn create(
        &self,
        reservation: &Reservation,
        attachment: &InventoryAttachment,
    ) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();

        if reservation.inventory_kind.is_owned() {
            let nights = Self::night_range(reservation.check_in, reservation.check_out);
            // Check every night before inserting any, so a conflict leaves
            // nothing partial behind.
            for night in &nights {
                if inner.nights.contains_key(&(reservation.inventory_id, *night)) {
                    return Err(CoreError::Conflict(format!(
                        "inventory {} is not available on {night}",
                        reservation.inventory_id
                    )));
                }
            }
            for night in nights {
                inner
                    .nights
                    .insert((reservation.inventory_id, night), reservation.id);
            }
        }

        inner.reservations.insert(reservation.id, reservation.clone());
        inner.attachments.insert(reservation.id, attachment.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Reservation>> {
        Ok(self.inner.lock().unwrap().reservations.get(&id).cloned())
    }

    async fn get_attachment(&self, reservation_id: Uuid) -> CoreResult<Option<InventoryAttachment>> {
        Ok(self.inner.lock().unwrap().attachments.get(&reservation_id).cloned())
    }

    async fn list_for_purchaser(&self, purchaser_id: &str) -> CoreResult<Vec<Reservation>> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<Reservation> = inner
            .reservations
            .values()
            .filter(|r| r.purchaser_id.as_deref() == Some(purchaser_id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn link_intent(
        &self,
        id: Uuid,
        provider: &str,
        intent_id: &str,
        _capture_method: CaptureMethod,
    ) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let reservation = inner
            .reservations
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("reservation {id}")))?;
        reservation.gateway_provider = Some(provider.to_string());
        reservation.gateway_intent_id = Some(intent_id.to_string());
        reservation.updated_at = Utc::now();
        Ok(())
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> CoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let reservation = inner
            .reservations
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("reservation {id}")))?;
        if reservation.payment_status != from {
            return Ok(false);
        }
        reservation.payment_status = to;
        reservation.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_status(&self, id: Uuid, status: ReservationStatus) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let reservation = inner
            .reservations
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("reservation {id}")))?;
        reservation.status = status;
        reservation.updated_at = Utc::now();
        Ok(())
    }

    async fn release_nights(&self, id: Uuid) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.nights.retain(|_, holder| *holder != id);
        Ok(())
    }

    async fn try_mark_finalized(&self, id: Uuid) -> CoreResult<bool> {
        Ok(self.inner.lock().unwrap().finalized.insert(id))
    }

    async fn try_mark_dispatched(&self, id: Uuid) -> CoreResult<bool> {
        Ok(self.inner.lock().unwrap().dispatched.insert(id))
    }

    async fn attach_booking_ref(&self, reservation_id: Uuid, booking_ref: &str) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let attachment = inner
            .attachments
            .get_mut(&reservation_id)
            .ok_or_else(|| CoreError::NotFound(format!("attachment for {reservation_id}")))?;
        match attachment {
            InventoryAttachment::SupplierAlfa { booking_ref: slot, .. }
            | InventoryAttachment::SupplierBravo { booking_ref: slot, .. } => {
                *slot = Some(booking_ref.to_string());
                Ok(())
            }
            _ => Err(CoreError::Validation(
                "booking reference only applies to supplier inventory".into(),
            )),
        }
    }

    async fn add_change(
        &self,
        reservation_id: Uuid,
        change_type: &str,
        before: Option<Value>,
        after: Option<Value>,
        actor: &str,
        note: Option<&str>,
    ) -> CoreResult<()> {
        self.inner.lock().unwrap().changes.push(ChangeEntry {
            reservation_id,
            change_type: change_type.to_string(),
            before,
            after,
            actor: actor.to_string(),
            note: note.map(str::to_string),
            at: Utc::now(),
        });
        Ok(())
    }

    async fn inventory_exists(&self, kind: InventoryKind, inventory_id: Uuid) -> CoreResult<bool> {
        Ok(self.inner.lock().unwrap().inventory.contains(&(kind, inventory_id)))
    }
}

#[async_trait]
impl DiscountRepository for MemoryStore {
    async fn get_by_code(&self, code: &str) -> CoreResult<Option<DiscountCode>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .discounts
            .values()
            .find(|d| d.code.eq_ignore_ascii_case(code))
            .cloned())
    }

    async fn increment_usage(&self, id: Uuid, reservation_id: Uuid) -> CoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let discount = inner
            .discounts
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("discount {id}")))?;
        if discount.at_cap() {
            return Ok(false);
        }
        discount.used_count += 1;
        discount.reservation_id = Some(reservation_id);
        Ok(true)
    }
}

#[async_trait]
impl CommissionRepository for MemoryStore {
    async fn find_or_create(&self, commission: &Commission) -> CoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let key = (commission.reservation_id, commission.referrer_id);
        if inner.commissions.contains_key(&key) {
            return Ok(false);
        }
        inner.commissions.insert(key, commission.clone());
        Ok(true)
    }

    async fn get(&self, reservation_id: Uuid, referrer_id: Uuid) -> CoreResult<Option<Commission>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .commissions
            .get(&(reservation_id, referrer_id))
            .cloned())
    }

    async fn reverse_for_reservation(&self, reservation_id: Uuid) -> CoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut reversed = 0;
        for commission in inner.commissions.values_mut() {
            if commission.reservation_id == reservation_id
                && commission.status != CommissionStatus::Paid
                && commission.status != CommissionStatus::Reversed
            {
                commission.status = CommissionStatus::Reversed;
                reversed += 1;
            }
        }
        Ok(reversed)
    }

    async fn settle_for_referrer(&self, referrer_id: Uuid) -> CoreResult<u64> {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        let mut settled = 0;
        for commission in inner.commissions.values_mut() {
            if commission.referrer_id != referrer_id {
                continue;
            }
            let payable = commission.status == CommissionStatus::Eligible
                || (commission.status == CommissionStatus::Hold
                    && commission.eligible_at.is_some_and(|at| at <= now));
            if payable {
                commission.status = CommissionStatus::Paid;
                settled += 1;
            }
        }
        Ok(settled)
    }
}
