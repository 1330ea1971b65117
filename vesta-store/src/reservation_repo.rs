use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;
use vesta_core::payment::CaptureMethod;
use vesta_core::repository::ReservationRepository;
use vesta_core::reservation::{
    GuestContact, InventoryAttachment, InventoryKind, PaymentStatus, Reservation,
    ReservationStatus,
};
use vesta_core::{CoreError, CoreResult};
use vesta_shared::pii::Masked;

pub struct PgReservationRepository {
    pool: PgPool,
}

impl PgReservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Unique-violation means the calendar (or reference code) is taken; that is
/// a conflict, not an internal failure.
pub(crate) fn db_err(err: sqlx::Error) -> CoreError {
    if let Some(db) = err.as_database_error() {
        if db.is_unique_violation() {
            return CoreError::Conflict("requested dates are no longer available".into());
        }
    }
    CoreError::Internal(err.to_string())
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    reference_code: String,
    purchaser_id: Option<String>,
    guest_name: String,
    guest_email: String,
    guest_phone: Option<String>,
    inventory_kind: String,
    inventory_id: Uuid,
    check_in: NaiveDate,
    check_out: NaiveDate,
    nights: i64,
    adults: i32,
    children: i32,
    gross_minor: i64,
    net_minor: Option<i64>,
    deposit_minor: i64,
    currency: String,
    pricing_snapshot: Value,
    status: String,
    payment_status: String,
    gateway_provider: Option<String>,
    gateway_intent_id: Option<String>,
    metadata: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ReservationRow {
    fn into_reservation(self) -> CoreResult<Reservation> {
        let status = ReservationStatus::parse(&self.status)
            .ok_or_else(|| CoreError::Internal(format!("unknown status {}", self.status)))?;
        let payment_status = PaymentStatus::parse(&self.payment_status).ok_or_else(|| {
            CoreError::Internal(format!("unknown payment status {}", self.payment_status))
        })?;
        let inventory_kind = InventoryKind::parse(&self.inventory_kind).ok_or_else(|| {
            CoreError::Internal(format!("unknown inventory kind {}", self.inventory_kind))
        })?;

        Ok(Reservation {
            id: self.id,
            reference_code: self.reference_code,
            purchaser_id: self.purchaser_id,
            guest: GuestContact {
                full_name: self.guest_name,
                email: Masked(self.guest_email),
                phone: self.guest_phone,
            },
            inventory_kind,
            inventory_id: self.inventory_id,
            check_in: self.check_in,
            check_out: self.check_out,
            nights: self.nights,
            adults: self.adults,
            children: self.children,
            gross_minor: self.gross_minor,
            net_minor: self.net_minor,
            deposit_minor: self.deposit_minor,
            currency: self.currency,
            pricing_snapshot: self.pricing_snapshot,
            status,
            payment_status,
            gateway_provider: self.gateway_provider,
            gateway_intent_id: self.gateway_intent_id,
            metadata: self.metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_RESERVATION: &str = r#"
SELECT id, reference_code, purchaser_id, guest_name, guest_email, guest_phone,
       inventory_kind, inventory_id, check_in, check_out, nights, adults, children,
       gross_minor, net_minor, deposit_minor, currency, pricing_snapshot,
       status, payment_status, gateway_provider, gateway_intent_id, metadata,
       created_at, updated_at
FROM reservations
"#;

#[async_trait]
impl ReservationRepository for PgReservationRepository {
    async fn create(
        &self,
        reservation: &Reservation,
        attachment: &InventoryAttachment,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO reservations
                (id, reference_code, purchaser_id, guest_name, guest_email, guest_phone,
                 inventory_kind, inventory_id, check_in, check_out, nights, adults, children,
                 gross_minor, net_minor, deposit_minor, currency, pricing_snapshot,
                 status, payment_status, gateway_provider, gateway_intent_id, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
            "#,
        )
        .bind(reservation.id)
        .bind(&reservation.reference_code)
        .bind(&reservation.purchaser_id)
        .bind(&reservation.guest.full_name)
        .bind(&reservation.guest.email.0)
        .bind(&reservation.guest.phone)
        .bind(reservation.inventory_kind.as_str())
        .bind(reservation.inventory_id)
        .bind(reservation.check_in)
        .bind(reservation.check_out)
        .bind(reservation.nights)
        .bind(reservation.adults)
        .bind(reservation.children)
        .bind(reservation.gross_minor)
        .bind(reservation.net_minor)
        .bind(reservation.deposit_minor)
        .bind(&reservation.currency)
        .bind(&reservation.pricing_snapshot)
        .bind(reservation.status.as_str())
        .bind(reservation.payment_status.as_str())
        .bind(&reservation.gateway_provider)
        .bind(&reservation.gateway_intent_id)
        .bind(&reservation.metadata)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let payload = serde_json::to_value(attachment)
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        sqlx::query(
            "INSERT INTO reservation_attachments (reservation_id, payload) VALUES ($1, $2)",
        )
        .bind(reservation.id)
        .bind(payload)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if reservation.inventory_kind.is_owned() {
            // One row per held night; the primary key on (inventory_id, night)
            // rejects any overlap and rolls back the whole transaction.
            let mut night = reservation.check_in;
            while night < reservation.check_out {
                sqlx::query(
                    "INSERT INTO reservation_nights (inventory_id, night, reservation_id) VALUES ($1, $2, $3)",
                )
                .bind(reservation.inventory_id)
                .bind(night)
                .bind(reservation.id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                night += Duration::days(1);
            }
        }

        tx.commit().await.map_err(db_err)
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Reservation>> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!("{SELECT_RESERVATION} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(ReservationRow::into_reservation).transpose()
    }

    async fn get_attachment(&self, reservation_id: Uuid) -> CoreResult<Option<InventoryAttachment>> {
        let payload: Option<(Value,)> = sqlx::query_as(
            "SELECT payload FROM reservation_attachments WHERE reservation_id = $1",
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        payload
            .map(|(value,)| {
                serde_json::from_value(value).map_err(|e| CoreError::Internal(e.to_string()))
            })
            .transpose()
    }

    async fn list_for_purchaser(&self, purchaser_id: &str) -> CoreResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "{SELECT_RESERVATION} WHERE purchaser_id = $1 ORDER BY created_at DESC"
        ))
        .bind(purchaser_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(ReservationRow::into_reservation).collect()
    }

    async fn link_intent(
        &self,
        id: Uuid,
        provider: &str,
        intent_id: &str,
        capture_method: CaptureMethod,
    ) -> CoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET gateway_provider = $1, gateway_intent_id = $2,
                gateway_capture_method = $3, updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(provider)
        .bind(intent_id)
        .bind(capture_method.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("reservation {id}")));
        }
        Ok(())
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE reservations SET payment_status = $1, updated_at = NOW() WHERE id = $2 AND payment_status = $3",
        )
        .bind(to.as_str())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_status(&self, id: Uuid, status: ReservationStatus) -> CoreResult<()> {
        sqlx::query("UPDATE reservations SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn release_nights(&self, id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM reservation_nights WHERE reservation_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn try_mark_finalized(&self, id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE reservations SET finalized_at = NOW() WHERE id = $1 AND finalized_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn try_mark_dispatched(&self, id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE reservations SET dispatched_at = NOW() WHERE id = $1 AND dispatched_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn attach_booking_ref(&self, reservation_id: Uuid, booking_ref: &str) -> CoreResult<()> {
        sqlx::query(
            r#"
            UPDATE reservation_attachments
            SET payload = jsonb_set(payload, '{booking_ref}', to_jsonb($1::text))
            WHERE reservation_id = $2
            "#,
        )
        .bind(booking_ref)
        .bind(reservation_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
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
        sqlx::query(
            r#"
            INSERT INTO reservation_changes (id, reservation_id, change_type, change_before, change_after, actor, note)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(reservation_id)
        .bind(change_type)
        .bind(before)
        .bind(after)
        .bind(actor)
        .bind(note)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn inventory_exists(&self, kind: InventoryKind, inventory_id: Uuid) -> CoreResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM inventories WHERE kind = $1 AND id = $2)",
        )
        .bind(kind.as_str())
        .bind(inventory_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(exists)
    }
}
