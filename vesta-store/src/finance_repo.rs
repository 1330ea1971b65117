use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use vesta_core::commission::{Commission, CommissionBasis, CommissionStatus};
use vesta_core::discount::DiscountCode;
use vesta_core::repository::{CommissionRepository, DiscountRepository};
use vesta_core::{CoreError, CoreResult};

use crate::reservation_repo::db_err;

pub struct PgDiscountRepository {
    pool: PgPool,
}

impl PgDiscountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DiscountRow {
    id: Uuid,
    code: String,
    percent_off: Option<f64>,
    special_price: Option<f64>,
    owner_id: Option<Uuid>,
    used_count: i32,
    usage_cap: Option<i32>,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    reservation_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<DiscountRow> for DiscountCode {
    fn from(row: DiscountRow) -> Self {
        DiscountCode {
            id: row.id,
            code: row.code,
            percent_off: row.percent_off,
            special_price: row.special_price,
            owner_id: row.owner_id,
            used_count: row.used_count,
            usage_cap: row.usage_cap,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            reservation_id: row.reservation_id,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl DiscountRepository for PgDiscountRepository {
    async fn get_by_code(&self, code: &str) -> CoreResult<Option<DiscountCode>> {
        let row = sqlx::query_as::<_, DiscountRow>(
            r#"
            SELECT id, code, percent_off, special_price, owner_id, used_count, usage_cap,
                   valid_from, valid_until, reservation_id, created_at
            FROM discount_codes
            WHERE UPPER(code) = UPPER($1)
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(DiscountCode::from))
    }

    async fn increment_usage(&self, id: Uuid, reservation_id: Uuid) -> CoreResult<bool> {
        // The cap guard lives in the WHERE clause so two concurrent
        // finalizers cannot both count the last slot.
        let result = sqlx::query(
            r#"
            UPDATE discount_codes
            SET used_count = used_count + 1, reservation_id = $1
            WHERE id = $2 AND (usage_cap IS NULL OR used_count < usage_cap)
            "#,
        )
        .bind(reservation_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }
}

pub struct PgCommissionRepository {
    pool: PgPool,
}

impl PgCommissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CommissionRow {
    id: Uuid,
    reservation_id: Uuid,
    referrer_id: Uuid,
    amount_minor: i64,
    currency: String,
    basis: String,
    rate_pct: f64,
    status: String,
    eligible_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl CommissionRow {
    fn into_commission(self) -> CoreResult<Commission> {
        let basis = CommissionBasis::parse(&self.basis)
            .ok_or_else(|| CoreError::Internal(format!("unknown commission basis {}", self.basis)))?;
        let status = CommissionStatus::parse(&self.status)
            .ok_or_else(|| CoreError::Internal(format!("unknown commission status {}", self.status)))?;
        Ok(Commission {
            id: self.id,
            reservation_id: self.reservation_id,
            referrer_id: self.referrer_id,
            amount_minor: self.amount_minor,
            currency: self.currency,
            basis,
            rate_pct: self.rate_pct,
            status,
            eligible_at: self.eligible_at,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl CommissionRepository for PgCommissionRepository {
    async fn find_or_create(&self, commission: &Commission) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO commissions
                (id, reservation_id, referrer_id, amount_minor, currency, basis, rate_pct, status, eligible_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (reservation_id, referrer_id) DO NOTHING
            "#,
        )
        .bind(commission.id)
        .bind(commission.reservation_id)
        .bind(commission.referrer_id)
        .bind(commission.amount_minor)
        .bind(&commission.currency)
        .bind(commission.basis.as_str())
        .bind(commission.rate_pct)
        .bind(commission.status.as_str())
        .bind(commission.eligible_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, reservation_id: Uuid, referrer_id: Uuid) -> CoreResult<Option<Commission>> {
        let row = sqlx::query_as::<_, CommissionRow>(
            r#"
            SELECT id, reservation_id, referrer_id, amount_minor, currency, basis, rate_pct,
                   status, eligible_at, created_at
            FROM commissions
            WHERE reservation_id = $1 AND referrer_id = $2
            "#,
        )
        .bind(reservation_id)
        .bind(referrer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(CommissionRow::into_commission).transpose()
    }

    async fn reverse_for_reservation(&self, reservation_id: Uuid) -> CoreResult<u64> {
        let result = sqlx::query(
            "UPDATE commissions SET status = 'REVERSED' WHERE reservation_id = $1 AND status IN ('HOLD', 'ELIGIBLE')",
        )
        .bind(reservation_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn settle_for_referrer(&self, referrer_id: Uuid) -> CoreResult<u64> {
        // A HOLD row past its hold window is payable without an explicit
        // promotion step; the window check lives in the WHERE clause.
        let result = sqlx::query(
            r#"
            UPDATE commissions
            SET status = 'PAID'
            WHERE referrer_id = $1
              AND (status = 'ELIGIBLE' OR (status = 'HOLD' AND eligible_at <= NOW()))
            "#,
        )
        .bind(referrer_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}
