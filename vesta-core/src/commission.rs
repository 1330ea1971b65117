use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionStatus {
    Hold,
    Eligible,
    Paid,
    Reversed,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Hold => "HOLD",
            CommissionStatus::Eligible => "ELIGIBLE",
            CommissionStatus::Paid => "PAID",
            CommissionStatus::Reversed => "REVERSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HOLD" => Some(CommissionStatus::Hold),
            "ELIGIBLE" => Some(CommissionStatus::Eligible),
            "PAID" => Some(CommissionStatus::Paid),
            "REVERSED" => Some(CommissionStatus::Reversed),
            _ => None,
        }
    }
}

/// What the commission rate was applied to. Markup (gross minus net) when
/// the supplier net is known, else the full gross.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionBasis {
    Markup,
    Gross,
}

impl CommissionBasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionBasis::Markup => "MARKUP",
            CommissionBasis::Gross => "GROSS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MARKUP" => Some(CommissionBasis::Markup),
            "GROSS" => Some(CommissionBasis::Gross),
            _ => None,
        }
    }
}

/// Referral credit owed on a confirmed payment. Keyed by
/// (reservation, referrer); find-or-create guarantees at most one row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commission {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub referrer_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub basis: CommissionBasis,
    pub rate_pct: f64,
    pub status: CommissionStatus,
    pub eligible_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
