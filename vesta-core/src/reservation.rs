use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vesta_shared::pii::Masked;

/// Reservation lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
            ReservationStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ReservationStatus::Pending),
            "CONFIRMED" => Some(ReservationStatus::Confirmed),
            "CANCELLED" => Some(ReservationStatus::Cancelled),
            "COMPLETED" => Some(ReservationStatus::Completed),
            _ => None,
        }
    }
}

/// Payment status, advanced only by the reconciler's compare-and-swap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    Pending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNPAID" => Some(PaymentStatus::Unpaid),
            "PENDING" => Some(PaymentStatus::Pending),
            "PAID" => Some(PaymentStatus::Paid),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// Which inventory source a reservation draws on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InventoryKind {
    LocalHotel,
    Home,
    SupplierAlfa,
    SupplierBravo,
    Outside,
}

impl InventoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryKind::LocalHotel => "LOCAL_HOTEL",
            InventoryKind::Home => "HOME",
            InventoryKind::SupplierAlfa => "SUPPLIER_ALFA",
            InventoryKind::SupplierBravo => "SUPPLIER_BRAVO",
            InventoryKind::Outside => "OUTSIDE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOCAL_HOTEL" => Some(InventoryKind::LocalHotel),
            "HOME" => Some(InventoryKind::Home),
            "SUPPLIER_ALFA" => Some(InventoryKind::SupplierAlfa),
            "SUPPLIER_BRAVO" => Some(InventoryKind::SupplierBravo),
            "OUTSIDE" => Some(InventoryKind::Outside),
            _ => None,
        }
    }

    /// Owned inventory carries its own calendar, so overlapping
    /// non-cancelled reservations must be blocked at booking time.
    pub fn is_owned(&self) -> bool {
        matches!(self, InventoryKind::LocalHotel | InventoryKind::Home)
    }

    /// Supplier-backed inventory needs an outbound booking call before the
    /// reservation can be confirmed.
    pub fn is_supplier(&self) -> bool {
        matches!(self, InventoryKind::SupplierAlfa | InventoryKind::SupplierBravo)
    }
}

/// Contact snapshot taken at booking time. The email is masked in Debug
/// output so it never leaks through log macros.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestContact {
    pub full_name: String,
    pub email: Masked<String>,
    pub phone: Option<String>,
}

/// Immutable, inventory-type-specific snapshot attached to a Reservation.
/// One variant per source; the only post-booking mutation is attaching the
/// supplier confirmation reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InventoryAttachment {
    LocalHotel {
        room_name: String,
        board: Option<String>,
        rate_plan: Option<String>,
        cancellation_policy: Option<String>,
    },
    Home {
        home_name: String,
        house_rules: Option<String>,
        cancellation_policy: Option<String>,
    },
    SupplierAlfa {
        offer_id: String,
        option_id: String,
        room_name: String,
        board: Option<String>,
        cancellation_policy: Option<String>,
        booking_ref: Option<String>,
    },
    SupplierBravo {
        offer_id: String,
        room_name: String,
        rate_plan: Option<String>,
        cancellation_policy: Option<String>,
        booking_ref: Option<String>,
    },
    Outside {
        vendor_name: Option<String>,
        note: Option<String>,
    },
}

impl InventoryAttachment {
    pub fn kind(&self) -> InventoryKind {
        match self {
            InventoryAttachment::LocalHotel { .. } => InventoryKind::LocalHotel,
            InventoryAttachment::Home { .. } => InventoryKind::Home,
            InventoryAttachment::SupplierAlfa { .. } => InventoryKind::SupplierAlfa,
            InventoryAttachment::SupplierBravo { .. } => InventoryKind::SupplierBravo,
            InventoryAttachment::Outside { .. } => InventoryKind::Outside,
        }
    }

    pub fn booking_ref(&self) -> Option<&str> {
        match self {
            InventoryAttachment::SupplierAlfa { booking_ref, .. }
            | InventoryAttachment::SupplierBravo { booking_ref, .. } => booking_ref.as_deref(),
            _ => None,
        }
    }
}

/// The aggregate root of a guest booking. Created PENDING/UNPAID together
/// with its attachment in one transaction, never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub reference_code: String,
    pub purchaser_id: Option<String>,
    pub guest: GuestContact,
    pub inventory_kind: InventoryKind,
    pub inventory_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub nights: i64,
    pub adults: i32,
    pub children: i32,
    pub gross_minor: i64,
    pub net_minor: Option<i64>,
    pub deposit_minor: i64,
    pub currency: String,
    pub pricing_snapshot: serde_json::Value,
    pub status: ReservationStatus,
    pub payment_status: PaymentStatus,
    pub gateway_provider: Option<String>,
    pub gateway_intent_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Human-facing reference code derived from the id, in the same family
    /// as fulfillment barcodes ("VES-3F2A9C41").
    pub fn reference_code_for(id: Uuid) -> String {
        let simple = id.simple().to_string();
        format!("VES-{}", simple[..8].to_uppercase())
    }

    /// Markup actually charged on top of the supplier net, when net is known.
    pub fn markup_minor(&self) -> Option<i64> {
        self.net_minor.map(|net| self.gross_minor - net)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ReservationStatus::Cancelled | ReservationStatus::Completed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_code_shape() {
        let id = Uuid::new_v4();
        let code = Reservation::reference_code_for(id);
        assert!(code.starts_with("VES-"));
        assert_eq!(code.len(), 12);
        assert_eq!(code, code.to_uppercase());
    }

    #[test]
    fn owned_inventory_kinds() {
        assert!(InventoryKind::LocalHotel.is_owned());
        assert!(InventoryKind::Home.is_owned());
        assert!(!InventoryKind::SupplierAlfa.is_owned());
        assert!(!InventoryKind::Outside.is_owned());
    }

    #[test]
    fn attachment_round_trips_with_kind_tag() {
        let attachment = InventoryAttachment::SupplierAlfa {
            offer_id: "off-1".into(),
            option_id: "opt-9".into(),
            room_name: "Double Deluxe".into(),
            board: Some("BB".into()),
            cancellation_policy: None,
            booking_ref: None,
        };
        let json = serde_json::to_value(&attachment).unwrap();
        assert_eq!(json["kind"], "SUPPLIER_ALFA");
        let back: InventoryAttachment = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), InventoryKind::SupplierAlfa);
    }
}
