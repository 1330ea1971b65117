use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReservationCreatedEvent {
    pub reservation_id: Uuid,
    pub reference_code: String,
    pub inventory_kind: String,
    pub gross_minor: i64,
    pub currency: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReservationConfirmedEvent {
    pub reservation_id: Uuid,
    pub reference_code: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PaymentSettledEvent {
    pub reservation_id: Uuid,
    pub intent_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct CommissionAccruedEvent {
    pub reservation_id: Uuid,
    pub referrer_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub timestamp: i64,
}
