use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A discount code. Either a percentage off the marked-up gross or a fixed
/// special price; the special price wins when both are present. The usage
/// counter increments exactly once per finalized reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountCode {
    pub id: Uuid,
    pub code: String,
    pub percent_off: Option<f64>,
    pub special_price: Option<f64>,
    pub owner_id: Option<Uuid>,
    pub used_count: i32,
    pub usage_cap: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub reservation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl DiscountCode {
    pub fn at_cap(&self) -> bool {
        match self.usage_cap {
            Some(cap) => self.used_count >= cap,
            None => false,
        }
    }

    pub fn within_window(&self, now: DateTime<Utc>) -> bool {
        if let Some(from) = self.valid_from {
            if now < from {
                return false;
            }
        }
        if let Some(until) = self.valid_until {
            if now > until {
                return false;
            }
        }
        true
    }

    pub fn usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.at_cap() && self.within_window(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn code() -> DiscountCode {
        DiscountCode {
            id: Uuid::new_v4(),
            code: "SPRING10".into(),
            percent_off: Some(10.0),
            special_price: None,
            owner_id: None,
            used_count: 0,
            usage_cap: Some(2),
            valid_from: None,
            valid_until: None,
            reservation_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn cap_blocks_usage() {
        let mut c = code();
        assert!(c.usable_at(Utc::now()));
        c.used_count = 2;
        assert!(c.at_cap());
        assert!(!c.usable_at(Utc::now()));
    }

    #[test]
    fn window_blocks_usage() {
        let mut c = code();
        c.valid_until = Some(Utc::now() - Duration::days(1));
        assert!(!c.usable_at(Utc::now()));
    }
}
