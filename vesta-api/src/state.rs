use std::sync::Arc;
use vesta_booking::builder::ReservationBuilder;
use vesta_booking::confirm::ConfirmationService;
use vesta_core::repository::{CommissionRepository, DiscountRepository, ReservationRepository};
use vesta_payment::intent::IntentManager;
use vesta_payment::reconciler::{PayoutReconciler, Reconciler};
use vesta_store::{EventProducer, RedisClient};

use crate::middleware::resiliency::Resiliency;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn ReservationRepository>,
    pub discounts: Arc<dyn DiscountRepository>,
    pub commissions: Arc<dyn CommissionRepository>,
    pub builder: Arc<ReservationBuilder>,
    pub intents: Arc<IntentManager>,
    pub reconciler: Arc<Reconciler>,
    pub payouts: Arc<PayoutReconciler>,
    pub confirmations: Arc<ConfirmationService>,
    pub redis: Arc<RedisClient>,
    pub kafka: Arc<EventProducer>,
    pub auth: AuthConfig,
    pub webhook_secret: String,
    pub resiliency: Arc<Resiliency>,
}
