use async_trait::async_trait;

use crate::reservation::Reservation;
use crate::CoreResult;

/// Downstream confirmation messaging. Fire-and-forget tolerant: a failed
/// dispatch is logged and retried by the caller's redelivery, never by
/// re-running already-succeeded effects.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn dispatch_confirmation(&self, reservation: &Reservation) -> CoreResult<()>;
}

/// What happens after a reservation first transitions into CONFIRMED/PAID.
/// Both the synchronous confirm path and the webhook reconciler feed the
/// same hook; its internal markers keep the effects exactly-once.
#[async_trait]
pub trait PostConfirmationHook: Send + Sync {
    async fn on_confirmed(&self, reservation: &Reservation) -> CoreResult<()>;
}
