use std::sync::Arc;
use tracing::{info, warn};
use vesta_core::payment::{CaptureMethod, GatewayIntent, IntentMetadata, IntentStatus, PaymentGateway};
use vesta_core::repository::ReservationRepository;
use vesta_core::reservation::{PaymentStatus, Reservation};
use vesta_shared::pii::truncate_identity;

use crate::{PaymentError, PaymentResult};

#[derive(Debug, Clone)]
pub struct EnsuredIntent {
    pub intent_id: String,
    pub client_secret: Option<String>,
    pub status: IntentStatus,
    pub capture_method: CaptureMethod,
}

/// Idempotently creates, reuses or repairs the gateway intent bound to a
/// reservation. Gateway calls never run inside a database transaction; the
/// linkage write happens in its own short transaction afterwards, with a
/// compensating cancel if that write fails.
pub struct IntentManager {
    gateway: Arc<dyn PaymentGateway>,
    repo: Arc<dyn ReservationRepository>,
    provider: String,
}

impl IntentManager {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        repo: Arc<dyn ReservationRepository>,
        provider: impl Into<String>,
    ) -> Self {
        Self { gateway, repo, provider: provider.into() }
    }

    /// Total the gateway authorizes: the purchaser charge plus any security
    /// deposit component.
    fn intent_amount(reservation: &Reservation) -> i64 {
        reservation.gross_minor + reservation.deposit_minor
    }

    fn metadata_for(reservation: &Reservation) -> IntentMetadata {
        IntentMetadata {
            reservation_id: reservation.id,
            reference_code: reservation.reference_code.clone(),
            guest_hint: truncate_identity(&reservation.guest.email.0),
        }
    }

    pub async fn ensure_intent(
        &self,
        reservation: &Reservation,
        requested: CaptureMethod,
    ) -> PaymentResult<EnsuredIntent> {
        // A deposit is an authorize-now, settle-later component; it always
        // forces manual capture regardless of what the caller asked for.
        let capture_method = if reservation.deposit_minor > 0 {
            CaptureMethod::Manual
        } else {
            requested
        };
        let amount_minor = Self::intent_amount(reservation);

        if reservation.payment_status == PaymentStatus::Paid {
            if let Some(intent_id) = &reservation.gateway_intent_id {
                let intent = self.gateway.retrieve_intent(intent_id).await?;
                return Ok(Self::ensured(&intent));
            }
        }

        if let Some(intent_id) = &reservation.gateway_intent_id {
            let existing = self.gateway.retrieve_intent(intent_id).await?;
            match existing.status {
                IntentStatus::Succeeded => {
                    // Already settled on the gateway side; the reconciler
                    // owns flipping local payment status.
                    return Ok(Self::ensured(&existing));
                }
                IntentStatus::Canceled | IntentStatus::Failed => {
                    info!(reservation_id = %reservation.id, intent_id = %existing.id,
                        "linked intent is dead, creating a replacement");
                }
                _ => {
                    let currency_drift =
                        !existing.currency.eq_ignore_ascii_case(&reservation.currency);
                    let capture_drift = existing.capture_method != capture_method;
                    if currency_drift || capture_drift {
                        // Currency and capture method are immutable on an
                        // open intent; cancel and start over.
                        let _ = self.gateway.cancel_intent(&existing.id).await?;
                    } else if existing.amount_minor != amount_minor {
                        let updated = self
                            .gateway
                            .update_intent_amount(&existing.id, amount_minor)
                            .await?;
                        return Ok(Self::ensured(&updated));
                    } else {
                        return Ok(Self::ensured(&existing));
                    }
                }
            }
        }

        let intent = self
            .gateway
            .create_intent(
                amount_minor,
                &reservation.currency,
                capture_method,
                Self::metadata_for(reservation),
            )
            .await?;

        // Second, short transaction after the network hop returned.
        if let Err(err) = self
            .repo
            .link_intent(reservation.id, &self.provider, &intent.id, capture_method)
            .await
        {
            warn!(reservation_id = %reservation.id, intent_id = %intent.id,
                "failed to persist intent linkage, cancelling gateway intent: {err}");
            if let Err(cancel_err) = self.gateway.cancel_intent(&intent.id).await {
                warn!(intent_id = %intent.id, "compensating cancel failed: {cancel_err}");
            }
            return Err(err.into());
        }

        Ok(Self::ensured(&intent))
    }

    pub async fn capture(&self, reservation: &Reservation) -> PaymentResult<EnsuredIntent> {
        let intent_id = reservation
            .gateway_intent_id
            .as_deref()
            .ok_or(PaymentError::NotFound(reservation.id))?;
        let intent = self.gateway.capture_intent(intent_id).await?;
        Ok(Self::ensured(&intent))
    }

    pub async fn cancel(&self, reservation: &Reservation) -> PaymentResult<EnsuredIntent> {
        let intent_id = reservation
            .gateway_intent_id
            .as_deref()
            .ok_or(PaymentError::NotFound(reservation.id))?;
        let intent = self.gateway.cancel_intent(intent_id).await?;
        Ok(Self::ensured(&intent))
    }

    fn ensured(intent: &GatewayIntent) -> EnsuredIntent {
        EnsuredIntent {
            intent_id: intent.id.clone(),
            client_secret: intent.client_secret.clone(),
            status: intent.status,
            capture_method: intent.capture_method,
        }
    }
}
