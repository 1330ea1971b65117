use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::sync::Arc;
use tracing::{error, info, warn};
use vesta_booking::dispatcher::Dispatcher;
use vesta_core::repository::ReservationRepository;
use vesta_shared::models::events::ReservationConfirmedEvent;
use vesta_store::events::topics;

/// Consumes confirmation events and drives the guest-facing dispatch.
/// The dispatch marker makes redelivered events harmless.
pub async fn start_dispatch_worker(
    brokers: String,
    group_id: String,
    repo: Arc<dyn ReservationRepository>,
    dispatcher: Arc<Dispatcher>,
) {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("group.id", &group_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "earliest")
        .create()
        .expect("Consumer creation failed");

    consumer
        .subscribe(&[topics::RESERVATION_CONFIRMED])
        .expect("Can't subscribe");

    info!("Dispatch worker started, listening for confirmations...");

    loop {
        match consumer.recv().await {
            Err(e) => error!("Kafka error: {}", e),
            Ok(m) => {
                let Some(Ok(payload)) = m.payload_view::<str>() else {
                    continue;
                };
                let event: ReservationConfirmedEvent = match serde_json::from_str(payload) {
                    Ok(event) => event,
                    Err(e) => {
                        error!("Error reading payload: {}", e);
                        continue;
                    }
                };
                if let Err(e) = dispatch_one(repo.as_ref(), &dispatcher, &event).await {
                    error!(
                        reservation_id = %event.reservation_id,
                        "Failed to dispatch confirmation: {}",
                        e
                    );
                }
            }
        }
    }
}

async fn dispatch_one(
    repo: &dyn ReservationRepository,
    dispatcher: &Dispatcher,
    event: &ReservationConfirmedEvent,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(reservation) = repo.get(event.reservation_id).await? else {
        warn!(reservation_id = %event.reservation_id, "confirmed event for unknown reservation");
        return Ok(());
    };

    if dispatcher.dispatch(&reservation).await? {
        info!(
            reference_code = %reservation.reference_code,
            "Dispatched confirmation"
        );
    }
    Ok(())
}
