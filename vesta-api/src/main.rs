use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vesta_api::{
    app,
    middleware::resiliency::Resiliency,
    state::{AppState, AuthConfig},
};
use vesta_booking::builder::ReservationBuilder;
use vesta_booking::confirm::ConfirmationService;
use vesta_booking::dispatcher::{ConfirmationPipeline, Dispatcher, LoggingNotifier};
use vesta_booking::finalizer::{CommissionRules, Finalizer};
use vesta_booking::supplier::{MockSupplier, StaticDirectory};
use vesta_core::repository::{CommissionRepository, DiscountRepository, ReservationRepository};
use vesta_core::reservation::InventoryKind;
use vesta_payment::gateway::MockGateway;
use vesta_payment::intent::IntentManager;
use vesta_payment::reconciler::{ConfirmationPolicy, PayoutReconciler, Reconciler};
use vesta_pricing::fx::FxConverter;
use vesta_pricing::markup::MarkupEngine;
use vesta_store::fx::ConfigRateSource;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vesta_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = vesta_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Vesta API on port {}", config.server.port);

    // Postgres
    let db = vesta_store::DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    // Redis Connection
    let redis_client = vesta_store::RedisClient::new(&config.redis.url)
        .await
        .expect("Failed to connect to Redis");
    let redis_arc = Arc::new(redis_client);

    // Kafka Connection
    let kafka_producer = vesta_store::EventProducer::new(&config.kafka.brokers)
        .expect("Failed to create Kafka producer");
    let kafka_arc = Arc::new(kafka_producer);

    let repo: Arc<dyn ReservationRepository> =
        Arc::new(vesta_store::reservation_repo::PgReservationRepository::new(db.pool.clone()));
    let discounts: Arc<dyn DiscountRepository> =
        Arc::new(vesta_store::finance_repo::PgDiscountRepository::new(db.pool.clone()));
    let commissions: Arc<dyn CommissionRepository> =
        Arc::new(vesta_store::finance_repo::PgCommissionRepository::new(db.pool.clone()));

    // Market rates fall back to config-pinned values; Redis fronts them.
    let fx = Arc::new(FxConverter::new(
        redis_arc.clone(),
        Arc::new(ConfigRateSource::new(config.pricing.fx_rates.clone())),
        config.pricing.fx_cache_ttl_seconds,
    ));

    // Sandbox adapters until live supplier and gateway credentials land.
    let supplier = Arc::new(MockSupplier::new());
    let suppliers = Arc::new(
        StaticDirectory::new()
            .with(InventoryKind::SupplierAlfa, supplier.clone())
            .with(InventoryKind::SupplierBravo, supplier),
    );
    let gateway = Arc::new(MockGateway::new());

    let builder = Arc::new(ReservationBuilder::new(
        repo.clone(),
        discounts.clone(),
        suppliers.clone(),
        gateway.clone(),
        MarkupEngine::new(config.pricing.markup.clone()),
        fx.clone(),
        config.pricing.referral_first_booking_pct,
    ));

    let intents = Arc::new(IntentManager::new(
        gateway.clone(),
        repo.clone(),
        config.payment.provider.clone(),
    ));

    let finalizer = Finalizer::new(
        repo.clone(),
        discounts.clone(),
        commissions.clone(),
        gateway.clone(),
        fx.clone(),
        CommissionRules {
            rate_pct: config.commission.rate_pct,
            cap_amount: config.commission.cap_amount,
            cap_currency: config.commission.cap_currency.clone(),
            hold_days: config.commission.hold_days,
        },
    );
    let dispatcher = Dispatcher::new(repo.clone(), Arc::new(LoggingNotifier));
    let pipeline = Arc::new(ConfirmationPipeline::new(finalizer, dispatcher));

    let manual_gate: Vec<InventoryKind> = config
        .payment
        .manual_confirmation_kinds
        .iter()
        .filter_map(|raw| InventoryKind::parse(raw))
        .collect();
    let reconciler = Arc::new(Reconciler::new(
        repo.clone(),
        pipeline,
        ConfirmationPolicy::with_manual_gate(manual_gate),
        config.payment.settlement_tolerance_minor,
    ));

    let confirmations = Arc::new(ConfirmationService::new(
        repo.clone(),
        commissions.clone(),
        suppliers,
        gateway,
        Duration::from_secs(config.payment.supplier_timeout_seconds),
    ));

    let app_state = AppState {
        repo: repo.clone(),
        discounts,
        commissions: commissions.clone(),
        builder,
        intents,
        reconciler,
        payouts: Arc::new(PayoutReconciler::new(commissions)),
        confirmations,
        redis: redis_arc,
        kafka: kafka_arc,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        webhook_secret: config.payment.webhook_secret.clone(),
        resiliency: Arc::new(Resiliency::new()),
    };

    // Dispatch worker picks up confirmation events and sends guest
    // notifications out of band.
    let worker_repo = repo.clone();
    let worker_dispatcher = Arc::new(Dispatcher::new(repo, Arc::new(LoggingNotifier)));
    tokio::spawn(vesta_api::worker::start_dispatch_worker(
        config.kafka.brokers.clone(),
        "vesta-dispatch".to_string(),
        worker_repo,
        worker_dispatcher,
    ));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .unwrap();
}
