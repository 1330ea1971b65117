extern crate vesta_core;
use axum::{
    extract::State,
    http::Method,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod middleware;
pub mod payments;
pub mod reservations;
pub mod state;
pub mod webhooks;
pub mod worker;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    // Booking creation stays open so anonymous guests can book; the
    // handler reads an optional token for role pricing. Webhooks carry
    // their own shared-secret check.
    let public_routes = Router::new()
        .route("/health", get(health))
        .route(
            "/v1/reservations",
            post(reservations::create_reservation).get(reservations::list_reservations),
        )
        .route("/v1/webhooks/payments", post(webhooks::handle_payment_webhook))
        .route("/v1/webhooks/accounts", post(webhooks::handle_account_webhook));

    let purchaser_routes = Router::new()
        .route("/v1/reservations/{id}", get(reservations::get_reservation))
        .route(
            "/v1/reservations/{id}/payment-intent",
            post(payments::ensure_payment_intent),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::purchaser_auth_middleware,
        ));

    let operator_routes = Router::new()
        .route(
            "/v1/reservations/{id}/confirm",
            post(reservations::confirm_reservation),
        )
        .route(
            "/v1/reservations/{id}/cancel",
            post(reservations::cancel_reservation),
        )
        .route("/v1/reservations/{id}/capture", post(payments::capture_payment))
        .route(
            "/v1/reservations/{id}/payment/cancel",
            post(payments::cancel_payment),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::operator_auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(purchaser_routes)
        .merge(operator_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::resiliency::circuit_breaker_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, impl IntoResponse> {
    let ip = addr.ip().to_string();
    let key = format!("ratelimit:{}", ip);

    match state.redis.check_rate_limit(&key, 100, 60).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => Err((axum::http::StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")),
        Err(_) => Ok(next.run(req).await), // Fail open
    }
}
