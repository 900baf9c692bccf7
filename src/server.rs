use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use std::future::Future;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    api::handler::{
        health_check, list_reconciliation_runs, reconciliation_status, run_reconciliation, AppState,
    },
    cards::handlers::{
        create_card, delete_card, list_cards, list_statuses, payment_report, update_card,
    },
    config::Config,
    middleware::{create_cors_layer, rate_limit_middleware, RateLimitLayer},
    settings::handlers::{get_settings, update_settings},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub fn create_app(state: AppState, config: &Config) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let api = Router::new()
        // Cards
        .route("/cards", get(list_cards).post(create_card))
        .route("/cards/:id", put(update_card).delete(delete_card))
        .route("/statuses", get(list_statuses))
        .route("/report", get(payment_report))
        // Notification settings
        .route("/settings", get(get_settings).put(update_settings))
        // Reconciliation
        .route("/reconciliation/run", post(run_reconciliation))
        .route("/reconciliation/status", get(reconciliation_status))
        .route("/reconciliation/runs", get(list_reconciliation_runs))
        .layer(from_fn_with_state(
            RateLimitLayer::per_minute(config.rate_limit_per_minute),
            rate_limit_middleware,
        ));

    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(&config.cors_origins))
                .layer(CompressionLayer::new())
                .layer(request_timeout_layer(REQUEST_TIMEOUT))
                .layer(CatchPanicLayer::new()),
        )
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

/// Requests running past `timeout` are answered with 408
fn request_timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

pub async fn run_server(
    app: Router,
    bind_address: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
