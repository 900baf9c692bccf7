mod api;
mod bootstrap;
mod cards;
mod config;
mod error;
mod middleware;
mod notifications;
mod reconciliation;
mod server;
mod settings;
mod status;

#[cfg(test)]
mod test_support;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,cc_tracker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("❌ Could not listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("❌ Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env may carry RUST_LOG, so load it before tracing
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting CC Tracker backend");

    let config = Config::from_env()?;
    let state = bootstrap::initialize_app_state(&config).await?;

    state.scheduler.start();

    let app = server::create_app(state.clone(), &config);
    server::run_server(app, &config.bind_address, shutdown_signal()).await?;

    state.scheduler.stop().await;
    info!("👋 Server stopped");

    Ok(())
}
