mod adapters;
mod api;
mod bootstrap;
mod clock;
mod config;
mod error;
mod ledger;
mod middleware;
mod quote_engine;
mod server;
mod settlement;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,settlement_sim=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before reading RUST_LOG
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting cross-chain settlement simulator");

    let config = config::Config::from_env()?;
    let state = bootstrap::initialize_app_state(&config).await?;
    let scheduler = state.scheduler.clone();

    // Create HTTP server
    let app = server::create_app(state, &config.cors_allowed_origins);

    // Run the Server
    server::run_server(app, &config.bind_address).await?;

    // Pending transfers are resolved per the configured policy
    scheduler.shutdown(config.shutdown_policy).await;

    info!("👋 Shutdown complete");
    Ok(())
}
