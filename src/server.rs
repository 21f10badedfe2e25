use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tokio::signal;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    api::{
        handler::{
            enqueue_transfer, fx_convert, fx_spread, fx_status, get_quote, health_check, list_pending,
            metrics_all, metrics_clear, metrics_summary, run_simulation, AppState,
        },
        models::EnqueueRequest,
        streaming::stream_events,
    },
    middleware::{create_cors_layer, rate_limit_middleware, validate_json},
};

pub fn create_app(state: AppState, allowed_origins: &[String]) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    // Write endpoints share one request budget
    let limited = Router::new()
        .route(
            "/crosschain/enqueue",
            post(enqueue_transfer).route_layer(from_fn(validate_json::<EnqueueRequest>)),
        )
        .route("/simulate/run", post(run_simulation))
        .route_layer(from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ws/events", get(stream_events))
        .nest(
            "/api",
            Router::new()
                // Cross-chain simulation
                .route("/crosschain/quote", get(get_quote))
                .route("/crosschain/pending", get(list_pending))
                // Fiat conversion
                .route("/fx/convert", get(fx_convert))
                .route("/fx/spread", get(fx_spread))
                .route("/fx/status", get(fx_status))
                // Dashboard metrics
                .route("/metrics/summary", get(metrics_summary))
                .route("/metrics/all", get(metrics_all))
                .route("/metrics/clear", post(metrics_clear))
                .merge(limited),
        )
        .layer(CompressionLayer::new())
        .layer(create_cors_layer(allowed_origins))
        // Add request tracing
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

/// Serve until Ctrl-C / SIGTERM
pub async fn run_server(app: Router, bind_address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    info!("🛑 Shutdown signal received, draining HTTP server");
}
