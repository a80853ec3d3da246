//! Embedding Gateway - Main Entry Point
//!
//! Serves rate-limited, cached embeddings from a local ONNX model.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use embedding_gateway::config::Config;
use embedding_gateway::handlers::{self, AppState};
use embedding_gateway::services::InferenceService;

fn main() -> Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    init_tracing(config.json_logs);

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers.max(1))
        .enable_all()
        .build()?
        .block_on(serve(config))
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "embedding_gateway=info,tower_http=debug".into()),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

async fn serve(config: Config) -> Result<()> {
    info!("🚀 Starting Embedding Gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("📦 Model: {} ({}D, max {} tokens)", config.model_name, config.model_dimension, config.max_length);
    info!(
        "🔧 Port: {}, workers: {}, rate limit: {}/s, batch size: {}",
        config.port, config.workers, config.rate_limit_per_second, config.batch_size
    );

    let service = match InferenceService::from_config(&config).await {
        Ok(service) => Arc::new(service),
        Err(e) => {
            tracing::error!("Failed to initialize inference service: {}", e);
            return Err(e);
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = Arc::new(AppState { service });

    let app = handlers::router(state)
        // Middleware
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    info!("✅ Embedding Gateway listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Embedding Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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

    info!("Shutdown signal received");
}
