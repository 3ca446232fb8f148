//! RecycleGate -- mark-for-deletion enforcement gateway.
//!
//! Sits in front of a Swift-style object storage service and refuses to
//! let accounts or objects be deleted without an aged recycle mark.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

/// Command-line arguments for the RecycleGate server.
#[derive(Parser, Debug)]
#[command(
    name = "recyclegate",
    version,
    about = "Mark-for-deletion enforcement gateway for object storage"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "recyclegate.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = recyclegate::config::load_config(&cli.config)?;

    // Initialize tracing / logging. RUST_LOG wins over the config level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));
    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(env_filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    info!("Loaded configuration from {}", cli.config);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    // Initialize Prometheus metrics recorder and register metric descriptions.
    if config.observability.metrics {
        recyclegate::metrics::init_metrics();
        recyclegate::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    // Initialize the upstream storage transport based on config.
    let upstream: Arc<dyn recyclegate::upstream::store::UpstreamStore> =
        match config.upstream.backend.as_str() {
            "memory" => {
                info!("In-memory upstream initialized (development mode)");
                Arc::new(recyclegate::upstream::memory::MemoryUpstream::new())
            }
            "http" | _ => {
                let upstream =
                    recyclegate::upstream::http::HttpUpstream::new(&config.upstream.http)?;
                info!(
                    "HTTP upstream initialized: endpoint={}",
                    config.upstream.http.endpoint
                );
                Arc::new(upstream)
            }
        };

    info!(
        "Recycle grace periods: account={}s object={}s",
        config.recycle.account_recycled_seconds, config.recycle.object_recycled_seconds
    );

    // Build AppState.
    let state = Arc::new(recyclegate::AppState {
        config: config.clone(),
        upstream,
    });

    let app = recyclegate::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("RecycleGate listening on {}", bind_addr);

    // Graceful shutdown: on SIGTERM/SIGINT, stop accepting new connections,
    // wait for in-flight requests to complete, then exit.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("RecycleGate shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
