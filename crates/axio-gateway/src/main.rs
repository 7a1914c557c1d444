//! axio-gateway: realtime chat gateway
//!
//! Serves the axio realtime server through axum with the demo handlers.
//!
//! Usage:
//!   axio-gateway                   - Start the gateway
//!   axio-gateway --config <path>   - Start with an explicit config file
//!   axio-gateway --help            - Show help

mod chat;
mod config;
mod error;
mod middleware;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use axio_bridge::Wrapper;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Run mode
#[derive(Debug, PartialEq)]
enum RunMode {
    /// Start the gateway
    Serve { config: Option<PathBuf> },
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = parse_args(std::env::args().skip(1))?;

    let config_path = match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("axio-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Serve { config } => config,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load(config_path.as_deref()).context("Config error")?;

    tracing::info!("Starting axio-gateway...");
    tracing::info!(
        "Realtime path: {}, context policy: {:?}",
        config.http.path,
        config.bridge.context_policy
    );

    run_server(config).await
}

/// Parse command line arguments
fn parse_args<I>(args: I) -> anyhow::Result<RunMode>
where
    I: IntoIterator<Item = String>,
{
    let mut config = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-v" => return Ok(RunMode::Version),
            "--config" | "-c" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
                config = Some(PathBuf::from(path));
            }
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }

    Ok(RunMode::Serve { config })
}

/// Print help message
fn print_help() {
    println!("axio-gateway - realtime chat gateway");
    println!();
    println!("Usage:");
    println!("  axio-gateway                   Start the gateway");
    println!("  axio-gateway --config <path>   Read settings from <path>");
    println!("  axio-gateway --help            Show this help message");
    println!("  axio-gateway --version         Show version");
    println!();
    println!("Without --config, ./{} is used when present.", config::DEFAULT_CONFIG_FILE);
    println!();
    println!("Environment Variables:");
    println!("  AXIO_HOST              Listen host (default: 0.0.0.0)");
    println!("  AXIO_PORT              Listen port (default: 3000)");
    println!("  AXIO_PATH              Realtime path prefix (default: /socket.io)");
    println!("  AXIO_PING_INTERVAL_MS  Ping interval (default: 25000)");
    println!("  AXIO_PING_TIMEOUT_MS   Ping timeout (default: 20000)");
    println!("  AXIO_MAX_PAYLOAD       Max inbound message size (default: 1000000)");
    println!("  AXIO_WRITE_BUFFER      Outbound frames per connection (default: 64)");
    println!("  AXIO_ACCEPT_BACKLOG    Pending upgraded sockets (default: 128)");
    println!("  AXIO_CONTEXT_POLICY    latest or per_connection (default: latest)");
    println!("  RUST_LOG               Log filter");
}

/// Build the HTTP application
fn app(config: &Config) -> Router {
    let bridge = Wrapper::new(config.options()).with_policy(config.bridge.context_policy);
    chat::register(&bridge);

    axio_bridge::router(Arc::new(bridge), &config.http.path)
        .layer(axum::middleware::from_fn(middleware::request_values))
        .layer(TraceLayer::new_for_http())
}

/// Serve until Ctrl+C
async fn run_server(config: Config) -> anyhow::Result<()> {
    let addr = config.addr()?;
    let app = app(&config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);
    tracing::info!("Press Ctrl+C to exit");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
        tracing::info!("Shutting down...");
    })
    .await?;

    Ok(())
}
