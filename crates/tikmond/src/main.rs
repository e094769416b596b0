//! tikmond - tikmon exporter daemon
//!
//! Serves the scrape, discover and reload endpoints, reloads the
//! configuration periodically and sweeps idle device sessions.
//!
//! Usage:
//!   tikmond --config <config.yml> [--mock-fixtures <fixtures.yml>] [-v|-vv]
//!
//! Device sessions are provided by the scriptable mock transport; the
//! fixture file maps command text to the rows or trap it answers with.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser};
use tikmon_api::{create_router, AppState};
use tikmon_core::SharedConfig;
use tikmon_device::transport::mock::{MockConfig, MockConnector};
use tikmon_device::ConnectionPool;
use tikmon_engine::{pool_config, Scraper};
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "tikmond")]
#[command(author, version, about = "Prometheus exporter for RouterOS devices")]
struct Cli {
    /// Root configuration file
    #[arg(short, long, env = "TIKMON_CONFIG")]
    config: PathBuf,

    /// Mock device fixtures (command text to rows or trap)
    #[arg(long, env = "TIKMON_MOCK_FIXTURES")]
    mock_fixtures: Option<PathBuf>,

    /// More output, repeat for trace level
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins over the verbosity flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (plain, json) = if json {
        (None, Some(fmt::layer().json()))
    } else {
        (Some(fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();
}

fn load_connector(path: Option<&PathBuf>) -> anyhow::Result<Arc<MockConnector>> {
    let config = match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading mock fixtures");
            MockConfig::from_file(path).context("failed to load mock fixtures")?
        }
        None => {
            tracing::warn!("No mock fixtures given, every command except the identity probe traps");
            MockConfig::default()
        }
    };
    Ok(Arc::new(MockConnector::new(config)))
}

/// Reload the configuration every `configuration_reload_interval`
fn spawn_reload(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let interval = state
                .config()
                .snapshot()
                .global
                .configuration_reload_interval;
            tokio::time::sleep(interval.max(Duration::from_secs(1))).await;

            tracing::debug!("Periodic configuration reload");
            if let Err(e) = state.reload() {
                tracing::warn!(error = %e, "Periodic reload failed");
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Stopping...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting tikmond");

    let config = SharedConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;
    let config = Arc::new(config);
    let global = config.snapshot().global.clone();
    tracing::info!(
        targets = config.snapshot().targets.len(),
        modules = config.snapshot().modules.len(),
        "Configuration loaded"
    );

    let connector = load_connector(cli.mock_fixtures.as_ref())?;
    let pool = Arc::new(ConnectionPool::new(connector, pool_config(&global)));
    let cleanup = pool.spawn_cleanup();

    let scraper = Arc::new(Scraper::new(Arc::clone(&pool)));
    let state = AppState::new(Arc::clone(&config), scraper);
    let reload = spawn_reload(state.clone());

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], global.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reload.abort();
    drop(cleanup);
    pool.close_all().await;
    tracing::info!("Stopped");

    Ok(())
}
