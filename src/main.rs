//! cosi-blob-app -- test server for a COSI-provisioned Azure Blob bucket.
//!
//! Reads the mounted `BucketInfo` secret once at startup; a malformed secret
//! aborts startup. SIGTERM/SIGINT stop accepting connections and wait (with
//! a timeout) for in-flight requests. SIGHUP re-reads the secret.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use cosi_blob_app::config::{Config, LoggingConfig};
use cosi_blob_app::AppState;

/// Exit status when the shutdown timeout cuts off in-flight requests.
const FORCED_SHUTDOWN_EXIT_CODE: i32 = 1;

/// Command-line arguments for the test server.
#[derive(Parser, Debug)]
#[command(
    name = "cosi-blob-app",
    version,
    about = "Test server for a COSI-provisioned Azure Blob Storage bucket"
)]
struct Cli {
    /// Path to the YAML configuration file. Built-in defaults apply when
    /// omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the path of the mounted BucketInfo secret.
    #[arg(short, long)]
    secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => cosi_blob_app::config::load_config(path)?,
        None => Config::default(),
    };
    if let Some(secret) = cli.secret {
        config.secret.path = secret;
    }

    init_tracing(&config.logging);
    match &cli.config {
        Some(path) => info!("Loaded configuration from {}", path),
        None => info!("No configuration file given, using defaults"),
    }

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        cosi_blob_app::metrics::init_metrics();
        cosi_blob_app::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let store = cosi_blob_app::storage::connect(&config).await?;
    if let Some(container) = store.default_container() {
        info!("Default container: {}", container);
    } else {
        warn!("No default container; only container-scoped routes will work");
    }

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = Arc::new(AppState::new(config, store));

    #[cfg(unix)]
    spawn_refresh_on_sighup(Arc::clone(&state));

    let app = cosi_blob_app::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("cosi-blob-app listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_timeout))
        .await?;

    info!("cosi-blob-app shut down");

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` takes precedence over
/// `logging.level`.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Re-read the secret and rebuild the store on every SIGHUP.
#[cfg(unix)]
fn spawn_refresh_on_sighup(state: Arc<AppState>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to install SIGHUP handler: {}", e);
                return;
            }
        };
        while hangup.recv().await.is_some() {
            info!("Received SIGHUP, refreshing credentials");
            if let Err(e) = state.refresh().await {
                error!("Credential refresh failed, keeping current store: {:#}", e);
            }
        }
    });
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful
/// shutdown. In-flight requests get `timeout` to finish before the process
/// exits.
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }

    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        error!(
            "In-flight requests still running after {:?}, forcing exit",
            timeout
        );
        std::process::exit(FORCED_SHUTDOWN_EXIT_CODE);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forced_shutdown_reports_failure() {
        assert_ne!(FORCED_SHUTDOWN_EXIT_CODE, 0);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "cosi-blob-app",
            "--bind",
            "127.0.0.1:9000",
            "--secret",
            "/cosi/other/BucketInfo",
        ]);
        assert!(cli.config.is_none());
        assert_eq!(cli.bind.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(cli.secret.as_deref(), Some("/cosi/other/BucketInfo"));
    }
}
