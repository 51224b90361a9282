//! mysqlbeat runtime: process-level wiring
//!
//! Provides [`run()`] for the stock binary, and [`RuntimeBuilder`] for callers
//! who want to swap the database, the output or the metrics address.
//!
//! # Quick start
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     mysqlbeat_runtime::run("mysqlbeat.yml").await
//! }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod prelude;

use mysqlbeat::config::LoggingConfig;
use mysqlbeat::{
    Beat, Config, Database, LogFormat, Metrics, MetricsServer, MySqlDatabase, build_output,
};
use mysqlbeat_core::Emitter;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Run mysqlbeat from a YAML config file until SIGINT or SIGTERM.
///
/// Loads the file, applies `MYSQLBEAT_*` environment overrides, initialises
/// tracing and metrics, then polls until a signal arrives.
pub async fn run(config_path: impl AsRef<Path>) -> anyhow::Result<()> {
    RuntimeBuilder::new(config_path).run().await
}

/// Builder for controlling runtime wiring.
///
/// # Example
///
/// ```ignore
/// RuntimeBuilder::new("mysqlbeat.yml")
///     .output(Arc::new(StdoutEmitter::pretty()))
///     .metrics_addr("127.0.0.1:9102".parse()?)
///     .run()
///     .await
/// ```
pub struct RuntimeBuilder {
    config_path: PathBuf,
    database: Option<Arc<dyn Database>>,
    output: Option<Arc<dyn Emitter>>,
    metrics_addr: Option<SocketAddr>,
}

impl RuntimeBuilder {
    pub fn new(config_path: impl AsRef<Path>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            database: None,
            output: None,
            metrics_addr: None,
        }
    }

    /// Use this database instead of MySQL at the configured address
    pub fn database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    /// Use this output instead of the one named in `output:`
    pub fn output(mut self, output: Arc<dyn Emitter>) -> Self {
        self.output = Some(output);
        self
    }

    /// Serve `/metrics` and `/health` here.
    ///
    /// Default: `metrics.addr` from the config, or `MYSQLBEAT_METRICS_ADDR`.
    /// With neither set, no HTTP server is started.
    pub fn metrics_addr(mut self, addr: SocketAddr) -> Self {
        self.metrics_addr = Some(addr);
        self
    }

    /// Load config, start polling and block until shutdown.
    pub async fn run(self) -> anyhow::Result<()> {
        // ── 1. Load config ───────────────────────────────────────
        let config = Config::load(&self.config_path)?;

        // ── 2. Init tracing ──────────────────────────────────────
        init_tracing(&config.logging)?;

        // ── 3. Validate ──────────────────────────────────────────
        let resolved = config.validate()?;
        info!(
            config = %self.config_path.display(),
            server = %format!("{}:{}", resolved.hostname, resolved.port),
            statements = resolved.request.len(),
            "configuration loaded"
        );

        // ── 4. Init metrics + HTTP server ────────────────────────
        Metrics::init()?;

        // ── 5. Database and output ───────────────────────────────
        let database = self.database.unwrap_or_else(|| {
            Arc::new(MySqlDatabase::new(
                &resolved.hostname,
                resolved.port,
                &resolved.username,
                &resolved.password,
            ))
        });
        let output = self
            .output
            .unwrap_or_else(|| build_output(&resolved.output));

        let metrics_addr = self.metrics_addr.or(resolved.metrics_addr);
        let beat = Beat::from_resolved(resolved, database, output);

        let metrics_handle = metrics_addr.map(|addr| {
            info!(%addr, "metrics server starting");
            MetricsServer::start(addr, Some(beat.state_cell()))
        });

        // ── 6. Poll until a signal arrives ───────────────────────
        let result = beat.run_until(shutdown_signal()).await;

        // ── 7. Shutdown ──────────────────────────────────────────
        if let Some(handle) = metrics_handle {
            handle.abort();
        }
        result?;
        info!("mysqlbeat shutdown complete");

        Ok(())
    }
}

/// Initialise the tracing subscriber from the `logging:` section.
///
/// `RUST_LOG` wins over the configured level. Logs go to stderr; stdout
/// belongs to the event stream.
fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.level))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?,
    }
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
