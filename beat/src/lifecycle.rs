//! Lifecycle controller
//!
//! [`Beat`] is a validated, not yet running collector. [`Beat::start`] spawns
//! the poller and returns a [`RunningBeat`]; [`RunningBeat::stop`] drains the
//! in-flight cycle, closes the connector and shuts the output down.
//!
//! # Example
//!
//! ```ignore
//! let config = Config::load("mysqlbeat.yml")?;
//! let resolved = config.validate()?;
//! let database = Arc::new(MySqlDatabase::new(
//!     &resolved.hostname,
//!     resolved.port,
//!     &resolved.username,
//!     &resolved.password,
//! ));
//! let output = build_output(&resolved.output);
//!
//! Beat::from_resolved(resolved, database, output)
//!     .run_until(tokio::signal::ctrl_c())
//!     .await?;
//! ```

use crate::config::{Config, ResolvedConfig};
use crate::connector::{Connector, Database};
use crate::error::{BeatError, Result};
use crate::poller::Poller;
use crate::publish::Publisher;
use crate::state::{PollerState, StateCell};
use mysqlbeat_core::Emitter;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

/// A configured collector, ready to start
pub struct Beat {
    config: ResolvedConfig,
    database: Arc<dyn Database>,
    output: Arc<dyn Emitter>,
    state: Arc<StateCell>,
}

impl Beat {
    /// Validate `config` and build a beat
    ///
    /// Invalid configuration is a fatal [`BeatError::Configuration`].
    pub fn new(
        config: &Config,
        database: Arc<dyn Database>,
        output: Arc<dyn Emitter>,
    ) -> Result<Self> {
        Ok(Self::from_resolved(config.validate()?, database, output))
    }

    /// Build from an already validated configuration
    pub fn from_resolved(
        config: ResolvedConfig,
        database: Arc<dyn Database>,
        output: Arc<dyn Emitter>,
    ) -> Self {
        Self {
            config,
            database,
            output,
            state: Arc::new(StateCell::new()),
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Poller state cell, shared with the running beat
    pub fn state_cell(&self) -> Arc<StateCell> {
        Arc::clone(&self.state)
    }

    /// Bring up the connector then the poller
    ///
    /// Must be called inside a tokio runtime. The connection itself is
    /// opened lazily by the first cycle.
    pub fn start(self) -> RunningBeat {
        let state = self.state;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            server = %self.database.describe(),
            period_ms = self.config.period.as_millis() as u64,
            statements = self.config.request.len(),
            "starting mysqlbeat"
        );

        let connector = Connector::new(self.database, self.config.connector_config())
            .with_shutdown(shutdown_rx.clone());
        let publisher = Publisher::new(self.output);
        let poller = Poller::new(
            self.config.period,
            self.config.request.clone(),
            connector,
            publisher.clone(),
            Arc::clone(&state),
            shutdown_rx,
        );

        RunningBeat {
            state,
            shutdown: shutdown_tx,
            poller: Some(tokio::spawn(poller.run())),
            publisher,
        }
    }

    /// Start, wait for `signal` (or an unexpected poller exit), then stop
    pub async fn run_until<S>(self, signal: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let mut running = self.start();

        let early_exit = match running.poller.as_mut() {
            Some(handle) => {
                tokio::select! {
                    _ = signal => None,
                    joined = handle => Some(joined),
                }
            }
            None => None,
        };

        match early_exit {
            None => running.stop().await,
            Some(joined) => {
                warn!("poller exited before shutdown was requested");
                running.poller = None;
                running.teardown(joined).await
            }
        }
    }
}

/// Handle to a started beat
pub struct RunningBeat {
    state: Arc<StateCell>,
    shutdown: watch::Sender<bool>,
    poller: Option<JoinHandle<Connector>>,
    publisher: Publisher,
}

impl RunningBeat {
    pub fn state(&self) -> PollerState {
        self.state.get()
    }

    /// Watch poller state changes
    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }

    /// Shared state cell, e.g. for the health endpoint
    pub fn state_cell(&self) -> Arc<StateCell> {
        Arc::clone(&self.state)
    }

    /// Stop polling and release everything
    ///
    /// Waits for the in-flight cycle. Idempotent: once stopped, later calls
    /// return `Ok` and the state stays [`PollerState::Stopped`].
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.poller.take() else {
            debug!("mysqlbeat already stopped");
            return Ok(());
        };

        info!(state = %self.state.get(), "stopping mysqlbeat");
        let _ = self.shutdown.send(true);
        let joined = handle.await;
        self.teardown(joined).await
    }

    async fn teardown(&mut self, joined: std::result::Result<Connector, JoinError>) -> Result<()> {
        let mut first_error = None;

        match joined {
            Ok(mut connector) => {
                if let Err(e) = connector.close().await {
                    error!(error = %e, "failed to close database connection");
                    first_error = Some(e);
                }
            }
            Err(e) => {
                error!(error = %e, "poller task failed");
                first_error = Some(BeatError::Shutdown(format!("poller task failed: {e}")));
                let _ = self.state.transition(PollerState::Stopping);
            }
        }

        if let Err(e) = self.publisher.shutdown().await {
            error!(output = self.publisher.output_name(), error = %e, "failed to shut output down");
            first_error.get_or_insert(BeatError::Shutdown(format!("output shutdown: {e}")));
        }

        let _ = self.state.transition(PollerState::Stopped);

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("mysqlbeat stopped");
                Ok(())
            }
        }
    }
}

impl Drop for RunningBeat {
    fn drop(&mut self) {
        // Dropped without stop(): let the poller wind down on its own
        if self.poller.is_some() {
            let _ = self.shutdown.send(true);
        }
    }
}
