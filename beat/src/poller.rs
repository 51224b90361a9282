//! Poller - the timer-driven collection loop
//!
//! One poller task per process. Each tick runs the whole [`PollRequest`] in
//! order on the connector's connection, shapes and normalizes every result
//! and publishes the events. Failures stay inside the statement (or, for a
//! lost connection, inside the cycle) that hit them.
//!
//! Shutdown is observed at tick boundaries and between statements.

use crate::connector::{Connection, Connector, QueryResult, SessionError};
use crate::error::BeatError;
use crate::metrics::{Metrics, try_record_statement};
use crate::normalize::normalize;
use crate::publish::{PublishOutcome, Publisher};
use crate::shape::shape;
use crate::state::{PollerState, StateCell};
use crate::statement::{PollRequest, Statement};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Logged once when the loop starts, before the first tick
pub const READINESS_MARKER: &str = "mysqlbeat is running! Hit CTRL-C to stop it.";

/// What one cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub statements_ok: usize,
    pub statements_failed: usize,
    pub events_accepted: usize,
    pub events_rejected: usize,
    /// The cycle was cut short by a connection error
    pub connection_error: bool,
    /// The cycle was cut short by shutdown
    pub interrupted: bool,
}

impl CycleReport {
    fn outcome(&self) -> &'static str {
        if self.connection_error {
            "connection_error"
        } else if self.interrupted {
            "interrupted"
        } else {
            "completed"
        }
    }
}

enum StatementError {
    /// Only this statement is lost
    Failed(BeatError),
    /// No connection could be had; the cycle is over
    ConnectionLost(BeatError),
}

/// Timer-driven collection loop
pub struct Poller {
    period: Duration,
    request: PollRequest,
    connector: Connector,
    publisher: Publisher,
    state: Arc<StateCell>,
    shutdown: watch::Receiver<bool>,
}

impl Poller {
    pub fn new(
        period: Duration,
        request: PollRequest,
        connector: Connector,
        publisher: Publisher,
        state: Arc<StateCell>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            period,
            request,
            connector,
            publisher,
            state,
            shutdown,
        }
    }

    /// Run until shutdown is signaled
    ///
    /// Returns the connector so the caller can close it once the last cycle
    /// has drained.
    pub async fn run(mut self) -> Connector {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("{READINESS_MARKER}");
        info!(
            period_ms = self.period.as_millis() as u64,
            statements = self.request.len(),
            output = self.publisher.output_name(),
            "poller started"
        );

        loop {
            let ticked = {
                let shutdown = &mut self.shutdown;
                tokio::select! {
                    biased;
                    _ = wait_for_shutdown(shutdown) => false,
                    _ = ticker.tick() => true,
                }
            };
            if !ticked || self.shutdown_requested() {
                break;
            }

            let report = self.run_cycle().await;
            debug!(
                ok = report.statements_ok,
                failed = report.statements_failed,
                accepted = report.events_accepted,
                rejected = report.events_rejected,
                connection_error = report.connection_error,
                interrupted = report.interrupted,
                "poll cycle finished"
            );
        }

        let _ = self.state.transition(PollerState::Stopping);
        info!("poller stopped");
        self.connector
    }

    /// Run every statement once
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        if self.state.transition(PollerState::Polling).is_err() {
            return report;
        }

        let started = Instant::now();
        let timestamp = Utc::now();
        self.connector.begin_cycle();
        let mut lease: Option<Connection> = None;

        let request = self.request.clone();
        for statement in request.statements() {
            if self.shutdown_requested() {
                report.interrupted = true;
                debug!(statement = statement.tag(), "shutdown requested, abandoning cycle");
                break;
            }

            let result = match self.execute(&mut lease, statement).await {
                Ok(result) => result,
                Err(StatementError::Failed(e)) => {
                    warn!(statement = statement.tag(), error = %e, "statement failed, skipping");
                    try_record_statement(statement.tag(), false);
                    report.statements_failed += 1;
                    continue;
                }
                Err(StatementError::ConnectionLost(e)) if self.shutdown_requested() => {
                    debug!(
                        statement = statement.tag(),
                        error = %e,
                        "shutdown requested while connecting"
                    );
                    report.interrupted = true;
                    break;
                }
                Err(StatementError::ConnectionLost(e)) => {
                    error!(statement = statement.tag(), error = %e, "skipping rest of cycle");
                    report.connection_error = true;
                    break;
                }
            };

            let batches = match shape(statement.kind(), &result) {
                Ok(batches) => batches,
                Err(message) => {
                    let e = BeatError::Query {
                        statement: statement.tag().to_string(),
                        message,
                    };
                    warn!(statement = statement.tag(), error = %e, "statement failed, skipping");
                    try_record_statement(statement.tag(), false);
                    report.statements_failed += 1;
                    continue;
                }
            };

            try_record_statement(statement.tag(), true);
            report.statements_ok += 1;

            for rows in &batches {
                let event = normalize(rows, statement.tag(), timestamp);
                match self.publisher.publish(event).await {
                    PublishOutcome::Accepted => report.events_accepted += 1,
                    PublishOutcome::Rejected(_) => report.events_rejected += 1,
                }
            }
        }

        if let Some(connection) = lease {
            self.connector.release(connection);
        }

        if let Some(m) = Metrics::get() {
            m.record_cycle(report.outcome(), started.elapsed().as_secs_f64());
            m.set_output_health(self.publisher.health().await);
        }
        let _ = self.state.transition(PollerState::Idle);
        report
    }

    async fn execute(
        &mut self,
        lease: &mut Option<Connection>,
        statement: &Statement,
    ) -> Result<QueryResult, StatementError> {
        let connection = match lease {
            Some(connection) => connection,
            None => {
                let acquired = self
                    .connector
                    .acquire()
                    .await
                    .map_err(StatementError::ConnectionLost)?;
                lease.insert(acquired)
            }
        };

        match connection.query(statement).await {
            Ok(result) => Ok(result),
            Err(SessionError::Query(message)) => Err(StatementError::Failed(BeatError::Query {
                statement: statement.tag().to_string(),
                message,
            })),
            Err(broken @ SessionError::Broken(_)) => {
                // Next statement dials a fresh connection
                if let Some(connection) = lease.take() {
                    self.connector.discard(connection).await;
                }
                Err(StatementError::Failed(BeatError::Query {
                    statement: statement.tag().to_string(),
                    message: broken.to_string(),
                }))
            }
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Resolve once shutdown is signaled or the sender is gone
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
