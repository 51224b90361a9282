//! Connector - owns the single database connection
//!
//! The connector hands its connection out as a [`Connection`] lease and takes
//! it back with [`Connector::release`]. A lease that hit a broken link goes to
//! [`Connector::discard`] instead and the next [`Connector::acquire`] dials a
//! fresh session. Dialing is bounded per poll cycle, each dial is bounded by
//! `connect_timeout`, and a shutdown signal ends dialing at once.

pub mod mysql;

use crate::backoff::BackoffConfig;
use crate::error::{BeatError, Result};
use crate::metrics::try_record_connection_attempt;
use crate::statement::Statement;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use mysql::MySqlDatabase;

/// Attempts allowed per cycle when none is configured
pub const DEFAULT_MAX_CONNECT_ATTEMPTS: u32 = 3;

/// Limit on one dial (network, handshake and authentication)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Result set of one statement, every cell as text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    /// Column names in server order
    pub columns: Vec<String>,
    /// Rows of nullable cells, same order as `columns`
    pub rows: Vec<Vec<Option<String>>>,
}

/// Failure reported by a [`Database`] or [`Session`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The link is unusable and must be replaced
    #[error("connection broken: {0}")]
    Broken(String),

    /// The statement failed but the link is still good
    #[error("{0}")]
    Query(String),
}

impl SessionError {
    pub fn is_broken(&self) -> bool {
        matches!(self, SessionError::Broken(_))
    }
}

/// Something that can open sessions to a database server
#[async_trait]
pub trait Database: Send + Sync {
    /// Human readable target, e.g. `127.0.0.1:3306`
    fn describe(&self) -> String;

    /// Open a new session (network, handshake and authentication)
    async fn connect(&self) -> std::result::Result<Box<dyn Session>, SessionError>;
}

/// One open link to the server
#[async_trait]
pub trait Session: Send {
    /// Run a read-only statement and return its rows as text
    async fn query(&mut self, sql: &str) -> std::result::Result<QueryResult, SessionError>;

    /// Check the link is alive
    async fn ping(&mut self) -> std::result::Result<(), SessionError>;

    /// Terminate the link
    async fn close(self: Box<Self>) -> std::result::Result<(), SessionError>;
}

/// Connector settings
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Dial attempts allowed per poll cycle
    pub max_attempts: u32,
    /// Delays between dial attempts
    pub backoff: BackoffConfig,
    /// Limit on each dial
    pub connect_timeout: Duration,
    /// Per-statement timeout; `None` waits forever
    pub query_timeout: Option<Duration>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_CONNECT_ATTEMPTS,
            backoff: BackoffConfig {
                max_delay: Duration::from_secs(5),
                ..Default::default()
            },
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            query_timeout: None,
        }
    }
}

/// A leased connection
///
/// Obtained from [`Connector::acquire`]; hand it back through
/// [`Connector::release`] or [`Connector::discard`].
pub struct Connection {
    session: Box<dyn Session>,
    query_timeout: Option<Duration>,
}

impl Connection {
    /// Run one statement on the leased session
    ///
    /// A timeout counts as a broken link since the session state is unknown.
    pub async fn query(
        &mut self,
        statement: &Statement,
    ) -> std::result::Result<QueryResult, SessionError> {
        let fut = self.session.query(statement.sql());
        match self.query_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(SessionError::Broken(format!(
                    "statement timed out after {}ms",
                    limit.as_millis()
                ))),
            },
            None => fut.await,
        }
    }
}

/// Owner of the single database connection
pub struct Connector {
    database: Arc<dyn Database>,
    config: ConnectorConfig,
    idle: Option<Box<dyn Session>>,
    /// Dial attempts spent in the current cycle
    attempts_used: u32,
    closed: bool,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Connector {
    pub fn new(database: Arc<dyn Database>, config: ConnectorConfig) -> Self {
        Self {
            database,
            config,
            idle: None,
            attempts_used: 0,
            closed: false,
            shutdown: None,
        }
    }

    /// Stop dialing as soon as `shutdown` turns true
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Reset the dial budget at the start of a poll cycle
    pub fn begin_cycle(&mut self) {
        self.attempts_used = 0;
    }

    /// Whether a session is parked and ready to lease
    pub fn has_idle(&self) -> bool {
        self.idle.is_some()
    }

    /// Whether [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Lease the connection, dialing if none is open
    ///
    /// Fails with [`BeatError::Connection`] once this cycle's dial budget is
    /// spent, or as soon as shutdown is signaled while waiting or dialing.
    pub async fn acquire(&mut self) -> Result<Connection> {
        if self.closed {
            return Err(BeatError::Connection {
                attempts: 0,
                message: "connector is closed".to_string(),
            });
        }

        let server = self.database.describe();

        if let Some(mut session) = self.idle.take() {
            match session.ping().await {
                Ok(()) => return Ok(self.lease(session)),
                Err(e) => {
                    debug!(server = %server, error = %e, "idle connection failed ping, reconnecting");
                    if let Err(e) = session.close().await {
                        debug!(server = %server, error = %e, "closing stale connection failed");
                    }
                }
            }
        }

        let mut last_error = None;

        while self.attempts_used < self.config.max_attempts {
            if self.attempts_used > 0 {
                debug!(
                    server = %server,
                    attempt = self.attempts_used + 1,
                    "waiting before reconnect"
                );
            }
            let waited = match self.shutdown.as_mut() {
                Some(rx) => self.config.backoff.pause(self.attempts_used, rx).await,
                None => {
                    tokio::time::sleep(self.config.backoff.delay_for_attempt(self.attempts_used))
                        .await;
                    true
                }
            };
            if !waited {
                return Err(self.stopped());
            }
            self.attempts_used += 1;

            let limit = self.config.connect_timeout;
            let dial = tokio::time::timeout(limit, self.database.connect());
            let dialed = match self.shutdown.as_mut() {
                Some(rx) => tokio::select! {
                    biased;
                    _ = rx.wait_for(|stop| *stop) => None,
                    dialed = dial => Some(dialed),
                },
                None => Some(dial.await),
            };
            let Some(dialed) = dialed else {
                return Err(self.stopped());
            };
            let dialed = dialed.unwrap_or_else(|_| {
                Err(SessionError::Broken(format!(
                    "connect timed out after {}ms",
                    limit.as_millis()
                )))
            });

            match dialed {
                Ok(session) => {
                    try_record_connection_attempt(true);
                    info!(
                        server = %server,
                        attempt = self.attempts_used,
                        "connected to database"
                    );
                    return Ok(self.lease(session));
                }
                Err(e) => {
                    try_record_connection_attempt(false);
                    warn!(
                        server = %server,
                        attempt = self.attempts_used,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "connection attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(BeatError::Connection {
            attempts: self.attempts_used,
            message: match last_error {
                Some(e) => e.to_string(),
                None => "no connection attempts left in this cycle".to_string(),
            },
        })
    }

    /// Park a healthy lease for the next acquire
    pub fn release(&mut self, connection: Connection) {
        // Dropping the session tears the link down
        if !self.closed {
            self.idle = Some(connection.session);
        }
    }

    /// Drop a lease whose link is broken
    pub async fn discard(&mut self, connection: Connection) {
        debug!(server = %self.database.describe(), "discarding broken connection");
        if let Err(e) = connection.session.close().await {
            debug!(error = %e, "closing broken connection failed");
        }
    }

    /// Terminate the idle connection, if any
    ///
    /// Idempotent: later calls are no-ops.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(session) = self.idle.take() {
            session.close().await.map_err(|e| {
                BeatError::Shutdown(format!("closing database connection: {e}"))
            })?;
            info!(server = %self.database.describe(), "database connection closed");
        }
        Ok(())
    }

    fn stopped(&self) -> BeatError {
        debug!(
            server = %self.database.describe(),
            attempts = self.attempts_used,
            "shutdown requested, giving up on connecting"
        );
        BeatError::Connection {
            attempts: self.attempts_used,
            message: "shutdown requested".to_string(),
        }
    }

    fn lease(&self, session: Box<dyn Session>) -> Connection {
        Connection {
            session,
            query_timeout: self.config.query_timeout,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::statement::StatementKind;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted database: pops one connect outcome per dial
    #[derive(Default)]
    struct ScriptedDatabase {
        outcomes: Mutex<VecDeque<bool>>,
        dials: AtomicU32,
        closes: Arc<AtomicU32>,
        hang: bool,
        hang_connect: bool,
        stale: bool,
    }

    impl ScriptedDatabase {
        fn new(outcomes: &[bool]) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.iter().copied().collect()),
                ..Default::default()
            }
        }
    }

    struct ScriptedSession {
        closes: Arc<AtomicU32>,
        hang: bool,
        stale: bool,
    }

    #[async_trait]
    impl Session for ScriptedSession {
        async fn query(&mut self, _sql: &str) -> std::result::Result<QueryResult, SessionError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(QueryResult::default())
        }

        async fn ping(&mut self) -> std::result::Result<(), SessionError> {
            if self.stale {
                return Err(SessionError::Broken("server has gone away".into()));
            }
            Ok(())
        }

        async fn close(self: Box<Self>) -> std::result::Result<(), SessionError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl Database for ScriptedDatabase {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        async fn connect(&self) -> std::result::Result<Box<dyn Session>, SessionError> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            if self.hang_connect {
                std::future::pending::<()>().await;
            }
            if self.outcomes.lock().pop_front().unwrap_or(true) {
                Ok(Box::new(ScriptedSession {
                    closes: self.closes.clone(),
                    hang: self.hang,
                    stale: self.stale,
                }))
            } else {
                Err(SessionError::Broken("connection refused".into()))
            }
        }
    }

    fn connector(db: Arc<ScriptedDatabase>, max_attempts: u32) -> Connector {
        Connector::new(
            db,
            ConnectorConfig {
                max_attempts,
                ..Default::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_reuses_released_connection() {
        let db = Arc::new(ScriptedDatabase::new(&[]));
        let mut conn = connector(db.clone(), 3);

        conn.begin_cycle();
        let lease = conn.acquire().await.unwrap();
        conn.release(lease);
        assert!(conn.has_idle());

        let lease = conn.acquire().await.unwrap();
        conn.release(lease);
        assert_eq!(db.dials.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_retries_within_budget() {
        let db = Arc::new(ScriptedDatabase::new(&[false, false, true]));
        let mut conn = connector(db.clone(), 3);

        conn.begin_cycle();
        assert!(conn.acquire().await.is_ok());
        assert_eq!(db.dials.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_fails_after_budget() {
        let db = Arc::new(ScriptedDatabase::new(&[false, false, false, true]));
        let mut conn = connector(db.clone(), 3);

        conn.begin_cycle();
        let err = conn.acquire().await.err().unwrap();
        match err {
            BeatError::Connection { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("connection refused"));
            }
            other => panic!("unexpected error: {other}"),
        }

        // Budget is spent until the next cycle
        assert!(conn.acquire().await.is_err());
        assert_eq!(db.dials.load(Ordering::SeqCst), 3);

        conn.begin_cycle();
        assert!(conn.acquire().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_forces_reconnect() {
        let db = Arc::new(ScriptedDatabase::new(&[]));
        let mut conn = connector(db.clone(), 3);

        conn.begin_cycle();
        let lease = conn.acquire().await.unwrap();
        conn.discard(lease).await;
        assert!(!conn.has_idle());
        assert_eq!(db.closes.load(Ordering::SeqCst), 1);

        let _lease = conn.acquire().await.unwrap();
        assert_eq!(db.dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_idle_connection_is_replaced() {
        let db = Arc::new(ScriptedDatabase {
            stale: true,
            ..Default::default()
        });
        let mut conn = connector(db.clone(), 3);

        conn.begin_cycle();
        let lease = conn.acquire().await.unwrap();
        conn.release(lease);

        conn.begin_cycle();
        let _lease = conn.acquire().await.unwrap();
        assert_eq!(db.dials.load(Ordering::SeqCst), 2);
        assert_eq!(db.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let db = Arc::new(ScriptedDatabase::new(&[]));
        let mut conn = connector(db.clone(), 3);

        conn.begin_cycle();
        let lease = conn.acquire().await.unwrap();
        conn.release(lease);

        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert!(conn.is_closed());
        assert_eq!(db.closes.load(Ordering::SeqCst), 1);
        assert!(conn.acquire().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_dialing() {
        let db = Arc::new(ScriptedDatabase::new(&[false; 10]));
        let (tx, rx) = watch::channel(false);
        let mut conn = connector(db.clone(), 10).with_shutdown(rx);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            tx.send(true).unwrap();
            tx
        });

        let started = tokio::time::Instant::now();
        conn.begin_cycle();
        let err = conn.acquire().await.err().unwrap();
        let _tx = stopper.await.unwrap();

        // Two dials fit before 150ms; the backoff after the second is cut short
        assert!(started.elapsed() < Duration::from_millis(200));
        assert!(db.dials.load(Ordering::SeqCst) <= 2);
        match err {
            BeatError::Connection { message, .. } => assert_eq!(message, "shutdown requested"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_hung_dial() {
        let db = Arc::new(ScriptedDatabase {
            hang_connect: true,
            ..Default::default()
        });
        let (tx, rx) = watch::channel(false);
        let mut conn = connector(db.clone(), 3).with_shutdown(rx);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send(true).unwrap();
            tx
        });

        let started = tokio::time::Instant::now();
        conn.begin_cycle();
        assert!(conn.acquire().await.is_err());
        let _tx = stopper.await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(100));
        assert_eq!(db.dials.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_dial_times_out() {
        let db = Arc::new(ScriptedDatabase {
            hang_connect: true,
            ..Default::default()
        });
        let mut conn = Connector::new(
            db.clone(),
            ConnectorConfig {
                max_attempts: 1,
                connect_timeout: Duration::from_secs(2),
                ..Default::default()
            },
        );

        conn.begin_cycle();
        let err = conn.acquire().await.err().unwrap();
        assert!(err.to_string().contains("connect timed out after 2000ms"));
        assert_eq!(db.dials.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_timeout_reports_broken_link() {
        let db = Arc::new(ScriptedDatabase {
            hang: true,
            ..Default::default()
        });
        let mut conn = Connector::new(
            db,
            ConnectorConfig {
                query_timeout: Some(Duration::from_millis(50)),
                ..Default::default()
            },
        );

        conn.begin_cycle();
        let mut lease = conn.acquire().await.unwrap();
        let statement = Statement::new("s", "SELECT SLEEP(10)", StatementKind::SingleRow).unwrap();
        let err = lease.query(&statement).await.unwrap_err();
        assert!(err.is_broken());
    }
}
