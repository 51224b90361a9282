//! Shared fakes for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mysqlbeat::{Database, Emitter, Event, PluginError, QueryResult, Session, SessionError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

// ============================================================================
// Fake database
// ============================================================================

#[derive(Clone)]
pub enum Answer {
    Rows(QueryResult),
    Fail(String),
}

#[derive(Default)]
struct Shared {
    answers: Mutex<HashMap<String, Answer>>,
    query_delay: Mutex<Option<Duration>>,
    connect_failures: AtomicU32,
    refuse_all: AtomicBool,
    break_queries: AtomicU32,
    dials: AtomicU32,
    queries: AtomicU32,
    closes: AtomicU32,
}

/// Scripted in-memory database
#[derive(Clone, Default)]
pub struct FakeDatabase {
    shared: Arc<Shared>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// `SHOW GLOBAL STATUS` answering a single `Threads_connected = 5` row
    pub fn with_status() -> Self {
        let db = Self::new();
        db.answer(
            "SHOW GLOBAL STATUS",
            two_columns(&[("Threads_connected", "5")]),
        );
        db
    }

    pub fn answer(&self, sql: &str, result: QueryResult) {
        self.shared
            .answers
            .lock()
            .insert(sql.to_string(), Answer::Rows(result));
    }

    pub fn fail(&self, sql: &str, message: &str) {
        self.shared
            .answers
            .lock()
            .insert(sql.to_string(), Answer::Fail(message.to_string()));
    }

    /// Every statement takes this long
    pub fn delay_queries(&self, delay: Duration) {
        *self.shared.query_delay.lock() = Some(delay);
    }

    /// Fail the next `n` dials
    pub fn fail_connects(&self, n: u32) {
        self.shared.connect_failures.store(n, Ordering::SeqCst);
    }

    /// Fail every dial
    pub fn refuse_all(&self) {
        self.shared.refuse_all.store(true, Ordering::SeqCst);
    }

    /// The next `n` statements report a broken link
    pub fn break_queries(&self, n: u32) {
        self.shared.break_queries.store(n, Ordering::SeqCst);
    }

    pub fn dials(&self) -> u32 {
        self.shared.dials.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> u32 {
        self.shared.queries.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.shared.closes.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Database for FakeDatabase {
    fn describe(&self) -> String {
        "fake:3306".to_string()
    }

    async fn connect(&self) -> Result<Box<dyn Session>, SessionError> {
        self.shared.dials.fetch_add(1, Ordering::SeqCst);
        if self.shared.refuse_all.load(Ordering::SeqCst) || take_one(&self.shared.connect_failures)
        {
            return Err(SessionError::Broken("connection refused".to_string()));
        }
        Ok(Box::new(FakeSession {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct FakeSession {
    shared: Arc<Shared>,
}

#[async_trait]
impl Session for FakeSession {
    async fn query(&mut self, sql: &str) -> Result<QueryResult, SessionError> {
        self.shared.queries.fetch_add(1, Ordering::SeqCst);
        let delay = *self.shared.query_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if take_one(&self.shared.break_queries) {
            return Err(SessionError::Broken("server has gone away".to_string()));
        }

        let answer = self.shared.answers.lock().get(sql).cloned();
        match answer {
            Some(Answer::Rows(result)) => Ok(result),
            Some(Answer::Fail(message)) => Err(SessionError::Query(message)),
            None => Err(SessionError::Query(format!("unknown statement: {sql}"))),
        }
    }

    async fn ping(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn two_columns(rows: &[(&str, &str)]) -> QueryResult {
    QueryResult {
        columns: vec!["Variable_name".to_string(), "Value".to_string()],
        rows: rows
            .iter()
            .map(|(name, value)| vec![Some(name.to_string()), Some(value.to_string())])
            .collect(),
    }
}

// ============================================================================
// Outputs
// ============================================================================

/// Emitter that keeps every event
#[derive(Default)]
pub struct CaptureEmitter {
    events: Mutex<Vec<Event>>,
    shutdowns: AtomicU32,
}

impl CaptureEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn shutdowns(&self) -> u32 {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Emitter for CaptureEmitter {
    fn name(&self) -> &'static str {
        "capture"
    }

    async fn emit(&self, events: &[Event]) -> Result<(), PluginError> {
        self.events.lock().extend_from_slice(events);
        Ok(())
    }

    async fn health(&self) -> bool {
        true
    }

    async fn shutdown(&self) -> Result<(), PluginError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Emitter that refuses everything
#[derive(Default)]
pub struct RejectingEmitter {
    attempts: AtomicU32,
}

impl RejectingEmitter {
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Emitter for RejectingEmitter {
    fn name(&self) -> &'static str {
        "rejecting"
    }

    async fn emit(&self, _events: &[Event]) -> Result<(), PluginError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PluginError::Send("queue full".to_string()))
    }

    async fn health(&self) -> bool {
        false
    }
}

// ============================================================================
// Log capture
// ============================================================================

/// In-memory log sink for `tracing_subscriber::fmt`
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Install as the thread's default subscriber until the guard drops
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }

    /// Number of log lines containing `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.text().lines().filter(|l| l.contains(needle)).count()
    }
}

impl Write for LogCapture {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
        self.buf.lock().extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
