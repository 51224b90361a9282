//! Stdout emitter
//!
//! Writes events as JSON lines (the default shipping format) or as a boxed,
//! human readable block for local debugging.

use crate::config::OutputFormat;
use async_trait::async_trait;
use mysqlbeat_core::{Emitter, Event, PluginError};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stdout emitter
pub struct StdoutEmitter {
    format: OutputFormat,
    /// Redirected sink; `None` writes to the process stdout
    sink: Option<Mutex<Box<dyn Write + Send>>>,
    emitted_count: AtomicU64,
}

impl StdoutEmitter {
    /// JSON lines on stdout
    pub fn new() -> Self {
        Self::with_format(OutputFormat::Json)
    }

    /// Boxed blocks on stdout
    pub fn pretty() -> Self {
        Self::with_format(OutputFormat::Pretty)
    }

    pub fn with_format(format: OutputFormat) -> Self {
        Self {
            format,
            sink: None,
            emitted_count: AtomicU64::new(0),
        }
    }

    /// Write to `sink` instead of stdout
    pub fn with_writer(format: OutputFormat, sink: impl Write + Send + 'static) -> Self {
        Self {
            format,
            sink: Some(Mutex::new(Box::new(sink))),
            emitted_count: AtomicU64::new(0),
        }
    }

    /// Get total events emitted
    pub fn emitted_count(&self) -> u64 {
        self.emitted_count.load(Ordering::Relaxed)
    }

    fn render(&self, event: &Event, out: &mut dyn Write) -> Result<(), PluginError> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer(&mut *out, event)
                    .map_err(|e| PluginError::Encode(e.to_string()))?;
                writeln!(out).map_err(write_failed)
            }
            OutputFormat::Pretty => {
                let mut block = String::new();
                block.push_str("┌─ Event ─────────────────────────────────────────────\n");
                block.push_str(&format!("│ ID:        {}\n", event.id()));
                block.push_str(&format!("│ Source:    {}\n", event.source()));
                block.push_str(&format!("│ Type:      {}\n", event.kind()));
                block.push_str(&format!("│ Timestamp: {}\n", event.timestamp().to_rfc3339()));
                for (name, value) in event.fields() {
                    block.push_str(&format!("│ {name} = {value} ({})\n", value.type_name()));
                }
                block.push_str("└─────────────────────────────────────────────────────\n");
                out.write_all(block.as_bytes()).map_err(write_failed)
            }
        }
    }
}

fn write_failed(e: std::io::Error) -> PluginError {
    PluginError::Send(format!("stdout write failed: {e}"))
}

impl Default for StdoutEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Emitter for StdoutEmitter {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn emit(&self, events: &[Event]) -> Result<(), PluginError> {
        let mut emitted = 0u64;
        let result = match &self.sink {
            Some(sink) => {
                let mut out = sink.lock();
                write_all(self, events, &mut **out, &mut emitted)
            }
            None => {
                let mut out = std::io::stdout().lock();
                write_all(self, events, &mut out, &mut emitted)
            }
        };

        // Only successfully written events count
        self.emitted_count.fetch_add(emitted, Ordering::Relaxed);
        result
    }

    async fn health(&self) -> bool {
        true
    }

    async fn shutdown(&self) -> Result<(), PluginError> {
        let flushed = match &self.sink {
            Some(sink) => sink.lock().flush(),
            None => std::io::stdout().lock().flush(),
        };
        flushed.map_err(|e| PluginError::Shutdown(format!("stdout flush failed: {e}")))
    }
}

fn write_all(
    emitter: &StdoutEmitter,
    events: &[Event],
    out: &mut dyn Write,
    emitted: &mut u64,
) -> Result<(), PluginError> {
    for event in events {
        emitter.render(event, out)?;
        *emitted += 1;
    }
    out.flush().map_err(write_failed)
}
