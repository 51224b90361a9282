//! Emitter trait for mysqlbeat outputs
//!
//! The [`Emitter`] trait is the boundary between the collector and the
//! output pipeline. The collector hands over finished [`Event`]s and learns
//! whether the pipeline took them; transport, batching and retries are the
//! emitter's business.

use crate::error::PluginError;
use crate::event::Event;
use async_trait::async_trait;

/// Emitter trait - ships Events to a destination
///
/// # Implementation Requirements
///
/// - Emitters must be `Send + Sync`; the poller calls them from its own task
/// - `emit` either takes the whole slice or returns an error for it
/// - `health` must be cheap, it may be called from the metrics endpoint
/// - `shutdown` flushes anything buffered and releases resources
///
/// # Example
///
/// ```ignore
/// use mysqlbeat_core::{Emitter, Event, PluginError};
/// use async_trait::async_trait;
///
/// struct FileEmitter {
///     file: std::sync::Mutex<std::fs::File>,
/// }
///
/// #[async_trait]
/// impl Emitter for FileEmitter {
///     fn name(&self) -> &'static str {
///         "file"
///     }
///
///     async fn emit(&self, events: &[Event]) -> Result<(), PluginError> {
///         use std::io::Write;
///         let mut file = self.file.lock().map_err(|_| PluginError::NotReady)?;
///         for event in events {
///             let line = serde_json::to_string(event)
///                 .map_err(|e| PluginError::Encode(e.to_string()))?;
///             writeln!(file, "{line}").map_err(|e| PluginError::Send(e.to_string()))?;
///         }
///         Ok(())
///     }
///
///     async fn health(&self) -> bool {
///         true
///     }
/// }
/// ```
#[async_trait]
pub trait Emitter: Send + Sync {
    /// Short identifier used in logs and metric labels ("stdout", "retry", ...)
    fn name(&self) -> &'static str;

    /// Ship a slice of events to the destination
    ///
    /// # Returns
    ///
    /// * `Ok(())` - the destination accepted every event
    /// * `Err(PluginError)` - the slice was not accepted
    async fn emit(&self, events: &[Event]) -> Result<(), PluginError>;

    /// Whether the destination is currently accepting events
    async fn health(&self) -> bool;

    /// Flush and release resources
    ///
    /// Called once during beat teardown. The default does nothing.
    async fn shutdown(&self) -> Result<(), PluginError> {
        Ok(())
    }
}
