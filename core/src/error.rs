//! Error types for mysqlbeat output plugins

use thiserror::Error;

/// Error type for output plugin operations
///
/// Returned by [`Emitter`](crate::Emitter) implementations. The publisher
/// turns any of these into a rejected publish outcome, so an emitter never
/// stops the poll loop by failing.
///
/// # Example
///
/// ```
/// use mysqlbeat_core::PluginError;
///
/// fn write_to_sink() -> Result<(), PluginError> {
///     Err(PluginError::Send("sink closed".to_string()))
/// }
///
/// match write_to_sink() {
///     Ok(()) => println!("written"),
///     Err(PluginError::Send(msg)) => println!("send failed: {}", msg),
///     Err(e) => println!("other error: {}", e),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// The output could not be set up (bad destination, missing permissions)
    #[error("initialization failed: {0}")]
    Init(String),

    /// An event could not be encoded for the destination
    #[error("encoding failed: {0}")]
    Encode(String),

    /// The destination refused or failed to take the event
    #[error("send failed: {0}")]
    Send(String),

    /// The link to the destination is down
    #[error("connection error: {0}")]
    Connection(String),

    /// The output is not accepting events yet
    #[error("output not ready")]
    NotReady,

    /// Flushing or closing the output failed
    #[error("shutdown error: {0}")]
    Shutdown(String),
}
