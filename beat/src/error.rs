//! Error types for mysqlbeat

use thiserror::Error;

// Re-export PluginError from mysqlbeat-core
pub use mysqlbeat_core::PluginError;

/// Result type alias for mysqlbeat operations
pub type Result<T> = std::result::Result<T, BeatError>;

/// Main error type for mysqlbeat
///
/// Only [`BeatError::Configuration`] is fatal to the process. Connection,
/// query and publish errors are logged by the poller and collection goes on.
#[derive(Error, Debug)]
pub enum BeatError {
    /// Invalid or incomplete configuration; the beat never starts polling
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Could not get a usable database connection
    #[error("connection error after {attempts} attempt(s): {message}")]
    Connection { attempts: u32, message: String },

    /// A single statement failed; the rest of the cycle continues
    #[error("query '{statement}' failed: {message}")]
    Query { statement: String, message: String },

    /// The output pipeline did not take an event
    #[error("publish from '{source_tag}' rejected: {reason}")]
    Publish { source_tag: String, reason: String },

    /// Metrics registration error
    #[error("metrics error: {0}")]
    Metrics(String),

    /// Teardown did not complete cleanly
    #[error("shutdown error: {0}")]
    Shutdown(String),
}

impl BeatError {
    /// Build a configuration error from anything printable
    pub fn config(msg: impl Into<String>) -> Self {
        BeatError::Configuration(msg.into())
    }

    /// Whether this error must stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, BeatError::Configuration(_))
    }
}

impl From<PluginError> for BeatError {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::Shutdown(msg) => BeatError::Shutdown(msg),
            other => BeatError::Publish {
                source_tag: "unknown".to_string(),
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(BeatError::config("no queries").is_fatal());
        assert!(
            !BeatError::Connection {
                attempts: 3,
                message: "refused".into()
            }
            .is_fatal()
        );
        assert!(
            !BeatError::Query {
                statement: "status".into(),
                message: "syntax".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_connection_error_display_carries_attempts() {
        let err = BeatError::Connection {
            attempts: 3,
            message: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "connection error after 3 attempt(s): connection refused"
        );
    }

    #[test]
    fn test_plugin_shutdown_error_maps_to_shutdown() {
        let err: BeatError = PluginError::Shutdown("flush failed".into()).into();
        assert!(matches!(err, BeatError::Shutdown(_)));

        let err: BeatError = PluginError::Send("closed".into()).into();
        assert!(matches!(err, BeatError::Publish { .. }));
    }
}
