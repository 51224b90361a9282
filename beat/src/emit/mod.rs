//! Built-in outputs
//!
//! Outputs implement [`Emitter`] from `mysqlbeat-core`, so third-party
//! outputs can be plugged into [`Beat`](crate::Beat) the same way.

pub mod retry;
pub mod stdout;

pub use mysqlbeat_core::Emitter;
pub use retry::RetryEmitter;
pub use stdout::StdoutEmitter;

use crate::config::OutputConfig;
use std::sync::Arc;

/// Build the configured output pipeline
///
/// Stdout in the configured format, wrapped in a [`RetryEmitter`] when
/// retries are enabled.
pub fn build_output(config: &OutputConfig) -> Arc<dyn Emitter> {
    let stdout: Arc<dyn Emitter> = Arc::new(StdoutEmitter::with_format(config.format));
    if config.retry.max_attempts == 0 {
        return stdout;
    }
    Arc::new(RetryEmitter::new(stdout, config.retry.backoff()))
}
