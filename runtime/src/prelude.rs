//! Convenience re-exports for embedding mysqlbeat.
//!
//! ```rust
//! use mysqlbeat_runtime::prelude::*;
//! ```

// Core types
pub use mysqlbeat_core::{Event, EventId, MetricValue};

// Collector
pub use mysqlbeat::{Beat, Config, PollerState, RunningBeat};

// Database access
pub use mysqlbeat::{Database, MySqlDatabase, QueryResult, Session, SessionError};

// Outputs
pub use mysqlbeat::{Emitter, StdoutEmitter};

// Resilience wrappers
pub use mysqlbeat::RetryEmitter;
pub use mysqlbeat::backoff::BackoffConfig;

// Error types
pub use mysqlbeat::{BeatError, PluginError};

// Runtime
pub use crate::RuntimeBuilder;
