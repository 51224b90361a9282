//! mysqlbeat - periodic MySQL status collector
//!
//! Connects to a MySQL server, runs a fixed list of read-only introspection
//! statements on an interval, types the returned rows into [`Event`]s and
//! hands each one to an output.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐ tick ┌──────────┐ rows ┌─────────┐ batches ┌────────────┐ event ┌───────────┐
//! │  ticker   │─────▶│  Poller  │─────▶│  shape  │────────▶│ normalize  │──────▶│ Publisher │──▶ Emitter
//! └───────────┘      └────┬─────┘      └─────────┘         └────────────┘       └───────────┘
//!                         │ acquire / release
//!                    ┌────▼──────┐
//!                    │ Connector │──▶ Database (sqlx MySQL)
//!                    └───────────┘
//! ```
//!
//! [`Beat`] owns the whole thing: it starts the connector and poller and on
//! shutdown drains the in-flight cycle, closes the connection and shuts the
//! output down.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod backoff;
pub mod config;
pub mod connector;
pub mod emit;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod metrics_server;
pub mod normalize;
pub mod password;
pub mod poller;
pub mod publish;
pub mod shape;
pub mod state;
pub mod statement;

pub use config::{Config, LogFormat, OutputFormat, ResolvedConfig};
pub use connector::{
    Connection, Connector, ConnectorConfig, Database, MySqlDatabase, QueryResult, Session,
    SessionError,
};
pub use emit::{RetryEmitter, StdoutEmitter, build_output};
pub use error::{BeatError, PluginError, Result};
pub use lifecycle::{Beat, RunningBeat};
pub use metrics::Metrics;
pub use metrics_server::MetricsServer;
pub use normalize::{RawRow, normalize};
pub use poller::{CycleReport, Poller, READINESS_MARKER};
pub use publish::{PublishOutcome, Publisher};
pub use state::{PollerState, StateCell};
pub use statement::{PollRequest, Statement, StatementKind};

// Core types
pub use mysqlbeat_core::{BEAT_KIND, Emitter, Event, EventId, MetricValue};
