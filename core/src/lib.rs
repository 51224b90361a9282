//! mysqlbeat-core - Core types shared by the collector and its outputs
//!
//! This crate holds what an output plugin needs to know about mysqlbeat and
//! nothing more:
//!
//! - [`Event`] - one normalized poll result (timestamp, source tag, typed metrics)
//! - [`MetricValue`] - integer, float or string metric
//! - [`Emitter`] trait - async interface for shipping events to a destination
//! - [`PluginError`] - error type for emitter operations
//!
//! Output plugins depend on this crate only, so they never pull in the
//! database driver or the poll engine.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(missing_docs)]

mod emit;
mod error;
/// The canonical event model
pub mod event;

pub use emit::Emitter;
pub use error::PluginError;
pub use event::{BEAT_KIND, Event, EventBuilder, EventId, MetricValue};
