//! Publisher adapter - hands events to the output one at a time
//!
//! No batching and no retry here; retry belongs to the output pipeline.

use crate::metrics::try_record_published;
use mysqlbeat_core::{Emitter, Event, PluginError};
use std::sync::Arc;
use tracing::warn;

/// Result of handing one event to the output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Accepted,
    Rejected(String),
}

impl PublishOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PublishOutcome::Accepted)
    }
}

/// Adapter between the poller and an [`Emitter`]
#[derive(Clone)]
pub struct Publisher {
    output: Arc<dyn Emitter>,
}

impl Publisher {
    pub fn new(output: Arc<dyn Emitter>) -> Self {
        Self { output }
    }

    /// Name of the wrapped output
    pub fn output_name(&self) -> &'static str {
        self.output.name()
    }

    /// Publish one event
    ///
    /// A rejection is logged here and reported back; it never fails the
    /// cycle.
    pub async fn publish(&self, event: Event) -> PublishOutcome {
        let outcome = match self.output.emit(std::slice::from_ref(&event)).await {
            Ok(()) => PublishOutcome::Accepted,
            Err(e) => {
                warn!(
                    output = self.output.name(),
                    source = event.source(),
                    event_id = %event.id(),
                    error = %e,
                    "event rejected by output"
                );
                PublishOutcome::Rejected(e.to_string())
            }
        };
        try_record_published(event.source(), outcome.is_accepted());
        outcome
    }

    pub async fn health(&self) -> bool {
        self.output.health().await
    }

    /// Flush and release the output
    pub async fn shutdown(&self) -> Result<(), PluginError> {
        self.output.shutdown().await
    }
}
