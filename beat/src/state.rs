//! Poller state machine
//!
//! ```text
//! Idle ──tick──▶ Polling ──done──▶ Idle
//!   │               │
//!   └──shutdown──▶ Stopping ──▶ Stopped
//! ```

use crate::metrics::Metrics;
use std::fmt;
use tokio::sync::watch;
use tracing::warn;

/// Where the poller is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollerState {
    Idle,
    Polling,
    Stopping,
    Stopped,
}

impl PollerState {
    /// Whether `self -> next` is an allowed transition
    pub fn can_transition_to(self, next: PollerState) -> bool {
        use PollerState::*;
        matches!(
            (self, next),
            (Idle, Polling) | (Polling, Idle) | (Idle, Stopping) | (Polling, Stopping) | (Stopping, Stopped)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PollerState::Idle => "idle",
            PollerState::Polling => "polling",
            PollerState::Stopping => "stopping",
            PollerState::Stopped => "stopped",
        }
    }

    /// Gauge encoding
    pub fn code(&self) -> u8 {
        match self {
            PollerState::Idle => 0,
            PollerState::Polling => 1,
            PollerState::Stopping => 2,
            PollerState::Stopped => 3,
        }
    }
}

impl fmt::Display for PollerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refused state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid poller transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: PollerState,
    pub to: PollerState,
}

/// Owner of the poller state
///
/// Writes go through [`transition`](Self::transition); readers subscribe to
/// a watch channel.
#[derive(Debug)]
pub struct StateCell {
    tx: watch::Sender<PollerState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PollerState::Idle);
        Self { tx }
    }

    pub fn get(&self) -> PollerState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.tx.subscribe()
    }

    /// Move to `next`, refusing (and logging) anything off the state machine
    pub fn transition(&self, next: PollerState) -> Result<(), InvalidTransition> {
        let mut refused = None;
        self.tx.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                refused = Some(InvalidTransition {
                    from: *current,
                    to: next,
                });
                false
            }
        });

        match refused {
            Some(err) => {
                warn!(from = %err.from, to = %err.to, "refused poller state transition");
                Err(err)
            }
            None => {
                if let Some(m) = Metrics::get() {
                    m.set_poller_state(next.code());
                }
                Ok(())
            }
        }
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
