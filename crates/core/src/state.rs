//! Sequencer lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a sequencer is in its lifecycle.
///
/// ```text
/// Idle ──run──▶ Scheduled ──delay──▶ Dispatching ──done()──▶ Scheduled
///                   │                     │
///                 abort              exhausted
///                   ▼                     ▼
///                Stopped ◀────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencerState {
    /// Constructed, never run
    Idle,
    /// A step is waiting on the scheduler
    Scheduled,
    /// An item is with the producer or consumer
    Dispatching,
    /// Completed or aborted
    Stopped,
}

impl SequencerState {
    /// Whether a run is in progress.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Scheduled | Self::Dispatching)
    }
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencerState::Idle => write!(f, "idle"),
            SequencerState::Scheduled => write!(f, "scheduled"),
            SequencerState::Dispatching => write!(f, "dispatching"),
            SequencerState::Stopped => write!(f, "stopped"),
        }
    }
}
