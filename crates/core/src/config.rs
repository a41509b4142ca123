//! Sequencer configuration.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pause between two steps when nothing else is configured.
pub const DEFAULT_STEP_DELAY_MS: u64 = 50;

/// Tunables for a sequencer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Delay before the first step and after every completion signal, in milliseconds
    #[serde(default = "default_step_delay")]
    pub step_delay_ms: u64,
}

fn default_step_delay() -> u64 {
    DEFAULT_STEP_DELAY_MS
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
        }
    }
}

impl SequencerConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inter-step delay.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The inter-step delay as a [`Duration`].
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
