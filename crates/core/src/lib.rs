//! Fiber core data model.
//!
//! Types shared by the sequencer and its front ends: run identities,
//! lifecycle states, configuration and the error taxonomy.

#![warn(missing_docs)]

mod id;
mod state;
mod config;
mod error;

pub use id::RunId;
pub use state::SequencerState;
pub use config::{SequencerConfig, DEFAULT_STEP_DELAY_MS};
pub use error::{Result, SequencerError};

/// Zero-based dispatch index handed to producer and consumer.
pub type Index = usize;
