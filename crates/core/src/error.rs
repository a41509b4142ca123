//! Error taxonomy for sequencer operations.

/// Result alias for sequencer operations.
pub type Result<T> = std::result::Result<T, SequencerError>;

/// Errors that can occur when starting or configuring a sequencer.
///
/// Failures inside the producer or consumer are not represented here: the
/// sequencer has no recovery policy and lets them propagate.
#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    /// `run` was called while a run is still scheduled or dispatching
    #[error("sequencer is already running")]
    AlreadyRunning,

    /// `run` was called before every callback was set
    #[error("sequencer has no {0} callback")]
    MissingCallback(&'static str),

    /// Configuration could not be loaded
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for SequencerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
