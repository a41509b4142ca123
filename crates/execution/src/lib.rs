//! Execution layer - the scheduler abstraction and the sequencer it drives.

#![warn(missing_docs)]

pub mod scheduler;
pub mod manual;
pub mod tokio_scheduler;
pub mod sequencer;

pub use scheduler::{Callback, Scheduler, TimerHandle};
pub use manual::ManualScheduler;
pub use tokio_scheduler::TokioScheduler;
pub use sequencer::{Done, Sequencer};
