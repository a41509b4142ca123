//! Delayed-execution primitive the sequencer is driven by.

use std::rc::Rc;
use std::time::Duration;

/// A callback parked on a scheduler until its delay elapses.
pub type Callback = Box<dyn FnOnce() + 'static>;

/// Opaque handle to a scheduled callback, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Wrap a backend-specific timer id.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The backend-specific timer id.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Single-threaded timer service.
///
/// Implementations must never run a callback from inside `schedule_after`:
/// callbacks only fire on a later turn of whatever loop drives the
/// scheduler.
pub trait Scheduler {
    /// Run `callback` once `delay` has elapsed.
    fn schedule_after(&self, delay: Duration, callback: Callback) -> TimerHandle;

    /// Prevent a scheduled callback from firing.
    ///
    /// Cancelling a handle that already fired or was already cancelled is a
    /// no-op.
    fn cancel(&self, handle: TimerHandle);
}

impl<S: Scheduler + ?Sized> Scheduler for Rc<S> {
    fn schedule_after(&self, delay: Duration, callback: Callback) -> TimerHandle {
        (**self).schedule_after(delay, callback)
    }

    fn cancel(&self, handle: TimerHandle) {
        (**self).cancel(handle);
    }
}
