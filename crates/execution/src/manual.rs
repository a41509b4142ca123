//! Virtual-clock scheduler.
//!
//! Time only moves when the owner calls [`ManualScheduler::advance`], which
//! makes every interleaving of timers reproducible.

use crate::scheduler::{Callback, Scheduler, TimerHandle};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::Duration;
use tracing::trace;

/// Upper bound on timers fired by a single [`ManualScheduler::run_until_idle`].
pub const IDLE_FIRE_LIMIT: usize = 1_000_000;

/// A scheduler driven by hand against a virtual clock.
///
/// Clones share the same clock and timer queue.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: Rc<RefCell<VirtualClock>>,
}

#[derive(Default)]
struct VirtualClock {
    now: Duration,
    next_id: u64,
    /// (deadline, handle) -> callback; handles grow monotonically so ties fire FIFO
    timers: BTreeMap<(Duration, TimerHandle), Callback>,
    deadlines: HashMap<TimerHandle, Duration>,
}

impl ManualScheduler {
    /// Create a scheduler whose clock reads zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time, measured from construction.
    pub fn now(&self) -> Duration {
        self.clock.borrow().now
    }

    /// Number of timers waiting to fire.
    pub fn pending(&self) -> usize {
        self.clock.borrow().timers.len()
    }

    /// Deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.clock
            .borrow()
            .timers
            .first_key_value()
            .map(|((deadline, _), _)| *deadline)
    }

    /// Move the clock forward by `by`, firing every timer that falls due.
    ///
    /// Timers scheduled by a firing callback also fire if their deadline is
    /// inside the window. Returns the number of callbacks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut fired = 0;

        while let Some(callback) = self.pop_due(target) {
            callback();
            fired += 1;
        }

        self.clock.borrow_mut().now = target;
        fired
    }

    /// Fire timers in deadline order until none remain.
    ///
    /// Stops early after [`IDLE_FIRE_LIMIT`] callbacks so that an endless
    /// sequence cannot hang a test.
    pub fn run_until_idle(&self) -> usize {
        let mut fired = 0;

        while fired < IDLE_FIRE_LIMIT {
            let Some(deadline) = self.next_deadline() else {
                break;
            };
            let Some(callback) = self.pop_due(deadline) else {
                break;
            };
            callback();
            fired += 1;
        }

        fired
    }

    /// Pop the earliest timer due at or before `target`, moving the clock to
    /// its deadline. The borrow is released before the callback runs.
    fn pop_due(&self, target: Duration) -> Option<Callback> {
        let mut clock = self.clock.borrow_mut();
        let (&(deadline, handle), _) = clock.timers.first_key_value()?;
        if deadline > target {
            return None;
        }

        let callback = clock.timers.remove(&(deadline, handle))?;
        clock.deadlines.remove(&handle);
        clock.now = clock.now.max(deadline);
        trace!(%handle, ?deadline, "firing timer");
        Some(callback)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_after(&self, delay: Duration, callback: Callback) -> TimerHandle {
        let mut clock = self.clock.borrow_mut();
        let handle = TimerHandle::from_raw(clock.next_id);
        clock.next_id += 1;

        let deadline = clock.now + delay;
        clock.timers.insert((deadline, handle), callback);
        clock.deadlines.insert(handle, deadline);
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        let mut clock = self.clock.borrow_mut();
        if let Some(deadline) = clock.deadlines.remove(&handle) {
            clock.timers.remove(&(deadline, handle));
            trace!(%handle, "cancelled timer");
        }
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let clock = self.clock.borrow();
        f.debug_struct("ManualScheduler")
            .field("now", &clock.now)
            .field("pending", &clock.timers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Callback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let make = {
            let log = log.clone();
            move |name: &'static str| -> Callback {
                let log = log.clone();
                Box::new(move || log.borrow_mut().push(name))
            }
        };
        (log, make)
    }

    #[test]
    fn test_schedule_never_fires_synchronously() {
        let scheduler = ManualScheduler::new();
        let (log, make) = recorder();

        scheduler.schedule_after(Duration::ZERO, make("zero"));

        assert!(log.borrow().is_empty());
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_advance_fires_in_deadline_order() {
        let scheduler = ManualScheduler::new();
        let (log, make) = recorder();

        scheduler.schedule_after(Duration::from_millis(30), make("c"));
        scheduler.schedule_after(Duration::from_millis(10), make("a"));
        scheduler.schedule_after(Duration::from_millis(20), make("b"));

        assert_eq!(scheduler.advance(Duration::from_millis(25)), 2);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert_eq!(scheduler.now(), Duration::from_millis(25));

        assert_eq!(scheduler.advance(Duration::from_millis(5)), 1);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_equal_deadlines_fire_fifo() {
        let scheduler = ManualScheduler::new();
        let (log, make) = recorder();

        scheduler.schedule_after(Duration::from_millis(5), make("first"));
        scheduler.schedule_after(Duration::from_millis(5), make("second"));
        scheduler.run_until_idle();

        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let scheduler = ManualScheduler::new();
        let (log, make) = recorder();

        let handle = scheduler.schedule_after(Duration::from_millis(5), make("cancelled"));
        scheduler.schedule_after(Duration::from_millis(6), make("kept"));
        scheduler.cancel(handle);
        // second cancel is a no-op
        scheduler.cancel(handle);

        scheduler.run_until_idle();
        assert_eq!(*log.borrow(), vec!["kept"]);
    }

    #[test]
    fn test_callbacks_can_schedule_more_work() {
        let scheduler = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner = scheduler.clone();
        let inner_log = log.clone();
        scheduler.schedule_after(
            Duration::from_millis(10),
            Box::new(move || {
                inner_log.borrow_mut().push(inner.now());
                let log = inner_log.clone();
                let clock = inner.clone();
                inner.schedule_after(
                    Duration::from_millis(10),
                    Box::new(move || log.borrow_mut().push(clock.now())),
                );
            }),
        );

        assert_eq!(scheduler.advance(Duration::from_millis(20)), 2);
        assert_eq!(
            *log.borrow(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }

    #[test]
    fn test_run_until_idle_moves_clock_to_last_deadline() {
        let scheduler = ManualScheduler::new();
        let (_log, make) = recorder();

        scheduler.schedule_after(Duration::from_millis(50), make("x"));
        scheduler.schedule_after(Duration::from_millis(75), make("y"));

        assert_eq!(scheduler.run_until_idle(), 2);
        assert_eq!(scheduler.now(), Duration::from_millis(75));
        assert_eq!(scheduler.next_deadline(), None);
    }
}
