//! Scheduler backed by tokio timers on a `LocalSet`.

use crate::scheduler::{Callback, Scheduler, TimerHandle};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// Runs callbacks as local tokio tasks after a `tokio::time::sleep`.
///
/// Clones share the same timer table.
#[derive(Clone, Default)]
pub struct TokioScheduler {
    inner: Rc<TimerTable>,
}

#[derive(Default)]
struct TimerTable {
    next_id: Cell<u64>,
    tasks: RefCell<HashMap<TimerHandle, JoinHandle<()>>>,
}

impl TokioScheduler {
    /// Create a scheduler with no pending timers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers that have neither fired nor been cancelled.
    pub fn pending(&self) -> usize {
        self.inner.tasks.borrow().len()
    }
}

impl Scheduler for TokioScheduler {
    /// # Panics
    ///
    /// Panics when called outside of a `tokio::task::LocalSet`.
    fn schedule_after(&self, delay: Duration, callback: Callback) -> TimerHandle {
        let handle = TimerHandle::from_raw(self.inner.next_id.get());
        self.inner.next_id.set(handle.as_raw() + 1);

        let table = Rc::downgrade(&self.inner);
        let task = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Some(table) = table.upgrade() {
                table.tasks.borrow_mut().remove(&handle);
            }
            trace!(%handle, "timer fired");
            callback();
        });

        self.inner.tasks.borrow_mut().insert(handle, task);
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        let task = self.inner.tasks.borrow_mut().remove(&handle);
        if let Some(task) = task {
            task.abort();
            trace!(%handle, "timer aborted");
        }
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::LocalSet;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        LocalSet::new()
            .run_until(async {
                let scheduler = TokioScheduler::new();
                let fired = Rc::new(Cell::new(false));

                let flag = fired.clone();
                scheduler.schedule_after(
                    Duration::from_millis(50),
                    Box::new(move || flag.set(true)),
                );
                assert_eq!(scheduler.pending(), 1);

                tokio::time::sleep(Duration::from_millis(49)).await;
                assert!(!fired.get());

                tokio::time::sleep(Duration::from_millis(2)).await;
                assert!(fired.get());
                assert_eq!(scheduler.pending(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_timer() {
        LocalSet::new()
            .run_until(async {
                let scheduler = TokioScheduler::new();
                let fired = Rc::new(Cell::new(false));

                let flag = fired.clone();
                let handle = scheduler.schedule_after(
                    Duration::from_millis(50),
                    Box::new(move || flag.set(true)),
                );
                scheduler.cancel(handle);
                scheduler.cancel(handle);

                tokio::time::sleep(Duration::from_millis(200)).await;
                assert!(!fired.get());
                assert_eq!(scheduler.pending(), 0);
            })
            .await;
    }
}
