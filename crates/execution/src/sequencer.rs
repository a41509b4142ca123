//! The sequencer: runs an index-addressed series of work items one at a time.
//!
//! Each item is pulled from a producer, handed to a consumer together with a
//! [`Done`] signal, and the next step is only scheduled once that signal has
//! been completed. Every step goes through the [`Scheduler`], so the caller's
//! loop regains control between items:
//!
//! ```text
//! run ─▶ [delay] ─▶ producer(i) ─┬─ Some(item) ─▶ consumer(item, i, done) ─ done.complete() ─▶ [delay] ─▶ ...
//!                                └─ None ─▶ on_complete(i)
//! ```

use crate::scheduler::{Scheduler, TimerHandle};
use fiber_core::{Index, Result, RunId, SequencerConfig, SequencerError, SequencerState};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, info, trace, warn};

type Producer<C, T> = Rc<RefCell<dyn FnMut(&mut C, Index) -> Option<T>>>;
type Consumer<C, T> = Rc<RefCell<dyn FnMut(&mut C, T, Index, Done)>>;
type CompletionHandler<C> = Rc<RefCell<dyn FnMut(&mut C, usize)>>;

/// Cooperative, single-threaded task sequencer.
///
/// A `Sequencer` is a cheap handle; clones drive the same run. Callbacks
/// receive the shared context as `&mut C`, which is borrowed only while a
/// callback executes. Scheduled steps hold a weak reference, so dropping
/// every handle stops the run at its next step.
///
/// ```rust,ignore
/// let sequencer = Sequencer::new(context, ManualScheduler::new())
///     .producer(|ctx: &mut Jobs, i| ctx.jobs.get(i).cloned())
///     .consumer(|ctx, job, _i, done| {
///         ctx.finished.push(job);
///         done.complete();
///     })
///     .on_complete(|_ctx, count| println!("{count} jobs done"));
///
/// sequencer.run()?;
/// ```
pub struct Sequencer<C, T, S: Scheduler> {
    inner: Rc<Inner<C, T, S>>,
}

struct Inner<C, T, S: Scheduler> {
    context: Rc<RefCell<C>>,
    scheduler: S,
    config: RefCell<SequencerConfig>,
    producer: RefCell<Option<Producer<C, T>>>,
    consumer: RefCell<Option<Consumer<C, T>>>,
    on_complete: RefCell<Option<CompletionHandler<C>>>,
    run: RefCell<RunState>,
}

#[derive(Debug)]
struct RunState {
    state: SequencerState,
    run_id: Option<RunId>,
    /// Index the next step hands to the producer
    next_index: Index,
    pending: Option<TimerHandle>,
}

impl RunState {
    fn is_current(&self, run_id: RunId, state: SequencerState) -> bool {
        self.run_id == Some(run_id) && self.state == state
    }
}

impl<C: 'static, T: 'static, S: Scheduler + 'static> Sequencer<C, T, S> {
    /// Create an idle sequencer sharing `context` with its callbacks.
    pub fn new(context: Rc<RefCell<C>>, scheduler: S) -> Self {
        Self {
            inner: Rc::new(Inner {
                context,
                scheduler,
                config: RefCell::new(SequencerConfig::default()),
                producer: RefCell::new(None),
                consumer: RefCell::new(None),
                on_complete: RefCell::new(None),
                run: RefCell::new(RunState {
                    state: SequencerState::Idle,
                    run_id: None,
                    next_index: 0,
                    pending: None,
                }),
            }),
        }
    }

    /// Set the configuration. Takes effect from the next scheduled step.
    pub fn with_config(self, config: SequencerConfig) -> Self {
        *self.inner.config.borrow_mut() = config;
        self
    }

    /// Set the producer.
    ///
    /// Called with each index in turn; returning `None` ends the sequence.
    pub fn producer<F>(self, producer: F) -> Self
    where
        F: FnMut(&mut C, Index) -> Option<T> + 'static,
    {
        let producer: Producer<C, T> = Rc::new(RefCell::new(producer));
        *self.inner.producer.borrow_mut() = Some(producer);
        self
    }

    /// Set the consumer.
    ///
    /// The consumer owns the [`Done`] signal for its item and must complete
    /// it, now or later, for the sequence to move on.
    pub fn consumer<F>(self, consumer: F) -> Self
    where
        F: FnMut(&mut C, T, Index, Done) + 'static,
    {
        let consumer: Consumer<C, T> = Rc::new(RefCell::new(consumer));
        *self.inner.consumer.borrow_mut() = Some(consumer);
        self
    }

    /// Set the completion handler, called with the number of items dispatched.
    pub fn on_complete<F>(self, on_complete: F) -> Self
    where
        F: FnMut(&mut C, usize) + 'static,
    {
        let on_complete: CompletionHandler<C> = Rc::new(RefCell::new(on_complete));
        *self.inner.on_complete.borrow_mut() = Some(on_complete);
        self
    }

    /// Start a run at index 0.
    ///
    /// Returns immediately; no callback is invoked before the first step's
    /// delay elapses. A sequencer that completed or was aborted can be run
    /// again.
    ///
    /// # Errors
    ///
    /// [`SequencerError::AlreadyRunning`] if a run is scheduled or
    /// dispatching, [`SequencerError::MissingCallback`] if a callback was
    /// never set.
    pub fn run(&self) -> Result<&Self> {
        let mut run = self.inner.run.borrow_mut();
        if run.state.is_active() {
            return Err(SequencerError::AlreadyRunning);
        }

        if self.inner.producer.borrow().is_none() {
            return Err(SequencerError::MissingCallback("producer"));
        }
        if self.inner.consumer.borrow().is_none() {
            return Err(SequencerError::MissingCallback("consumer"));
        }
        if self.inner.on_complete.borrow().is_none() {
            return Err(SequencerError::MissingCallback("completion"));
        }

        let run_id = RunId::new();
        run.run_id = Some(run_id);
        run.next_index = 0;
        run.state = SequencerState::Scheduled;
        run.pending = Some(Inner::schedule_step(&self.inner, run_id));

        info!(
            %run_id,
            step_delay_ms = self.inner.config.borrow().step_delay_ms,
            "sequencer started"
        );
        Ok(self)
    }

    /// Stop the current run.
    ///
    /// Cancels the pending step, if any. A consumer still holding its
    /// [`Done`] finishes undisturbed, but completing it no longer schedules
    /// anything. Unlike natural exhaustion, aborting never calls the
    /// completion handler and reports no count. Calling `abort` when nothing
    /// is running does nothing.
    pub fn abort(&self) {
        let mut run = self.inner.run.borrow_mut();
        if let Some(handle) = run.pending.take() {
            self.inner.scheduler.cancel(handle);
        }

        if run.state.is_active() {
            run.state = SequencerState::Stopped;
            if let Some(run_id) = run.run_id {
                info!(%run_id, next_index = run.next_index, "sequencer aborted");
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SequencerState {
        self.inner.run.borrow().state
    }

    /// Identity of the current or most recent run.
    pub fn run_id(&self) -> Option<RunId> {
        self.inner.run.borrow().run_id
    }

    /// The context shared with the callbacks.
    pub fn context(&self) -> Rc<RefCell<C>> {
        self.inner.context.clone()
    }

    /// The active configuration.
    pub fn config(&self) -> SequencerConfig {
        self.inner.config.borrow().clone()
    }

    /// The scheduler driving this sequencer.
    pub fn scheduler(&self) -> &S {
        &self.inner.scheduler
    }
}

impl<C: 'static, T: 'static, S: Scheduler + 'static> Inner<C, T, S> {
    fn schedule_step(this: &Rc<Self>, run_id: RunId) -> TimerHandle {
        let weak = Rc::downgrade(this);
        let delay = this.config.borrow().step_delay();
        this.scheduler
            .schedule_after(delay, Box::new(move || Self::step(&weak, run_id)))
    }

    fn step(weak: &Weak<Self>, run_id: RunId) {
        let Some(this) = weak.upgrade() else {
            trace!(%run_id, "sequencer dropped before step fired");
            return;
        };

        let index = {
            let mut run = this.run.borrow_mut();
            if !run.is_current(run_id, SequencerState::Scheduled) {
                trace!(%run_id, "stale step ignored");
                return;
            }
            run.pending = None;
            run.state = SequencerState::Dispatching;
            let index = run.next_index;
            run.next_index += 1;
            index
        };

        let (Some(producer), Some(consumer), Some(on_complete)) = (
            this.producer.borrow().clone(),
            this.consumer.borrow().clone(),
            this.on_complete.borrow().clone(),
        ) else {
            warn!(%run_id, "callbacks missing at dispatch, stopping");
            this.run.borrow_mut().state = SequencerState::Stopped;
            return;
        };

        let item = {
            let mut context = this.context.borrow_mut();
            (&mut *producer.borrow_mut())(&mut *context, index)
        };

        // the producer may have aborted or restarted us
        if !this.run.borrow().is_current(run_id, SequencerState::Dispatching) {
            debug!(%run_id, index, "run stopped while producing");
            return;
        }

        match item {
            None => {
                this.run.borrow_mut().state = SequencerState::Stopped;
                info!(%run_id, count = index, "sequence exhausted");

                let mut context = this.context.borrow_mut();
                (&mut *on_complete.borrow_mut())(&mut *context, index);
            }
            Some(item) => {
                debug!(%run_id, index, "dispatching item");
                let target: Weak<dyn Resume> = weak.clone();
                let done = Done {
                    target,
                    run_id,
                    index,
                    completed: false,
                };

                let mut context = this.context.borrow_mut();
                (&mut *consumer.borrow_mut())(&mut *context, item, index, done);
            }
        }
    }
}

/// Type-erased view of a sequencer used by [`Done`].
trait Resume {
    /// Whether `run_id` is still dispatching and waiting on a signal.
    fn is_awaiting(&self, run_id: RunId) -> bool;

    /// Schedule the step after `index`.
    fn resume(self: Rc<Self>, run_id: RunId, index: Index);
}

impl<C: 'static, T: 'static, S: Scheduler + 'static> Resume for Inner<C, T, S> {
    fn is_awaiting(&self, run_id: RunId) -> bool {
        self.run
            .borrow()
            .is_current(run_id, SequencerState::Dispatching)
    }

    fn resume(self: Rc<Self>, run_id: RunId, index: Index) {
        if !self.is_awaiting(run_id) {
            debug!(%run_id, index, "completion signal for a stopped run ignored");
            return;
        }

        let handle = Self::schedule_step(&self, run_id);
        let mut run = self.run.borrow_mut();
        run.state = SequencerState::Scheduled;
        run.pending = Some(handle);
        trace!(%run_id, index, %handle, "item resolved, next step scheduled");
    }
}

/// Completion signal for a single dispatched item.
///
/// Consuming `complete` makes double completion impossible. A `Done` that
/// is dropped without completing leaves its run stalled; this is logged.
#[must_use = "the sequence stalls until this signal is completed"]
pub struct Done {
    target: Weak<dyn Resume>,
    run_id: RunId,
    index: Index,
    completed: bool,
}

impl Done {
    /// Signal that the item is resolved and let the sequence move on.
    pub fn complete(mut self) {
        self.completed = true;
        if let Some(target) = self.target.upgrade() {
            target.resume(self.run_id, self.index);
        }
    }

    /// Index of the item this signal belongs to.
    pub fn index(&self) -> Index {
        self.index
    }

    /// Run the item was dispatched by.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }
}

impl Drop for Done {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let stalled = self
            .target
            .upgrade()
            .is_some_and(|target| target.is_awaiting(self.run_id));
        if stalled {
            warn!(
                run_id = %self.run_id,
                index = self.index,
                "completion signal dropped without completing, sequence stalled"
            );
        }
    }
}

impl std::fmt::Debug for Done {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Done")
            .field("run_id", &self.run_id)
            .field("index", &self.index)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

impl<C, T, S: Scheduler> Clone for Sequencer<C, T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C, T, S: Scheduler> std::fmt::Debug for Sequencer<C, T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("run", &*self.inner.run.borrow())
            .finish_non_exhaustive()
    }
}
