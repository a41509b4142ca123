//! Synthetic workload pushed through a sequencer.

use anyhow::Result;
use fiber_core::SequencerConfig;
use fiber_execution::{Scheduler, Sequencer};
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Shape of the generated work.
#[derive(Debug, Clone)]
pub struct Workload {
    /// Number of items to produce (None = until stopped)
    pub items: Option<usize>,
    /// Simulated time spent resolving each item
    pub work: Duration,
}

/// How a workload ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Producer ran dry
    Completed { count: usize },
    /// Stopped from outside
    Aborted { resolved: usize },
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Completed { count } => write!(f, "completed: {} items", count),
            Outcome::Aborted { resolved } => write!(f, "aborted after {} items", resolved),
        }
    }
}

struct Progress {
    resolved: usize,
    finished: Option<oneshot::Sender<usize>>,
}

/// Run `workload` until the producer is exhausted or `stop` resolves.
///
/// Must be polled inside a `tokio::task::LocalSet`.
pub async fn drive<S, F>(
    workload: Workload,
    scheduler: S,
    config: SequencerConfig,
    stop: F,
) -> Result<Outcome>
where
    S: Scheduler + 'static,
    F: Future<Output = ()>,
{
    let (finished_tx, finished_rx) = oneshot::channel();
    let progress = Rc::new(RefCell::new(Progress {
        resolved: 0,
        finished: Some(finished_tx),
    }));

    let Workload { items, work } = workload;
    let tracker = progress.clone();

    let sequencer = Sequencer::new(progress.clone(), scheduler)
        .with_config(config)
        .producer(move |_: &mut Progress, i| match items {
            Some(n) if i >= n => None,
            _ => Some(format!("item-{}", i)),
        })
        .consumer(move |_, item, i, done| {
            info!(index = i, %item, "dispatched");
            let tracker = tracker.clone();
            tokio::task::spawn_local(async move {
                tokio::time::sleep(work).await;
                debug!(index = i, %item, "resolved");
                tracker.borrow_mut().resolved += 1;
                done.complete();
            });
        })
        .on_complete(|progress, count| {
            if let Some(tx) = progress.finished.take() {
                let _ = tx.send(count);
            }
        });

    sequencer.run()?;

    tokio::select! {
        count = finished_rx => Ok(Outcome::Completed { count: count? }),
        () = stop => {
            sequencer.abort();
            let resolved = progress.borrow().resolved;
            Ok(Outcome::Aborted { resolved })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiber_execution::TokioScheduler;
    use tokio::task::LocalSet;

    fn workload(items: Option<usize>) -> Workload {
        Workload {
            items,
            work: Duration::from_millis(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_finite_workload_completes() {
        let outcome = LocalSet::new()
            .run_until(drive(
                workload(Some(3)),
                TokioScheduler::new(),
                SequencerConfig::default(),
                std::future::pending(),
            ))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Completed { count: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_workload_reports_zero() {
        let outcome = LocalSet::new()
            .run_until(drive(
                workload(Some(0)),
                TokioScheduler::new(),
                SequencerConfig::default(),
                std::future::pending(),
            ))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Completed { count: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_workload_stops_on_signal() {
        // items resolve at 60, 120 and 180ms; the fourth would start at 230ms
        let stop = tokio::time::sleep(Duration::from_millis(200));

        let outcome = LocalSet::new()
            .run_until(drive(
                workload(None),
                TokioScheduler::new(),
                SequencerConfig::default(),
                stop,
            ))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Aborted { resolved: 3 });
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Completed { count: 4 }.to_string(), "completed: 4 items");
        assert_eq!(Outcome::Aborted { resolved: 2 }.to_string(), "aborted after 2 items");
    }
}
