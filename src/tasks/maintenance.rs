//! Cache Maintenance Task
//!
//! Background worker that runs queued trims, sweeps aged entries on a fixed
//! interval and clears the cache on external invalidation signals.
//!
//! One worker serves one cache and handles jobs serially. It holds only a
//! weak reference to the cache state and stops once the cache is gone.

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, JoinHandle};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::cache::memory::Shared;
use crate::cache::TrimTarget;
use crate::error::CacheError;

// == Invalidation ==
/// External events after which cached values should be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    /// The host is running low on memory
    MemoryPressure,
    /// The host application moved to the background
    Background,
}

#[derive(Debug)]
enum Job {
    Trim(TrimTarget),
    Flush(oneshot::Sender<()>),
}

// == Maintenance Handle ==
/// Handle to a cache's maintenance worker. Dropping it aborts the worker.
#[derive(Debug)]
pub struct Maintenance {
    jobs: mpsc::UnboundedSender<Job>,
    task: JoinHandle<()>,
}

impl Maintenance {
    /// Spawns the worker on `handle`.
    ///
    /// # Arguments
    /// * `shared` - weak reference to the cache state
    /// * `sweep_interval` - interval between recurring age sweeps
    /// * `invalidations` - optional signal subscription; each signal clears the cache
    pub(crate) fn spawn<V>(
        handle: &Handle,
        shared: Weak<Shared<V>>,
        sweep_interval: Duration,
        invalidations: Option<broadcast::Receiver<Invalidation>>,
    ) -> Self
    where
        V: Send + 'static,
    {
        let (jobs, rx) = mpsc::unbounded_channel();
        let task = handle.spawn(run(shared, rx, sweep_interval, invalidations));
        Self { jobs, task }
    }

    /// Queues a trim. Failures are logged, never returned.
    pub(crate) fn schedule(&self, target: TrimTarget) {
        if let Err(err) = self.send(Job::Trim(target)) {
            warn!(%target, error = %err, "failed to schedule trim");
        }
    }

    /// Resolves once every job queued before this call has been handled.
    pub(crate) async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if let Err(err) = self.send(Job::Flush(done)) {
            warn!(error = %err, "failed to flush maintenance queue");
            return;
        }
        if wait.await.is_err() {
            warn!("maintenance worker stopped before flush completed");
        }
    }

    /// Stops the worker, releasing its invalidation subscription.
    pub(crate) fn shutdown(&self) {
        self.task.abort();
    }

    fn send(&self, job: Job) -> Result<(), CacheError> {
        self.jobs
            .send(job)
            .map_err(|_| CacheError::Worker("maintenance worker is not running".to_string()))
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run<V>(
    shared: Weak<Shared<V>>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    sweep_interval: Duration,
    mut invalidations: Option<broadcast::Receiver<Invalidation>>,
) where
    V: Send + 'static,
{
    debug!(?sweep_interval, "cache maintenance started");
    let mut sweep = sweep_timer(sweep_interval);

    loop {
        let alive = tokio::select! {
            job = jobs.recv() => match job {
                Some(Job::Trim(target)) => run_trim(&shared, target).await,
                Some(Job::Flush(done)) => {
                    let _ = done.send(());
                    true
                }
                None => false,
            },
            _ = next_sweep(&mut sweep) => run_trim(&shared, TrimTarget::Age).await,
            signal = next_signal(&mut invalidations) => match signal {
                Ok(signal) => invalidate(&shared, signal),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "invalidation signals lagged");
                    invalidate(&shared, Invalidation::MemoryPressure)
                }
                Err(RecvError::Closed) => {
                    debug!("invalidation source closed");
                    invalidations = None;
                    true
                }
            },
        };
        if !alive {
            break;
        }
    }
    debug!("cache maintenance stopped");
}

/// Recurring sweep timer, or `None` when the first tick lies beyond the clock's range.
fn sweep_timer(sweep_interval: Duration) -> Option<Interval> {
    let Some(start) = Instant::now().checked_add(sweep_interval) else {
        debug!(?sweep_interval, "sweep interval out of range, recurring sweep disabled");
        return None;
    };
    let mut sweep = time::interval_at(start, sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(sweep)
}

async fn next_sweep(sweep: &mut Option<Interval>) {
    match sweep {
        Some(sweep) => {
            sweep.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_signal(
    invalidations: &mut Option<broadcast::Receiver<Invalidation>>,
) -> Result<Invalidation, RecvError> {
    match invalidations {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Runs one trim off the async threads. Returns `false` once the cache is gone.
async fn run_trim<V>(shared: &Weak<Shared<V>>, target: TrimTarget) -> bool
where
    V: Send + 'static,
{
    let Some(shared) = shared.upgrade() else {
        return false;
    };
    match task::spawn_blocking(move || shared.trim(target)).await {
        Ok(0) => trace!(%target, "trim found nothing to evict"),
        Ok(evicted) => debug!(%target, evicted, "trim evicted entries"),
        Err(err) => warn!(%target, error = %err, "trim task failed"),
    }
    true
}

fn invalidate<V>(shared: &Weak<Shared<V>>, signal: Invalidation) -> bool {
    let Some(shared) = shared.upgrade() else {
        return false;
    };
    let removed = shared.clear();
    info!(?signal, removed, "memory cache invalidated");
    true
}
