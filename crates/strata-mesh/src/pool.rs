//! Worker pool that runs section preparation off the owner thread.
//!
//! [`ThreadWorkerPool`] keeps one `crossbeam-channel` lane per
//! [`TaskPriority`]; every worker empties the high lane before it takes
//! low-lane work. Submitting never blocks.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TryRecvError, select, unbounded};
use thiserror::Error;

use crate::task::TaskPriority;

/// A unit of work accepted by a [`WorkerPool`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors returned by worker pools.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool no longer accepts work.
    #[error("worker pool has been shut down")]
    ShutDown,
    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Accepts priority-tagged jobs and runs them asynchronously.
pub trait WorkerPool: Send + Sync {
    /// Queues `job` on the lane for `priority`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ShutDown`] if the pool stopped accepting work. The
    /// rejected job is dropped without running.
    fn submit(&self, priority: TaskPriority, job: Job) -> Result<(), PoolError>;

    /// Number of threads executing jobs.
    fn thread_count(&self) -> usize;
}

struct Lanes {
    high: Sender<Job>,
    low: Sender<Job>,
}

/// Fixed-size pool of named OS threads.
pub struct ThreadWorkerPool {
    lanes: RwLock<Option<Lanes>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    thread_count: usize,
}

impl ThreadWorkerPool {
    /// Spawns `thread_count` workers (at least one) named `{name}-{index}`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if the OS refuses a thread. Workers that
    /// were already started are shut down again.
    pub fn new(name: &str, thread_count: usize) -> Result<Self, PoolError> {
        let thread_count = thread_count.max(1);
        let (high_tx, high_rx) = unbounded::<Job>();
        let (low_tx, low_rx) = unbounded::<Job>();

        let pool = Self {
            lanes: RwLock::new(Some(Lanes {
                high: high_tx,
                low: low_tx,
            })),
            handles: Mutex::new(Vec::with_capacity(thread_count)),
            thread_count,
        };

        for index in 0..thread_count {
            let high = high_rx.clone();
            let low = low_rx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(&high, &low));
            match spawned {
                Ok(handle) => pool.handles().push(handle),
                Err(err) => {
                    pool.shutdown();
                    return Err(PoolError::Spawn(err));
                }
            }
        }

        tracing::debug!(threads = thread_count, "worker pool started");
        Ok(pool)
    }

    /// Stops accepting work and joins every worker.
    ///
    /// Jobs already running finish; queued jobs that have not started are
    /// dropped without running.
    pub fn shutdown(&self) {
        let lanes = self
            .lanes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // Dropping both senders disconnects the lanes and ends the worker loops.
        drop(lanes);
        let handles: Vec<_> = self.handles().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn handles(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WorkerPool for ThreadWorkerPool {
    fn submit(&self, priority: TaskPriority, job: Job) -> Result<(), PoolError> {
        let lanes = self.lanes.read().unwrap_or_else(PoisonError::into_inner);
        let lanes = lanes.as_ref().ok_or(PoolError::ShutDown)?;
        let lane = match priority {
            TaskPriority::High => &lanes.high,
            TaskPriority::Low => &lanes.low,
        };
        lane.send(job).map_err(|_| PoolError::ShutDown)
    }

    fn thread_count(&self) -> usize {
        self.thread_count
    }
}

impl Drop for ThreadWorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(high: &Receiver<Job>, low: &Receiver<Job>) {
    loop {
        let job = match high.try_recv() {
            Ok(job) => job,
            Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => match low.try_recv() {
                Ok(job) => job,
                Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => {
                    let received = select! {
                        recv(high) -> job => job,
                        recv(low) -> job => job,
                    };
                    match received {
                        Ok(job) => job,
                        Err(_) => return,
                    }
                }
            },
        };
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::warn!("worker job panicked");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
