//! Deterministic stand-ins for the pool, preparer and visibility graph.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use glam::{IVec2, IVec3};
use rustc_hash::FxHashSet;

use crate::collaborator::{PrepareError, SectionPreparer, VisibilityGraph};
use crate::item::MeshQueueItem;
use crate::pool::{Job, PoolError, WorkerPool};
use crate::task::{InterruptFlag, TaskPriority};

/// Holds submitted jobs until the test runs them.
#[derive(Default)]
pub struct ManualPool {
    jobs: Mutex<Vec<(TaskPriority, Job)>>,
    pub reject: AtomicBool,
}

impl ManualPool {
    pub fn pending(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn priorities(&self) -> Vec<TaskPriority> {
        self.jobs.lock().unwrap().iter().map(|(p, _)| *p).collect()
    }

    /// Runs every queued job on the calling thread, swallowing panics the way
    /// the real pool does.
    pub fn run_all(&self) -> usize {
        let jobs: Vec<_> = self.jobs.lock().unwrap().drain(..).collect();
        let count = jobs.len();
        for (_, job) in jobs {
            let _ = catch_unwind(AssertUnwindSafe(job));
        }
        count
    }

    /// Drops every queued job without running it.
    pub fn discard_all(&self) {
        self.jobs.lock().unwrap().clear();
    }
}

impl WorkerPool for ManualPool {
    fn submit(&self, priority: TaskPriority, job: Job) -> Result<(), PoolError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(PoolError::ShutDown);
        }
        self.jobs.lock().unwrap().push((priority, job));
        Ok(())
    }

    fn thread_count(&self) -> usize {
        4
    }
}

/// What [`RecordingPreparer`] does when asked to prepare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrepareOutcome {
    Succeed,
    Fail,
    Panic,
}

/// Records prepared items and reports a settable finished-mesh count.
pub struct RecordingPreparer {
    pub prepared: Mutex<Vec<MeshQueueItem>>,
    pub interrupted: AtomicUsize,
    pub meshes_to_load: AtomicUsize,
    outcome: Mutex<PrepareOutcome>,
}

impl Default for RecordingPreparer {
    fn default() -> Self {
        Self {
            prepared: Mutex::new(Vec::new()),
            interrupted: AtomicUsize::new(0),
            meshes_to_load: AtomicUsize::new(0),
            outcome: Mutex::new(PrepareOutcome::Succeed),
        }
    }
}

impl RecordingPreparer {
    pub fn set_outcome(&self, outcome: PrepareOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn prepared_items(&self) -> Vec<MeshQueueItem> {
        self.prepared.lock().unwrap().clone()
    }
}

impl SectionPreparer for RecordingPreparer {
    fn prepare(&self, item: &MeshQueueItem, interrupt: &InterruptFlag) -> Result<(), PrepareError> {
        if interrupt.is_set() {
            self.interrupted.fetch_add(1, Ordering::SeqCst);
            return Err(PrepareError::Interrupted);
        }
        let outcome = *self.outcome.lock().unwrap();
        match outcome {
            PrepareOutcome::Succeed => {
                self.prepared.lock().unwrap().push(*item);
                Ok(())
            }
            PrepareOutcome::Fail => Err(PrepareError::Failed("greedy mesher exploded".into())),
            PrepareOutcome::Panic => panic!("mesh builder bug"),
        }
    }

    fn meshes_to_load(&self) -> usize {
        self.meshes_to_load.load(Ordering::SeqCst)
    }
}

/// Visibility decided by explicit sets instead of a frustum.
#[derive(Default)]
pub struct SetVisibility {
    chunks: Mutex<FxHashSet<IVec2>>,
    hidden_sections: Mutex<FxHashSet<(IVec2, i32)>>,
}

impl SetVisibility {
    pub fn show_chunk(&self, chunk: IVec2) {
        self.chunks.lock().unwrap().insert(chunk);
    }

    pub fn hide_chunk(&self, chunk: IVec2) {
        self.chunks.lock().unwrap().remove(&chunk);
    }

    pub fn hide_section(&self, chunk: IVec2, height: i32) {
        self.hidden_sections.lock().unwrap().insert((chunk, height));
    }

    pub fn show_section(&self, chunk: IVec2, height: i32) {
        self.hidden_sections.lock().unwrap().remove(&(chunk, height));
    }
}

impl VisibilityGraph for SetVisibility {
    fn is_chunk_visible(&self, chunk: IVec2) -> bool {
        self.chunks.lock().unwrap().contains(&chunk)
    }

    fn is_section_visible(&self, chunk: IVec2, height: i32, _min: IVec3, _max: IVec3, _strict: bool) -> bool {
        self.is_chunk_visible(chunk) && !self.hidden_sections.lock().unwrap().contains(&(chunk, height))
    }
}
