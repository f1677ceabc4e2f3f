//! Dispatched preparation tasks and their cooperative interrupt flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::item::MeshQueueItem;

/// Worker-pool lane a task is submitted to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskPriority {
    /// Sections of the chunk the camera is standing in.
    High,
    /// Everything else.
    Low,
}

/// Shared cancellation flag between the scheduler and a running task.
///
/// Setting it never stops anything by itself: the preparer is expected to
/// poll [`is_set`](Self::is_set) and bail out.
#[derive(Clone, Debug, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    /// Creates a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests interruption.
    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once interruption was requested.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Unique id of a dispatched task.
pub type TaskId = u64;

/// A work item that has been handed to the worker pool.
#[derive(Clone, Debug)]
pub struct SectionMeshTask {
    /// Unique per queue, used to release the in-flight slot.
    pub id: TaskId,
    /// The section being prepared.
    pub item: MeshQueueItem,
    /// Lane the task was submitted to.
    pub priority: TaskPriority,
    /// Flag the preparer polls.
    pub interrupt: InterruptFlag,
}

impl SectionMeshTask {
    /// Requests cooperative interruption of this task.
    pub fn interrupt(&self) {
        self.interrupt.set();
    }
}
