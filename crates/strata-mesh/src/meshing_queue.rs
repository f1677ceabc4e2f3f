//! Front-line queue of visible sections whose mesh is stale.
//!
//! [`ChunkMeshingQueue`] keeps a de-duplicated, camera-ordered backlog and a
//! bounded set of in-flight [`SectionMeshTask`]s. [`work`](ChunkMeshingQueue::work)
//! moves items from the backlog into the worker pool, never exceeding
//! `max_preparing_tasks` and pausing while the finished-mesh backlog is full.
//!
//! The backlog and the in-flight set have separate locks and are never held
//! together: dispatch runs on the owner thread while completions arrive from
//! workers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glam::{IVec2, IVec3};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::collaborator::{PrepareError, SectionPreparer, VisibilityGraph};
use crate::item::MeshQueueItem;
use crate::limits::MeshingLimits;
use crate::pool::WorkerPool;
use crate::task::{InterruptFlag, SectionMeshTask, TaskId, TaskPriority};

type TaskSet = Arc<Mutex<FxHashMap<TaskId, SectionMeshTask>>>;

#[derive(Debug, Default)]
struct Backlog {
    items: VecDeque<MeshQueueItem>,
    pending: FxHashSet<MeshQueueItem>,
}

impl Backlog {
    fn retain(&mut self, mut keep: impl FnMut(&MeshQueueItem) -> bool) -> Vec<MeshQueueItem> {
        let mut removed = Vec::new();
        self.items.retain(|item| {
            let kept = keep(item);
            if !kept {
                removed.push(*item);
            }
            kept
        });
        for item in &removed {
            self.pending.remove(item);
        }
        removed
    }
}

/// Dispatcher for stale, visible sections.
pub struct ChunkMeshingQueue {
    backlog: Mutex<Backlog>,
    tasks: TaskSet,
    working: AtomicBool,
    /// Section-grid position of the camera.
    camera: Mutex<IVec3>,
    next_task_id: AtomicU64,
    limits: MeshingLimits,
    pool: Arc<dyn WorkerPool>,
    preparer: Arc<dyn SectionPreparer>,
}

impl ChunkMeshingQueue {
    /// Creates an empty queue dispatching into `pool`.
    pub fn new(
        limits: MeshingLimits,
        pool: Arc<dyn WorkerPool>,
        preparer: Arc<dyn SectionPreparer>,
    ) -> Self {
        Self {
            backlog: Mutex::new(Backlog::default()),
            tasks: Arc::new(Mutex::new(FxHashMap::default())),
            working: AtomicBool::new(false),
            camera: Mutex::new(IVec3::ZERO),
            next_task_id: AtomicU64::new(0),
            limits,
            pool,
            preparer,
        }
    }

    /// Dispatch limits in effect.
    pub fn limits(&self) -> MeshingLimits {
        self.limits
    }

    /// Moves the camera to the section at `section_position` (x, height, z).
    pub fn set_camera(&self, section_position: IVec3) {
        *lock(&self.camera) = section_position;
    }

    /// Section-grid position of the camera.
    pub fn camera(&self) -> IVec3 {
        *lock(&self.camera)
    }

    /// Chunk column the camera is in.
    pub fn camera_chunk(&self) -> IVec2 {
        let camera = self.camera();
        IVec2::new(camera.x, camera.z)
    }

    /// Adds `item` to the backlog, replacing a pending entry for the same section.
    ///
    /// Sections of the camera's chunk go to the front, everything else to the back.
    pub fn queue(&self, item: MeshQueueItem) {
        let camera_chunk = self.camera_chunk();
        let mut backlog = lock(&self.backlog);
        if backlog.pending.remove(&item) {
            backlog.items.retain(|queued| *queued != item);
        }
        if item.chunk == camera_chunk {
            backlog.items.push_front(item);
        } else {
            backlog.items.push_back(item);
        }
        backlog.pending.insert(item);
    }

    /// Orders the backlog nearest-first, with the camera's chunk ahead of everything.
    pub fn sort(&self) {
        let camera = self.camera();
        let camera_chunk = IVec2::new(camera.x, camera.z);
        let mut backlog = lock(&self.backlog);
        backlog.items.make_contiguous().sort_by_key(|item| {
            if item.chunk == camera_chunk {
                i64::MIN
            } else {
                item.distance_squared(camera)
            }
        });
    }

    /// Dispatches as many backlog items as the limits allow and returns how
    /// many were submitted.
    ///
    /// Does nothing while another `work` call is running, when the backlog is
    /// empty, when `max_preparing_tasks` tasks are already in flight, or when
    /// the preparer reports `max_meshes_to_load` finished meshes waiting.
    pub fn work(&self) -> usize {
        if self.working.swap(true, Ordering::Acquire) {
            return 0;
        }
        let _working = WorkingGuard(&self.working);

        if self.is_empty() {
            return 0;
        }
        let in_flight = self.in_flight_count();
        if in_flight >= self.limits.max_preparing_tasks {
            return 0;
        }
        let meshes_to_load = self.preparer.meshes_to_load();
        if meshes_to_load >= self.limits.max_meshes_to_load {
            tracing::trace!(meshes_to_load, "finished-mesh backlog full, dispatch paused");
            return 0;
        }

        let available = self.limits.max_preparing_tasks - in_flight;
        let batch: Vec<MeshQueueItem> = {
            let mut backlog = lock(&self.backlog);
            let take = available.min(backlog.items.len());
            let batch: Vec<_> = backlog.items.drain(..take).collect();
            for item in &batch {
                backlog.pending.remove(item);
            }
            batch
        };

        let camera_chunk = self.camera_chunk();
        let mut dispatched = 0;
        for (index, &item) in batch.iter().enumerate() {
            let priority = if item.chunk == camera_chunk {
                TaskPriority::High
            } else {
                TaskPriority::Low
            };
            if let Err(err) = self.dispatch(item, priority) {
                tracing::warn!(%err, "worker pool rejected section task, requeueing");
                self.requeue_front(&batch[index..]);
                break;
            }
            dispatched += 1;
        }

        tracing::debug!(dispatched, in_flight = in_flight + dispatched, "meshing pass");
        dispatched
    }

    fn dispatch(
        &self,
        item: MeshQueueItem,
        priority: TaskPriority,
    ) -> Result<(), crate::pool::PoolError> {
        let task = SectionMeshTask {
            id: self.next_task_id.fetch_add(1, Ordering::Relaxed),
            item,
            priority,
            interrupt: InterruptFlag::new(),
        };
        let interrupt = task.interrupt.clone();
        let slot = TaskSlot {
            tasks: Arc::clone(&self.tasks),
            id: task.id,
        };
        lock(&self.tasks).insert(task.id, task);

        let preparer = Arc::clone(&self.preparer);
        // The slot travels with the job: it is released when the job finishes,
        // panics, or is dropped unrun by the pool.
        self.pool.submit(
            priority,
            Box::new(move || {
                let _slot = slot;
                prepare_section(preparer.as_ref(), item, &interrupt);
            }),
        )
    }

    /// Puts undispatched items back at the front, keeping their order and
    /// skipping any that were queued again in the meantime.
    fn requeue_front(&self, items: &[MeshQueueItem]) {
        let mut backlog = lock(&self.backlog);
        for &item in items.iter().rev() {
            if backlog.pending.insert(item) {
                backlog.items.push_front(item);
            }
        }
    }

    /// Drops every backlog entry of `chunk` and returns how many were removed.
    pub fn remove_chunk(&self, chunk: IVec2) -> usize {
        lock(&self.backlog).retain(|item| item.chunk != chunk).len()
    }

    /// Drops the backlog entry for one section. Returns `true` if one was pending.
    pub fn remove_section(&self, chunk: IVec2, height: i32) -> bool {
        let item = MeshQueueItem::new(chunk, height);
        let mut backlog = lock(&self.backlog);
        if !backlog.pending.remove(&item) {
            return false;
        }
        backlog.items.retain(|queued| *queued != item);
        true
    }

    /// Drops backlog entries whose chunk is no longer visible and returns them.
    pub fn cleanup(&self, visibility: &dyn VisibilityGraph) -> Vec<MeshQueueItem> {
        lock(&self.backlog).retain(|item| visibility.is_chunk_visible(item.chunk))
    }

    /// Drops the whole backlog. In-flight tasks are untouched.
    pub fn clear(&self) {
        let mut backlog = lock(&self.backlog);
        backlog.items.clear();
        backlog.pending.clear();
    }

    /// Interrupts in-flight tasks of `chunk`.
    pub fn interrupt_chunk(&self, chunk: IVec2) -> usize {
        self.interrupt_where(|task| task.item.chunk == chunk)
    }

    /// Interrupts the in-flight task of one section.
    pub fn interrupt_section(&self, chunk: IVec2, height: i32) -> usize {
        let item = MeshQueueItem::new(chunk, height);
        self.interrupt_where(|task| task.item == item)
    }

    /// Interrupts every in-flight task.
    pub fn interrupt_all(&self) -> usize {
        self.interrupt_where(|_| true)
    }

    /// Interrupts in-flight tasks whose chunk is no longer visible and
    /// returns their items. Tasks interrupted earlier are not reported again.
    pub fn interrupt_invisible(&self, visibility: &dyn VisibilityGraph) -> Vec<MeshQueueItem> {
        lock(&self.tasks)
            .values()
            .filter(|task| !task.interrupt.is_set() && !visibility.is_chunk_visible(task.item.chunk))
            .map(|task| {
                task.interrupt();
                task.item
            })
            .collect()
    }

    fn interrupt_where(&self, mut matches: impl FnMut(&SectionMeshTask) -> bool) -> usize {
        let tasks = lock(&self.tasks);
        let mut interrupted = 0;
        for task in tasks.values().filter(|task| matches(task)) {
            task.interrupt();
            interrupted += 1;
        }
        interrupted
    }

    /// Releases the in-flight slot of task `id`.
    ///
    /// Dispatched jobs do this themselves when they end; calling it early
    /// frees the slot while the job keeps running.
    pub fn remove_task(&self, id: TaskId) -> Option<SectionMeshTask> {
        lock(&self.tasks).remove(&id)
    }

    /// Number of backlog entries.
    pub fn len(&self) -> usize {
        lock(&self.backlog).items.len()
    }

    /// Returns `true` if the backlog is empty.
    pub fn is_empty(&self) -> bool {
        lock(&self.backlog).items.is_empty()
    }

    /// Returns `true` if `item` is waiting in the backlog.
    pub fn contains(&self, item: &MeshQueueItem) -> bool {
        lock(&self.backlog).pending.contains(item)
    }

    /// Snapshot of the backlog in dispatch order.
    pub fn backlog(&self) -> Vec<MeshQueueItem> {
        lock(&self.backlog).items.iter().copied().collect()
    }

    /// Number of dispatched tasks that have not finished.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.tasks).len()
    }

    /// Snapshot of the in-flight tasks.
    pub fn in_flight(&self) -> Vec<SectionMeshTask> {
        lock(&self.tasks).values().cloned().collect()
    }
}

fn prepare_section(preparer: &dyn SectionPreparer, item: MeshQueueItem, interrupt: &InterruptFlag) {
    if interrupt.is_set() {
        tracing::trace!(chunk = %item.chunk, height = item.height, "task interrupted before start");
        return;
    }
    match preparer.prepare(&item, interrupt) {
        Ok(()) => tracing::trace!(chunk = %item.chunk, height = item.height, "section prepared"),
        Err(PrepareError::Interrupted) => {
            tracing::trace!(chunk = %item.chunk, height = item.height, "section preparation interrupted");
        }
        Err(err) => {
            tracing::warn!(chunk = %item.chunk, height = item.height, %err, "section preparation failed");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the non-reentrancy flag when a `work` pass ends.
struct WorkingGuard<'a>(&'a AtomicBool);

impl Drop for WorkingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns one in-flight slot; dropping it removes the task from the set.
struct TaskSlot {
    tasks: TaskSet,
    id: TaskId,
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        lock(&self.tasks).remove(&self.id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ManualPool, PrepareOutcome, RecordingPreparer, SetVisibility};

    fn item(x: i32, z: i32, height: i32) -> MeshQueueItem {
        MeshQueueItem::new(IVec2::new(x, z), height)
    }

    fn queue_with(limits: MeshingLimits) -> (ChunkMeshingQueue, Arc<ManualPool>, Arc<RecordingPreparer>) {
        let pool = Arc::new(ManualPool::default());
        let preparer = Arc::new(RecordingPreparer::default());
        let queue = ChunkMeshingQueue::new(limits, pool.clone(), preparer.clone());
        (queue, pool, preparer)
    }

    fn limits(max_preparing_tasks: usize, max_meshes_to_load: usize) -> MeshingLimits {
        MeshingLimits {
            max_preparing_tasks,
            max_meshes_to_load,
        }
    }

    #[test]
    fn test_duplicate_enqueue_keeps_one_entry() {
        let (queue, _, _) = queue_with(limits(4, 10));
        queue.set_camera(IVec3::new(100, 0, 100));
        let a = item(1, 1, 0);
        let b = item(2, 2, 0);

        queue.queue(a);
        queue.queue(b);
        queue.queue(a);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.backlog(), vec![b, a], "second enqueue decides the position");
    }

    #[test]
    fn test_camera_chunk_goes_to_front() {
        let (queue, _, _) = queue_with(limits(4, 10));
        queue.set_camera(IVec3::new(5, 3, 5));
        let far = item(9, 9, 0);
        let own = item(5, 5, 12);

        queue.queue(far);
        queue.queue(own);
        assert_eq!(queue.backlog(), vec![own, far]);

        // Re-enqueueing the camera chunk section keeps it at the front once.
        queue.queue(far);
        queue.queue(own);
        assert_eq!(queue.backlog(), vec![own, far]);
    }

    #[test]
    fn test_sort_nearest_first_with_camera_chunk_override() {
        let (queue, _, _) = queue_with(limits(4, 10));
        queue.set_camera(IVec3::new(0, 4, 0));
        let near = item(1, 0, 4);
        let mid = item(3, 0, 4);
        let far = item(10, 0, 4);
        // Same chunk as the camera but far away vertically.
        let own = item(0, 0, -20);

        for it in [far, own, mid, near] {
            queue.queue(it);
        }
        queue.set_camera(IVec3::new(0, 4, 0));
        queue.sort();
        assert_eq!(queue.backlog(), vec![own, near, mid, far]);
    }

    #[test]
    fn test_sort_orders_chunks_across_the_world() {
        let (queue, _, _) = queue_with(limits(4, 10));
        queue.set_camera(IVec3::new(50_000, 0, 0));
        let opposite = item(-50_000, 0, 0);
        let edge = item(-60_000, 0, 0);
        let near = item(49_000, 0, 0);

        for it in [edge, opposite, near] {
            queue.queue(it);
        }
        queue.sort();
        assert_eq!(queue.backlog(), vec![near, opposite, edge]);
    }

    #[test]
    fn test_work_on_empty_backlog_does_nothing() {
        let (queue, pool, _) = queue_with(limits(4, 10));
        assert_eq!(queue.work(), 0);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_dispatch_respects_available_slots() {
        let (queue, pool, preparer) = queue_with(limits(3, 10));
        queue.set_camera(IVec3::new(50, 0, 50));
        for x in 0..5 {
            queue.queue(item(x, 0, 0));
        }

        assert_eq!(queue.work(), 3);
        assert_eq!(queue.in_flight_count(), 3);
        assert_eq!(queue.len(), 2);

        // Saturated: nothing more until tasks finish.
        assert_eq!(queue.work(), 0);
        assert_eq!(pool.pending(), 3);

        assert_eq!(pool.run_all(), 3);
        assert_eq!(queue.in_flight_count(), 0, "finished tasks release their slots");
        assert_eq!(preparer.prepared_items(), vec![item(0, 0, 0), item(1, 0, 0), item(2, 0, 0)]);

        assert_eq!(queue.work(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_partial_slots_limit_batch() {
        let (queue, pool, _) = queue_with(limits(3, 10));
        queue.set_camera(IVec3::new(50, 0, 50));
        queue.queue(item(0, 0, 0));
        queue.queue(item(1, 0, 0));
        assert_eq!(queue.work(), 2);

        for x in 2..6 {
            queue.queue(item(x, 0, 0));
        }
        assert_eq!(queue.work(), 1, "only max - in_flight new tasks");
        assert_eq!(queue.in_flight_count(), 3);
        assert_eq!(pool.pending(), 3);
    }

    #[test]
    fn test_full_mesh_backlog_pauses_dispatch() {
        let (queue, pool, preparer) = queue_with(limits(4, 2));
        queue.queue(item(1, 0, 0));
        preparer.meshes_to_load.store(2, std::sync::atomic::Ordering::SeqCst);

        assert_eq!(queue.work(), 0);
        assert_eq!(queue.len(), 1, "backlog untouched while paused");
        assert_eq!(pool.pending(), 0);

        preparer.meshes_to_load.store(1, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(queue.work(), 1);
    }

    #[test]
    fn test_camera_chunk_dispatches_on_high_lane() {
        let (queue, pool, _) = queue_with(limits(4, 10));
        queue.set_camera(IVec3::new(2, 0, 2));
        queue.queue(item(7, 7, 0));
        queue.queue(item(2, 2, 1));
        queue.work();
        assert_eq!(pool.priorities(), vec![TaskPriority::High, TaskPriority::Low]);
    }

    #[test]
    fn test_work_is_not_reentrant() {
        let (queue, pool, _) = queue_with(limits(4, 10));
        queue.queue(item(1, 0, 0));
        queue.working.store(true, Ordering::SeqCst);
        assert_eq!(queue.work(), 0);
        assert_eq!(pool.pending(), 0);

        queue.working.store(false, Ordering::SeqCst);
        assert_eq!(queue.work(), 1);
        assert!(!queue.working.load(Ordering::SeqCst), "flag cleared after the pass");
    }

    #[test]
    fn test_failed_preparation_releases_slot() {
        let (queue, pool, preparer) = queue_with(limits(1, 10));
        preparer.set_outcome(PrepareOutcome::Fail);
        queue.queue(item(1, 0, 0));
        queue.work();
        assert_eq!(queue.in_flight_count(), 1);
        pool.run_all();
        assert_eq!(queue.in_flight_count(), 0);
    }

    #[test]
    fn test_panicking_preparation_releases_slot() {
        let (queue, pool, preparer) = queue_with(limits(1, 10));
        preparer.set_outcome(PrepareOutcome::Panic);
        queue.queue(item(1, 0, 0));
        queue.work();
        pool.run_all();
        assert_eq!(queue.in_flight_count(), 0);
    }

    #[test]
    fn test_dropped_job_releases_slot() {
        let (queue, pool, _) = queue_with(limits(2, 10));
        queue.queue(item(1, 0, 0));
        queue.work();
        pool.discard_all();
        assert_eq!(queue.in_flight_count(), 0);
    }

    #[test]
    fn test_rejected_submit_requeues_items() {
        let (queue, pool, _) = queue_with(limits(4, 10));
        queue.set_camera(IVec3::new(50, 0, 50));
        let items = [item(1, 0, 0), item(2, 0, 0), item(3, 0, 0)];
        for it in items {
            queue.queue(it);
        }
        pool.reject.store(true, Ordering::SeqCst);

        assert_eq!(queue.work(), 0);
        assert_eq!(queue.in_flight_count(), 0);
        assert_eq!(queue.backlog(), items.to_vec(), "order preserved on requeue");
    }

    #[test]
    fn test_interrupts_target_matching_tasks() {
        let (queue, pool, preparer) = queue_with(limits(8, 10));
        queue.set_camera(IVec3::new(50, 0, 50));
        for it in [item(1, 0, 0), item(1, 0, 1), item(2, 0, 0), item(3, 0, 0)] {
            queue.queue(it);
        }
        queue.work();

        assert_eq!(queue.interrupt_section(IVec2::new(2, 0), 0), 1);
        assert_eq!(queue.interrupt_chunk(IVec2::new(1, 0)), 2);
        let interrupted: Vec<_> = queue
            .in_flight()
            .into_iter()
            .filter(|task| task.interrupt.is_set())
            .map(|task| task.item)
            .collect();
        assert_eq!(interrupted.len(), 3);
        assert!(!interrupted.contains(&item(3, 0, 0)));

        pool.run_all();
        assert_eq!(preparer.prepared_items(), vec![item(3, 0, 0)]);
        assert_eq!(queue.in_flight_count(), 0);
    }

    #[test]
    fn test_interrupt_all_and_invisible() {
        let (queue, _, _) = queue_with(limits(8, 10));
        queue.queue(item(1, 0, 0));
        queue.queue(item(2, 0, 0));
        queue.work();

        let visibility = SetVisibility::default();
        visibility.show_chunk(IVec2::new(1, 0));
        assert_eq!(queue.interrupt_invisible(&visibility), vec![item(2, 0, 0)]);
        assert!(queue.interrupt_invisible(&visibility).is_empty(), "reported once");
        assert_eq!(queue.interrupt_all(), 2);
        assert!(queue.in_flight().iter().all(|task| task.interrupt.is_set()));
    }

    #[test]
    fn test_remove_task_frees_slot_early() {
        let (queue, pool, _) = queue_with(limits(1, 10));
        queue.queue(item(1, 0, 0));
        queue.queue(item(2, 0, 0));
        queue.work();
        let id = queue.in_flight()[0].id;

        assert!(queue.remove_task(id).is_some());
        assert_eq!(queue.work(), 1);
        pool.run_all();
        assert_eq!(queue.in_flight_count(), 0);
    }

    #[test]
    fn test_remove_and_cleanup() {
        let (queue, _, _) = queue_with(limits(4, 10));
        queue.set_camera(IVec3::new(50, 0, 50));
        for it in [item(1, 0, 0), item(1, 0, 1), item(2, 0, 0), item(3, 0, 0)] {
            queue.queue(it);
        }

        assert_eq!(queue.remove_chunk(IVec2::new(1, 0)), 2);
        assert!(!queue.contains(&item(1, 0, 1)));
        assert!(queue.remove_section(IVec2::new(2, 0), 0));
        assert!(!queue.remove_section(IVec2::new(2, 0), 0));

        queue.queue(item(4, 0, 0));
        let visibility = SetVisibility::default();
        visibility.show_chunk(IVec2::new(4, 0));
        assert_eq!(queue.cleanup(&visibility), vec![item(3, 0, 0)]);
        assert_eq!(queue.backlog(), vec![item(4, 0, 0)]);

        queue.clear();
        assert!(queue.is_empty());
        // Cleared items can be queued again.
        queue.queue(item(4, 0, 0));
        assert_eq!(queue.len(), 1);
    }
}
