//! Owner-loop facade tying the section world to the two queues.
//!
//! Every world edit goes through [`SectionScheduler::set_block`]: the store
//! updates the cell and its occlusion, the invalidator lists the stale
//! sections, and each one lands either in the meshing queue (visible) or the
//! culled queue (hidden). [`SectionScheduler::tick`] runs once per frame to
//! retire invisible work, promote culled sections that came into view and
//! dispatch the next batch.
//!
//! Lock order across the crate: culled queue, world, meshing backlog,
//! in-flight set. No method holds more than the first two at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glam::{IVec2, IVec3};
use strata_voxel::{BlockStateId, SectionWorld, WorldError, split_block_position};

use crate::collaborator::VisibilityGraph;
use crate::culled_queue::CulledQueue;
use crate::invalidation::MeshInvalidator;
use crate::item::MeshQueueItem;
use crate::meshing_queue::ChunkMeshingQueue;

/// Where [`SectionScheduler::queue_section`] put a section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueOutcome {
    /// Visible: waiting in the meshing backlog.
    Meshing,
    /// Hidden: parked in the culled queue.
    Culled,
    /// Column not fully loaded, or nothing to mesh.
    Skipped,
}

/// Counters from one [`SectionScheduler::tick`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Backlog items of invisible chunks moved to the culled queue.
    pub cleaned: usize,
    /// In-flight tasks interrupted because their chunk went out of view.
    pub interrupted: usize,
    /// Culled sections promoted back into the meshing queue.
    pub promoted: usize,
    /// Tasks submitted to the worker pool.
    pub dispatched: usize,
    /// Meshing backlog length after dispatch.
    pub backlog: usize,
    /// Culled queue length after promotion.
    pub culled: usize,
    /// Tasks still running after dispatch.
    pub in_flight: usize,
    /// Whether any section's occlusion changed since the previous tick.
    pub occlusion_changed: bool,
}

/// Drives section meshing for one world.
pub struct SectionScheduler {
    world: Arc<RwLock<SectionWorld>>,
    visibility: Arc<dyn VisibilityGraph>,
    meshing: ChunkMeshingQueue,
    culled: CulledQueue,
    seen_epoch: AtomicU64,
}

impl SectionScheduler {
    /// Creates a scheduler over `world` that dispatches through `meshing`.
    pub fn new(
        world: Arc<RwLock<SectionWorld>>,
        visibility: Arc<dyn VisibilityGraph>,
        meshing: ChunkMeshingQueue,
    ) -> Self {
        let epoch = world
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .occlusion_epoch();
        Self {
            world,
            visibility,
            meshing,
            culled: CulledQueue::new(),
            seen_epoch: AtomicU64::new(epoch),
        }
    }

    /// Shared handle to the world.
    pub fn world(&self) -> &Arc<RwLock<SectionWorld>> {
        &self.world
    }

    /// The meshing queue.
    pub fn meshing(&self) -> &ChunkMeshingQueue {
        &self.meshing
    }

    /// The culled queue.
    pub fn culled(&self) -> &CulledQueue {
        &self.culled
    }

    /// Moves the camera to the section at `section_position` (x, height, z).
    pub fn set_camera(&self, section_position: IVec3) {
        self.meshing.set_camera(section_position);
    }

    /// Writes a block and queues every section whose mesh it stales.
    ///
    /// Returns the previous value. Writing the value already present queues
    /// nothing.
    ///
    /// # Errors
    ///
    /// Propagates [`WorldError`] when the position is outside the loaded world.
    pub fn set_block(
        &self,
        pos: IVec3,
        value: Option<BlockStateId>,
    ) -> Result<Option<BlockStateId>, WorldError> {
        let previous = self.write_world().set_block(pos, value)?;
        if previous == value {
            return Ok(previous);
        }

        let (chunk, height, local) = split_block_position(pos);
        for item in MeshInvalidator::affected_sections(chunk, height, local) {
            self.queue_section(item.chunk, item.height, false);
        }
        Ok(previous)
    }

    /// Routes section `(chunk, height)` to the queue it belongs in.
    ///
    /// Sections of columns that are not fully loaded are skipped. Empty or
    /// missing sections are skipped and any pending entry for them is
    /// dropped. Otherwise the section goes to the meshing queue when
    /// `ignore_frustum` is set or the visibility graph reports it visible
    /// (occlusion included), and to the culled queue when not.
    pub fn queue_section(&self, chunk: IVec2, height: i32, ignore_frustum: bool) -> QueueOutcome {
        let bounds = {
            let world = self.read_world();
            let Some(column) = world.column(chunk) else {
                return QueueOutcome::Skipped;
            };
            if !column.is_fully_loaded() {
                return QueueOutcome::Skipped;
            }
            column.section(height).and_then(|section| section.bounds())
        };

        let Some(bounds) = bounds else {
            self.culled.remove_section(chunk, height);
            self.meshing.remove_section(chunk, height);
            return QueueOutcome::Skipped;
        };

        let min = IVec3::from_array(bounds.min.map(i32::from));
        let max = IVec3::from_array(bounds.max.map(i32::from)) + IVec3::ONE;
        if ignore_frustum || self.visibility.is_section_visible(chunk, height, min, max, true) {
            self.culled.remove_section(chunk, height);
            self.meshing.queue(MeshQueueItem::new(chunk, height));
            QueueOutcome::Meshing
        } else {
            self.meshing.remove_section(chunk, height);
            self.culled.queue(chunk, height);
            QueueOutcome::Culled
        }
    }

    /// Queues every non-empty section of a loaded column, e.g. after it
    /// finished loading. Returns how many went to the meshing queue.
    pub fn queue_column(&self, chunk: IVec2) -> usize {
        let heights: Vec<i32> = match self.read_world().column(chunk) {
            Some(column) if column.is_fully_loaded() => column.non_empty_heights().collect(),
            _ => return 0,
        };
        heights
            .into_iter()
            .filter(|&height| self.queue_section(chunk, height, false) == QueueOutcome::Meshing)
            .count()
    }

    /// Forgets every queued or running section of `chunk` and unloads its
    /// column. Returns `true` if the column was loaded.
    pub fn unload_chunk(&self, chunk: IVec2) -> bool {
        self.culled.remove_chunk(chunk);
        self.meshing.remove_chunk(chunk);
        let interrupted = self.meshing.interrupt_chunk(chunk);
        let unloaded = self.write_world().unload_column(chunk).is_some();
        tracing::debug!(%chunk, interrupted, unloaded, "chunk unloaded");
        unloaded
    }

    /// Drops all queued work, interrupts all running tasks and unloads every column.
    pub fn unload_world(&self) {
        self.culled.clear();
        self.meshing.clear();
        let interrupted = self.meshing.interrupt_all();
        self.write_world().clear();
        tracing::debug!(interrupted, "world unloaded");
    }

    /// Runs one scheduling pass.
    ///
    /// Backlog entries and running tasks of chunks that left the view are
    /// parked in the culled queue, visible culled sections are promoted, the
    /// backlog is sorted nearest-first and the next batch is dispatched.
    pub fn tick(&self) -> TickStats {
        let visibility = self.visibility.as_ref();

        let cleaned = self.meshing.cleanup(visibility);
        for item in &cleaned {
            self.culled.queue(item.chunk, item.height);
        }
        let interrupted = self.meshing.interrupt_invisible(visibility);
        for item in &interrupted {
            self.culled.queue(item.chunk, item.height);
        }

        let promoted = self.culled.collect(&self.world, visibility);
        for &item in &promoted {
            self.meshing.queue(item);
        }

        self.meshing.sort();
        let dispatched = self.meshing.work();

        let epoch = self.read_world().occlusion_epoch();
        let occlusion_changed = self.seen_epoch.swap(epoch, Ordering::Relaxed) != epoch;

        let stats = TickStats {
            cleaned: cleaned.len(),
            interrupted: interrupted.len(),
            promoted: promoted.len(),
            dispatched,
            backlog: self.meshing.len(),
            culled: self.culled.len(),
            in_flight: self.meshing.in_flight_count(),
            occlusion_changed,
        };
        tracing::trace!(?stats, "scheduler tick");
        stats
    }

    fn read_world(&self) -> RwLockReadGuard<'_, SectionWorld> {
        self.world.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_world(&self) -> RwLockWriteGuard<'_, SectionWorld> {
        self.world.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod scenario_tests;
