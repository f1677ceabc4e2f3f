//! Parking area for stale sections the camera cannot currently see.
//!
//! Entries wait here without taking meshing slots until
//! [`CulledQueue::collect`] finds them visible again and hands them back for
//! the meshing queue.
//!
//! Lock order: the culled lock is always taken before the world lock.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use glam::{IVec2, IVec3};
use rustc_hash::{FxHashMap, FxHashSet};
use strata_voxel::{SECTION_WIDTH, SectionWorld};

use crate::collaborator::VisibilityGraph;
use crate::item::MeshQueueItem;

/// Pending section heights per chunk column.
#[derive(Debug, Default)]
pub struct CulledQueue {
    queue: Mutex<FxHashMap<IVec2, FxHashSet<i32>>>,
}

impl CulledQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks section `(chunk, height)`. Parking it twice keeps one entry.
    pub fn queue(&self, chunk: IVec2, height: i32) {
        self.lock().entry(chunk).or_default().insert(height);
    }

    /// Removes and returns every parked section that is visible now.
    ///
    /// A section counts as visible when its chunk is and the frustum test on
    /// the whole section passes. Entries whose column was unloaded or whose
    /// section became empty are dropped without being returned. Chunks left
    /// with no heights are removed.
    pub fn collect(
        &self,
        world: &RwLock<SectionWorld>,
        visibility: &dyn VisibilityGraph,
    ) -> Vec<MeshQueueItem> {
        let mut queue = self.lock();
        if queue.is_empty() {
            return Vec::new();
        }
        let world = world.read().unwrap_or_else(PoisonError::into_inner);

        let full = IVec3::splat(SECTION_WIDTH as i32);
        let mut collected = Vec::new();
        let mut dropped = 0usize;
        queue.retain(|&chunk, heights| {
            let Some(column) = world.column(chunk) else {
                dropped += heights.len();
                return false;
            };
            if !visibility.is_chunk_visible(chunk) {
                return true;
            }
            heights.retain(|&height| {
                if column.section(height).is_none_or(|section| section.is_empty()) {
                    dropped += 1;
                    return false;
                }
                if visibility.is_section_visible(chunk, height, IVec3::ZERO, full, false) {
                    collected.push(MeshQueueItem::new(chunk, height));
                    return false;
                }
                true
            });
            !heights.is_empty()
        });

        if !collected.is_empty() || dropped > 0 {
            tracing::debug!(promoted = collected.len(), dropped, "culled queue collected");
        }
        collected
    }

    /// Drops every chunk the visibility graph no longer shows at all and
    /// returns how many sections went with them.
    pub fn cleanup(&self, visibility: &dyn VisibilityGraph) -> usize {
        let mut removed = 0;
        self.lock().retain(|&chunk, heights| {
            let keep = visibility.is_chunk_visible(chunk);
            if !keep {
                removed += heights.len();
            }
            keep
        });
        removed
    }

    /// Drops everything.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Drops every parked section of `chunk`, returning how many there were.
    pub fn remove_chunk(&self, chunk: IVec2) -> usize {
        self.lock().remove(&chunk).map_or(0, |heights| heights.len())
    }

    /// Drops one parked section. Returns `true` if it was parked.
    pub fn remove_section(&self, chunk: IVec2, height: i32) -> bool {
        let mut queue = self.lock();
        let Some(heights) = queue.get_mut(&chunk) else {
            return false;
        };
        let removed = heights.remove(&height);
        if heights.is_empty() {
            queue.remove(&chunk);
        }
        removed
    }

    /// Returns `true` if section `(chunk, height)` is parked.
    pub fn contains(&self, chunk: IVec2, height: i32) -> bool {
        self.lock()
            .get(&chunk)
            .is_some_and(|heights| heights.contains(&height))
    }

    /// Number of parked sections.
    pub fn len(&self) -> usize {
        self.lock().values().map(FxHashSet::len).sum()
    }

    /// Returns `true` if nothing is parked.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of chunks with at least one parked section.
    pub fn chunk_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<IVec2, FxHashSet<i32>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use strata_voxel::{BlockRegistry, BlockStateDef, Transparency};

    use super::*;
    use crate::test_support::SetVisibility;

    fn world_with(chunks: &[IVec2], heights: &[i32]) -> RwLock<SectionWorld> {
        let mut registry = BlockRegistry::new();
        let stone = registry
            .register(BlockStateDef {
                name: "stone".into(),
                transparency: Transparency::Opaque,
                full_cube: true,
                fluid: false,
            })
            .unwrap();
        let mut world = SectionWorld::new(Arc::new(registry), -4, 4);
        for &chunk in chunks {
            world.load_column(chunk, world.new_column());
            for &height in heights {
                let pos = IVec3::new(chunk.x * 16, height * 16, chunk.y * 16);
                world.set_block(pos, Some(stone)).unwrap();
            }
        }
        RwLock::new(world)
    }

    #[test]
    fn test_queue_dedups_heights() {
        let culled = CulledQueue::new();
        culled.queue(IVec2::ZERO, 1);
        culled.queue(IVec2::ZERO, 1);
        culled.queue(IVec2::ZERO, 2);
        culled.queue(IVec2::ONE, 1);
        assert_eq!(culled.len(), 3);
        assert_eq!(culled.chunk_count(), 2);
        assert!(culled.contains(IVec2::ZERO, 2));
    }

    #[test]
    fn test_collect_promotes_visible_once() {
        let world = world_with(&[IVec2::ZERO], &[0, 1]);
        let visibility = SetVisibility::default();
        let culled = CulledQueue::new();
        culled.queue(IVec2::ZERO, 0);
        culled.queue(IVec2::ZERO, 1);

        assert!(culled.collect(&world, &visibility).is_empty(), "nothing visible yet");
        assert_eq!(culled.len(), 2);

        visibility.show_chunk(IVec2::ZERO);
        visibility.hide_section(IVec2::ZERO, 1);
        assert_eq!(
            culled.collect(&world, &visibility),
            vec![MeshQueueItem::new(IVec2::ZERO, 0)]
        );
        assert!(culled.collect(&world, &visibility).is_empty(), "second collect is empty");
        assert!(culled.contains(IVec2::ZERO, 1));

        visibility.show_section(IVec2::ZERO, 1);
        assert_eq!(
            culled.collect(&world, &visibility),
            vec![MeshQueueItem::new(IVec2::ZERO, 1)]
        );
        assert!(culled.is_empty(), "chunk entry dropped once its heights are gone");
    }

    #[test]
    fn test_collect_drops_unloaded_and_emptied_sections() {
        let world = world_with(&[IVec2::ZERO], &[0, 1]);
        let visibility = SetVisibility::default();
        visibility.show_chunk(IVec2::ZERO);
        visibility.show_chunk(IVec2::ONE);
        let culled = CulledQueue::new();
        culled.queue(IVec2::ZERO, 0);
        culled.queue(IVec2::ZERO, 3);
        culled.queue(IVec2::ONE, 0);

        world
            .write()
            .unwrap()
            .set_block(IVec3::ZERO, None)
            .unwrap();

        assert!(culled.collect(&world, &visibility).is_empty());
        assert!(culled.is_empty());
    }

    #[test]
    fn test_cleanup_drops_invisible_chunks() {
        let visibility = SetVisibility::default();
        visibility.show_chunk(IVec2::ZERO);
        let culled = CulledQueue::new();
        culled.queue(IVec2::ZERO, 0);
        culled.queue(IVec2::ONE, 0);
        culled.queue(IVec2::ONE, 1);

        assert_eq!(culled.cleanup(&visibility), 2);
        assert_eq!(culled.len(), 1);
        assert!(culled.contains(IVec2::ZERO, 0));
    }

    #[test]
    fn test_remove_and_clear() {
        let culled = CulledQueue::new();
        culled.queue(IVec2::ZERO, 0);
        culled.queue(IVec2::ZERO, 1);
        culled.queue(IVec2::ONE, 0);

        assert!(culled.remove_section(IVec2::ONE, 0));
        assert!(!culled.remove_section(IVec2::ONE, 0));
        assert_eq!(culled.chunk_count(), 1);
        assert_eq!(culled.remove_chunk(IVec2::ZERO), 2);
        assert_eq!(culled.remove_chunk(IVec2::ZERO), 0);

        culled.queue(IVec2::ONE, 5);
        culled.clear();
        assert!(culled.is_empty());
    }
}
