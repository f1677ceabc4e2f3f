//! Mesh invalidation: which sections need remeshing after a block edit.

use glam::IVec2;
use strata_voxel::{SECTION_MAX, neighbor_offsets};

use crate::item::MeshQueueItem;

/// Determines which sections need remeshing after a block edit.
pub struct MeshInvalidator;

impl MeshInvalidator {
    /// Returns the sections whose meshes depend on the block at `local_pos`
    /// inside section `(chunk, height)`.
    ///
    /// The edited section always comes first. A neighbor is added for every
    /// face, edge or corner step whose shared boundary the block touches,
    /// since neighbor meshes read it for face culling and smooth lighting.
    pub fn affected_sections(
        chunk: IVec2,
        height: i32,
        local_pos: (usize, usize, usize),
    ) -> Vec<MeshQueueItem> {
        let mut dirty = vec![MeshQueueItem::new(chunk, height)];
        let (x, y, z) = local_pos;

        for (dx, dy, dz) in neighbor_offsets() {
            if touches(x, dx) && touches(y, dy) && touches(z, dz) {
                dirty.push(MeshQueueItem::new(
                    IVec2::new(chunk.x + dx, chunk.y + dz),
                    height + dy,
                ));
            }
        }

        dirty
    }
}

/// Whether a local coordinate lies on the boundary a step of `delta` crosses.
fn touches(coordinate: usize, delta: i32) -> bool {
    match delta {
        -1 => coordinate == 0,
        1 => coordinate == SECTION_MAX,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> IVec2 {
        IVec2::ZERO
    }

    #[test]
    fn test_interior_change_does_not_invalidate_neighbors() {
        let dirty = MeshInvalidator::affected_sections(origin(), 3, (8, 8, 8));
        assert_eq!(dirty, vec![MeshQueueItem::new(origin(), 3)]);
    }

    #[test]
    fn test_face_edit_invalidates_one_neighbor() {
        let dirty = MeshInvalidator::affected_sections(origin(), 0, (0, 8, 8));
        assert_eq!(dirty.len(), 2);
        assert!(dirty.contains(&MeshQueueItem::new(IVec2::new(-1, 0), 0)));

        let dirty = MeshInvalidator::affected_sections(origin(), 0, (8, SECTION_MAX, 8));
        assert_eq!(dirty.len(), 2);
        assert!(dirty.contains(&MeshQueueItem::new(origin(), 1)));

        let dirty = MeshInvalidator::affected_sections(origin(), 0, (8, 8, SECTION_MAX));
        assert!(dirty.contains(&MeshQueueItem::new(IVec2::new(0, 1), 0)));
    }

    #[test]
    fn test_edge_edit_invalidates_three_neighbors() {
        let dirty = MeshInvalidator::affected_sections(origin(), 0, (SECTION_MAX, 0, 8));
        assert_eq!(dirty.len(), 4);
        assert!(dirty.contains(&MeshQueueItem::new(IVec2::new(1, 0), 0)));
        assert!(dirty.contains(&MeshQueueItem::new(origin(), -1)));
        assert!(dirty.contains(&MeshQueueItem::new(IVec2::new(1, 0), -1)));
    }

    #[test]
    fn test_corner_edit_invalidates_full_neighborhood_octant() {
        let dirty = MeshInvalidator::affected_sections(IVec2::new(4, -2), 1, (0, 0, 0));
        // self + 3 faces + 3 edges + 1 corner
        assert_eq!(dirty.len(), 8);
        assert_eq!(dirty[0], MeshQueueItem::new(IVec2::new(4, -2), 1));
        assert!(dirty.contains(&MeshQueueItem::new(IVec2::new(3, -3), 0)));
        assert!(!dirty.iter().any(|item| item.height > 1));
    }

    #[test]
    fn test_no_duplicates() {
        let dirty = MeshInvalidator::affected_sections(origin(), 0, (SECTION_MAX, SECTION_MAX, SECTION_MAX));
        let unique: std::collections::HashSet<_> = dirty.iter().copied().collect();
        assert_eq!(unique.len(), dirty.len());
    }
}
