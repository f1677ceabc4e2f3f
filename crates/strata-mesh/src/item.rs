//! Work items: which section needs a (re)mesh.

use glam::{IVec2, IVec3};

/// Identifies one section by chunk column position and section height.
///
/// Two items for the same section compare equal no matter when or why they
/// were created, so duplicate enqueues collapse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshQueueItem {
    /// Chunk column position (x, z).
    pub chunk: IVec2,
    /// Section height inside the column.
    pub height: i32,
}

impl MeshQueueItem {
    /// Creates an item for the section at `(chunk, height)`.
    pub fn new(chunk: IVec2, height: i32) -> Self {
        Self { chunk, height }
    }

    /// Section-grid position `(x, height, z)`.
    pub fn section_position(&self) -> IVec3 {
        IVec3::new(self.chunk.x, self.height, self.chunk.y)
    }

    /// Squared section-grid distance to `camera` (a section position).
    ///
    /// Computed in `i64` so chunks far apart on a large world cannot overflow.
    pub fn distance_squared(&self, camera: IVec3) -> i64 {
        (self.section_position().as_i64vec3() - camera.as_i64vec3()).length_squared()
    }
}
