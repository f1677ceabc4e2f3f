//! Interfaces to the systems the scheduler drives but does not own: the
//! camera visibility graph and the mesh preparer.

use glam::{IVec2, IVec3};
use thiserror::Error;

use crate::item::MeshQueueItem;
use crate::task::InterruptFlag;

/// Frustum/distance test answering whether chunks and sections are on screen.
pub trait VisibilityGraph: Send + Sync {
    /// Returns `true` if any part of the column at `chunk` may be visible.
    fn is_chunk_visible(&self, chunk: IVec2) -> bool;

    /// Returns `true` if the section at `(chunk, height)` may be visible.
    ///
    /// `min`/`max` bound the section's content in local block coordinates
    /// (`max` exclusive). With `strict`, a section hidden behind occluding
    /// sections counts as invisible; otherwise only the frustum is checked.
    fn is_section_visible(&self, chunk: IVec2, height: i32, min: IVec3, max: IVec3, strict: bool)
    -> bool;
}

/// Why a preparation did not produce a mesh.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrepareError {
    /// The task's interrupt flag was observed set.
    #[error("preparation interrupted")]
    Interrupted,
    /// The section vanished before the worker got to it.
    #[error("section {0:?} no longer exists")]
    SectionMissing(MeshQueueItem),
    /// Any other failure inside the mesh builder.
    #[error("preparation failed: {0}")]
    Failed(String),
}

/// Builds a section's geometry on a worker thread and hands it to the upload path.
pub trait SectionPreparer: Send + Sync {
    /// Prepares the mesh for `item`, polling `interrupt` while it works.
    ///
    /// # Errors
    ///
    /// Returns [`PrepareError::Interrupted`] when it bailed out because of
    /// `interrupt`, or another variant when meshing failed.
    fn prepare(&self, item: &MeshQueueItem, interrupt: &InterruptFlag) -> Result<(), PrepareError>;

    /// Number of finished meshes waiting for upload.
    fn meshes_to_load(&self) -> usize;
}
