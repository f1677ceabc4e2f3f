//! Authoritative block storage for one 16×16×16 section.
//!
//! [`SectionBlocks`] owns the cell array and keeps its bookkeeping (non-empty
//! count, fluid count, fully-opaque count, bounding box) exact after every
//! public mutator. Writes through [`SectionBlocks::set`] also keep the
//! section's [`SectionOcclusion`] current; [`SectionBlocks::set_raw`] skips it.
//!
//! Cell indices and coordinates outside the section are programming errors
//! and panic.

use std::sync::Arc;

use crate::direction::FaceDirection;
use crate::occlusion::{OcclusionInput, OcclusionSignal, SectionOcclusion};
use crate::registry::{BlockRegistry, BlockStateId};

/// Side length of a section in cells.
pub const SECTION_WIDTH: usize = 16;

/// Largest valid local coordinate.
pub const SECTION_MAX: usize = SECTION_WIDTH - 1;

/// Number of cells in one boundary plane (16²).
pub const SECTION_AREA: usize = SECTION_WIDTH * SECTION_WIDTH;

/// Total number of cells in a section (16³).
pub const SECTION_VOLUME: usize = SECTION_AREA * SECTION_WIDTH;

/// Converts `(x, y, z)` to a linear cell index (x varies fastest, then z, then y).
///
/// # Panics
///
/// Panics if any coordinate is `>= SECTION_WIDTH`.
pub fn local_index(x: usize, y: usize, z: usize) -> usize {
    assert!(
        x < SECTION_WIDTH && y < SECTION_WIDTH && z < SECTION_WIDTH,
        "local position ({x}, {y}, {z}) outside section"
    );
    y * SECTION_AREA + z * SECTION_WIDTH + x
}

/// Converts a linear cell index back to `(x, y, z)`.
///
/// # Panics
///
/// Panics if `index >= SECTION_VOLUME`.
pub fn local_position(index: usize) -> (usize, usize, usize) {
    assert!(index < SECTION_VOLUME, "cell index {index} outside section");
    (
        index % SECTION_WIDTH,
        index / SECTION_AREA,
        (index / SECTION_WIDTH) % SECTION_WIDTH,
    )
}

/// Inclusive bounding box of the non-empty cells of a section, in local coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectionBounds {
    /// Smallest occupied `[x, y, z]`.
    pub min: [u8; 3],
    /// Largest occupied `[x, y, z]`.
    pub max: [u8; 3],
}

impl SectionBounds {
    /// Bounds covering the whole section.
    pub const FULL: SectionBounds = SectionBounds {
        min: [0; 3],
        max: [SECTION_MAX as u8; 3],
    };

    /// Bounds of a single cell.
    pub fn single(x: usize, y: usize, z: usize) -> Self {
        let pos = [x as u8, y as u8, z as u8];
        Self { min: pos, max: pos }
    }

    /// Grows the box to include `(x, y, z)`.
    pub fn include(&mut self, x: usize, y: usize, z: usize) {
        for (axis, coord) in [x, y, z].into_iter().enumerate() {
            let coord = coord as u8;
            self.min[axis] = self.min[axis].min(coord);
            self.max[axis] = self.max[axis].max(coord);
        }
    }

    /// Returns `true` if `(x, y, z)` lies on one of the box's six planes.
    pub fn on_surface(&self, x: usize, y: usize, z: usize) -> bool {
        [x, y, z].into_iter().enumerate().any(|(axis, coord)| {
            let coord = coord as u8;
            coord == self.min[axis] || coord == self.max[axis]
        })
    }

    /// Returns `true` if no occupied cell touches any boundary plane of the section.
    pub fn is_interior(&self) -> bool {
        self.min.iter().all(|&c| c > 0) && self.max.iter().all(|&c| (c as usize) < SECTION_MAX)
    }
}

/// Cell array plus incremental bookkeeping and cached occlusion for one section.
#[derive(Debug)]
pub struct SectionBlocks {
    registry: Arc<BlockRegistry>,
    /// `None` while the section is empty.
    cells: Option<Box<[Option<BlockStateId>]>>,
    count: usize,
    fluid_count: usize,
    opaque_count: usize,
    bounds: Option<SectionBounds>,
    occlusion: SectionOcclusion,
}

impl SectionBlocks {
    /// Creates an empty section that reports occlusion changes to `signal`.
    pub fn new(registry: Arc<BlockRegistry>, signal: OcclusionSignal) -> Self {
        Self {
            registry,
            cells: None,
            count: 0,
            fluid_count: 0,
            opaque_count: 0,
            bounds: None,
            occlusion: SectionOcclusion::new(signal),
        }
    }

    /// Creates a section from a full cell array (bulk load).
    ///
    /// # Panics
    ///
    /// Panics if `cells.len() != SECTION_VOLUME`.
    pub fn from_cells(
        registry: Arc<BlockRegistry>,
        signal: OcclusionSignal,
        cells: Vec<Option<BlockStateId>>,
    ) -> Self {
        let mut section = Self::new(registry, signal);
        section.replace(cells);
        section
    }

    /// Returns the cell at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= SECTION_VOLUME`.
    pub fn get(&self, index: usize) -> Option<BlockStateId> {
        assert!(index < SECTION_VOLUME, "cell index {index} outside section");
        self.cells.as_ref().and_then(|cells| cells[index])
    }

    /// Returns the cell at local `(x, y, z)`.
    pub fn get_at(&self, x: usize, y: usize, z: usize) -> Option<BlockStateId> {
        self.get(local_index(x, y, z))
    }

    /// Overwrites the cell at `index` and returns the previous value.
    ///
    /// Counters and bounds are updated; occlusion is left untouched.
    ///
    /// # Panics
    ///
    /// Panics if `index >= SECTION_VOLUME`.
    pub fn set_raw(&mut self, index: usize, value: Option<BlockStateId>) -> Option<BlockStateId> {
        assert!(index < SECTION_VOLUME, "cell index {index} outside section");
        let previous = self.get(index);
        if previous == value {
            return previous;
        }

        if self.registry.is_fluid(previous) != self.registry.is_fluid(value) {
            if self.registry.is_fluid(value) {
                self.fluid_count += 1;
            } else {
                self.fluid_count -= 1;
            }
        }
        if self.registry.is_fully_opaque(previous) != self.registry.is_fully_opaque(value) {
            if self.registry.is_fully_opaque(value) {
                self.opaque_count += 1;
            } else {
                self.opaque_count -= 1;
            }
        }

        let (x, y, z) = local_position(index);
        match (previous, value) {
            (None, Some(_)) => {
                self.count += 1;
                match &mut self.bounds {
                    Some(bounds) => bounds.include(x, y, z),
                    None => self.bounds = Some(SectionBounds::single(x, y, z)),
                }
            }
            (Some(_), None) => self.count -= 1,
            _ => {}
        }

        if self.count == 0 {
            self.cells = None;
            self.bounds = None;
            return previous;
        }
        let cells = self
            .cells
            .get_or_insert_with(|| vec![None; SECTION_VOLUME].into_boxed_slice());
        cells[index] = value;

        if value.is_none() && self.bounds.is_some_and(|b| b.on_surface(x, y, z)) {
            self.bounds = compute_bounds(cells);
        }
        previous
    }

    /// Overwrites the cell at `index`, lets occlusion react, and returns the
    /// previous value.
    ///
    /// # Panics
    ///
    /// Panics if `index >= SECTION_VOLUME`.
    pub fn set(&mut self, index: usize, value: Option<BlockStateId>) -> Option<BlockStateId> {
        let previous = self.set_raw(index, value);
        let (occlusion, input) = self.occlusion_parts();
        occlusion.on_set(&input, previous, value);
        previous
    }

    /// Writes the cell at local `(x, y, z)` through [`set`](Self::set).
    pub fn set_at(
        &mut self,
        x: usize,
        y: usize,
        z: usize,
        value: Option<BlockStateId>,
    ) -> Option<BlockStateId> {
        self.set(local_index(x, y, z), value)
    }

    /// Recounts every counter and the bounds from the cell array, then
    /// refreshes occlusion.
    ///
    /// `bulk` marks a recalculation after a bulk load: the occlusion result is
    /// still refreshed, but the per-section change signal is suppressed
    /// because the loader signals once for the whole column.
    pub fn recalculate(&mut self, bulk: bool) {
        let mut count = 0;
        let mut fluid_count = 0;
        let mut opaque_count = 0;
        if let Some(cells) = &self.cells {
            for &cell in cells.iter().filter(|cell| cell.is_some()) {
                count += 1;
                if self.registry.is_fluid(cell) {
                    fluid_count += 1;
                }
                if self.registry.is_fully_opaque(cell) {
                    opaque_count += 1;
                }
            }
        }
        self.count = count;
        self.fluid_count = fluid_count;
        self.opaque_count = opaque_count;
        if count == 0 {
            self.cells = None;
        }
        self.bounds = self.cells.as_deref().and_then(compute_bounds);

        let (occlusion, input) = self.occlusion_parts();
        if input.count == 0 {
            occlusion.clear(!bulk);
        } else {
            occlusion.recalculate(&input, !bulk);
        }
    }

    /// Replaces the whole cell array (bulk load) and recalculates.
    ///
    /// # Panics
    ///
    /// Panics if `cells.len() != SECTION_VOLUME`.
    pub fn replace(&mut self, cells: Vec<Option<BlockStateId>>) {
        assert_eq!(cells.len(), SECTION_VOLUME, "section cell array has wrong size");
        self.cells = Some(cells.into_boxed_slice());
        self.recalculate(true);
    }

    /// Removes every cell.
    pub fn clear(&mut self) {
        self.cells = None;
        self.recalculate(false);
    }

    /// Returns an owned snapshot of the cell array for off-thread meshing.
    pub fn copy_cells(&self) -> Option<Box<[Option<BlockStateId>]>> {
        self.cells.clone()
    }

    /// Returns `true` if face `a` cannot see face `b` through this section.
    ///
    /// The first query of a section built by single writes computes the
    /// result from the current cells.
    pub fn is_occluded(&self, a: FaceDirection, b: FaceDirection) -> bool {
        self.occlusion.is_occluded(&self.occlusion_input(), a, b)
    }

    /// Returns the section's occlusion engine.
    pub fn occlusion(&self) -> &SectionOcclusion {
        &self.occlusion
    }

    /// Number of non-empty cells.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns `true` if the section has no non-empty cells.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of fluid-classified cells.
    pub fn fluid_count(&self) -> usize {
        self.fluid_count
    }

    /// Returns `true` if at least one cell holds fluid.
    pub fn has_fluid(&self) -> bool {
        self.fluid_count > 0
    }

    /// Number of fully opaque cells.
    pub fn opaque_count(&self) -> usize {
        self.opaque_count
    }

    /// Bounding box of the non-empty cells, `None` for an empty section.
    pub fn bounds(&self) -> Option<SectionBounds> {
        self.bounds
    }

    /// Returns the registry used to classify cells.
    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    fn occlusion_input(&self) -> OcclusionInput<'_> {
        OcclusionInput {
            cells: self.cells.as_deref(),
            registry: &self.registry,
            count: self.count,
            opaque_count: self.opaque_count,
            bounds: self.bounds,
        }
    }

    fn occlusion_parts(&mut self) -> (&mut SectionOcclusion, OcclusionInput<'_>) {
        let input = OcclusionInput {
            cells: self.cells.as_deref(),
            registry: &self.registry,
            count: self.count,
            opaque_count: self.opaque_count,
            bounds: self.bounds,
        };
        (&mut self.occlusion, input)
    }
}

fn compute_bounds(cells: &[Option<BlockStateId>]) -> Option<SectionBounds> {
    let mut bounds: Option<SectionBounds> = None;
    for (index, _) in cells.iter().enumerate().filter(|(_, cell)| cell.is_some()) {
        let (x, y, z) = local_position(index);
        match &mut bounds {
            Some(bounds) => bounds.include(x, y, z),
            None => bounds = Some(SectionBounds::single(x, y, z)),
        }
    }
    bounds
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
