//! Loaded chunk columns, keyed by chunk position.
//!
//! A [`ChunkColumn`] is a vertical stack of [`SectionBlocks`] sharing one
//! [`OcclusionSignal`]. [`SectionWorld`] owns every loaded column in an
//! [`FxHashMap`] and is the single authority for which sections exist.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{IVec2, IVec3};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::occlusion::OcclusionSignal;
use crate::registry::{BlockRegistry, BlockStateId};
use crate::section::{SECTION_WIDTH, SectionBlocks};

/// Errors from block writes addressed by world position.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    /// The column containing the position is not loaded.
    #[error("chunk column {0} is not loaded")]
    ColumnNotLoaded(IVec2),
    /// The position's section height lies outside the world's range.
    #[error("section height {0} outside the world")]
    HeightOutOfRange(i32),
}

/// Splits a block position into chunk position, section height and local
/// `(x, y, z)` inside that section.
pub fn split_block_position(pos: IVec3) -> (IVec2, i32, (usize, usize, usize)) {
    let width = SECTION_WIDTH as i32;
    let chunk = IVec2::new(pos.x.div_euclid(width), pos.z.div_euclid(width));
    let height = pos.y.div_euclid(width);
    let local = (
        pos.x.rem_euclid(width) as usize,
        pos.y.rem_euclid(width) as usize,
        pos.z.rem_euclid(width) as usize,
    );
    (chunk, height, local)
}

/// Vertical stack of sections for one chunk position.
#[derive(Debug)]
pub struct ChunkColumn {
    registry: Arc<BlockRegistry>,
    min_section: i32,
    max_section: i32,
    sections: BTreeMap<i32, SectionBlocks>,
    signal: OcclusionSignal,
    fully_loaded: bool,
}

impl ChunkColumn {
    /// Creates an empty column covering section heights `min_section..=max_section`.
    ///
    /// # Panics
    ///
    /// Panics if `min_section > max_section`.
    pub fn new(registry: Arc<BlockRegistry>, min_section: i32, max_section: i32) -> Self {
        assert!(min_section <= max_section, "empty section range {min_section}..={max_section}");
        Self {
            registry,
            min_section,
            max_section,
            sections: BTreeMap::new(),
            signal: OcclusionSignal::new(),
            fully_loaded: false,
        }
    }

    /// Lowest section height of this column.
    pub fn min_section(&self) -> i32 {
        self.min_section
    }

    /// Highest section height of this column.
    pub fn max_section(&self) -> i32 {
        self.max_section
    }

    /// Returns `true` if `height` lies in this column's range.
    pub fn contains_height(&self, height: i32) -> bool {
        (self.min_section..=self.max_section).contains(&height)
    }

    /// Returns the section at `height`, if one was ever created.
    pub fn section(&self, height: i32) -> Option<&SectionBlocks> {
        self.sections.get(&height)
    }

    /// Mutable access to the section at `height`, if one was ever created.
    pub fn section_mut(&mut self, height: i32) -> Option<&mut SectionBlocks> {
        self.sections.get_mut(&height)
    }

    /// Returns the section at `height`, creating an empty one on demand.
    ///
    /// # Panics
    ///
    /// Panics if `height` is outside the column.
    pub fn section_or_create(&mut self, height: i32) -> &mut SectionBlocks {
        assert!(self.contains_height(height), "section height {height} outside column");
        let registry = &self.registry;
        let signal = &self.signal;
        self.sections
            .entry(height)
            .or_insert_with(|| SectionBlocks::new(Arc::clone(registry), signal.clone()))
    }

    /// Bulk-loads one section's cells. Does not signal; call
    /// [`finish_loading`](Self::finish_loading) once the whole column is in.
    pub fn load_section(&mut self, height: i32, cells: Vec<Option<BlockStateId>>) {
        self.section_or_create(height).replace(cells);
    }

    /// Marks the column as complete and signals once for all bulk-loaded sections.
    pub fn finish_loading(&mut self) {
        self.fully_loaded = true;
        self.signal.bump();
    }

    /// Returns `true` once [`finish_loading`](Self::finish_loading) has run.
    pub fn is_fully_loaded(&self) -> bool {
        self.fully_loaded
    }

    /// The column's shared occlusion signal.
    pub fn signal(&self) -> &OcclusionSignal {
        &self.signal
    }

    /// Heights of every created section, lowest first.
    pub fn heights(&self) -> impl Iterator<Item = i32> + '_ {
        self.sections.keys().copied()
    }

    /// Heights of sections holding at least one block, lowest first.
    pub fn non_empty_heights(&self) -> impl Iterator<Item = i32> + '_ {
        self.sections
            .iter()
            .filter(|(_, section)| !section.is_empty())
            .map(|(&height, _)| height)
    }
}

/// Owns all loaded columns and provides fast access by chunk position.
#[derive(Debug)]
pub struct SectionWorld {
    registry: Arc<BlockRegistry>,
    min_section: i32,
    max_section: i32,
    columns: FxHashMap<IVec2, ChunkColumn>,
    /// Epoch contributions of columns that have been unloaded.
    retired_epoch: u64,
}

impl SectionWorld {
    /// Creates an empty world whose columns span `min_section..=max_section`.
    pub fn new(registry: Arc<BlockRegistry>, min_section: i32, max_section: i32) -> Self {
        assert!(min_section <= max_section, "empty section range {min_section}..={max_section}");
        Self {
            registry,
            min_section,
            max_section,
            columns: FxHashMap::default(),
            retired_epoch: 0,
        }
    }

    /// Block-state registry shared by every section.
    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    /// Lowest section height.
    pub fn min_section(&self) -> i32 {
        self.min_section
    }

    /// Highest section height.
    pub fn max_section(&self) -> i32 {
        self.max_section
    }

    /// Creates an empty column spanning the world's section range, ready to be
    /// filled and then passed to [`load_column`](Self::load_column).
    pub fn new_column(&self) -> ChunkColumn {
        ChunkColumn::new(Arc::clone(&self.registry), self.min_section, self.max_section)
    }

    /// Inserts a column, replacing (and returning) any previous one.
    pub fn load_column(&mut self, chunk: IVec2, column: ChunkColumn) -> Option<ChunkColumn> {
        let previous = self.columns.insert(chunk, column);
        if let Some(old) = &previous {
            self.retire(old);
        }
        previous
    }

    /// Removes and returns the column at `chunk`.
    pub fn unload_column(&mut self, chunk: IVec2) -> Option<ChunkColumn> {
        let removed = self.columns.remove(&chunk)?;
        self.retire(&removed);
        Some(removed)
    }

    /// Drops every column.
    pub fn clear(&mut self) {
        for column in std::mem::take(&mut self.columns).into_values() {
            self.retire(&column);
        }
    }

    fn retire(&mut self, column: &ChunkColumn) {
        // +1 so that an unload is itself a visible change.
        self.retired_epoch += column.signal.epoch() + 1;
    }

    /// Returns the column at `chunk`.
    pub fn column(&self, chunk: IVec2) -> Option<&ChunkColumn> {
        self.columns.get(&chunk)
    }

    /// Mutable access to the column at `chunk`.
    pub fn column_mut(&mut self, chunk: IVec2) -> Option<&mut ChunkColumn> {
        self.columns.get_mut(&chunk)
    }

    /// Returns `true` if a column is loaded at `chunk`.
    pub fn is_loaded(&self, chunk: IVec2) -> bool {
        self.columns.contains_key(&chunk)
    }

    /// Returns `true` if the column at `chunk` is loaded and finished loading.
    pub fn is_fully_loaded(&self, chunk: IVec2) -> bool {
        self.columns.get(&chunk).is_some_and(ChunkColumn::is_fully_loaded)
    }

    /// Number of loaded columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Iterates all loaded chunk positions (arbitrary order).
    pub fn chunk_positions(&self) -> impl Iterator<Item = IVec2> + '_ {
        self.columns.keys().copied()
    }

    /// Returns the section at `(chunk, height)`.
    pub fn section(&self, chunk: IVec2, height: i32) -> Option<&SectionBlocks> {
        self.columns.get(&chunk)?.section(height)
    }

    /// Mutable access to the section at `(chunk, height)`.
    pub fn section_mut(&mut self, chunk: IVec2, height: i32) -> Option<&mut SectionBlocks> {
        self.columns.get_mut(&chunk)?.section_mut(height)
    }

    /// Reads the block at a world position. Unloaded positions read as empty.
    pub fn block(&self, pos: IVec3) -> Option<BlockStateId> {
        let (chunk, height, (x, y, z)) = split_block_position(pos);
        self.section(chunk, height)?.get_at(x, y, z)
    }

    /// Writes the block at a world position through the occlusion-aware path
    /// and returns the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::ColumnNotLoaded`] if the position's column is not
    /// loaded, or [`WorldError::HeightOutOfRange`] if its section height is
    /// outside the world.
    pub fn set_block(
        &mut self,
        pos: IVec3,
        value: Option<BlockStateId>,
    ) -> Result<Option<BlockStateId>, WorldError> {
        let (chunk, height, (x, y, z)) = split_block_position(pos);
        let column = self
            .columns
            .get_mut(&chunk)
            .ok_or(WorldError::ColumnNotLoaded(chunk))?;
        if !column.contains_height(height) {
            return Err(WorldError::HeightOutOfRange(height));
        }
        if value.is_none() && column.section(height).is_none() {
            return Ok(None);
        }
        Ok(column.section_or_create(height).set_at(x, y, z, value))
    }

    /// Coalesced occlusion change counter over the whole world.
    ///
    /// Increases whenever any section's occlusion result changes, a column
    /// finishes loading, or a column is unloaded.
    pub fn occlusion_epoch(&self) -> u64 {
        self.retired_epoch
            + self
                .columns
                .values()
                .map(|column| column.signal.epoch())
                .sum::<u64>()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::FaceDirection;
    use crate::registry::{BlockStateDef, Transparency};
    use crate::section::SECTION_VOLUME;

    fn registry_with_stone() -> (Arc<BlockRegistry>, BlockStateId) {
        let mut registry = BlockRegistry::new();
        let stone = registry
            .register(BlockStateDef {
                name: "stone".into(),
                transparency: Transparency::Opaque,
                full_cube: true,
                fluid: false,
            })
            .unwrap();
        (Arc::new(registry), stone)
    }

    #[test]
    fn test_split_block_position_handles_negatives() {
        let (chunk, height, local) = split_block_position(IVec3::new(-1, -17, 33));
        assert_eq!(chunk, IVec2::new(-1, 2));
        assert_eq!(height, -2);
        assert_eq!(local, (15, 15, 1));
    }

    #[test]
    fn test_load_and_unload_column() {
        let (registry, _) = registry_with_stone();
        let mut world = SectionWorld::new(registry, 0, 3);
        let chunk = IVec2::new(2, -5);

        assert!(world.load_column(chunk, world.new_column()).is_none());
        assert!(world.is_loaded(chunk));
        assert!(!world.is_fully_loaded(chunk));
        assert_eq!(world.column_count(), 1);

        assert!(world.unload_column(chunk).is_some());
        assert!(!world.is_loaded(chunk));
        assert!(world.unload_column(chunk).is_none());
    }

    #[test]
    fn test_set_block_requires_loaded_column() {
        let (registry, stone) = registry_with_stone();
        let mut world = SectionWorld::new(registry, 0, 3);
        let result = world.set_block(IVec3::new(5, 5, 5), Some(stone));
        assert_eq!(result, Err(WorldError::ColumnNotLoaded(IVec2::ZERO)));
    }

    #[test]
    fn test_set_block_rejects_out_of_range_height() {
        let (registry, stone) = registry_with_stone();
        let mut world = SectionWorld::new(registry, 0, 3);
        world.load_column(IVec2::ZERO, world.new_column());
        let result = world.set_block(IVec3::new(0, 64, 0), Some(stone));
        assert_eq!(result, Err(WorldError::HeightOutOfRange(4)));
    }

    #[test]
    fn test_set_block_creates_section_and_reads_back() {
        let (registry, stone) = registry_with_stone();
        let mut world = SectionWorld::new(registry, 0, 3);
        world.load_column(IVec2::ZERO, world.new_column());

        let pos = IVec3::new(3, 20, 7);
        assert_eq!(world.set_block(pos, Some(stone)), Ok(None));
        assert_eq!(world.block(pos), Some(stone));
        assert_eq!(world.section(IVec2::ZERO, 1).map(SectionBlocks::count), Some(1));

        // Clearing in a never-created section must not create one.
        assert_eq!(world.set_block(IVec3::new(0, 50, 0), None), Ok(None));
        assert!(world.section(IVec2::ZERO, 3).is_none());
    }

    #[test]
    fn test_section_built_by_edits_answers_occlusion() {
        let (registry, stone) = registry_with_stone();
        let mut world = SectionWorld::new(registry, 0, 1);
        world.load_column(IVec2::ZERO, world.new_column());
        for z in 0..16 {
            for x in 0..16 {
                world.set_block(IVec3::new(x, 20, z), Some(stone)).unwrap();
            }
        }

        let section = world.section(IVec2::ZERO, 1).unwrap();
        assert!(section.is_occluded(FaceDirection::PosY, FaceDirection::NegY));
        assert!(!section.is_occluded(FaceDirection::PosX, FaceDirection::NegZ));
    }

    #[test]
    fn test_column_load_signals_once() {
        let (registry, stone) = registry_with_stone();
        let mut world = SectionWorld::new(registry, 0, 3);
        let mut column = world.new_column();
        for height in 0..4 {
            column.load_section(height, vec![Some(stone); SECTION_VOLUME]);
        }
        assert_eq!(column.signal().epoch(), 0);
        column.finish_loading();
        assert_eq!(column.signal().epoch(), 1);

        let before = world.occlusion_epoch();
        world.load_column(IVec2::ONE, column);
        assert!(world.is_fully_loaded(IVec2::ONE));
        assert_eq!(world.occlusion_epoch(), before + 1);
        assert_eq!(
            world.column(IVec2::ONE).map(|c| c.non_empty_heights().count()),
            Some(4)
        );
    }

    #[test]
    fn test_occlusion_epoch_grows_on_change_and_unload() {
        let (registry, stone) = registry_with_stone();
        let mut world = SectionWorld::new(registry, 0, 0);
        let mut column = world.new_column();
        column.load_section(0, vec![Some(stone); SECTION_VOLUME]);
        column.finish_loading();
        world.load_column(IVec2::ZERO, column);
        let loaded = world.occlusion_epoch();

        // A pocket on a single face connects nothing: the result and the
        // epoch stay put.
        world.set_block(IVec3::new(0, 8, 8), None).unwrap();
        assert_eq!(world.occlusion_epoch(), loaded);

        // Drilling a full shaft opens PosY <-> NegY.
        for y in 0..16 {
            world.set_block(IVec3::new(8, y, 8), None).unwrap();
        }
        let drilled = world.occlusion_epoch();
        assert!(drilled > loaded);

        world.unload_column(IVec2::ZERO);
        assert!(world.occlusion_epoch() > drilled);
    }
}
