//! Voxel section storage with cached face-to-face occlusion, the block-state
//! registry that classifies cells, and the loaded-column world.

pub mod direction;
pub mod occlusion;
pub mod registry;
pub mod scratch;
pub mod section;
pub mod world;

pub use direction::{
    CornerDirection, EdgeDirection, FACE_PAIR_COUNT, FACE_PAIRS, FaceDirection, face_pair_index,
    neighbor_offsets,
};
pub use occlusion::{
    ALL_OCCLUDED, NOT_OCCLUDED, OcclusionInput, OcclusionSignal, OcclusionState, SectionOcclusion,
};
pub use registry::{BlockRegistry, BlockStateDef, BlockStateId, RegistryError, Transparency};
pub use scratch::{LABEL_POOL, LabelPool, LabelScratch};
pub use section::{
    SECTION_AREA, SECTION_MAX, SECTION_VOLUME, SECTION_WIDTH, SectionBlocks, SectionBounds,
    local_index, local_position,
};
pub use world::{ChunkColumn, SectionWorld, WorldError, split_block_position};
