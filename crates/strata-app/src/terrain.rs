//! Synthetic terrain for the headless runner: simplex-noise hills with caves
//! and a water table, generated one column at a time.

use std::sync::Arc;

use glam::IVec2;
use noise::{NoiseFn, Simplex};
use strata_voxel::{
    BlockRegistry, BlockStateDef, BlockStateId, ChunkColumn, RegistryError, SECTION_VOLUME,
    SECTION_WIDTH, SectionWorld, Transparency, local_index,
};

/// Block states the generator and the edit simulation place.
#[derive(Clone, Copy, Debug)]
pub struct Palette {
    pub stone: BlockStateId,
    pub dirt: BlockStateId,
    pub glass: BlockStateId,
    pub water: BlockStateId,
}

/// Registers the runner's block states.
pub fn build_registry() -> Result<(Arc<BlockRegistry>, Palette), RegistryError> {
    let mut registry = BlockRegistry::new();
    let mut register = |name: &str, transparency: Transparency, fluid: bool| {
        registry.register(BlockStateDef {
            name: name.to_string(),
            transparency,
            full_cube: !fluid,
            fluid,
        })
    };
    let palette = Palette {
        stone: register("stone", Transparency::Opaque, false)?,
        dirt: register("dirt", Transparency::Opaque, false)?,
        glass: register("glass", Transparency::FullyTransparent, false)?,
        water: register("water", Transparency::SemiTransparent, true)?,
    };
    Ok((Arc::new(registry), palette))
}

const SEA_LEVEL: i32 = 24;
const BASE_HEIGHT: f64 = 32.0;
const HILL_AMPLITUDE: f64 = 20.0;
const HILL_FREQUENCY: f64 = 0.012;
const CAVE_FREQUENCY: f64 = 0.045;
const CAVE_THRESHOLD: f64 = -0.55;
/// Caves stay this many blocks below the surface.
const CAVE_ROOF: i32 = 5;

/// Deterministic column generator.
pub struct TerrainGenerator {
    hills: Simplex,
    caves: Simplex,
    palette: Palette,
}

impl TerrainGenerator {
    /// Creates a generator whose hills and caves are derived from `seed`.
    pub fn new(seed: u64, palette: Palette) -> Self {
        Self {
            hills: Simplex::new(seed as u32),
            caves: Simplex::new(seed.wrapping_add(1) as u32),
            palette,
        }
    }

    /// Surface height, in blocks, at world column `(x, z)`.
    pub fn surface_height(&self, x: i32, z: i32) -> i32 {
        let mut total = 0.0;
        let mut frequency = HILL_FREQUENCY;
        let mut amplitude = HILL_AMPLITUDE;
        for _ in 0..3 {
            total += self.hills.get([f64::from(x) * frequency, f64::from(z) * frequency]) * amplitude;
            frequency *= 2.0;
            amplitude *= 0.5;
        }
        (BASE_HEIGHT + total).round() as i32
    }

    fn block_at(&self, x: i32, y: i32, z: i32, surface: i32) -> Option<BlockStateId> {
        if y > surface {
            return (y <= SEA_LEVEL).then_some(self.palette.water);
        }
        if y < surface - CAVE_ROOF {
            let sample = self.caves.get([
                f64::from(x) * CAVE_FREQUENCY,
                f64::from(y) * CAVE_FREQUENCY,
                f64::from(z) * CAVE_FREQUENCY,
            ]);
            if sample < CAVE_THRESHOLD {
                return None;
            }
        }
        if y >= surface - 3 {
            Some(self.palette.dirt)
        } else {
            Some(self.palette.stone)
        }
    }

    /// Generates and finishes loading the column at `chunk`.
    ///
    /// Sections that would be entirely empty are not stored.
    pub fn generate_column(&self, world: &SectionWorld, chunk: IVec2) -> ChunkColumn {
        let width = SECTION_WIDTH as i32;
        let mut column = world.new_column();

        let mut surfaces = [0i32; SECTION_WIDTH * SECTION_WIDTH];
        for lz in 0..SECTION_WIDTH {
            for lx in 0..SECTION_WIDTH {
                surfaces[lz * SECTION_WIDTH + lx] =
                    self.surface_height(chunk.x * width + lx as i32, chunk.y * width + lz as i32);
            }
        }
        let top = surfaces.iter().copied().max().unwrap_or(0).max(SEA_LEVEL);

        for height in column.min_section()..=column.max_section() {
            let base_y = height * width;
            if base_y > top {
                break;
            }
            let mut cells = vec![None; SECTION_VOLUME];
            let mut any = false;
            for ly in 0..SECTION_WIDTH {
                for lz in 0..SECTION_WIDTH {
                    for lx in 0..SECTION_WIDTH {
                        let block = self.block_at(
                            chunk.x * width + lx as i32,
                            base_y + ly as i32,
                            chunk.y * width + lz as i32,
                            surfaces[lz * SECTION_WIDTH + lx],
                        );
                        any |= block.is_some();
                        cells[local_index(lx, ly, lz)] = block;
                    }
                }
            }
            if any {
                column.load_section(height, cells);
            }
        }

        column.finish_loading();
        column
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> (SectionWorld, Palette) {
        let (registry, palette) = build_registry().unwrap();
        (SectionWorld::new(registry, -4, 8), palette)
    }

    #[test]
    fn test_registry_classifies_palette() {
        let (registry, palette) = build_registry().unwrap();
        assert!(registry.is_fully_opaque(Some(palette.stone)));
        assert!(!registry.is_fully_opaque(Some(palette.glass)));
        assert!(registry.is_fluid(Some(palette.water)));
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let (world, palette) = world();
        let a = TerrainGenerator::new(7, palette).generate_column(&world, IVec2::new(3, -2));
        let b = TerrainGenerator::new(7, palette).generate_column(&world, IVec2::new(3, -2));
        let heights_a: Vec<_> = a.non_empty_heights().collect();
        let heights_b: Vec<_> = b.non_empty_heights().collect();
        assert_eq!(heights_a, heights_b);
        for height in heights_a {
            assert_eq!(
                a.section(height).unwrap().count(),
                b.section(height).unwrap().count()
            );
        }
    }

    #[test]
    fn test_columns_are_finished_and_bottom_is_solid() {
        let (world, palette) = world();
        let generator = TerrainGenerator::new(1, palette);
        let column = generator.generate_column(&world, IVec2::ZERO);
        assert!(column.is_fully_loaded());
        // Deep sections sit far below the surface and the cave roof.
        let bottom = column.section(-4).unwrap();
        assert!(bottom.count() > 0);
        assert!(column.section(8).is_none(), "sky sections are not stored");
    }
}
