//! Block-state registry: maps compact [`BlockStateId`] handles to the
//! [`BlockStateDef`] metadata that sections consult when classifying cells.
//!
//! The registry is built once during startup and shared (behind an `Arc`) by
//! every section. Air is not registered: an empty cell is `None`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Compact identifier stored inside every non-empty section cell (2 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockStateId(pub u16);

/// Transparency mode for a block state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transparency {
    /// Fully blocks light and visibility.
    Opaque,
    /// Partially transparent (e.g. water, stained glass).
    SemiTransparent,
    /// Completely transparent (e.g. a glass pane's gaps, barriers).
    FullyTransparent,
}

/// Full descriptor for a block state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockStateDef {
    /// Human-readable name (e.g. "stone", "water", "oak_slab[type=bottom]").
    pub name: String,
    /// Transparency mode.
    pub transparency: Transparency,
    /// Whether the collision/render shape fills the whole cell.
    pub full_cube: bool,
    /// Whether the state holds a fluid (water, lava, waterlogged blocks).
    pub fluid: bool,
}

impl BlockStateDef {
    /// Returns `true` if the state fills its cell and nothing can be seen through it.
    pub fn is_fully_opaque(&self) -> bool {
        self.full_cube && self.transparency == Transparency::Opaque
    }
}

/// Errors that can occur during block-state registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A state with the same name has already been registered.
    #[error("duplicate block state name: {0}")]
    DuplicateName(String),
    /// All 65 536 slots have been consumed.
    #[error("block state registry is full (max 65536 states)")]
    RegistryFull,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps [`BlockStateId`] → [`BlockStateDef`] with O(1) lookup by index and
/// O(1) reverse lookup by name.
#[derive(Debug, Default)]
pub struct BlockRegistry {
    /// Dense array where `index == BlockStateId.0`.
    states: Vec<BlockStateDef>,
    /// Reverse lookup: name → ID.
    name_to_id: HashMap<String, BlockStateId>,
}

impl BlockRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new block state and returns its assigned ID.
    ///
    /// IDs are assigned sequentially starting from 0.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if a state with the same name
    /// already exists, or [`RegistryError::RegistryFull`] if all slots are
    /// consumed.
    pub fn register(&mut self, def: BlockStateDef) -> Result<BlockStateId, RegistryError> {
        if self.name_to_id.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        if self.states.len() > u16::MAX as usize {
            return Err(RegistryError::RegistryFull);
        }

        let id = BlockStateId(self.states.len() as u16);
        self.name_to_id.insert(def.name.clone(), id);
        self.states.push(def);
        Ok(id)
    }

    /// Returns the definition for a given ID.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range. IDs are only produced by the registry
    /// itself, so this indicates a programming error.
    pub fn get(&self, id: BlockStateId) -> &BlockStateDef {
        &self.states[id.0 as usize]
    }

    /// Returns the ID for a named block state, or `None` if not found.
    pub fn lookup_by_name(&self, name: &str) -> Option<BlockStateId> {
        self.name_to_id.get(name).copied()
    }

    /// Returns the total number of registered states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns `true` if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Returns `true` if the cell content blocks sight completely.
    ///
    /// Empty cells and unknown IDs are never opaque, so a stale handle can
    /// only make a section look more open than it is, never hide it.
    pub fn is_fully_opaque(&self, state: Option<BlockStateId>) -> bool {
        state
            .and_then(|id| self.states.get(id.0 as usize))
            .is_some_and(BlockStateDef::is_fully_opaque)
    }

    /// Returns `true` if the cell content is fluid-classified.
    pub fn is_fluid(&self, state: Option<BlockStateId>) -> bool {
        state
            .and_then(|id| self.states.get(id.0 as usize))
            .is_some_and(|def| def.fluid)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stone_def() -> BlockStateDef {
        BlockStateDef {
            name: "stone".to_string(),
            transparency: Transparency::Opaque,
            full_cube: true,
            fluid: false,
        }
    }

    fn water_def() -> BlockStateDef {
        BlockStateDef {
            name: "water".to_string(),
            transparency: Transparency::SemiTransparent,
            full_cube: true,
            fluid: true,
        }
    }

    fn slab_def() -> BlockStateDef {
        BlockStateDef {
            name: "stone_slab".to_string(),
            transparency: Transparency::Opaque,
            full_cube: false,
            fluid: false,
        }
    }

    #[test]
    fn test_ids_follow_registration_order() {
        let mut registry = BlockRegistry::new();
        let id1 = registry.register(stone_def()).unwrap();
        let id2 = registry.register(water_def()).unwrap();
        let id3 = registry.register(slab_def()).unwrap();
        assert_eq!(id1, BlockStateId(0));
        assert_eq!(id2, BlockStateId(1));
        assert_eq!(id3, BlockStateId(2));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_name_lookup_resolves_registered_state() {
        let mut registry = BlockRegistry::new();
        let id = registry.register(water_def()).unwrap();
        assert_eq!(registry.lookup_by_name("water"), Some(id));
        assert_eq!(registry.lookup_by_name("lava"), None);
    }

    #[test]
    fn test_duplicate_state_name_rejected() {
        let mut registry = BlockRegistry::new();
        registry.register(stone_def()).unwrap();
        let result = registry.register(stone_def());
        assert!(matches!(result, Err(RegistryError::DuplicateName(_))));
    }

    #[test]
    fn test_opacity_classification() {
        let mut registry = BlockRegistry::new();
        let stone = registry.register(stone_def()).unwrap();
        let water = registry.register(water_def()).unwrap();
        let slab = registry.register(slab_def()).unwrap();

        assert!(registry.is_fully_opaque(Some(stone)));
        assert!(!registry.is_fully_opaque(Some(water)));
        assert!(!registry.is_fully_opaque(Some(slab)), "partial shapes let sight through");
        assert!(!registry.is_fully_opaque(None));
    }

    #[test]
    fn test_fluid_classification() {
        let mut registry = BlockRegistry::new();
        let stone = registry.register(stone_def()).unwrap();
        let water = registry.register(water_def()).unwrap();

        assert!(registry.is_fluid(Some(water)));
        assert!(!registry.is_fluid(Some(stone)));
        assert!(!registry.is_fluid(None));
    }

    #[test]
    fn test_unknown_id_is_neither_opaque_nor_fluid() {
        let registry = BlockRegistry::new();
        assert!(registry.is_empty());
        assert!(!registry.is_fully_opaque(Some(BlockStateId(42))));
        assert!(!registry.is_fluid(Some(BlockStateId(42))));
    }
}
