//! Per-section occlusion: can sight (or light) travel from one face of a
//! section to another through connected non-opaque cells?
//!
//! The answer for all 15 face pairs is cached in a [`SectionOcclusion`] and
//! only recomputed when an edit flips a cell between fully opaque and not.
//! Recomputation exits early for sections that are too sparse (or whose
//! content sits strictly inside the cube) to block anything; otherwise it
//! labels the connected open regions reachable from each face and checks,
//! per pair, whether the two faces share a region.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};

use rustc_hash::FxHashSet;

use crate::direction::{FACE_PAIR_COUNT, FACE_PAIRS, FaceDirection, face_pair_index};
use crate::registry::{BlockRegistry, BlockStateId};
use crate::scratch::{FloodScratch, LABEL_POOL, OPAQUE, UNVISITED};
use crate::section::{
    SECTION_AREA, SECTION_MAX, SECTION_VOLUME, SECTION_WIDTH, SectionBounds, local_index,
    local_position,
};

/// Result with every pair open.
pub const NOT_OCCLUDED: [bool; FACE_PAIR_COUNT] = [false; FACE_PAIR_COUNT];

/// Result with every pair blocked.
pub const ALL_OCCLUDED: [bool; FACE_PAIR_COUNT] = [true; FACE_PAIR_COUNT];

/// Coalescing invalidation counter shared between the sections of one chunk
/// column (and whoever watches it).
///
/// Sections bump it when their occlusion result changes; observers compare
/// the epoch against the last value they saw instead of receiving a list of
/// changes.
#[derive(Clone, Debug, Default)]
pub struct OcclusionSignal(Arc<AtomicU64>);

impl OcclusionSignal {
    /// Creates a signal at epoch 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that some occlusion result changed.
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::Release);
    }

    /// Returns the number of changes recorded so far.
    pub fn epoch(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Lifecycle of a section's cached result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OcclusionState {
    /// Nothing has been computed yet; the first query refreshes.
    Uncomputed,
    /// The cached result matches the section content.
    Computed,
}

/// Borrowed view of everything the engine reads from the owning section.
#[derive(Clone, Copy, Debug)]
pub struct OcclusionInput<'a> {
    /// Cell array, `None` when the section holds no cells at all.
    pub cells: Option<&'a [Option<BlockStateId>]>,
    /// Classification source for the cells.
    pub registry: &'a BlockRegistry,
    /// Number of non-empty cells.
    pub count: usize,
    /// Number of fully opaque cells.
    pub opaque_count: usize,
    /// Bounding box of non-empty cells.
    pub bounds: Option<SectionBounds>,
}

impl OcclusionInput<'_> {
    fn is_opaque(&self, index: usize) -> bool {
        self.cells
            .is_some_and(|cells| self.registry.is_fully_opaque(cells[index]))
    }
}

/// Cached face-to-face occlusion of one section.
///
/// The result is a 15-bit mask (bit `i` is pair `i` of [`FACE_PAIRS`]) so that
/// readers sharing the section can run the first refresh without a write lock.
#[derive(Debug)]
pub struct SectionOcclusion {
    occluded: AtomicU16,
    computed: AtomicBool,
    /// Set by the first query; until then edits skip recomputation entirely.
    tracking: AtomicBool,
    recomputations: AtomicU64,
    flood_fills: AtomicU64,
    signal: OcclusionSignal,
}

impl SectionOcclusion {
    /// Creates an uncomputed engine that reports changes to `signal`.
    pub fn new(signal: OcclusionSignal) -> Self {
        Self {
            occluded: AtomicU16::new(0),
            computed: AtomicBool::new(false),
            tracking: AtomicBool::new(false),
            recomputations: AtomicU64::new(0),
            flood_fills: AtomicU64::new(0),
            signal,
        }
    }

    /// Returns `true` if there is **no** open path from face `a` to face `b`.
    ///
    /// The same face on both sides is never occluded. The first query on an
    /// uncomputed engine refreshes the result from `input` and starts
    /// tracking, so later opacity edits keep the cache current. That refresh
    /// does not bump the signal.
    pub fn is_occluded(
        &self,
        input: &OcclusionInput<'_>,
        a: FaceDirection,
        b: FaceDirection,
    ) -> bool {
        let Some(pair) = face_pair_index(a, b) else {
            return false;
        };
        if !self.computed.load(Ordering::Acquire) {
            self.refresh(input, false);
        }
        self.is_pair_occluded(pair)
    }

    /// Returns the cached result for the pair at `pair` in [`FACE_PAIRS`].
    ///
    /// # Panics
    ///
    /// Panics if `pair >= FACE_PAIR_COUNT`.
    pub fn is_pair_occluded(&self, pair: usize) -> bool {
        assert!(pair < FACE_PAIR_COUNT, "face pair {pair} out of range");
        self.occluded.load(Ordering::Acquire) & (1 << pair) != 0
    }

    /// Returns the whole cached result.
    pub fn result(&self) -> [bool; FACE_PAIR_COUNT] {
        unpack(self.occluded.load(Ordering::Acquire))
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> OcclusionState {
        if self.computed.load(Ordering::Acquire) {
            OcclusionState::Computed
        } else {
            OcclusionState::Uncomputed
        }
    }

    /// Returns `true` once a query or a full recalculation has happened.
    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::Relaxed)
    }

    /// Number of recomputations performed (fast paths included).
    pub fn recompute_count(&self) -> u64 {
        self.recomputations.load(Ordering::Relaxed)
    }

    /// Number of recomputations that needed the full flood fill.
    pub fn flood_fill_count(&self) -> u64 {
        self.flood_fills.load(Ordering::Relaxed)
    }

    /// Reacts to a single-cell write.
    ///
    /// Only a change in the fully-opaque classification can change the
    /// result; everything else returns immediately. Edits to a section nobody
    /// has queried yet are skipped as well: the first query refreshes.
    pub fn on_set(
        &mut self,
        input: &OcclusionInput<'_>,
        previous: Option<BlockStateId>,
        next: Option<BlockStateId>,
    ) {
        if input.registry.is_fully_opaque(previous) == input.registry.is_fully_opaque(next) {
            return;
        }
        if !self.is_tracking() {
            return;
        }
        self.recalculate(input, true);
    }

    /// Unconditionally recomputes the result from the section content.
    pub fn recalculate(&mut self, input: &OcclusionInput<'_>, notify: bool) {
        self.refresh(input, notify);
    }

    /// Resets the result to "nothing blocked" without tracing.
    pub fn clear(&mut self, notify: bool) {
        self.update(NOT_OCCLUDED, notify);
    }

    fn refresh(&self, input: &OcclusionInput<'_>, notify: bool) {
        self.tracking.store(true, Ordering::Relaxed);
        if input.count == 0 {
            self.update(NOT_OCCLUDED, notify);
            return;
        }
        self.recomputations.fetch_add(1, Ordering::Relaxed);
        let occluded = match fast_path(input) {
            Some(result) => result,
            None => {
                self.flood_fills.fetch_add(1, Ordering::Relaxed);
                flood_fill(input)
            }
        };
        tracing::trace!(?occluded, "section occlusion recomputed");
        self.update(occluded, notify);
    }

    fn update(&self, occluded: [bool; FACE_PAIR_COUNT], notify: bool) {
        let bits = pack(&occluded);
        let previous = self.occluded.swap(bits, Ordering::AcqRel);
        self.computed.store(true, Ordering::Release);
        if previous != bits && notify {
            self.signal.bump();
        }
    }
}

fn pack(occluded: &[bool; FACE_PAIR_COUNT]) -> u16 {
    occluded
        .iter()
        .enumerate()
        .filter(|(_, blocked)| **blocked)
        .fold(0, |bits, (pair, _)| bits | (1 << pair))
}

fn unpack(bits: u16) -> [bool; FACE_PAIR_COUNT] {
    std::array::from_fn(|pair| bits & (1 << pair) != 0)
}

/// Answers without tracing when the content cannot block anything, or blocks
/// everything.
fn fast_path(input: &OcclusionInput<'_>) -> Option<[bool; FACE_PAIR_COUNT]> {
    // Closing off one face from another needs at least a full layer of opaque cells.
    if input.opaque_count < SECTION_AREA {
        return Some(NOT_OCCLUDED);
    }
    if input.opaque_count == SECTION_VOLUME {
        return Some(ALL_OCCLUDED);
    }
    match input.bounds {
        Some(bounds) if bounds.is_interior() => Some(NOT_OCCLUDED),
        Some(_) => None,
        None => Some(NOT_OCCLUDED),
    }
}

/// Labels the open regions touching each face and intersects them per pair.
fn flood_fill(input: &OcclusionInput<'_>) -> [bool; FACE_PAIR_COUNT] {
    let mut scratch = LABEL_POOL.acquire();
    let FloodScratch {
        labels,
        stack,
        face_regions,
    } = &mut *scratch;

    let mut next_label: i16 = 0;
    for face in FaceDirection::ALL {
        for a in 0..SECTION_WIDTH {
            for b in 0..SECTION_WIDTH {
                let index = face_cell(face, a, b);
                if let Some(label) = trace(input, labels, stack, index, &mut next_label) {
                    face_regions[face.index()].insert(label);
                }
            }
        }
    }

    let mut occluded = [false; FACE_PAIR_COUNT];
    for (slot, &(a, b)) in FACE_PAIRS.iter().enumerate() {
        occluded[slot] = !shares_region(&face_regions[a.index()], &face_regions[b.index()]);
    }
    occluded
}

/// Returns the index of cell `(a, b)` on the boundary plane of `face`.
fn face_cell(face: FaceDirection, a: usize, b: usize) -> usize {
    match face {
        FaceDirection::PosX => local_index(SECTION_MAX, a, b),
        FaceDirection::NegX => local_index(0, a, b),
        FaceDirection::PosY => local_index(a, SECTION_MAX, b),
        FaceDirection::NegY => local_index(a, 0, b),
        FaceDirection::PosZ => local_index(a, b, SECTION_MAX),
        FaceDirection::NegZ => local_index(a, b, 0),
    }
}

/// Returns the region label of the cell at `start`, labelling its whole
/// connected open region first if nothing has reached it yet. Opaque cells
/// yield `None`.
fn trace(
    input: &OcclusionInput<'_>,
    labels: &mut [i16],
    stack: &mut Vec<u16>,
    start: usize,
    next_label: &mut i16,
) -> Option<i16> {
    match labels[start] {
        OPAQUE => return None,
        UNVISITED => {}
        label => return Some(label),
    }
    if input.is_opaque(start) {
        labels[start] = OPAQUE;
        return None;
    }

    let label = *next_label;
    *next_label += 1;
    labels[start] = label;
    stack.push(start as u16);

    while let Some(index) = stack.pop() {
        let (x, y, z) = local_position(index as usize);
        for direction in FaceDirection::ALL {
            let (nx, ny, nz) = direction.offset(x as i32, y as i32, z as i32);
            if !in_section(nx) || !in_section(ny) || !in_section(nz) {
                continue;
            }
            let neighbor = local_index(nx as usize, ny as usize, nz as usize);
            if labels[neighbor] != UNVISITED {
                continue;
            }
            if input.is_opaque(neighbor) {
                labels[neighbor] = OPAQUE;
            } else {
                labels[neighbor] = label;
                stack.push(neighbor as u16);
            }
        }
    }
    Some(label)
}

fn in_section(coord: i32) -> bool {
    (0..SECTION_WIDTH as i32).contains(&coord)
}

/// Returns `true` if both faces reach at least one common region.
fn shares_region(a: &FxHashSet<i16>, b: &FxHashSet<i16>) -> bool {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small.iter().any(|region| large.contains(region))
}


#[cfg(test)]
#[path = "occlusion_tests.rs"]
mod section_tests;
