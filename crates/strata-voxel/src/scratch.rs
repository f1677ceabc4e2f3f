//! Pooled scratch buffers for the occlusion flood fill.
//!
//! Every recomputation needs one region label per cell, a traversal stack and
//! one region set per face. Allocating those per edit adds up quickly under
//! constant block updates, so they are checked out of a shared [`LabelPool`]
//! and handed back when the [`LabelScratch`] guard drops, including while
//! unwinding.

use std::ops::{Deref, DerefMut};
use std::sync::{LazyLock, Mutex, PoisonError};

use rustc_hash::FxHashSet;

use crate::section::SECTION_VOLUME;

/// Region label: cell has not been reached by any trace yet.
pub const UNVISITED: i16 = -1;

/// Region label: cell is fully opaque and can never carry a region.
pub const OPAQUE: i16 = -2;

/// Upper bound on idle buffers kept around; extra returns are dropped.
const MAX_IDLE_BUFFERS: usize = 16;

/// Process-wide pool used by [`crate::occlusion::SectionOcclusion`].
pub static LABEL_POOL: LazyLock<LabelPool> = LazyLock::new(LabelPool::new);

/// Working memory for one flood fill.
#[derive(Debug)]
pub struct FloodScratch {
    /// One region label per cell, indexed like the section's cell array.
    pub labels: Box<[i16]>,
    /// Pending cell indices of the trace in progress.
    pub stack: Vec<u16>,
    /// Distinct region labels touching each face, indexed by face ordinal.
    pub face_regions: [FxHashSet<i16>; 6],
}

impl FloodScratch {
    fn new() -> Self {
        Self {
            labels: vec![UNVISITED; SECTION_VOLUME].into_boxed_slice(),
            stack: Vec::new(),
            face_regions: Default::default(),
        }
    }

    fn reset(&mut self) {
        self.labels.fill(UNVISITED);
        self.stack.clear();
        for regions in &mut self.face_regions {
            regions.clear();
        }
    }
}

/// A pool of reusable [`FloodScratch`] buffers.
#[derive(Debug, Default)]
pub struct LabelPool {
    idle: Mutex<Vec<FloodScratch>>,
}

impl LabelPool {
    /// Creates an empty pool. Buffers are allocated on first demand.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks out a buffer with every label reset to [`UNVISITED`] and every
    /// collection empty.
    pub fn acquire(&self) -> LabelScratch<'_> {
        let recycled = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let scratch = match recycled {
            Some(mut scratch) => {
                scratch.reset();
                scratch
            }
            None => FloodScratch::new(),
        };
        LabelScratch {
            pool: self,
            scratch: Some(scratch),
        }
    }

    /// Number of buffers currently waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, scratch: FloodScratch) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < MAX_IDLE_BUFFERS {
            idle.push(scratch);
        }
    }
}

/// A checked-out scratch buffer; returns itself to the pool on drop.
#[derive(Debug)]
pub struct LabelScratch<'a> {
    pool: &'a LabelPool,
    // Always `Some` until `Drop` hands it back.
    scratch: Option<FloodScratch>,
}

impl Deref for LabelScratch<'_> {
    type Target = FloodScratch;

    fn deref(&self) -> &FloodScratch {
        match &self.scratch {
            Some(scratch) => scratch,
            None => unreachable!("scratch buffer used after release"),
        }
    }
}

impl DerefMut for LabelScratch<'_> {
    fn deref_mut(&mut self) -> &mut FloodScratch {
        match &mut self.scratch {
            Some(scratch) => scratch,
            None => unreachable!("scratch buffer used after release"),
        }
    }
}

impl Drop for LabelScratch<'_> {
    fn drop(&mut self) {
        if let Some(scratch) = self.scratch.take() {
            self.pool.release(scratch);
        }
    }
}
