//! Dispatch limits for the meshing queue.

use strata_config::MeshingConfig;

/// Bounds on concurrent preparation and on the finished-mesh backlog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshingLimits {
    /// Tasks that may be in flight at once.
    pub max_preparing_tasks: usize,
    /// Finished meshes waiting for upload before dispatch pauses.
    pub max_meshes_to_load: usize,
}

impl MeshingLimits {
    /// Derives the limits from the pool size and the memory budget.
    ///
    /// `max_preparing_tasks = max(worker_threads - reserved, 1)`; the
    /// finished-mesh cap is `high` when `memory_budget > threshold`, else `low`.
    #[must_use]
    pub fn new(
        worker_threads: usize,
        reserved: usize,
        memory_budget: u64,
        threshold: u64,
        high: usize,
        low: usize,
    ) -> Self {
        Self {
            max_preparing_tasks: worker_threads.saturating_sub(reserved).max(1),
            max_meshes_to_load: if memory_budget > threshold { high } else { low },
        }
    }

    /// Limits for a pool sized by [`resolve_worker_threads`].
    #[must_use]
    pub fn from_config(config: &MeshingConfig) -> Self {
        Self::new(
            resolve_worker_threads(config.worker_threads),
            config.reserved_threads,
            config.memory_budget_bytes,
            config.high_memory_threshold_bytes,
            config.max_meshes_to_load_high,
            config.max_meshes_to_load_low,
        )
    }
}

/// Turns the configured worker count into a real one: `0` means one per CPU.
#[must_use]
pub fn resolve_worker_threads(configured: usize) -> usize {
    if configured == 0 {
        num_cpus::get().max(1)
    } else {
        configured
    }
}
