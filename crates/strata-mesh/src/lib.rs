//! Mesh-preparation scheduling: the meshing and culled queues, the worker
//! pool they dispatch into, and the facade that routes world edits.

pub mod collaborator;
pub mod culled_queue;
pub mod invalidation;
pub mod item;
pub mod limits;
pub mod meshing_queue;
pub mod pool;
pub mod scheduler;
pub mod task;

#[cfg(test)]
mod test_support;

pub use collaborator::{PrepareError, SectionPreparer, VisibilityGraph};
pub use culled_queue::CulledQueue;
pub use invalidation::MeshInvalidator;
pub use item::MeshQueueItem;
pub use limits::{MeshingLimits, resolve_worker_threads};
pub use meshing_queue::ChunkMeshingQueue;
pub use pool::{Job, PoolError, ThreadWorkerPool, WorkerPool};
pub use scheduler::{QueueOutcome, SectionScheduler, TickStats};
pub use task::{InterruptFlag, SectionMeshTask, TaskId, TaskPriority};
