#![warn(missing_docs)]

//! Parallel quadric-error-metric triangle mesh decimation.
//!
//! Given an indexed triangle mesh, the engine iteratively collapses edges
//! in ascending order of a quadric error cost until a feature-size limit,
//! a vertex-count target, or a triangle budget is reached. The pipeline:
//!
//! 1. **Build** — vertex/triangle/edge arenas and hash tables from the
//!    caller's buffers
//! 2. **Seed** — per-edge collapse costs into spatially partitioned
//!    priority queues
//! 3. **Decimate** — a parallel collapse loop under a rising cost ceiling,
//!    with cross-partition collapses serialized at step barriers
//! 4. **Pack** — live vertices and triangles written back in place
//!
//! # Example
//!
//! ```ignore
//! use qmesh_decimate::{decimate, IndexData, Operation, VertexData};
//!
//! let mut op = Operation::new(
//!     VertexData::F32(&mut vertices),
//!     3,
//!     IndexData::U32(&mut indices),
//!     3,
//! );
//! op.set_feature_size(0.1);
//! let stats = decimate(&mut op, 4)?;
//! println!("{} triangles left", stats.triangle_count);
//! ```

mod buffers;
mod budget;
mod collapse;
mod cost;
mod driver;
pub mod error;
mod hash;
mod heap;
mod mesh;
mod operation;
mod partition;
mod pool;
mod status;

pub use buffers::{IndexData, VertexData};
pub use error::{DecimateError, Result};
pub use operation::{
    BudgetOptions, BudgetReport, DecimateFlags, DecimateStats, Operation, DEFAULT_SYNC_STEPS,
};
pub use status::{Stage, StatusFn, StatusReport};

/// Run one decimation, writing the simplified mesh back into the
/// operation's buffers and returning the run counters.
///
/// `thread_count` workers share the spatially partitioned collapse work;
/// with one thread the run is bit-reproducible for fixed settings.
pub fn decimate(op: &mut Operation<'_>, thread_count: usize) -> Result<DecimateStats> {
    driver::execute(op, thread_count)
}

/// Binary-search the feature size until the output triangle count drops
/// to `max_triangles` (within the configured tolerance), then write the
/// winning probe's mesh back into the operation's buffers.
///
/// When no feature size can reach the budget, the smallest achievable
/// mesh is returned and the report's `budget_met` is false.
pub fn decimate_budget(
    op: &mut Operation<'_>,
    max_triangles: usize,
    thread_count: usize,
    options: &BudgetOptions,
) -> Result<BudgetReport> {
    budget::execute(op, max_triangles, thread_count, options)
}
