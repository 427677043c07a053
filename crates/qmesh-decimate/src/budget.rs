//! The triangle-budget driver: a binary search over feature size that
//! brings the output triangle count under a caller-supplied budget.
//!
//! Larger feature sizes admit more collapses and therefore produce fewer
//! triangles, so the probe count is monotone in the feature size and a
//! plain bisection converges. Every probe rebuilds the engine state from
//! the immutable input; only the final accepted run writes results back.

use std::time::Instant;

use qmesh_math::Aabb;

use crate::cost::EngineParams;
use crate::driver;
use crate::error::{DecimateError, Result};
use crate::mesh;
use crate::operation::{BudgetOptions, BudgetReport, DecimateStats, Operation};
use crate::partition;
use crate::status::StatusSink;

/// Lower search bound as a fraction of the mesh diagonal.
const FEATURE_EPSILON: f64 = 1e-6;

/// Run the budget search and write the winning probe's mesh back into the
/// operation's buffers.
pub(crate) fn execute(
    op: &mut Operation<'_>,
    max_triangles: usize,
    thread_count: usize,
    options: &BudgetOptions,
) -> Result<BudgetReport> {
    if max_triangles == 0 {
        return Err(DecimateError::InvalidBudget(
            "triangle budget must be at least 1".into(),
        ));
    }
    op.validate()?;

    // Already under budget: nothing to decimate, the input passes
    // through unchanged.
    if op.triangle_count <= max_triangles {
        return Ok(BudgetReport {
            final_triangle_count: op.triangle_count,
            final_feature_size: op.feature_size(),
            iteration_count: 0,
            budget_met: true,
            stats: DecimateStats {
                vertex_count: op.vertex_count,
                triangle_count: op.triangle_count,
                decimation_count: 0,
                collision_count: 0,
                canceled: false,
            },
        });
    }

    let diagonal = input_diagonal(op);
    if !(diagonal > 0.0) {
        return Err(DecimateError::InvalidConfiguration(
            "mesh has a degenerate bounding box".into(),
        ));
    }

    let started = Instant::now();
    let mut lo = diagonal * FEATURE_EPSILON;
    let mut hi = diagonal;
    // Best feasible probe (count under budget, closest to it) and the
    // smallest infeasible count seen, as the fallback answer.
    let mut best_feasible: Option<(f64, usize)> = None;
    let mut smallest: Option<(f64, usize)> = None;
    let mut iterations = 0u32;

    while iterations < options.max_iterations {
        if let Some(limit) = options.time_limit {
            if started.elapsed() >= limit {
                log::debug!("budget search stopped by time limit after {iterations} probes");
                break;
            }
        }
        let feature = 0.5 * (lo + hi);
        let count = probe(op, feature, thread_count)?;
        iterations += 1;
        log::debug!("budget probe {iterations}: feature {feature:.6} -> {count} triangles");

        if count <= max_triangles {
            if best_feasible.map_or(true, |(_, c)| count > c) {
                best_feasible = Some((feature, count));
            }
            let gap = (max_triangles - count) as f64 / max_triangles as f64;
            if gap <= options.tolerance {
                break;
            }
            hi = feature;
        } else {
            if smallest.map_or(true, |(_, c)| count < c) {
                smallest = Some((feature, count));
            }
            lo = feature;
        }
    }

    let (feature, feasible) = match (best_feasible, smallest) {
        (Some((f, _)), _) => (f, true),
        (None, Some((f, _))) => (f, false),
        (None, None) => (hi, false),
    };

    op.set_feature_size(feature);
    let stats = driver::execute(op, thread_count)?;
    Ok(BudgetReport {
        final_triangle_count: stats.triangle_count,
        final_feature_size: feature,
        iteration_count: iterations,
        budget_met: feasible && stats.triangle_count <= max_triangles,
        stats,
    })
}

/// Run one full decimation at `feature` on throwaway state and report the
/// resulting live triangle count. The caller's buffers are not written.
fn probe(op: &Operation<'_>, feature: f64, thread_count: usize) -> Result<usize> {
    let mut sink = StatusSink::new(None, 0, 0);
    let mut mesh = mesh::build(op, &mut sink)?;

    let mut params = EngineParams::from_operation(op);
    params.feature_size = feature;
    params.max_collapse_cost = (0.25 * feature).powi(6);
    params.max_accept_cost = params.max_collapse_cost;

    let workers = thread_count.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| DecimateError::InvalidConfiguration(format!("thread pool: {e}")))?;
    let mut parts = partition::assign_partitions(&mut mesh, workers);
    driver::seed_queues(&mut mesh, &params, &mut parts, &pool);
    driver::run_loop(
        &mut mesh,
        &mut params,
        &mut parts,
        &pool,
        &mut sink,
        op.cancel.as_deref(),
    );
    Ok(mesh.live_triangle_count())
}

/// Bounding-box diagonal of the input vertices.
fn input_diagonal(op: &Operation<'_>) -> f64 {
    let mut bounds = Aabb::empty();
    for i in 0..op.vertex_count {
        bounds.expand(&op.vertices.read_point(i, op.vertex_stride));
    }
    bounds.diagonal()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::{IndexData, VertexData};

    #[test]
    fn test_trivial_budget_is_identity() {
        let mut v = vec![
            0.0f64, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            1.0, 1.0, 0.0, //
            0.0, 1.0, 0.0,
        ];
        let original = v.clone();
        let mut i = vec![0u32, 1, 2, 0, 2, 3];
        let original_indices = i.clone();
        let mut op = Operation::new(VertexData::F64(&mut v), 3, IndexData::U32(&mut i), 3);
        let report = execute(&mut op, 10, 1, &BudgetOptions::default()).unwrap();
        assert!(report.budget_met);
        assert_eq!(report.iteration_count, 0);
        assert_eq!(report.final_triangle_count, 2);
        assert_eq!(report.stats.decimation_count, 0);
        drop(op);
        assert_eq!(v, original);
        assert_eq!(i, original_indices);
    }

    #[test]
    fn test_zero_budget_is_rejected() {
        let mut v = vec![0.0f64; 9];
        let mut i = vec![0u32, 1, 2];
        let mut op = Operation::new(VertexData::F64(&mut v), 3, IndexData::U32(&mut i), 3);
        assert!(matches!(
            execute(&mut op, 0, 1, &BudgetOptions::default()),
            Err(DecimateError::InvalidBudget(_))
        ));
    }
}
