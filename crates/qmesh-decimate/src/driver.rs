//! The parallel collapse loop: a quadratic cost ramp over syncsteps, one
//! partition-parallel pass per step, and serial coordinator work at the
//! step barrier.
//!
//! A globally ordered queue would serialize the whole workload, so the
//! ramp approximates the global ascending-cost order instead: within a
//! step every worker drains its own partition in cost order below the
//! step ceiling, cross-partition operations wait for the barrier, and
//! ceilings never decrease across steps.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::collapse::{self, Outcome};
use crate::cost::{evaluate_edge, EngineParams, FAIL_COST};
use crate::error::{DecimateError, Result};
use crate::heap::CollapseOp;
use crate::mesh::{self, MeshGraph, MeshView};
use crate::operation::{DecimateStats, Operation};
use crate::partition::{self, PartAccess, PartitionState};
use crate::pool::OpId;
use crate::status::{Stage, StatusSink};

/// Hard bound on ramp steps; vertex-target runs keep climbing past the
/// configured step count and this guards pathological inputs.
pub(crate) const SYNC_STEP_ABORT: u32 = 1 << 20;

/// Run a complete decimation: build, partition, seed, collapse, pack.
pub(crate) fn execute(op: &mut Operation<'_>, thread_count: usize) -> Result<DecimateStats> {
    op.validate()?;
    let mut callback = op.status.take();
    let cancel = op.cancel.clone();
    let mut sink = StatusSink::new(
        callback.as_mut(),
        op.status_interval_triangles,
        op.triangle_count,
    );
    let result = run_pipeline(op, thread_count, &mut sink, cancel.as_deref());
    drop(sink);
    op.status = callback;
    result
}

fn run_pipeline(
    op: &mut Operation<'_>,
    thread_count: usize,
    sink: &mut StatusSink<'_, '_>,
    cancel: Option<&AtomicBool>,
) -> Result<DecimateStats> {
    sink.report(Stage::Init, 1.0, op.triangle_count);

    let mut mesh = mesh::build(op, sink)?;
    let mut params = EngineParams::from_operation(op);
    let workers = thread_count.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| DecimateError::InvalidConfiguration(format!("thread pool: {e}")))?;

    sink.report(Stage::BuildQueues, 0.0, mesh.live_triangle_count());
    let mut parts = partition::assign_partitions(&mut mesh, workers);
    seed_queues(&mut mesh, &params, &mut parts, &pool);

    sink.report(Stage::Decimate, 0.0, mesh.live_triangle_count());
    let canceled = run_loop(&mut mesh, &mut params, &mut parts, &pool, sink, cancel);
    sink.report(Stage::Decimate, 1.0, mesh.live_triangle_count());

    sink.report(Stage::Cleanup, 0.0, mesh.live_triangle_count());
    if op.normals_out.is_some() {
        mesh::recompute_vertex_normals(&mut mesh);
    }

    sink.report(Stage::Pack, 0.0, mesh.live_triangle_count());
    let stats = mesh::pack(mesh, op, canceled);
    sink.report(Stage::Done, 1.0, stats.triangle_count);
    Ok(stats)
}

/// Compute initial costs for every live edge and fill the per-partition
/// heaps. Workers only write edges pinned to their own partition; the
/// mesh itself is read-only here.
pub(crate) fn seed_queues(
    mesh: &mut MeshGraph,
    params: &EngineParams,
    parts: &mut [PartitionState],
    pool: &rayon::ThreadPool,
) {
    let mut buckets: Vec<Vec<crate::pool::EdgeId>> = vec![Vec::new(); parts.len()];
    for (i, edge) in mesh.edges.iter().enumerate() {
        if edge.is_live() {
            buckets[edge.partition as usize].push(crate::pool::EdgeId(i as u32));
        }
    }

    let view = mesh.view();
    pool.install(|| {
        parts
            .par_iter_mut()
            .zip(buckets.par_iter())
            .for_each(|(part, edges)| {
                for &e in edges {
                    if let Some(cost) = evaluate_edge(&view, params, e) {
                        let [v0, v1] = view.edge(e).v;
                        let record = CollapseOp::new(
                            e,
                            cost.cost,
                            cost.point,
                            view.vert(v0).generation,
                            view.vert(v1).generation,
                        );
                        let id = OpId(part.ops.alloc(record));
                        part.heap.push(id, &mut part.ops);
                        view.edge_mut(e).op = id;
                    }
                }
            });
    });
}

/// The syncstep loop. Returns true when the run stopped at a cancel
/// point.
pub(crate) fn run_loop(
    mesh: &mut MeshGraph,
    params: &mut EngineParams,
    parts: &mut [PartitionState],
    pool: &rayon::ThreadPool,
    sink: &mut StatusSink<'_, '_>,
    cancel: Option<&AtomicBool>,
) -> bool {
    let total_steps = params.sync_step_count;
    let target = params.target_vertex_count_max;
    let mut step: u32 = 0;

    loop {
        if let Some(flag) = cancel {
            if flag.load(Ordering::Relaxed) {
                return true;
            }
        }
        if target > 0 && mesh.live_vertex_count() <= target {
            break;
        }
        if target == 0 && step > total_steps {
            break;
        }
        if step >= SYNC_STEP_ABORT {
            log::warn!("aborting collapse loop after {step} steps");
            break;
        }
        if parts.iter().all(|p| p.heap.is_empty() && p.deferred.is_empty()) {
            break;
        }
        if target > 0 && step > total_steps {
            // Past the feature-size wall the vertex target takes over:
            // accept anything short of the fail sentinel.
            params.max_accept_cost = FAIL_COST;
        }

        let ceiling = params.step_ceiling(step);
        {
            let view = mesh.view();
            let params: &EngineParams = params;
            pool.install(|| {
                parts
                    .par_iter_mut()
                    .for_each(|part| worker_pass(&view, params, part, ceiling, step, None));
            });
        }

        drain_deferred(mesh, params, parts, step);

        let progress = f64::from(step.min(total_steps)) / f64::from(total_steps);
        sink.report_interval(progress, mesh.live_triangle_count());

        // Advance the ramp. When every pending operation sits above the
        // ceiling, jump straight to the first step that can pop one
        // instead of idling through the gap.
        let min_pending = parts
            .iter()
            .filter_map(|p| p.heap.peek_cost(&p.ops))
            .fold(f64::INFINITY, f64::min);
        step = if min_pending > ceiling && min_pending.is_finite() {
            if min_pending >= FAIL_COST || params.max_collapse_cost <= 0.0 {
                // Only parked rejects remain; no ceiling will ever admit
                // them.
                break;
            }
            let needed =
                ((min_pending / params.max_collapse_cost).sqrt() * f64::from(total_steps)).ceil();
            (step + 1).max(needed.min(f64::from(SYNC_STEP_ABORT)) as u32)
        } else {
            step + 1
        };
    }
    false
}

/// One worker's share of a syncstep: pop own-partition operations in
/// ascending cost order up to the step ceiling, executing local ones and
/// parking cross-partition ones for the barrier.
///
/// `accepted_costs`, when supplied, records the cost of every accepted
/// collapse in execution order.
fn worker_pass(
    view: &MeshView<'_>,
    params: &EngineParams,
    part: &mut PartitionState,
    ceiling: f64,
    step: u32,
    mut accepted_costs: Option<&mut Vec<f64>>,
) {
    // Operations requeued during this pass wait for the next step; they
    // are parked here so each pass pops in non-decreasing cost order.
    let mut held: Vec<OpId> = Vec::new();

    loop {
        match part.heap.peek_cost(&part.ops) {
            Some(cost) if cost <= ceiling => {}
            _ => break,
        }
        let Some(op_id) = part.heap.pop_min(&mut part.ops) else {
            break;
        };
        let (stale, eligible_step, edge_id, cost) = {
            let record = part.ops.get(op_id.0);
            (record.stale, record.eligible_step, record.edge, record.cost)
        };

        if stale {
            part.ops.retire(op_id.0);
            let edge = view.edge_mut(edge_id);
            if edge.is_live() && edge.op == op_id {
                edge.op = OpId::NONE;
            }
            continue;
        }
        if eligible_step > step {
            held.push(op_id);
            continue;
        }

        let edge = view.edge(edge_id);
        if !edge.is_live() || edge.op != op_id {
            part.ops.retire(op_id.0);
            continue;
        }
        let [v0, v1] = edge.v;
        if !collapse::is_local(view, v0, v1, part.id) {
            part.ops.get_mut(op_id.0).deferred = true;
            part.deferred.push(op_id);
            continue;
        }

        let partition = part.id;
        let mut access = PartAccess::Own(&mut *part);
        let outcome = collapse::try_collapse(view, params, &mut access, partition, op_id, step);
        if outcome == Outcome::Accepted {
            if let Some(trace) = accepted_costs.as_deref_mut() {
                trace.push(cost);
            }
        }
    }

    for id in held {
        part.heap.push(id, &mut part.ops);
    }
}

/// Barrier work: the coordinator serially executes the collapses whose
/// neighborhoods cross partitions.
fn drain_deferred(
    mesh: &mut MeshGraph,
    params: &EngineParams,
    parts: &mut [PartitionState],
    step: u32,
) {
    let ceiling = params.step_ceiling(step);
    let view = mesh.view();
    for pi in 0..parts.len() {
        let deferred = std::mem::take(&mut parts[pi].deferred);
        let partition = pi as u32;
        for op_id in deferred {
            let (stale, cost, edge_id) = {
                let record = parts[pi].ops.get_mut(op_id.0);
                record.deferred = false;
                (record.stale, record.cost, record.edge)
            };
            let mut access = PartAccess::All(parts);
            if stale {
                collapse::discard_op(&view, &mut access, partition, op_id);
                continue;
            }
            if cost > ceiling {
                // A neighboring collapse repriced it past this step's
                // ceiling while it waited; back onto the heap it goes.
                let part = access.get(partition);
                part.heap.push(op_id, &mut part.ops);
                continue;
            }
            let outcome = collapse::try_collapse(&view, params, &mut access, partition, op_id, step);
            if outcome == Outcome::Stale {
                // The neighborhood moved while the operation waited; give
                // the edge a fresh cost so it is not lost.
                let edge = view.edge(edge_id);
                if edge.is_live() && !edge.op.is_some() {
                    collapse::requeue_edge(&view, params, &mut access, edge_id, step);
                }
            }
        }
    }
}
