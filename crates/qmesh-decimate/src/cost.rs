//! The collapse cost model: quadric value at the chosen collapse point
//! plus shape, area, and boundary penalties, with the coplanar fast path.

use qmesh_math::{triangle_aspect, Point3, Quadric, EQUILATERAL_RATIO};

use crate::mesh::MeshView;
use crate::operation::Operation;
use crate::pool::EdgeId;

/// Sentinel cost for operations that must never be accepted. Rejected
/// collapses are parked at this cost until their neighborhood changes.
pub(crate) const FAIL_COST: f64 = 0.25 * (f32::MAX as f64);

/// Planar-mode penalty factor applied below the coplanarity threshold.
const COPLANAR_RELIEF: f64 = 0.01;

/// Immutable per-run parameters handed to workers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EngineParams {
    pub max_collapse_cost: f64,
    /// Operations costlier than this are rejected outright. Raised to the
    /// fail sentinel when a vertex-count target keeps the run going past
    /// the feature-size wall.
    pub max_accept_cost: f64,
    pub feature_size: f64,
    pub compactness_weight: f64,
    pub boundary_weight: f64,
    pub planar_mode: bool,
    pub planar_threshold: f64,
    pub min_normal_dot: f64,
    pub boundary_lock: bool,
    pub normal_splitting: bool,
    pub ridge_cos: f64,
    pub sync_step_count: u32,
    pub target_vertex_count_max: usize,
}

impl EngineParams {
    pub(crate) fn from_operation(op: &Operation<'_>) -> Self {
        Self {
            max_collapse_cost: op.max_collapse_cost(),
            max_accept_cost: op.max_collapse_cost(),
            feature_size: op.feature_size(),
            compactness_weight: op.compactness_weight,
            boundary_weight: op.boundary_weight,
            planar_mode: op.flags.planar_mode,
            planar_threshold: op.planar_threshold,
            min_normal_dot: op.min_normal_dot,
            boundary_lock: op.flags.boundary_lock,
            normal_splitting: op.flags.normal_vertex_splitting,
            ridge_cos: op.ridge_angle.cos(),
            sync_step_count: op.sync_step_count,
            target_vertex_count_max: op.target_vertex_count_max,
        }
    }

    /// Cost ceiling for one step of the quadratic ramp. Early steps chase
    /// cheap collapses; the ceiling reaches the full collapse cost at the
    /// last configured step and keeps climbing in vertex-target mode.
    pub(crate) fn step_ceiling(&self, step: u32) -> f64 {
        let ratio = step as f64 / self.sync_step_count as f64;
        self.max_collapse_cost * ratio * ratio
    }
}

/// A computed candidate collapse for one edge.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EdgeCost {
    pub cost: f64,
    pub point: Point3,
}

/// Pick the collapse point for the merged quadric: the minimizer when the
/// system is well-conditioned, otherwise the cheapest of the midpoint and
/// the two endpoints.
fn choose_point(q: &Quadric, p0: &Point3, p1: &Point3) -> (Point3, f64) {
    if let Some(x) = q.minimize() {
        return (x, q.evaluate(&x).max(0.0));
    }
    let mid = Point3::from((p0.coords + p1.coords) * 0.5);
    let candidates = [mid, *p0, *p1];
    let mut best = 0;
    let mut best_cost = q.evaluate(&candidates[0]);
    for (i, c) in candidates.iter().enumerate().skip(1) {
        let cost = q.evaluate(c);
        if cost < best_cost {
            best = i;
            best_cost = cost;
        }
    }
    (candidates[best], best_cost.max(0.0))
}

/// Evaluate the collapse of `edge`, or `None` when the edge must never
/// collapse (locked, non-manifold, or pinned by the boundary lock).
pub(crate) fn evaluate_edge(
    view: &MeshView<'_>,
    params: &EngineParams,
    edge_id: EdgeId,
) -> Option<EdgeCost> {
    let edge = view.edge(edge_id);
    if edge.locked || edge.nonmanifold {
        return None;
    }
    let [v0, v1] = edge.v;
    let a = view.vert(v0);
    let b = view.vert(v1);
    if params.boundary_lock && (a.boundary || b.boundary) {
        return None;
    }

    let q = a.quadric.sum(&b.quadric);
    let (point, value) = choose_point(&q, &a.position, &b.position);

    // Survey the hypothetical post-collapse 1-ring: worst triangle shape
    // and the largest unit-normal deviation.
    let mut worst_aspect = EQUILATERAL_RATIO;
    let mut max_deviation: f64 = 0.0;
    for (v, other) in [(v0, v1), (v1, v0)] {
        for &t in &view.vert(v).incident {
            let tri = view.tri(t);
            if tri.contains(other) {
                // Shared triangles are retired by the collapse.
                continue;
            }
            let [w0, w1] = tri.opposite_corners(v);
            let p0 = &point;
            let p1 = &view.vert(w0).position;
            let p2 = &view.vert(w1).position;
            worst_aspect = worst_aspect.min(triangle_aspect(p0, p1, p2));
            match view.oriented_plane(p0, p1, p2) {
                Some(plane) => {
                    let deviation = (plane.normal - tri.plane.normal).norm();
                    max_deviation = max_deviation.max(deviation);
                }
                None => {
                    // Degenerate shape: worst possible on both measures.
                    worst_aspect = 0.0;
                    max_deviation = 2.0;
                }
            }
        }
    }

    let mc = params.max_collapse_cost;
    let mut penalty = mc
        * params.compactness_weight
        * (1.0 - worst_aspect / EQUILATERAL_RATIO).clamp(0.0, 1.0);
    if params.feature_size > 0.0 {
        let fs2 = params.feature_size * params.feature_size;
        penalty += (q.area / fs2).sqrt() * mc;
    } else {
        return Some(EdgeCost {
            cost: FAIL_COST,
            point,
        });
    }
    if a.boundary || b.boundary {
        penalty *= params.boundary_weight;
    }
    if params.planar_mode && max_deviation < params.planar_threshold {
        penalty *= COPLANAR_RELIEF;
    }

    Some(EdgeCost {
        cost: value + penalty,
        point,
    })
}
