//! The collapse executor: validity checks, topological rewiring, vertex
//! merging, attribute recomputation, and requeueing of the affected
//! neighborhood.

use qmesh_math::{triangle_area, Point3, Quadric, Vec3};

use crate::cost::{evaluate_edge, EngineParams, FAIL_COST};
use crate::hash::{EdgeKey, TriKey};
use crate::heap::CollapseOp;
use crate::mesh::{Edge, MeshView, NO_OWNER};
use crate::partition::PartAccess;
use crate::pool::{EdgeId, OpId, TriId, VertexId};

/// Result of attempting a popped operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The collapse was executed.
    Accepted,
    /// Validity failed; the operation is parked at the fail sentinel.
    Rejected,
    /// The operation no longer matches the mesh and was discarded.
    Stale,
}

/// True when every entity the collapse of `(v0, v1)` reads or writes is
/// owned by `partition`. The mutation footprint is the closed 1-ring; the
/// cost refresh of its edges additionally reads one ring further out.
pub(crate) fn is_local(view: &MeshView<'_>, v0: VertexId, v1: VertexId, partition: u32) -> bool {
    if view.owner(v0) != partition || view.owner(v1) != partition {
        return false;
    }
    let mut link: Vec<VertexId> = Vec::with_capacity(16);
    for v in [v0, v1] {
        for &t in &view.vert(v).incident {
            for w in view.tri(t).verts {
                if w != v0 && w != v1 && !link.contains(&w) {
                    if view.owner(w) != partition {
                        return false;
                    }
                    link.push(w);
                }
            }
        }
    }
    for &w in &link {
        for &t in &view.vert(w).incident {
            for x in view.tri(t).verts {
                if view.owner(x) != partition {
                    return false;
                }
            }
        }
    }
    true
}

/// Run one popped operation end to end. `partition` is the partition the
/// operation's edge is pinned to.
pub(crate) fn try_collapse(
    view: &MeshView<'_>,
    params: &EngineParams,
    access: &mut PartAccess<'_>,
    partition: u32,
    op_id: OpId,
    step: u32,
) -> Outcome {
    let (edge_id, cost, point, gen_v0, gen_v1) = {
        let part = access.get(partition);
        let op = part.ops.get(op_id.0);
        (op.edge, op.cost, op.point, op.gen_v0, op.gen_v1)
    };

    let edge = view.edge(edge_id);
    if !edge.is_live() || edge.op != op_id {
        discard_op(view, access, partition, op_id);
        return Outcome::Stale;
    }
    let [v0, v1] = edge.v;
    if view.vert(v0).generation != gen_v0 || view.vert(v1).generation != gen_v1 {
        discard_op(view, access, partition, op_id);
        return Outcome::Stale;
    }

    let refused = edge.locked
        || edge.nonmanifold
        || (params.boundary_lock && (view.vert(v0).boundary || view.vert(v1).boundary))
        || cost >= FAIL_COST
        || cost > params.max_accept_cost
        || !validate(view, params, v0, v1, &point);
    if refused {
        let part = access.get(partition);
        {
            let op = part.ops.get_mut(op_id.0);
            op.cost = FAIL_COST;
            op.stale = true;
        }
        part.heap.push(op_id, &mut part.ops);
        return Outcome::Rejected;
    }

    perform(view, params, access, v0, v1, point, step);

    // The collapsed edge retired during the rewire and took the hash entry
    // with it; drop its operation record.
    let part = access.get(partition);
    part.ops.retire(op_id.0);
    Outcome::Accepted
}

/// Drop an operation record, unhooking it from its edge if still linked.
pub(crate) fn discard_op(
    view: &MeshView<'_>,
    access: &mut PartAccess<'_>,
    partition: u32,
    op_id: OpId,
) {
    let part = access.get(partition);
    let edge_id = part.ops.get(op_id.0).edge;
    part.ops.retire(op_id.0);
    let edge = view.edge_mut(edge_id);
    if edge.is_live() && edge.op == op_id {
        edge.op = OpId::NONE;
    }
}

/// All validity gates from the collapse contract. The collapse must not
/// degenerate a surviving triangle, flip any orientation, or pinch the
/// surface into a non-manifold fan.
fn validate(
    view: &MeshView<'_>,
    params: &EngineParams,
    v0: VertexId,
    v1: VertexId,
    point: &Point3,
) -> bool {
    // Corners across the shared triangles are the only neighbors the two
    // endpoints are allowed to have in common (the link condition).
    let mut shared_opposites: Vec<VertexId> = Vec::with_capacity(2);
    let mut neighbors0: Vec<VertexId> = Vec::with_capacity(16);
    for &t in &view.vert(v0).incident {
        let tri = view.tri(t);
        let is_shared = tri.contains(v1);
        for w in tri.verts {
            if w == v0 || w == v1 {
                continue;
            }
            if is_shared {
                shared_opposites.push(w);
            }
            if !neighbors0.contains(&w) {
                neighbors0.push(w);
            }
        }
    }
    for &t in &view.vert(v1).incident {
        let tri = view.tri(t);
        if tri.contains(v0) {
            continue;
        }
        for w in tri.verts {
            if w != v1 && neighbors0.contains(&w) && !shared_opposites.contains(&w) {
                return false;
            }
        }
    }

    // No surviving triangle may degenerate or flip its orientation when
    // the merged vertex moves to the collapse point.
    for (v, other) in [(v0, v1), (v1, v0)] {
        for &t in &view.vert(v).incident {
            let tri = view.tri(t);
            if tri.contains(other) {
                continue;
            }
            let [w0, w1] = tri.opposite_corners(v);
            let p1 = view.vert(w0).position;
            let p2 = view.vert(w1).position;
            let Some(plane) = view.oriented_plane(point, &p1, &p2) else {
                return false;
            };
            if plane.normal.dot(&tri.plane.normal) <= params.min_normal_dot {
                return false;
            }
        }
    }
    true
}

/// Execute an accepted collapse of `v1` into `v0` at `point`.
fn perform(
    view: &MeshView<'_>,
    params: &EngineParams,
    access: &mut PartAccess<'_>,
    v0: VertexId,
    v1: VertexId,
    point: Point3,
    step: u32,
) {
    // Retire the triangles along the collapsed edge; the edge itself
    // retires with its last owner.
    let shared: Vec<TriId> = view
        .vert(v0)
        .incident
        .iter()
        .copied()
        .filter(|&t| view.tri(t).contains(v1))
        .collect();
    for t in shared {
        view.retire_triangle(t);
    }

    let moved: Vec<TriId> = view.vert(v1).incident.clone();
    let mut v1_edges: Vec<EdgeId> = Vec::with_capacity(moved.len() + 1);
    for &t in &moved {
        for e in view.tri(t).edges {
            if e.is_some() {
                let edge = view.edge(e);
                if edge.is_live()
                    && (edge.v[0] == v1 || edge.v[1] == v1)
                    && !v1_edges.contains(&e)
                {
                    v1_edges.push(e);
                }
            }
        }
    }

    // Merge the vertex payloads.
    {
        let merged_quadric = view.vert(v0).quadric.sum(&view.vert(v1).quadric);
        let v1_boundary = view.vert(v1).boundary;
        let a = view.vert_mut(v0);
        a.position = point;
        a.quadric = merged_quadric;
        a.boundary |= v1_boundary;
        a.generation += 1;
    }

    // Re-point the surviving triangles of v1 and detect duplicates.
    for &t in &moved {
        let tri = view.tri_mut(t);
        if !tri.is_live() {
            continue;
        }
        let old_key = TriKey::new([tri.verts[0].0, tri.verts[1].0, tri.verts[2].0]);
        if view.tri_table.lookup(&old_key) == Some(t.0) {
            view.tri_table.remove(&old_key);
        }
        for c in tri.verts.iter_mut() {
            if *c == v1 {
                *c = v0;
            }
        }
        let new_key = TriKey::new([tri.verts[0].0, tri.verts[1].0, tri.verts[2].0]);
        if view.tri_table.insert(new_key, t.0).is_some() {
            // The merge folded two triangles onto the same corner triple.
            view.counters
                .collisions
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            view.retire_triangle(t);
            continue;
        }
        tri.generation += 1;
        view.vert_mut(v0).incident.push(t);
    }

    // Re-key the surviving edges of v1, merging into existing records
    // where the 1-rings overlap.
    for &e in &v1_edges {
        let edge = view.edge_mut(e);
        if !edge.is_live() {
            continue;
        }
        let w = edge.other(v1);
        debug_assert!(w != v0, "the collapsed edge outlived its triangles");
        view.edge_table.remove(&EdgeKey::new(v1.0, w.0));
        let new_key = EdgeKey::new(v0.0, w.0);
        if let Some(existing) = view.edge_table.lookup(&new_key) {
            let target = view.edge_mut(EdgeId(existing));
            for i in 0..(edge.tri_count.min(2) as usize) {
                let t = edge.tris[i];
                if t.is_some() && view.tri(t).is_live() {
                    target.attach_tri(t);
                    let tri = view.tri_mut(t);
                    for te in tri.edges.iter_mut() {
                        if *te == e {
                            *te = EdgeId(existing);
                        }
                    }
                }
            }
            if edge.nonmanifold {
                target.nonmanifold = true;
            }
            target.boundary = target.tri_count == 1;
            drop_edge_op(view, access, e);
            *view.edge_mut(e) = Edge::retired_slot();
        } else {
            edge.v = if v0.0 < w.0 { [v0, w] } else { [w, v0] };
            view.edge_table.insert(new_key, e.0);
        }
    }

    // Retire v1 behind a redirect.
    {
        let b = view.vert_mut(v1);
        b.incident.clear();
        b.merged_into = v0;
        b.generation += 1;
    }
    view.set_owner(v1, NO_OWNER);
    view.counters
        .live_verts
        .fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
    view.counters
        .decimations
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

    // Refresh the planes of every triangle now incident to v0; the merged
    // vertex moved, so all of them changed.
    for &t in &view.vert(v0).incident {
        let tri = view.tri_mut(t);
        let [a, b, c] = tri.verts.map(|v| view.vert(v).position);
        if let Some(plane) = view.oriented_plane(&a, &b, &c) {
            tri.plane = plane;
            tri.area = triangle_area(&a, &b, &c);
        }
        tri.generation += 1;
    }

    let mut affected = vec![v0];
    if params.normal_splitting {
        split_normal_clusters(view, params, &mut affected);
    }

    // Ownership refresh for the merged vertex, its split copies, and the
    // link around them.
    let mut link: Vec<VertexId> = Vec::with_capacity(16);
    for &v in &affected {
        for &t in &view.vert(v).incident {
            for w in view.tri(t).verts {
                if !affected.contains(&w) && !link.contains(&w) {
                    link.push(w);
                }
            }
        }
    }
    for &v in &affected {
        view.refresh_owner(v);
    }
    for &w in &link {
        view.refresh_owner(w);
    }

    // Requeue every edge of the modified neighborhood with fresh costs.
    let mut requeue: Vec<EdgeId> = Vec::with_capacity(32);
    for &v in &affected {
        for &t in &view.vert(v).incident {
            for e in view.tri(t).edges {
                if e.is_some() && view.edge(e).is_live() && !requeue.contains(&e) {
                    requeue.push(e);
                }
            }
        }
    }
    for e in requeue {
        requeue_edge(view, params, access, e, step);
    }
}

/// Recompute an edge's cost and update, insert, or withdraw its queued
/// operation accordingly.
pub(crate) fn requeue_edge(
    view: &MeshView<'_>,
    params: &EngineParams,
    access: &mut PartAccess<'_>,
    e: EdgeId,
    step: u32,
) {
    let edge = view.edge(e);
    if !edge.is_live() {
        return;
    }
    let fresh = evaluate_edge(view, params, e);
    let [v0, v1] = edge.v;
    let gen_v0 = view.vert(v0).generation;
    let gen_v1 = view.vert(v1).generation;
    let part = access.get(edge.partition);

    match (edge.op.is_some(), fresh) {
        (true, Some(fresh)) => {
            let op_id = edge.op;
            let queued = {
                let op = part.ops.get_mut(op_id.0);
                op.cost = fresh.cost;
                op.point = fresh.point;
                op.gen_v0 = gen_v0;
                op.gen_v1 = gen_v1;
                op.stale = false;
                op.eligible_step = step + 1;
                op.queued()
            };
            if queued {
                part.heap.update(op_id, &mut part.ops);
            } else if !part.ops.get(op_id.0).deferred {
                part.heap.push(op_id, &mut part.ops);
            }
        }
        (true, None) => {
            let op_id = edge.op;
            if part.ops.get(op_id.0).queued() {
                part.heap.remove(op_id, &mut part.ops);
            }
            if part.ops.get(op_id.0).deferred {
                // The coordinator still holds it; let the drain discard.
                part.ops.get_mut(op_id.0).stale = true;
            } else {
                part.ops.retire(op_id.0);
                view.edge_mut(e).op = OpId::NONE;
            }
        }
        (false, Some(fresh)) => {
            let mut op = CollapseOp::new(e, fresh.cost, fresh.point, gen_v0, gen_v1);
            op.eligible_step = step + 1;
            let id = OpId(part.ops.alloc(op));
            part.heap.push(id, &mut part.ops);
            view.edge_mut(e).op = id;
        }
        (false, None) => {}
    }
}

/// Withdraw the queued operation of an edge that is about to retire.
fn drop_edge_op(view: &MeshView<'_>, access: &mut PartAccess<'_>, e: EdgeId) {
    let edge = view.edge(e);
    if !edge.op.is_some() {
        return;
    }
    let op_id = edge.op;
    let part = access.get(edge.partition);
    if part.ops.get(op_id.0).queued() {
        part.heap.remove(op_id, &mut part.ops);
    }
    if part.ops.get(op_id.0).deferred {
        part.ops.get_mut(op_id.0).stale = true;
    } else {
        part.ops.retire(op_id.0);
    }
    view.edge_mut(e).op = OpId::NONE;
}

/// Split the merged vertex into one copy per normal-discontinuous cluster
/// of its incident triangles, drawing from the reserved headroom. Skipped
/// (with a warning) when the headroom is exhausted.
fn split_normal_clusters(
    view: &MeshView<'_>,
    params: &EngineParams,
    affected: &mut Vec<VertexId>,
) {
    let v = affected[0];
    let incident: Vec<TriId> = view.vert(v).incident.clone();
    if incident.len() < 2 {
        return;
    }

    // Greedy clustering against each cluster's seed normal.
    let mut seeds: Vec<Vec3> = Vec::new();
    let mut assign: Vec<usize> = Vec::with_capacity(incident.len());
    for &t in &incident {
        let n = view.tri(t).plane.normal;
        match seeds.iter().position(|s| s.dot(&n) >= params.ridge_cos) {
            Some(c) => assign.push(c),
            None => {
                seeds.push(n);
                assign.push(seeds.len() - 1);
            }
        }
    }
    if seeds.len() <= 1 {
        return;
    }

    // Claim one copy per extra cluster up front; give everything back if
    // the headroom runs dry mid-claim.
    let mut copies: Vec<VertexId> = Vec::with_capacity(seeds.len() - 1);
    for _ in 1..seeds.len() {
        match view.counters.alloc_vertex() {
            Some(id) => copies.push(id),
            None => {
                log::warn!("vertex headroom exhausted; keeping discontinuous normals merged");
                for id in copies {
                    release_vertex(view, id, v);
                }
                return;
            }
        }
    }

    let template = view.vert(v).clone();
    for &copy in &copies {
        let vert = view.vert_mut(copy);
        vert.position = template.position;
        vert.quadric = Quadric::zero();
        vert.incident = Vec::new();
        vert.merged_into = VertexId::NONE;
        vert.boundary = true;
        vert.normal = Vec3::zeros();
        vert.generation = 1;
    }

    // Collect the edges at v before any re-pointing.
    let mut spokes: Vec<EdgeId> = Vec::with_capacity(incident.len() + 1);
    for &t in &incident {
        for e in view.tri(t).edges {
            if e.is_some() {
                let edge = view.edge(e);
                if edge.is_live() && (edge.v[0] == v || edge.v[1] == v) && !spokes.contains(&e) {
                    spokes.push(e);
                }
            }
        }
    }

    // Every spoke can in the worst case split along a seam; reserve that
    // many edge slots so the rewiring below cannot run out halfway.
    let Some(edge_base) = view.counters.reserve_edges(spokes.len() as u32) else {
        log::warn!("edge headroom exhausted; keeping discontinuous normals merged");
        for id in copies {
            release_vertex(view, id, v);
        }
        return;
    };
    let mut next_edge = edge_base;

    // Move the triangles of clusters 1.. onto their copies.
    for (slot, &t) in incident.iter().enumerate() {
        let cluster = assign[slot];
        if cluster == 0 {
            continue;
        }
        let copy = copies[cluster - 1];
        let tri = view.tri_mut(t);
        let old_key = TriKey::new([tri.verts[0].0, tri.verts[1].0, tri.verts[2].0]);
        if view.tri_table.lookup(&old_key) == Some(t.0) {
            view.tri_table.remove(&old_key);
        }
        for c in tri.verts.iter_mut() {
            if *c == v {
                *c = copy;
            }
        }
        view.tri_table
            .insert(TriKey::new([tri.verts[0].0, tri.verts[1].0, tri.verts[2].0]), t.0);
        tri.generation += 1;
        view.vert_mut(copy).incident.push(t);
    }
    {
        let vert = view.vert_mut(v);
        vert.incident = incident
            .iter()
            .zip(assign.iter())
            .filter(|(_, &c)| c == 0)
            .map(|(&t, _)| t)
            .collect();
        vert.boundary = true;
        vert.generation += 1;
    }

    // The accumulated quadric cannot be divided between the copies;
    // rebuild each share from the cluster's current planes instead.
    for &vid in std::iter::once(&v).chain(copies.iter()) {
        let vert = view.vert_mut(vid);
        let mut q = Quadric::zero();
        for &t in &vert.incident {
            let tri = view.tri(t);
            q.add(&Quadric::from_plane(&tri.plane, tri.area));
        }
        vert.quadric = q;
    }

    // Re-key the spokes: an edge follows its triangles' copy; a spoke
    // whose two triangles landed in different clusters splits into two
    // boundary edges along the seam.
    for &e in &spokes {
        let edge = view.edge_mut(e);
        if !edge.is_live() {
            continue;
        }
        let w = edge.other(v);
        let mut owners: Vec<(TriId, VertexId)> = Vec::with_capacity(2);
        for i in 0..(edge.tri_count.min(2) as usize) {
            let t = edge.tris[i];
            if !t.is_some() || !view.tri(t).is_live() {
                continue;
            }
            let corner = *view
                .tri(t)
                .verts
                .iter()
                .find(|c| **c == v || copies.contains(c))
                .expect("spoke triangle lost its split corner");
            owners.push((t, corner));
        }
        match owners.as_slice() {
            [] => {}
            [(_, c)] | [(_, c), (_, _)] if owners.iter().all(|(_, x)| x == c) => {
                if *c != v {
                    rekey_spoke(view, e, v, *c, w);
                }
                view.edge_mut(e).boundary = view.edge(e).tri_count == 1;
            }
            [(_, c0), (t1, c1)] => {
                // Seam: the original record keeps the first triangle.
                let t1 = *t1;
                let (c0, c1) = (*c0, *c1);
                let new_edge = EdgeId(next_edge);
                next_edge += 1;
                {
                    let edge = view.edge_mut(e);
                    edge.detach_tri(t1);
                    edge.boundary = true;
                }
                if c0 != v {
                    rekey_spoke(view, e, v, c0, w);
                }
                let partition = view.tri(t1).partition;
                {
                    let fresh = view.edge_mut(new_edge);
                    *fresh = Edge::seam(c1, w, t1, partition, params.boundary_lock);
                }
                view.edge_table
                    .insert(view.edge(new_edge).key(), new_edge.0);
                let tri = view.tri_mut(t1);
                for te in tri.edges.iter_mut() {
                    if *te == e {
                        *te = new_edge;
                    }
                }
                view.vert_mut(w).boundary = true;
            }
            _ => {}
        }
    }

    affected.extend(copies);
}

/// Re-key a spoke edge from `(v, w)` to `(c, w)`.
fn rekey_spoke(view: &MeshView<'_>, e: EdgeId, v: VertexId, c: VertexId, w: VertexId) {
    view.edge_table.remove(&EdgeKey::new(v.0, w.0));
    let edge = view.edge_mut(e);
    edge.v = if c.0 < w.0 { [c, w] } else { [w, c] };
    view.edge_table.insert(EdgeKey::new(c.0, w.0), e.0);
}

/// Return an unused freshly claimed vertex slot to the retired state.
fn release_vertex(view: &MeshView<'_>, id: VertexId, redirect: VertexId) {
    let vert = view.vert_mut(id);
    vert.merged_into = redirect;
    vert.incident.clear();
    view.counters
        .live_verts
        .fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
    view.set_owner(id, NO_OWNER);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::{IndexData, VertexData};
    use crate::mesh::MeshGraph;
    use crate::operation::Operation;
    use crate::partition::assign_partitions;
    use crate::status::StatusSink;

    fn build_patch(verts: &[f64], tris: &[u32]) -> (MeshGraph, EngineParams) {
        let verts: &'static mut Vec<f64> = Box::leak(Box::new(verts.to_vec()));
        let tris: &'static mut Vec<u32> = Box::leak(Box::new(tris.to_vec()));
        let op = Operation::new(VertexData::F64(verts), 3, IndexData::U32(tris), 3);
        let mut sink = StatusSink::new(None, 0, 0);
        let mesh = crate::mesh::build(&op, &mut sink).unwrap();
        let params = EngineParams::from_operation(&op);
        (mesh, params)
    }

    #[test]
    fn test_link_condition_rejects_pinched_fan() {
        // Vertex 3 neighbors both endpoints of edge (0, 1) through
        // triangles that do not touch the edge: collapsing would pinch
        // the surface into a non-manifold fan at 3.
        let verts = [
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.5, 1.0, 0.0, //
            0.5, -1.0, 0.0, //
            -1.0, -1.0, 0.0, //
            2.0, -1.0, 0.0,
        ];
        let point = Point3::new(0.5, 0.0, 0.0);

        let pinched = [0u32, 1, 2, 0, 4, 3, 1, 3, 5];
        let (mut mesh, params) = build_patch(&verts, &pinched);
        let view = mesh.view();
        assert!(!validate(&view, &params, VertexId(0), VertexId(1), &point));

        // Without the fan through vertex 3 on the far endpoint the only
        // common neighbor is the shared opposite corner, and the same
        // collapse passes.
        let open = [0u32, 1, 2, 0, 4, 3];
        let (mut mesh, params) = build_patch(&verts, &open);
        let view = mesh.view();
        assert!(validate(&view, &params, VertexId(0), VertexId(1), &point));
    }

    #[test]
    fn test_orientation_flip_is_rejected() {
        let verts = [
            0.0, 0.0, 0.0, //
            -1.0, -1.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0,
        ];
        let tris = [0u32, 1, 2, 0, 2, 3];
        let (mut mesh, params) = build_patch(&verts, &tris);
        let view = mesh.view();

        // Dragging vertex 0 across the 2-3 line inverts triangle
        // (0, 2, 3), which survives the collapse of (0, 1).
        let flip_point = Point3::new(2.0, 2.0, 0.0);
        assert!(!validate(&view, &params, VertexId(0), VertexId(1), &flip_point));

        // The midpoint keeps it on the original side.
        let safe_point = Point3::new(-0.5, -0.5, 0.0);
        assert!(validate(&view, &params, VertexId(0), VertexId(1), &safe_point));
    }

    #[test]
    fn test_requeue_edge_dispatch() {
        let verts = [
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            1.0, 1.0, 0.0, //
            0.0, 1.0, 0.0,
        ];
        let tris = [0u32, 1, 2, 0, 2, 3];
        let (mut mesh, params) = build_patch(&verts, &tris);
        let mut parts = assign_partitions(&mut mesh, 1);
        let diagonal = EdgeId(mesh.edge_table.lookup(&EdgeKey::new(0, 2)).unwrap());
        let view = mesh.view();
        let pid = view.edge(diagonal).partition as usize;

        // No queued operation, collapsible edge: a fresh one is pushed,
        // eligible from the next step on.
        requeue_edge(&view, &params, &mut PartAccess::All(&mut parts), diagonal, 0);
        let op_id = view.edge(diagonal).op;
        assert!(op_id.is_some());
        assert_eq!(parts[pid].heap.len(), 1);
        assert_eq!(parts[pid].ops.get(op_id.0).eligible_step, 1);

        // Queued operation after the neighborhood changed: updated in
        // place under the same handle, generations refreshed.
        view.vert_mut(VertexId(0)).generation += 1;
        requeue_edge(&view, &params, &mut PartAccess::All(&mut parts), diagonal, 4);
        assert_eq!(view.edge(diagonal).op, op_id);
        assert_eq!(parts[pid].heap.len(), 1);
        let record = parts[pid].ops.get(op_id.0);
        assert_eq!(record.gen_v0, view.vert(VertexId(0)).generation);
        assert_eq!(record.eligible_step, 5);
        assert!(!record.stale);

        // The edge became non-collapsible: the operation is withdrawn
        // and the record retired.
        view.edge_mut(diagonal).locked = true;
        requeue_edge(&view, &params, &mut PartAccess::All(&mut parts), diagonal, 4);
        assert!(!view.edge(diagonal).op.is_some());
        assert_eq!(parts[pid].heap.len(), 0);
        assert_eq!(parts[pid].ops.live(), 0);

        // Still non-collapsible with nothing queued: a no-op.
        requeue_edge(&view, &params, &mut PartAccess::All(&mut parts), diagonal, 4);
        assert!(!view.edge(diagonal).op.is_some());
        assert_eq!(parts[pid].heap.len(), 0);
    }
}
