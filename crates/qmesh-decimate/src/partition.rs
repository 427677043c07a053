//! Spatial partitioning of the triangle set and the per-partition state
//! the collapse loop works with.
//!
//! Triangles are recursively bisected along the longest axis of their
//! centroid bounds into a few leaves per worker, so almost every collapse
//! stays inside one partition and cross-partition work is rare.

use qmesh_math::{Aabb, Point3};

use crate::heap::{CollapseOp, CostHeap};
use crate::mesh::{MeshGraph, NO_OWNER};
use crate::pool::{OpId, Pool, TriId};

/// Leaves carved out per worker thread. A few per worker keeps the leaf
/// diameter small enough that cross-partition edges stay rare without
/// fragmenting the heaps.
pub(crate) const PARTITIONS_PER_WORKER: usize = 4;

/// Mutable per-partition state: the priority queue, its operation pool,
/// and the cross-partition operations parked for the barrier.
#[derive(Debug)]
pub(crate) struct PartitionState {
    pub id: u32,
    pub heap: CostHeap,
    pub ops: Pool<CollapseOp>,
    pub deferred: Vec<OpId>,
}

impl PartitionState {
    fn new(id: u32, expected_edges: usize) -> Self {
        Self {
            id,
            heap: CostHeap::with_capacity(expected_edges),
            ops: Pool::with_capacity(expected_edges),
            deferred: Vec::new(),
        }
    }
}

/// Access to partition state from a collapse: a worker only ever holds its
/// own partition, while the coordinator at the barrier holds all of them.
pub(crate) enum PartAccess<'s> {
    Own(&'s mut PartitionState),
    All(&'s mut [PartitionState]),
}

impl<'s> PartAccess<'s> {
    pub(crate) fn get(&mut self, partition: u32) -> &mut PartitionState {
        match self {
            PartAccess::Own(part) => {
                debug_assert_eq!(part.id, partition, "worker touched a foreign partition");
                part
            }
            PartAccess::All(parts) => &mut parts[partition as usize],
        }
    }
}

/// Bisect the live triangles into `worker_count * PARTITIONS_PER_WORKER`
/// leaves, pin every edge to the partition of its first owning triangle,
/// and seed the per-vertex owner table. Returns the partition states.
pub(crate) fn assign_partitions(mesh: &mut MeshGraph, worker_count: usize) -> Vec<PartitionState> {
    let leaf_count = worker_count.max(1) * PARTITIONS_PER_WORKER;

    let mut items: Vec<(TriId, Point3)> = mesh
        .tris
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_live())
        .map(|(i, t)| {
            let centroid = Point3::from(
                (mesh.verts[t.verts[0].index()].position.coords
                    + mesh.verts[t.verts[1].index()].position.coords
                    + mesh.verts[t.verts[2].index()].position.coords)
                    / 3.0,
            );
            (TriId(i as u32), centroid)
        })
        .collect();

    bisect(&mut items, leaf_count, 0, &mut mesh.tris);

    for edge in mesh.edges.iter_mut().filter(|e| e.is_live()) {
        edge.partition = mesh.tris[edge.tris[0].index()].partition;
    }

    for (v, owner) in mesh.vert_owner.iter().enumerate() {
        let vert = &mesh.verts[v];
        let mut value = NO_OWNER;
        if vert.is_live() {
            for (i, &t) in vert.incident.iter().enumerate() {
                let p = mesh.tris[t.index()].partition;
                if i == 0 {
                    value = p;
                } else if p != value {
                    value = NO_OWNER;
                    break;
                }
            }
        }
        owner.store(value, std::sync::atomic::Ordering::Relaxed);
    }

    let expected = mesh.edges.len() / leaf_count + 1;
    (0..leaf_count as u32)
        .map(|id| PartitionState::new(id, expected))
        .collect()
}

/// Recursively split `items` into `leaves` groups of roughly equal size
/// along the longest axis of the current centroid bounds.
fn bisect(
    items: &mut [(TriId, Point3)],
    leaves: usize,
    first_leaf: u32,
    tris: &mut [crate::mesh::Triangle],
) {
    if leaves <= 1 || items.len() <= 1 {
        for (id, _) in items.iter() {
            tris[id.index()].partition = first_leaf;
        }
        return;
    }

    let mut bounds = Aabb::empty();
    for (_, c) in items.iter() {
        bounds.expand(c);
    }
    let axis = bounds.longest_axis();

    let left_leaves = leaves / 2;
    let split = items.len() * left_leaves / leaves;
    // Strict total order (coordinate, then handle) makes the two sides
    // deterministic even for coincident centroids.
    items.select_nth_unstable_by(split.min(items.len() - 1), |a, b| {
        a.1[axis]
            .partial_cmp(&b.1[axis])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    let (left, right) = items.split_at_mut(split);
    bisect(left, left_leaves, first_leaf, tris);
    bisect(right, leaves - left_leaves, first_leaf + left_leaves as u32, tris);
}
