//! The internal mesh graph: vertex/triangle/edge arenas, incidence, and
//! the build and pack passes at either end of the pipeline.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use qmesh_math::{triangle_area, Plane, Point3, Quadric, Vec3};
use rayon::prelude::*;

use crate::buffers::VertexData;
use crate::error::{DecimateError, Result};
use crate::hash::{ConcurrentTable, EdgeKey, TriKey};
use crate::operation::{DecimateStats, Operation};
use crate::pool::{EdgeId, SharedSlice, TriId, VertexId};
use crate::status::{Stage, StatusSink};

/// A mesh vertex with its accumulated quadric and incidence.
#[derive(Debug, Clone)]
pub(crate) struct Vertex {
    pub position: Point3,
    pub quadric: Quadric,
    /// Live incident triangles, unordered.
    pub incident: Vec<TriId>,
    /// Redirect handle; set when this vertex was merged away.
    pub merged_into: VertexId,
    /// On a boundary edge or feature ridge.
    pub boundary: bool,
    /// Recomputed output normal, filled during cleanup.
    pub normal: Vec3,
    /// Bumped on every mutation; queued operations pin the generation of
    /// both endpoints so stale work is detectable after the fact.
    pub generation: u32,
}

impl Vertex {
    fn at(position: Point3) -> Self {
        Self {
            position,
            quadric: Quadric::zero(),
            incident: Vec::new(),
            merged_into: VertexId::NONE,
            boundary: false,
            normal: Vec3::zeros(),
            generation: 0,
        }
    }

    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        !self.merged_into.is_some()
    }
}

/// A mesh triangle; retired triangles keep their slot with a sentinel
/// first corner.
#[derive(Debug, Clone)]
pub(crate) struct Triangle {
    pub verts: [VertexId; 3],
    pub edges: [EdgeId; 3],
    /// Supporting plane, oriented by the configured winding.
    pub plane: Plane,
    pub area: f64,
    /// Owning spatial partition.
    pub partition: u32,
    pub generation: u32,
}

impl Triangle {
    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        self.verts[0].is_some()
    }

    /// Corners other than `v`; callers guarantee `v` is a corner.
    pub(crate) fn opposite_corners(&self, v: VertexId) -> [VertexId; 2] {
        if self.verts[0] == v {
            [self.verts[1], self.verts[2]]
        } else if self.verts[1] == v {
            [self.verts[2], self.verts[0]]
        } else {
            [self.verts[0], self.verts[1]]
        }
    }

    pub(crate) fn contains(&self, v: VertexId) -> bool {
        self.verts[0] == v || self.verts[1] == v || self.verts[2] == v
    }

    fn retired() -> Self {
        Self {
            verts: [VertexId::NONE; 3],
            edges: [EdgeId::NONE; 3],
            plane: Plane {
                normal: Vec3::zeros(),
                d: 0.0,
            },
            area: 0.0,
            partition: 0,
            generation: 0,
        }
    }
}

/// A mesh edge with its canonical endpoint pair and owning triangles.
#[derive(Debug, Clone)]
pub(crate) struct Edge {
    /// Endpoints, canonical: `v[0] < v[1]`.
    pub v: [VertexId; 2],
    /// Owning triangles; one for boundary, two for interior. Higher
    /// incidence marks the edge non-manifold and only the first two are
    /// tracked.
    pub tris: [TriId; 2],
    pub tri_count: u32,
    /// Partition the edge is pinned to (that of an incident triangle).
    pub partition: u32,
    /// Queued operation in the pinned partition's pool, if any.
    pub op: crate::pool::OpId,
    pub boundary: bool,
    pub ridge: bool,
    pub locked: bool,
    pub nonmanifold: bool,
}

impl Edge {
    fn between(a: VertexId, b: VertexId) -> Self {
        let v = if a.0 < b.0 { [a, b] } else { [b, a] };
        Self {
            v,
            tris: [TriId::NONE; 2],
            tri_count: 0,
            partition: 0,
            op: crate::pool::OpId::NONE,
            boundary: false,
            ridge: false,
            locked: false,
            nonmanifold: false,
        }
    }

    /// An inert slot: not live, no owners, no key.
    pub(crate) fn retired_slot() -> Self {
        let mut e = Self::between(VertexId(0), VertexId(1));
        e.v = [VertexId::NONE; 2];
        e
    }

    /// A single-sided seam edge created by vertex splitting.
    pub(crate) fn seam(a: VertexId, b: VertexId, tri: TriId, partition: u32, locked: bool) -> Self {
        let mut e = Self::between(a, b);
        e.tris[0] = tri;
        e.tri_count = 1;
        e.partition = partition;
        e.boundary = true;
        e.locked = locked;
        e
    }

    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        self.v[0].is_some()
    }

    pub(crate) fn key(&self) -> EdgeKey {
        EdgeKey::new(self.v[0].0, self.v[1].0)
    }

    /// The endpoint that is not `v`; callers guarantee `v` is an endpoint.
    pub(crate) fn other(&self, v: VertexId) -> VertexId {
        if self.v[0] == v {
            self.v[1]
        } else {
            self.v[0]
        }
    }

    pub(crate) fn attach_tri(&mut self, tri: TriId) {
        if (self.tri_count as usize) < 2 {
            self.tris[self.tri_count as usize] = tri;
        } else {
            self.nonmanifold = true;
        }
        self.tri_count += 1;
    }

    pub(crate) fn detach_tri(&mut self, tri: TriId) {
        if self.tris[0] == tri {
            self.tris[0] = self.tris[1];
            self.tris[1] = TriId::NONE;
        } else if self.tris[1] == tri {
            self.tris[1] = TriId::NONE;
        }
        self.tri_count = self.tri_count.saturating_sub(1);
    }
}

/// Shared atomic counters for the parallel phase.
#[derive(Debug)]
pub(crate) struct Counters {
    pub live_verts: AtomicU32,
    pub live_tris: AtomicU32,
    vert_cursor: AtomicU32,
    vert_cap: u32,
    edge_cursor: AtomicU32,
    edge_cap: u32,
    pub decimations: AtomicU64,
    pub collisions: AtomicU64,
}

impl Counters {
    /// Claim a fresh vertex slot from the reserved headroom, if any is
    /// left.
    pub(crate) fn alloc_vertex(&self) -> Option<VertexId> {
        let slot = self.vert_cursor.fetch_add(1, Ordering::Relaxed);
        if slot >= self.vert_cap {
            self.vert_cursor.fetch_sub(1, Ordering::Relaxed);
            return None;
        }
        self.live_verts.fetch_add(1, Ordering::Relaxed);
        Some(VertexId(slot))
    }

    /// Claim a contiguous range of `n` fresh edge slots from the reserved
    /// headroom. All-or-nothing, so a vertex split can never run dry
    /// halfway through rewiring a seam.
    pub(crate) fn reserve_edges(&self, n: u32) -> Option<u32> {
        let base = self.edge_cursor.fetch_add(n, Ordering::Relaxed);
        if base + n > self.edge_cap {
            self.edge_cursor.fetch_sub(n, Ordering::Relaxed);
            return None;
        }
        Some(base)
    }

    pub(crate) fn vert_count(&self) -> u32 {
        self.vert_cursor.load(Ordering::Relaxed)
    }
}

/// Owner sentinel for vertices touching several partitions (or none);
/// operations near them are deferred to the barrier.
pub(crate) const NO_OWNER: u32 = u32::MAX;

/// The fully built mesh graph.
pub(crate) struct MeshGraph {
    pub verts: Vec<Vertex>,
    pub tris: Vec<Triangle>,
    pub edges: Vec<Edge>,
    /// Partition owning each vertex, or [`NO_OWNER`] when its triangles
    /// straddle partitions. Atomic so the locality test may read owners
    /// of vertices another worker holds.
    pub vert_owner: Vec<AtomicU32>,
    pub edge_table: ConcurrentTable<EdgeKey, u32>,
    pub tri_table: ConcurrentTable<TriKey, u32>,
    pub counters: Counters,
    pub winding_ccw: bool,
}

/// Shared accessor handed to partition workers and the coordinator.
///
/// See [`SharedSlice`] for the ownership contract that makes concurrent
/// `_mut` access sound.
#[derive(Clone, Copy)]
pub(crate) struct MeshView<'a> {
    verts: SharedSlice<'a, Vertex>,
    tris: SharedSlice<'a, Triangle>,
    edges: SharedSlice<'a, Edge>,
    owners: &'a [AtomicU32],
    pub edge_table: &'a ConcurrentTable<EdgeKey, u32>,
    pub tri_table: &'a ConcurrentTable<TriKey, u32>,
    pub counters: &'a Counters,
    pub winding_ccw: bool,
}

impl MeshGraph {
    /// Create the shared view used by a syncstep pass.
    pub(crate) fn view(&mut self) -> MeshView<'_> {
        let winding_ccw = self.winding_ccw;
        // SAFETY: the view is handed to partition workers that only touch
        // entities inside partitions they own; everything else waits for
        // the barrier, where the coordinator holds the sole view.
        unsafe {
            MeshView {
                verts: SharedSlice::new(&mut self.verts),
                tris: SharedSlice::new(&mut self.tris),
                edges: SharedSlice::new(&mut self.edges),
                owners: &self.vert_owner,
                edge_table: &self.edge_table,
                tri_table: &self.tri_table,
                counters: &self.counters,
                winding_ccw,
            }
        }
    }

    pub(crate) fn live_triangle_count(&self) -> usize {
        self.counters.live_tris.load(Ordering::Relaxed) as usize
    }

    pub(crate) fn live_vertex_count(&self) -> usize {
        self.counters.live_verts.load(Ordering::Relaxed) as usize
    }
}

impl<'a> MeshView<'a> {
    #[inline]
    pub(crate) fn vert(&self, id: VertexId) -> &'a Vertex {
        self.verts.get(id.0)
    }

    #[inline]
    pub(crate) fn vert_mut(&self, id: VertexId) -> &'a mut Vertex {
        self.verts.get_mut(id.0)
    }

    #[inline]
    pub(crate) fn tri(&self, id: TriId) -> &'a Triangle {
        self.tris.get(id.0)
    }

    #[inline]
    pub(crate) fn tri_mut(&self, id: TriId) -> &'a mut Triangle {
        self.tris.get_mut(id.0)
    }

    #[inline]
    pub(crate) fn edge(&self, id: EdgeId) -> &'a Edge {
        self.edges.get(id.0)
    }

    #[inline]
    pub(crate) fn edge_mut(&self, id: EdgeId) -> &'a mut Edge {
        self.edges.get_mut(id.0)
    }

    /// Partition owning `v`, or [`NO_OWNER`].
    #[inline]
    pub(crate) fn owner(&self, v: VertexId) -> u32 {
        self.owners[v.index()].load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_owner(&self, v: VertexId, partition: u32) {
        self.owners[v.index()].store(partition, Ordering::Relaxed);
    }

    /// Recompute `v`'s owner from its current incidence.
    pub(crate) fn refresh_owner(&self, v: VertexId) {
        let vert = self.vert(v);
        let mut owner = NO_OWNER;
        for (i, &t) in vert.incident.iter().enumerate() {
            let p = self.tri(t).partition;
            if i == 0 {
                owner = p;
            } else if p != owner {
                owner = NO_OWNER;
                break;
            }
        }
        self.set_owner(v, owner);
    }

    /// Plane of the corner triple, oriented by the configured winding.
    pub(crate) fn oriented_plane(&self, a: &Point3, b: &Point3, c: &Point3) -> Option<Plane> {
        let plane = Plane::from_triangle(a, b, c)?;
        if self.winding_ccw {
            Some(plane)
        } else {
            Some(Plane {
                normal: -plane.normal,
                d: -plane.d,
            })
        }
    }

    /// Retire a triangle: detach it from its edges and vertices and drop
    /// its hash entry. Edges left with no owner are retired with it.
    pub(crate) fn retire_triangle(&self, id: TriId) {
        let tri = self.tri_mut(id);
        if !tri.is_live() {
            return;
        }
        let verts = tri.verts;
        let edges = tri.edges;
        // Only drop the hash entry if it is ours; a duplicate produced by
        // a collapse shares its key with the surviving triangle.
        let key = TriKey::new([verts[0].0, verts[1].0, verts[2].0]);
        if self.tri_table.lookup(&key) == Some(id.0) {
            self.tri_table.remove(&key);
        }
        for v in verts {
            let vert = self.vert_mut(v);
            if let Some(pos) = vert.incident.iter().position(|&t| t == id) {
                vert.incident.swap_remove(pos);
            }
        }
        for e in edges {
            if e.is_some() {
                let edge = self.edge_mut(e);
                edge.detach_tri(id);
                if edge.tri_count == 0 {
                    self.retire_edge(e);
                }
            }
        }
        *tri = Triangle::retired();
        self.counters.live_tris.fetch_sub(1, Ordering::Relaxed);
    }

    /// Retire an edge and drop its hash entry. The queued operation, if
    /// any, is left for the owner's heap to discard as stale.
    pub(crate) fn retire_edge(&self, id: EdgeId) {
        let edge = self.edge_mut(id);
        if !edge.is_live() {
            return;
        }
        self.edge_table.remove(&edge.key());
        *edge = Edge::retired_slot();
    }
}

/// Extra edge slots reserved per vertex of split headroom.
const SPLIT_EDGE_HEADROOM: usize = 4;

/// Build the mesh graph from the operation's buffers.
///
/// Degenerate input triangles (repeated corners or zero area) and exact
/// duplicates are dropped with a warning rather than failing the run.
pub(crate) fn build(op: &Operation<'_>, sink: &mut StatusSink<'_, '_>) -> Result<MeshGraph> {
    sink.report(Stage::BuildMesh, 0.0, op.triangle_count);
    let vertex_count = op.vertex_count;
    let winding_ccw = op.flags.triangle_winding_ccw;

    let mut verts = read_vertices(&op.vertices, vertex_count, op.vertex_stride, op.vertex_alloc);

    let mut tris: Vec<Triangle> = Vec::with_capacity(op.triangle_count);
    let tri_table: ConcurrentTable<TriKey, u32> =
        ConcurrentTable::with_capacity(op.triangle_count, 64);
    let mut collisions = 0u64;
    let mut dropped = 0usize;

    for t in 0..op.triangle_count {
        let base = t * op.index_stride;
        let mut corners = [VertexId::NONE; 3];
        for (k, corner) in corners.iter_mut().enumerate() {
            let raw = op.indices.read_raw(base + k);
            if raw < 0 || raw as usize >= vertex_count {
                return Err(DecimateError::IndexOutOfRange {
                    triangle: t,
                    index: raw,
                    count: vertex_count,
                });
            }
            *corner = VertexId(raw as u32);
        }
        if corners[0] == corners[1] || corners[1] == corners[2] || corners[2] == corners[0] {
            dropped += 1;
            continue;
        }
        let [a, b, c] = corners.map(|v| verts[v.index()].position);
        let plane = match Plane::from_triangle(&a, &b, &c) {
            Some(p) if winding_ccw => p,
            Some(p) => Plane {
                normal: -p.normal,
                d: -p.d,
            },
            None => {
                dropped += 1;
                continue;
            }
        };
        let id = TriId(tris.len() as u32);
        if tri_table
            .insert(TriKey::new(corners.map(|v| v.0)), id.0)
            .is_some()
        {
            collisions += 1;
            dropped += 1;
            continue;
        }
        for v in corners {
            verts[v.index()].incident.push(id);
        }
        tris.push(Triangle {
            verts: corners,
            edges: [EdgeId::NONE; 3],
            plane,
            area: triangle_area(&a, &b, &c),
            partition: 0,
            generation: 0,
        });
    }
    if dropped > 0 {
        log::warn!("dropped {dropped} degenerate or duplicate input triangles");
    }
    if tris.is_empty() {
        return Err(DecimateError::EmptyMesh);
    }

    let owner_slots = verts.len();
    let mut mesh = MeshGraph {
        verts,
        tris,
        edges: Vec::new(),
        vert_owner: (0..owner_slots).map(|_| AtomicU32::new(NO_OWNER)).collect(),
        edge_table: ConcurrentTable::with_capacity(op.triangle_count * 3 / 2, 64),
        tri_table,
        counters: Counters {
            live_verts: AtomicU32::new(vertex_count as u32),
            live_tris: AtomicU32::new(0),
            vert_cursor: AtomicU32::new(vertex_count as u32),
            vert_cap: op.vertex_alloc as u32,
            edge_cursor: AtomicU32::new(0),
            edge_cap: 0,
            decimations: AtomicU64::new(0),
            collisions: AtomicU64::new(collisions),
        },
        winding_ccw,
    };
    mesh.counters
        .live_tris
        .store(mesh.tris.len() as u32, Ordering::Relaxed);

    sink.report(Stage::BuildEdges, 0.0, mesh.live_triangle_count());
    build_edges(&mut mesh, op)?;
    accumulate_quadrics(&mut mesh);
    Ok(mesh)
}

fn read_vertices(
    data: &VertexData<'_>,
    count: usize,
    stride: usize,
    alloc: usize,
) -> Vec<Vertex> {
    let mut verts = Vec::with_capacity(alloc.max(count));
    if stride == 3 {
        // Packed layout: walk the buffer directly.
        match data {
            VertexData::F32(s) => {
                verts.extend(s[..count * 3].chunks_exact(3).map(|c| {
                    Vertex::at(Point3::new(c[0] as f64, c[1] as f64, c[2] as f64))
                }));
            }
            VertexData::F64(s) => {
                verts.extend(
                    s[..count * 3]
                        .chunks_exact(3)
                        .map(|c| Vertex::at(Point3::new(c[0], c[1], c[2]))),
                );
            }
        }
    } else {
        verts.extend((0..count).map(|i| Vertex::at(data.read_point(i, stride))));
    }
    // Reserved headroom for split copies; slots past the cursor are inert
    // until claimed.
    verts.resize(alloc.max(count), Vertex::at(Point3::origin()));
    verts
}

fn build_edges(mesh: &mut MeshGraph, op: &Operation<'_>) -> Result<()> {
    for t in 0..mesh.tris.len() {
        let id = TriId(t as u32);
        if !mesh.tris[t].is_live() {
            continue;
        }
        for j in 0..3 {
            let a = mesh.tris[t].verts[j];
            let b = mesh.tris[t].verts[(j + 1) % 3];
            let key = EdgeKey::new(a.0, b.0);
            let edges = &mut mesh.edges;
            let (slot, _) = mesh.edge_table.find_or_insert(key, || {
                let slot = edges.len() as u32;
                edges.push(Edge::between(a, b));
                slot
            });
            mesh.edges[slot as usize].attach_tri(id);
            mesh.tris[t].edges[j] = EdgeId(slot);
        }
    }

    // Classify boundaries, feature ridges, and non-manifold fans.
    let ridge_cos = op.ridge_angle.cos();
    let mut nonmanifold = 0usize;
    for e in 0..mesh.edges.len() {
        let (flag_verts, tri_pair) = {
            let edge = &mut mesh.edges[e];
            match edge.tri_count {
                1 => {
                    edge.boundary = true;
                    edge.locked = op.flags.boundary_lock;
                    (true, None)
                }
                2 => (false, Some((edge.tris[0], edge.tris[1]))),
                _ => {
                    edge.nonmanifold = true;
                    nonmanifold += 1;
                    (true, None)
                }
            }
        };
        let mut mark = flag_verts;
        if let Some((t0, t1)) = tri_pair {
            let dot = mesh.tris[t0.index()]
                .plane
                .normal
                .dot(&mesh.tris[t1.index()].plane.normal);
            if dot < ridge_cos {
                mesh.edges[e].ridge = true;
                mark = true;
            }
        }
        if mark {
            let [a, b] = mesh.edges[e].v;
            mesh.verts[a.index()].boundary = true;
            mesh.verts[b.index()].boundary = true;
        }
    }
    if nonmanifold > 0 {
        log::warn!("{nonmanifold} non-manifold edges; their collapses are disabled");
    }

    // Headroom for boundary edges created by vertex splitting.
    let headroom = if op.flags.normal_vertex_splitting {
        (op.vertex_alloc - op.vertex_count) * SPLIT_EDGE_HEADROOM
    } else {
        0
    };
    let built = mesh.edges.len();
    mesh.edges.resize(built + headroom, Edge::retired_slot());
    mesh.counters.edge_cursor = AtomicU32::new(built as u32);
    mesh.counters.edge_cap = (built + headroom) as u32;
    Ok(())
}

fn accumulate_quadrics(mesh: &mut MeshGraph) {
    let tris = &mesh.tris;
    mesh.verts[..mesh.counters.vert_count() as usize]
        .par_iter_mut()
        .for_each(|vert| {
            for &tid in &vert.incident {
                let tri = &tris[tid.index()];
                vert.quadric
                    .add(&Quadric::from_plane(&tri.plane, tri.area));
            }
        });
}

/// Compute output vertex normals: area-weighted average of incident
/// triangle planes.
pub(crate) fn recompute_vertex_normals(mesh: &mut MeshGraph) {
    let tris = &mesh.tris;
    mesh.verts[..mesh.counters.vert_count() as usize]
        .par_iter_mut()
        .for_each(|vert| {
            if !vert.is_live() {
                return;
            }
            let mut n = Vec3::zeros();
            for &tid in &vert.incident {
                let tri = &tris[tid.index()];
                n += tri.plane.normal * tri.area;
            }
            let len = n.norm();
            vert.normal = if len > f64::MIN_POSITIVE { n / len } else { n };
        });
}

/// Write the live mesh back into the caller's buffers and produce the run
/// counters. Consumes the graph.
pub(crate) fn pack(mesh: MeshGraph, op: &mut Operation<'_>, canceled: bool) -> DecimateStats {
    let vert_count = mesh.counters.vert_count() as usize;
    let mut remap: Vec<u32> = vec![u32::MAX; vert_count];
    let mut next = 0u32;
    for (i, vert) in mesh.verts[..vert_count].iter().enumerate() {
        if vert.is_live() {
            remap[i] = next;
            op.vertices
                .write_point(next as usize, op.vertex_stride, &vert.position);
            if let Some(normals) = op.normals_out.as_mut() {
                normals.write_vec(next as usize, op.normal_stride, &vert.normal);
            }
            next += 1;
        }
    }

    let mut tri_out = 0usize;
    for tri in &mesh.tris {
        if !tri.is_live() {
            continue;
        }
        let base = tri_out * op.index_stride;
        for (k, v) in tri.verts.iter().enumerate() {
            debug_assert!(remap[v.index()] != u32::MAX);
            op.indices.write(base + k, remap[v.index()]);
        }
        tri_out += 1;
    }

    op.vertex_count = next as usize;
    op.triangle_count = tri_out;

    DecimateStats {
        vertex_count: next as usize,
        triangle_count: tri_out,
        decimation_count: mesh.counters.decimations.load(Ordering::Relaxed),
        collision_count: mesh.counters.collisions.load(Ordering::Relaxed),
        canceled,
    }
}
