//! The configuration value describing one decimation run.

use std::f64::consts::PI;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffers::{IndexData, VertexData};
use crate::error::{DecimateError, Result};
use crate::status::StatusFn;

/// Default number of cost-ramp steps in the collapse loop.
pub const DEFAULT_SYNC_STEPS: u32 = 64;

/// Behavior switches for a decimation run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DecimateFlags {
    /// Detect near-coplanar collapses and slash their penalty, letting
    /// dense interior triangulations of flat faces collapse freely.
    pub planar_mode: bool,
    /// Split a merged vertex into one copy per normal-discontinuous
    /// triangle cluster, drawing from the reserved vertex headroom.
    pub normal_vertex_splitting: bool,
    /// Triangles wind counter-clockwise when viewed from outside. When
    /// unset the opposite convention is assumed.
    pub triangle_winding_ccw: bool,
    /// Refuse any collapse that would move a boundary vertex.
    pub boundary_lock: bool,
    /// Assert the vertex buffer is tightly packed (stride of exactly 3),
    /// allowing the bulk load path. A disagreeing stride is rejected.
    pub continuous_vertices: bool,
}

/// Counters describing a finished decimation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecimateStats {
    /// Live vertices written back, including any split copies.
    pub vertex_count: usize,
    /// Live triangles written back.
    pub triangle_count: usize,
    /// Number of accepted edge collapses.
    pub decimation_count: u64,
    /// Number of duplicate triangles retired during collapses. Nonzero
    /// values indicate non-manifold input regions; not an error.
    pub collision_count: u64,
    /// True when the run stopped early at a cooperative cancel point and
    /// the output is a valid partial result.
    pub canceled: bool,
}

/// Options for the triangle-budget search driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetOptions {
    /// Maximum number of binary-search probes.
    pub max_iterations: u32,
    /// Relative tolerance on the triangle target; the search stops once a
    /// feasible probe lands within this fraction of the budget.
    pub tolerance: f64,
    /// Optional wall-clock limit, checked between probes.
    pub time_limit: Option<Duration>,
}

impl Default for BudgetOptions {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            tolerance: 0.05,
            time_limit: None,
        }
    }
}

/// Outcome of a triangle-budget search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BudgetReport {
    /// Triangle count of the returned mesh.
    pub final_triangle_count: usize,
    /// Feature size of the probe that produced the returned mesh.
    pub final_feature_size: f64,
    /// Number of probes run.
    pub iteration_count: u32,
    /// False when no probe reached the budget; the returned mesh is then
    /// the smallest achievable one.
    pub budget_met: bool,
    /// Counters of the accepted run.
    #[serde(skip)]
    pub stats: DecimateStats,
}

/// The configuration and buffer set for one decimation.
///
/// Borrowed input buffers double as output: pack writes the simplified
/// mesh back in place, honoring the configured formats and strides.
pub struct Operation<'a> {
    /// Vertex positions, read at build and overwritten at pack.
    pub vertices: VertexData<'a>,
    /// Scalars per vertex (at least 3; x, y, z first).
    pub vertex_stride: usize,
    /// Number of input vertices.
    pub vertex_count: usize,
    /// Triangle corner indices, read at build and overwritten at pack.
    pub indices: IndexData<'a>,
    /// Index entries per triangle (at least 3; corners first).
    pub index_stride: usize,
    /// Number of input triangles.
    pub triangle_count: usize,
    /// Upper bound on total vertices including split copies. The vertex
    /// buffer must be sized for this bound when splitting is enabled.
    pub vertex_alloc: usize,
    /// Stop once the live vertex count drops to this value; 0 disables
    /// the target and the run stops at the feature-size wall instead.
    pub target_vertex_count_max: usize,
    /// Number of cost-ramp steps in the collapse loop.
    pub sync_step_count: u32,
    /// Behavior switches.
    pub flags: DecimateFlags,
    /// Penalty weight for sliver-shaped post-collapse triangles.
    pub compactness_weight: f64,
    /// Penalty multiplier for collapses moving boundary or ridge
    /// vertices; 1 leaves them priced like the interior.
    pub boundary_weight: f64,
    /// Dihedral angle (radians) above which an interior edge counts as a
    /// feature ridge; also the clustering angle for vertex splitting.
    pub ridge_angle: f64,
    /// Unit-normal deviation below which a collapse counts as coplanar in
    /// planar mode.
    pub planar_threshold: f64,
    /// Minimum dot product between a triangle's pre- and post-collapse
    /// unit normals; collapses folding any triangle past this are refused.
    pub min_normal_dot: f64,
    /// Optional buffer receiving recomputed per-vertex normals at pack.
    pub normals_out: Option<VertexData<'a>>,
    /// Scalars per normal in `normals_out`.
    pub normal_stride: usize,
    /// Optional progress callback.
    pub status: Option<StatusFn<'a>>,
    /// Extra mid-decimation reports every time this many triangles have
    /// been retired; 0 reports stage boundaries only.
    pub status_interval_triangles: usize,
    /// Cooperative cancel flag, observed at step barriers.
    pub cancel: Option<Arc<AtomicBool>>,

    feature_size: f64,
    max_collapse_cost: f64,
}

impl<'a> Operation<'a> {
    /// Create an operation over caller buffers with default settings.
    ///
    /// Vertex and triangle counts are derived from the buffer lengths and
    /// strides; adjust the public fields afterwards for partial buffers.
    pub fn new(
        vertices: VertexData<'a>,
        vertex_stride: usize,
        indices: IndexData<'a>,
        index_stride: usize,
    ) -> Self {
        let vertex_count = if vertex_stride == 0 {
            0
        } else {
            vertices.scalar_len() / vertex_stride
        };
        let triangle_count = if index_stride == 0 {
            0
        } else {
            indices.index_len() / index_stride
        };
        let mut op = Self {
            vertices,
            vertex_stride,
            vertex_count,
            indices,
            index_stride,
            triangle_count,
            vertex_alloc: vertex_count,
            target_vertex_count_max: 0,
            sync_step_count: DEFAULT_SYNC_STEPS,
            flags: DecimateFlags::default(),
            compactness_weight: 1.0,
            boundary_weight: 1.0,
            ridge_angle: PI / 4.0,
            planar_threshold: 1e-3,
            min_normal_dot: 0.0,
            normals_out: None,
            normal_stride: 3,
            status: None,
            status_interval_triangles: 0,
            cancel: None,
            feature_size: 0.0,
            max_collapse_cost: 0.0,
        };
        op.set_feature_size(1.0);
        op
    }

    /// Set the feature size, the length scale controlling how aggressively
    /// collapses are accepted. Larger means more reduction.
    pub fn set_feature_size(&mut self, feature_size: f64) {
        self.feature_size = feature_size;
        self.max_collapse_cost = (0.25 * feature_size).powi(6);
    }

    /// Current feature size.
    pub fn feature_size(&self) -> f64 {
        self.feature_size
    }

    /// Cost ceiling derived from the feature size.
    pub fn max_collapse_cost(&self) -> f64 {
        self.max_collapse_cost
    }

    /// Check buffer/flag consistency. Called by the entry points before
    /// any mutation; a failing operation leaves the input untouched.
    pub fn validate(&self) -> Result<()> {
        if self.vertex_count == 0 || self.triangle_count == 0 {
            return Err(DecimateError::EmptyMesh);
        }
        if self.vertex_stride < 3 {
            return Err(DecimateError::InvalidConfiguration(format!(
                "vertex stride {} is below 3",
                self.vertex_stride
            )));
        }
        if self.index_stride < 3 {
            return Err(DecimateError::InvalidConfiguration(format!(
                "index stride {} is below 3",
                self.index_stride
            )));
        }
        if self.flags.continuous_vertices && self.vertex_stride != 3 {
            return Err(DecimateError::InvalidConfiguration(format!(
                "continuous-vertices flag requires a packed stride of 3, got {}",
                self.vertex_stride
            )));
        }
        if self.vertex_alloc < self.vertex_count {
            return Err(DecimateError::InvalidConfiguration(format!(
                "vertex allocation bound {} is below the input vertex count {}",
                self.vertex_alloc, self.vertex_count
            )));
        }
        let writeback_vertices = if self.flags.normal_vertex_splitting {
            self.vertex_alloc
        } else {
            self.vertex_count
        };
        if self.vertices.scalar_len() < writeback_vertices * self.vertex_stride {
            return Err(DecimateError::InvalidConfiguration(format!(
                "vertex buffer holds {} scalars but {} are required",
                self.vertices.scalar_len(),
                writeback_vertices * self.vertex_stride
            )));
        }
        if self.indices.index_len() < self.triangle_count * self.index_stride {
            return Err(DecimateError::InvalidConfiguration(format!(
                "index buffer holds {} entries but {} are required",
                self.indices.index_len(),
                self.triangle_count * self.index_stride
            )));
        }
        if matches!(self.indices, IndexData::I32(_)) && self.vertex_alloc > i32::MAX as usize {
            return Err(DecimateError::InvalidConfiguration(format!(
                "vertex allocation bound {} does not fit signed 32-bit indices",
                self.vertex_alloc
            )));
        }
        if let Some(normals) = &self.normals_out {
            if self.normal_stride < 3 {
                return Err(DecimateError::InvalidConfiguration(format!(
                    "normal stride {} is below 3",
                    self.normal_stride
                )));
            }
            if normals.scalar_len() < writeback_vertices * self.normal_stride {
                return Err(DecimateError::InvalidConfiguration(format!(
                    "normal buffer holds {} scalars but {} are required",
                    normals.scalar_len(),
                    writeback_vertices * self.normal_stride
                )));
            }
        }
        if !(self.feature_size >= 0.0) {
            return Err(DecimateError::InvalidConfiguration(format!(
                "feature size {} is not a non-negative number",
                self.feature_size
            )));
        }
        if self.sync_step_count == 0 {
            return Err(DecimateError::InvalidConfiguration(
                "sync step count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
