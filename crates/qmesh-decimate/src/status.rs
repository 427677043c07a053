//! Progress reporting for long-running decimations.

use serde::{Deserialize, Serialize};

/// Pipeline stage reported through the status callback.
///
/// Stages are reported in order; progress is monotone within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    /// Configuration validation.
    Init = 0,
    /// Vertex and triangle arenas are being populated.
    BuildMesh = 1,
    /// Edge and triangle hash tables are being built.
    BuildEdges = 2,
    /// Per-partition priority queues are being seeded.
    BuildQueues = 3,
    /// The collapse loop is running.
    Decimate = 4,
    /// Retired entities are being dropped.
    Cleanup = 5,
    /// Results are being written back to the caller's buffers.
    Pack = 6,
    /// The run finished.
    Done = 7,
}

impl Stage {
    /// Human-readable stage name.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::BuildMesh => "build-mesh",
            Stage::BuildEdges => "build-edges",
            Stage::BuildQueues => "build-queues",
            Stage::Decimate => "decimate",
            Stage::Cleanup => "cleanup",
            Stage::Pack => "pack",
            Stage::Done => "done",
        }
    }
}

/// A single progress notification.
#[derive(Debug, Clone, Copy)]
pub struct StatusReport {
    /// Current pipeline stage.
    pub stage: Stage,
    /// Human-readable name of the stage.
    pub stage_name: &'static str,
    /// Progress within the stage, in `[0, 1]`, monotone per stage.
    pub progress: f64,
    /// Number of live triangles at the time of the report.
    pub triangle_count: usize,
}

/// Caller-registered progress callback.
pub type StatusFn<'a> = Box<dyn FnMut(&StatusReport) + Send + 'a>;

/// Throttled status dispatch: stage transitions always fire; inside the
/// decimation stage, reports also fire whenever the live triangle count has
/// dropped by at least `interval_triangles` since the last report.
pub(crate) struct StatusSink<'a, 'b> {
    callback: Option<&'b mut StatusFn<'a>>,
    interval_triangles: usize,
    last_reported_count: usize,
}

impl<'a, 'b> StatusSink<'a, 'b> {
    pub(crate) fn new(
        callback: Option<&'b mut StatusFn<'a>>,
        interval_triangles: usize,
        initial_count: usize,
    ) -> Self {
        Self {
            callback,
            interval_triangles,
            last_reported_count: initial_count,
        }
    }

    /// Report a stage boundary or explicit progress point.
    pub(crate) fn report(&mut self, stage: Stage, progress: f64, triangle_count: usize) {
        self.last_reported_count = triangle_count;
        if let Some(cb) = self.callback.as_mut() {
            cb(&StatusReport {
                stage,
                stage_name: stage.name(),
                progress: progress.clamp(0.0, 1.0),
                triangle_count,
            });
        }
    }

    /// Report mid-decimation progress if the triangle interval elapsed.
    pub(crate) fn report_interval(&mut self, progress: f64, triangle_count: usize) {
        if self.callback.is_none() || self.interval_triangles == 0 {
            return;
        }
        if self.last_reported_count.saturating_sub(triangle_count) >= self.interval_triangles {
            self.report(Stage::Decimate, progress, triangle_count);
        }
    }
}
