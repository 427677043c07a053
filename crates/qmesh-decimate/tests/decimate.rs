//! End-to-end decimation scenarios.

mod common;

use common::*;
use qmesh_decimate::{
    decimate, decimate_budget, BudgetOptions, IndexData, Operation, VertexData,
};

#[test]
fn cube_with_planar_mode_is_untouched() {
    // A cube has no reducible coplanar interior vertices: every collapse
    // would cost far more than the feature-size ceiling allows.
    let (mut v, mut i) = unit_cube();
    let original_v = v.clone();
    let original_i = i.clone();
    let mut op = Operation::new(VertexData::F64(&mut v), 3, IndexData::U32(&mut i), 3);
    op.set_feature_size(0.5);
    op.flags.planar_mode = true;
    op.flags.triangle_winding_ccw = true;

    let stats = decimate(&mut op, 1).unwrap();
    assert_eq!(stats.triangle_count, 12);
    assert_eq!(stats.vertex_count, 8);
    assert_eq!(stats.decimation_count, 0);
    drop(op);
    assert_eq!(v, original_v);
    assert_eq!(i, original_i);
}

#[test]
fn sphere_budget_lands_inside_tolerance() {
    let (mut v, mut i) = uv_sphere(40, 40, 1.0);
    assert_eq!(v.len() / 3, 1600);
    assert_eq!(i.len() / 3, 3120);

    let mut op = Operation::new(VertexData::F64(&mut v), 3, IndexData::U32(&mut i), 3);
    let report = decimate_budget(&mut op, 1000, 1, &BudgetOptions::default()).unwrap();

    assert!(report.budget_met);
    assert!(report.iteration_count <= 20);
    assert!(
        report.final_triangle_count <= 1000 && report.final_triangle_count >= 950,
        "expected a count within 5% under the budget, got {}",
        report.final_triangle_count
    );
    drop(op);
    assert_triangles_valid(&i, report.final_triangle_count, report.stats.vertex_count);
}

#[test]
fn small_sphere_collapses_to_degenerate_hull() {
    // The feature size dwarfs the sphere, so the collapse loop runs until
    // the validity gates are all that is left standing.
    let (mut v, mut i) = uv_sphere(20, 20, 0.05);
    assert_eq!(v.len() / 3, 400);
    assert_eq!(i.len() / 3, 760);

    let mut op = Operation::new(VertexData::F64(&mut v), 3, IndexData::U32(&mut i), 3);
    op.set_feature_size(1.0);
    let stats = decimate(&mut op, 1).unwrap();

    assert!(
        stats.triangle_count <= 20,
        "expected an aggressive collapse, got {} triangles",
        stats.triangle_count
    );
    drop(op);
    assert_triangles_valid(&i, stats.triangle_count, stats.vertex_count);
}

#[test]
fn planar_grid_fast_path_clears_the_interior() {
    let (mut v, mut i) = flat_grid(99, 1.0);
    assert_eq!(i.len() / 3, 19_602);

    let mut op = Operation::new(VertexData::F64(&mut v), 3, IndexData::U32(&mut i), 3);
    op.set_feature_size(0.05);
    op.flags.planar_mode = true;
    let stats = decimate(&mut op, 1).unwrap();

    assert!(
        stats.triangle_count <= 400,
        "coplanar fast path left {} triangles",
        stats.triangle_count
    );
    drop(op);
    assert_triangles_valid(&i, stats.triangle_count, stats.vertex_count);

    // Orientation preservation: the grid was wound counter-clockwise
    // seen from +z, and flips are forbidden, so every survivor still is.
    for t in 0..stats.triangle_count {
        let p = |k: usize| {
            let idx = i[t * 3 + k] as usize * 3;
            [v[idx], v[idx + 1], v[idx + 2]]
        };
        let (a, b, c) = (p(0), p(1), p(2));
        let u = [b[0] - a[0], b[1] - a[1]];
        let w = [c[0] - a[0], c[1] - a[1]];
        assert!(
            u[0] * w[1] - u[1] * w[0] > 0.0,
            "triangle {t} flipped its winding"
        );
    }
}

#[test]
fn planar_mode_beats_plain_run_on_planar_input() {
    let run = |planar: bool| {
        let (mut v, mut i) = flat_grid(40, 1.0);
        let mut op = Operation::new(VertexData::F64(&mut v), 3, IndexData::U32(&mut i), 3);
        op.set_feature_size(0.05);
        op.flags.planar_mode = planar;
        decimate(&mut op, 1).unwrap().triangle_count
    };
    let with_flag = run(true);
    let without_flag = run(false);
    assert!(
        with_flag < without_flag,
        "planar mode should strictly improve reduction: {with_flag} vs {without_flag}"
    );
}

#[test]
fn heavy_boundary_weight_preserves_the_rim() {
    let run = |weight: f64| {
        let (mut v, mut i) = flat_grid(24, 1.0);
        let mut op = Operation::new(VertexData::F64(&mut v), 3, IndexData::U32(&mut i), 3);
        op.set_feature_size(0.2);
        op.flags.planar_mode = true;
        op.boundary_weight = weight;
        decimate(&mut op, 1).unwrap().triangle_count
    };
    let heavy = run(1e9);
    let neutral = run(1.0);
    // Pricing boundary vertices out of reach keeps the rim fan alive.
    assert!(
        heavy >= neutral,
        "boundary weight should never increase reduction: {heavy} vs {neutral}"
    );
    assert!(heavy > 4, "the rim should survive a prohibitive boundary weight");
}

#[test]
fn locked_boundary_strip_is_untouched() {
    let (mut v, mut i) = two_triangle_strip();
    let original_v = v.clone();
    let original_i = i.clone();
    let mut op = Operation::new(VertexData::F64(&mut v), 3, IndexData::U32(&mut i), 3);
    op.set_feature_size(10.0);
    op.flags.boundary_lock = true;

    let stats = decimate(&mut op, 1).unwrap();
    assert_eq!(stats.decimation_count, 0);
    assert_eq!(stats.triangle_count, 2);
    drop(op);
    assert_eq!(v, original_v);
    assert_eq!(i, original_i);
}

#[test]
fn unreachable_budget_reports_smallest_achievable() {
    let (mut v, mut i) = unit_cube();
    let mut op = Operation::new(VertexData::F64(&mut v), 3, IndexData::U32(&mut i), 3);
    let report = decimate_budget(&mut op, 2, 1, &BudgetOptions::default()).unwrap();

    assert!(!report.budget_met, "a cube cannot reach 2 triangles");
    assert!(report.final_triangle_count > 2);
    drop(op);
    assert_triangles_valid(&i, report.final_triangle_count, report.stats.vertex_count);
}

#[test]
fn larger_feature_size_never_keeps_more_triangles() {
    let counts: Vec<usize> = [0.5, 1.0, 2.0]
        .iter()
        .map(|&feature| {
            let (mut v, mut i) = uv_sphere(20, 20, 1.0);
            let mut op =
                Operation::new(VertexData::F64(&mut v), 3, IndexData::U32(&mut i), 3);
            op.set_feature_size(feature);
            decimate(&mut op, 1).unwrap().triangle_count
        })
        .collect();
    assert!(
        counts[0] >= counts[1] && counts[1] >= counts[2],
        "triangle count must be monotone in feature size: {counts:?}"
    );
    assert!(
        counts[2] < 760,
        "the largest feature size should reduce the sphere"
    );
}

#[test]
fn recomputed_normals_point_outward() {
    let (mut v, mut i) = uv_sphere(24, 24, 1.0);
    let mut normals = vec![0.0f64; v.len()];
    let mut op = Operation::new(VertexData::F64(&mut v), 3, IndexData::U32(&mut i), 3);
    op.set_feature_size(0.6);
    op.normals_out = Some(VertexData::F64(&mut normals));

    let stats = decimate(&mut op, 1).unwrap();
    assert!(stats.decimation_count > 0);
    drop(op);
    for k in 0..stats.vertex_count {
        let p = [v[k * 3], v[k * 3 + 1], v[k * 3 + 2]];
        let n = [normals[k * 3], normals[k * 3 + 1], normals[k * 3 + 2]];
        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        assert!((len - 1.0).abs() < 1e-6, "normal {k} is not unit length");
        let dot = p[0] * n[0] + p[1] * n[1] + p[2] * n[2];
        assert!(dot > 0.0, "normal {k} points into the sphere");
    }
}

#[test]
fn folded_sheet_with_vertex_splitting_stays_valid() {
    let (mut v, mut i) = folded_sheet(12, 1.0);
    let input_vertices = v.len() / 3;
    // Headroom for split copies plus the buffer space to write them back.
    v.resize(input_vertices * 2 * 3, 0.0);

    let mut op = Operation::new(VertexData::F64(&mut v), 3, IndexData::U32(&mut i), 3);
    op.vertex_count = input_vertices;
    op.vertex_alloc = input_vertices * 2;
    op.set_feature_size(0.5);
    op.flags.normal_vertex_splitting = true;

    let stats = decimate(&mut op, 1).unwrap();
    assert!(stats.vertex_count <= input_vertices * 2);
    drop(op);
    assert_triangles_valid(&i, stats.triangle_count, stats.vertex_count);
}

#[test]
fn alternate_formats_round_trip() {
    // f32 positions with a padded stride, i32 indices.
    let (v64, i64s) = unit_cube();
    let mut v: Vec<f32> = Vec::with_capacity(8 * 5);
    for p in v64.chunks_exact(3) {
        v.extend_from_slice(&[p[0] as f32, p[1] as f32, p[2] as f32, 9.0, 9.0]);
    }
    let mut i: Vec<i32> = i64s.iter().map(|&x| x as i32).collect();
    let original_v = v.clone();
    let original_i = i.clone();

    let mut op = Operation::new(VertexData::F32(&mut v), 5, IndexData::I32(&mut i), 3);
    op.set_feature_size(0.5);
    op.flags.triangle_winding_ccw = true;
    let stats = decimate(&mut op, 1).unwrap();

    assert_eq!(stats.triangle_count, 12);
    drop(op);
    assert_eq!(v, original_v);
    assert_eq!(i, original_i);
}

#[test]
fn multithreaded_budget_matches_validity() {
    let (mut v, mut i) = uv_sphere(30, 30, 1.0);
    let mut op = Operation::new(VertexData::F64(&mut v), 3, IndexData::U32(&mut i), 3);
    let report = decimate_budget(&mut op, 600, 4, &BudgetOptions::default()).unwrap();
    assert!(report.final_triangle_count <= 600 || !report.budget_met);
    drop(op);
    assert_triangles_valid(&i, report.final_triangle_count, report.stats.vertex_count);
}

#[test]
fn status_reports_cover_all_stages_in_order() {
    use qmesh_decimate::Stage;
    use std::sync::{Arc, Mutex};

    let seen: Arc<Mutex<Vec<(Stage, f64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let (mut v, mut i) = uv_sphere(16, 16, 0.05);
    let mut op = Operation::new(VertexData::F64(&mut v), 3, IndexData::U32(&mut i), 3);
    op.set_feature_size(1.0);
    op.status = Some(Box::new(move |r| {
        sink.lock().unwrap().push((r.stage, r.progress));
    }));
    op.status_interval_triangles = 50;

    decimate(&mut op, 1).unwrap();
    let seen = seen.lock().unwrap();

    // Stages arrive in pipeline order.
    for w in seen.windows(2) {
        assert!(w[0].0 <= w[1].0, "stages out of order: {:?} then {:?}", w[0], w[1]);
    }
    let stages: Vec<Stage> = seen.iter().map(|(s, _)| *s).collect();
    for expected in [
        Stage::Init,
        Stage::BuildMesh,
        Stage::BuildEdges,
        Stage::BuildQueues,
        Stage::Decimate,
        Stage::Cleanup,
        Stage::Pack,
        Stage::Done,
    ] {
        assert!(stages.contains(&expected), "missing stage {expected:?}");
    }
    // Progress is monotone within the decimation stage.
    let decimate_progress: Vec<f64> = seen
        .iter()
        .filter(|(s, _)| *s == Stage::Decimate)
        .map(|(_, p)| *p)
        .collect();
    for w in decimate_progress.windows(2) {
        assert!(w[0] <= w[1]);
    }
}
