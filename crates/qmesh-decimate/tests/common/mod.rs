//! Test mesh generators shared by the integration tests.

/// Axis-aligned unit cube: 8 vertices, 12 triangles, wound
/// counter-clockwise viewed from outside.
pub fn unit_cube() -> (Vec<f64>, Vec<u32>) {
    let vertices = vec![
        0.0, 0.0, 0.0, //
        1.0, 0.0, 0.0, //
        1.0, 1.0, 0.0, //
        0.0, 1.0, 0.0, //
        0.0, 0.0, 1.0, //
        1.0, 0.0, 1.0, //
        1.0, 1.0, 1.0, //
        0.0, 1.0, 1.0,
    ];
    let indices = vec![
        0, 2, 1, 0, 3, 2, // bottom
        4, 5, 6, 4, 6, 7, // top
        0, 1, 5, 0, 5, 4, // front
        2, 3, 7, 2, 7, 6, // back
        0, 4, 7, 0, 7, 3, // left
        1, 2, 6, 1, 6, 5, // right
    ];
    (vertices, indices)
}

/// UV sphere without pole merging: `rings * sectors` vertices and
/// `(rings - 1) * sectors * 2` triangles.
pub fn uv_sphere(rings: u32, sectors: u32, radius: f64) -> (Vec<f64>, Vec<u32>) {
    let mut vertices = Vec::with_capacity((rings * sectors) as usize * 3);
    for r in 0..rings {
        let phi = std::f64::consts::PI * (r as f64 + 0.5) / rings as f64;
        for s in 0..sectors {
            let theta = 2.0 * std::f64::consts::PI * s as f64 / sectors as f64;
            vertices.extend_from_slice(&[
                radius * phi.sin() * theta.cos(),
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
            ]);
        }
    }
    let mut indices = Vec::with_capacity(((rings - 1) * sectors) as usize * 6);
    for r in 0..rings - 1 {
        for s in 0..sectors {
            let a = r * sectors + s;
            let b = r * sectors + (s + 1) % sectors;
            let c = a + sectors;
            let d = b + sectors;
            indices.extend_from_slice(&[a, b, d]);
            indices.extend_from_slice(&[a, d, c]);
        }
    }
    (vertices, indices)
}

/// Flat grid on z = 0 spanning `[0, extent]^2` with `cells^2 * 2`
/// triangles, wound counter-clockwise viewed from +z.
pub fn flat_grid(cells: u32, extent: f64) -> (Vec<f64>, Vec<u32>) {
    let w = cells + 1;
    let mut vertices = Vec::with_capacity((w * w) as usize * 3);
    for j in 0..w {
        for i in 0..w {
            vertices.extend_from_slice(&[
                extent * i as f64 / cells as f64,
                extent * j as f64 / cells as f64,
                0.0,
            ]);
        }
    }
    let mut indices = Vec::with_capacity((cells * cells) as usize * 6);
    for j in 0..cells {
        for i in 0..cells {
            let a = j * w + i;
            indices.extend_from_slice(&[a, a + 1, a + w + 1]);
            indices.extend_from_slice(&[a, a + w + 1, a + w]);
        }
    }
    (vertices, indices)
}

/// Two triangles sharing one edge.
pub fn two_triangle_strip() -> (Vec<f64>, Vec<u32>) {
    (
        vec![
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            1.0, 1.0, 0.0, //
            0.0, 1.0, 0.0,
        ],
        vec![0, 1, 2, 0, 2, 3],
    )
}

/// A sharply folded grid: two `cells x cells` sheets meeting at a 90
/// degree ridge along the y axis.
pub fn folded_sheet(cells: u32, extent: f64) -> (Vec<f64>, Vec<u32>) {
    let w = cells + 1;
    let mut vertices = Vec::with_capacity((w * (2 * cells + 1)) as usize * 3);
    // Columns run from -extent (lifted) through the fold at x = 0 to
    // +extent (flat).
    for j in 0..w {
        let y = extent * j as f64 / cells as f64;
        for i in 0..=(2 * cells) {
            let t = i as f64 / cells as f64 - 1.0;
            let (x, z) = if t < 0.0 { (0.0, -t * extent) } else { (t * extent, 0.0) };
            vertices.extend_from_slice(&[x, y, z]);
        }
    }
    let row = 2 * cells + 1;
    let mut indices = Vec::new();
    for j in 0..cells {
        for i in 0..2 * cells {
            let a = j * row + i;
            indices.extend_from_slice(&[a, a + 1, a + row + 1]);
            indices.extend_from_slice(&[a, a + row + 1, a + row]);
        }
    }
    (vertices, indices)
}

/// Every emitted triangle must have three distinct corner indices inside
/// the emitted vertex range.
pub fn assert_triangles_valid(indices: &[u32], triangle_count: usize, vertex_count: usize) {
    for t in 0..triangle_count {
        let tri = [indices[t * 3], indices[t * 3 + 1], indices[t * 3 + 2]];
        assert!(
            tri.iter().all(|&v| (v as usize) < vertex_count),
            "triangle {t} references vertex out of range: {tri:?} / {vertex_count}"
        );
        assert!(
            tri[0] != tri[1] && tri[1] != tri[2] && tri[2] != tri[0],
            "triangle {t} has repeated vertices: {tri:?}"
        );
    }
}
