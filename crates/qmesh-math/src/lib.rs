#![warn(missing_docs)]

//! Quadric error metric math for the qmesh decimation engine.
//!
//! Thin wrappers around nalgebra providing the geometric primitives the
//! decimation pipeline works with: planes, axis-aligned boxes, triangle
//! measures, and the symmetric 4x4 quadric form stored as 10 scalars.

use nalgebra::Vector3;

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// Determinant magnitude below which the quadric 3x3 subsystem is treated
/// as singular and the collapse point falls back to midpoint/endpoints.
pub const DET_EPSILON: f64 = 1e-12;

/// Altitude/longest-edge ratio of an equilateral triangle, the best
/// achievable triangle shape. Used to normalize compactness measures.
pub const EQUILATERAL_RATIO: f64 = 0.866_025_403_784_438_6;

/// An oriented plane `n . x + d = 0` with unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal of the plane.
    pub normal: Vec3,
    /// Signed offset; `d = -n . p` for any point `p` on the plane.
    pub d: f64,
}

impl Plane {
    /// Plane supporting the triangle `(a, b, c)` with the normal oriented
    /// by the winding `(b - a) x (c - a)`.
    ///
    /// Returns `None` for degenerate (zero-area) triangles.
    pub fn from_triangle(a: &Point3, b: &Point3, c: &Point3) -> Option<Plane> {
        let cross = (b - a).cross(&(c - a));
        let len = cross.norm();
        if len <= f64::MIN_POSITIVE {
            return None;
        }
        let normal = cross / len;
        Some(Plane {
            normal,
            d: -normal.dot(&a.coords),
        })
    }

    /// Signed distance from `p` to the plane.
    pub fn signed_distance(&self, p: &Point3) -> f64 {
        self.normal.dot(&p.coords) + self.d
    }
}

/// Area of the triangle `(a, b, c)`.
pub fn triangle_area(a: &Point3, b: &Point3, c: &Point3) -> f64 {
    (b - a).cross(&(c - a)).norm() * 0.5
}

/// Unnormalized winding normal `(b - a) x (c - a)` of the triangle.
pub fn triangle_cross(a: &Point3, b: &Point3, c: &Point3) -> Vec3 {
    (b - a).cross(&(c - a))
}

/// Shape measure of a triangle: smallest altitude over longest edge.
///
/// Ranges over `(0, EQUILATERAL_RATIO]`; slivers approach zero. Returns 0
/// for degenerate triangles.
pub fn triangle_aspect(a: &Point3, b: &Point3, c: &Point3) -> f64 {
    let e0 = (b - a).norm();
    let e1 = (c - b).norm();
    let e2 = (a - c).norm();
    let longest = e0.max(e1).max(e2);
    if longest <= f64::MIN_POSITIVE {
        return 0.0;
    }
    // smallest altitude = 2 * area / longest edge
    let area = triangle_area(a, b, c);
    2.0 * area / (longest * longest)
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl Aabb {
    /// An empty box that any point will expand.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::MAX, f64::MAX, f64::MAX),
            max: Point3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    /// Expand the box to contain `p`.
    pub fn expand(&mut self, p: &Point3) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    /// Merge another box into this one.
    pub fn merge(&mut self, other: &Aabb) {
        self.expand(&other.min);
        self.expand(&other.max);
    }

    /// Index of the longest axis (0, 1, or 2).
    pub fn longest_axis(&self) -> usize {
        let ext = self.max - self.min;
        let mut axis = 0;
        if ext.y > ext.x {
            axis = 1;
        }
        if ext.z > ext[axis] {
            axis = 2;
        }
        axis
    }

    /// Length of the main diagonal. Zero for an empty box.
    pub fn diagonal(&self) -> f64 {
        if self.min.x > self.max.x {
            return 0.0;
        }
        (self.max - self.min).norm()
    }

    /// Center point of the box.
    pub fn center(&self) -> Point3 {
        Point3::from((self.min.coords + self.max.coords) * 0.5)
    }
}

/// Symmetric 4x4 quadric form stored as 10 scalars, plus the surface area
/// accumulated alongside it.
///
/// The scalar layout follows the upper triangle of the matrix associated
/// with a plane `(a, b, c, d)`:
/// `[a2, ab, ac, ad, b2, bc, bd, c2, cd, d2]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadric {
    m: [f64; 10],
    /// Total triangle area accumulated into this quadric.
    pub area: f64,
}

impl Quadric {
    /// The zero quadric.
    pub fn zero() -> Self {
        Self {
            m: [0.0; 10],
            area: 0.0,
        }
    }

    /// Quadric of a plane, scaled by the supporting triangle's area.
    pub fn from_plane(plane: &Plane, area: f64) -> Self {
        let (a, b, c) = (plane.normal.x, plane.normal.y, plane.normal.z);
        let d = plane.d;
        let w = area;
        Self {
            m: [
                w * a * a,
                w * a * b,
                w * a * c,
                w * a * d,
                w * b * b,
                w * b * c,
                w * b * d,
                w * c * c,
                w * c * d,
                w * d * d,
            ],
            area,
        }
    }

    /// Sum of two quadrics (and their areas).
    pub fn sum(&self, rhs: &Quadric) -> Quadric {
        let mut m = self.m;
        for (a, b) in m.iter_mut().zip(rhs.m.iter()) {
            *a += b;
        }
        Quadric {
            m,
            area: self.area + rhs.area,
        }
    }

    /// Accumulate another quadric into this one.
    pub fn add(&mut self, rhs: &Quadric) {
        for (a, b) in self.m.iter_mut().zip(rhs.m.iter()) {
            *a += b;
        }
        self.area += rhs.area;
    }

    /// Evaluate the form `x' Q x` at a point.
    ///
    /// The result is the area-weighted sum of squared distances to the
    /// accumulated planes; non-negative up to rounding.
    pub fn evaluate(&self, p: &Point3) -> f64 {
        let (x, y, z) = (p.x, p.y, p.z);
        let q = &self.m;
        q[0] * x * x
            + 2.0 * q[1] * x * y
            + 2.0 * q[2] * x * z
            + 2.0 * q[3] * x
            + q[4] * y * y
            + 2.0 * q[5] * y * z
            + 2.0 * q[6] * y
            + q[7] * z * z
            + 2.0 * q[8] * z
            + q[9]
    }

    fn det3(
        &self,
        a11: usize,
        a12: usize,
        a13: usize,
        a21: usize,
        a22: usize,
        a23: usize,
        a31: usize,
        a32: usize,
        a33: usize,
    ) -> f64 {
        let q = &self.m;
        q[a11] * q[a22] * q[a33] + q[a13] * q[a21] * q[a32] + q[a12] * q[a23] * q[a31]
            - q[a13] * q[a22] * q[a31]
            - q[a11] * q[a23] * q[a32]
            - q[a12] * q[a21] * q[a33]
    }

    /// Solve the 3x3 linear subsystem for the point minimizing the form.
    ///
    /// Returns `None` when the system is ill-conditioned (determinant below
    /// [`DET_EPSILON`]); callers fall back to the edge midpoint, then to
    /// the lower-cost endpoint.
    pub fn minimize(&self) -> Option<Point3> {
        let det = self.det3(0, 1, 2, 1, 4, 5, 2, 5, 7);
        if det.abs() <= DET_EPSILON {
            return None;
        }
        let inv = 1.0 / det;
        Some(Point3::new(
            -inv * self.det3(1, 2, 3, 4, 5, 6, 5, 7, 8),
            inv * self.det3(0, 2, 3, 1, 5, 6, 2, 7, 8),
            -inv * self.det3(0, 1, 3, 1, 4, 6, 2, 5, 8),
        ))
    }
}
