//! Format-parameterized views over the caller's vertex and index buffers.
//!
//! The engine reads the input through these views at build time and writes
//! the simplified mesh back through them at pack time; no copies of the
//! caller's buffers are held in between.

use qmesh_math::{Point3, Vec3};

/// A caller-owned vertex buffer in one of the supported scalar formats.
///
/// Positions are laid out as `stride` scalars per vertex with the first
/// three scalars being x, y, z. The same buffer receives the packed result.
#[derive(Debug)]
pub enum VertexData<'a> {
    /// 32-bit float positions.
    F32(&'a mut [f32]),
    /// 64-bit float positions.
    F64(&'a mut [f64]),
}

impl VertexData<'_> {
    /// Total number of scalars in the buffer.
    pub fn scalar_len(&self) -> usize {
        match self {
            VertexData::F32(s) => s.len(),
            VertexData::F64(s) => s.len(),
        }
    }

    pub(crate) fn read_point(&self, vertex: usize, stride: usize) -> Point3 {
        let base = vertex * stride;
        match self {
            VertexData::F32(s) => Point3::new(
                s[base] as f64,
                s[base + 1] as f64,
                s[base + 2] as f64,
            ),
            VertexData::F64(s) => Point3::new(s[base], s[base + 1], s[base + 2]),
        }
    }

    pub(crate) fn write_point(&mut self, vertex: usize, stride: usize, p: &Point3) {
        let base = vertex * stride;
        match self {
            VertexData::F32(s) => {
                s[base] = p.x as f32;
                s[base + 1] = p.y as f32;
                s[base + 2] = p.z as f32;
            }
            VertexData::F64(s) => {
                s[base] = p.x;
                s[base + 1] = p.y;
                s[base + 2] = p.z;
            }
        }
    }

    pub(crate) fn write_vec(&mut self, vertex: usize, stride: usize, v: &Vec3) {
        let base = vertex * stride;
        match self {
            VertexData::F32(s) => {
                s[base] = v.x as f32;
                s[base + 1] = v.y as f32;
                s[base + 2] = v.z as f32;
            }
            VertexData::F64(s) => {
                s[base] = v.x;
                s[base + 1] = v.y;
                s[base + 2] = v.z;
            }
        }
    }
}

/// A caller-owned triangle index buffer in one of the supported formats.
///
/// Indices are laid out as `stride` entries per triangle with the first
/// three entries being the corner vertices.
#[derive(Debug)]
pub enum IndexData<'a> {
    /// Unsigned 32-bit indices.
    U32(&'a mut [u32]),
    /// Signed 32-bit indices.
    I32(&'a mut [i32]),
}

impl IndexData<'_> {
    /// Total number of index entries in the buffer.
    pub fn index_len(&self) -> usize {
        match self {
            IndexData::U32(s) => s.len(),
            IndexData::I32(s) => s.len(),
        }
    }

    /// Read one index entry, widened so signed formats can report negative
    /// values for range validation.
    pub(crate) fn read_raw(&self, slot: usize) -> i64 {
        match self {
            IndexData::U32(s) => s[slot] as i64,
            IndexData::I32(s) => s[slot] as i64,
        }
    }

    pub(crate) fn write(&mut self, slot: usize, value: u32) {
        match self {
            IndexData::U32(s) => s[slot] = value,
            IndexData::I32(s) => s[slot] = value as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strided_point_roundtrip() {
        let mut raw = vec![0.0f32; 16];
        let mut data = VertexData::F32(&mut raw);
        data.write_point(1, 8, &Point3::new(1.0, 2.0, 3.0));
        let p = data.read_point(1, 8);
        assert_eq!(p, Point3::new(1.0, 2.0, 3.0));
        // The write stayed inside vertex 1's stride window.
        assert_eq!(data.read_point(0, 8), Point3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_signed_index_widening() {
        let mut raw = vec![3i32, -1, 7];
        let data = IndexData::I32(&mut raw);
        assert_eq!(data.read_raw(0), 3);
        assert_eq!(data.read_raw(1), -1);
    }
}
