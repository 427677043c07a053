//! Error types for the decimation engine.

use thiserror::Error;

/// Errors that can occur while configuring or running a decimation.
#[derive(Error, Debug)]
pub enum DecimateError {
    /// Mesh has no triangles or no vertices.
    #[error("mesh is empty")]
    EmptyMesh,

    /// Buffer sizes, strides, or flags are inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An index buffer entry references a vertex outside the vertex range.
    #[error("triangle {triangle} references vertex {index}, but only {count} vertices exist")]
    IndexOutOfRange {
        /// Offending triangle number.
        triangle: usize,
        /// Out-of-range vertex index.
        index: i64,
        /// Number of vertices in the input.
        count: usize,
    },

    /// The triangle budget is zero or otherwise unusable.
    #[error("invalid triangle budget: {0}")]
    InvalidBudget(String),
}

/// Result type for decimation operations.
pub type Result<T> = std::result::Result<T, DecimateError>;
