//! Error types for soft body simulation.

use thiserror::Error;

use crate::types::BodyId;

/// Errors that can occur while building or editing soft bodies.
///
/// Runtime numerical faults (`NaN`/infinite forces, velocities or positions)
/// are not reported through this type. The integrator recovers from them
/// locally and counts them in [`StepStats`](crate::StepStats).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SoftBodyError {
    /// Mesh buffers are malformed (e.g. a triangle references a missing vertex).
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// Particle index out of bounds.
    #[error("Particle index {index} out of bounds (body has {len} particles)")]
    IndexOutOfBounds {
        /// The offending index.
        index: usize,
        /// Number of particles in the body.
        len: usize,
    },

    /// No body with this id is registered.
    #[error("{0} is not registered")]
    UnknownBody(BodyId),

    /// A body with this id is already registered.
    #[error("{0} is already registered")]
    DuplicateBody(BodyId),

    /// Configuration error.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SoftBodyError {
    /// Create an invalid mesh error.
    pub fn invalid_mesh(msg: impl Into<String>) -> Self {
        Self::InvalidMesh(msg.into())
    }

    /// Create an index out of bounds error.
    #[must_use]
    pub const fn index_out_of_bounds(index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds { index, len }
    }

    /// Create an invalid config error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Result type for soft body operations.
pub type Result<T> = std::result::Result<T, SoftBodyError>;
