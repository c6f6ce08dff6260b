//! Mapping a render mesh onto a simulated body.
//!
//! A [`SkinBinding`] is computed once, while the body is at rest. Every
//! mesh vertex records the particles that influence it, each with a weight
//! and the vertex's offset from that particle at bind time. Deforming then
//! follows the particles:
//!
//! ```text
//! v' = Σᵢ wᵢ · (pᵢ + offsetᵢ)
//! ```
//!
//! [`SkinningMethod::Nearest`] binds each vertex to its closest particle.
//! [`SkinningMethod::Blend`] uses inverse-distance weights over the closest
//! particles within a radius, falling back to the nearest particle when none
//! is in range.

use nalgebra::{Point3, Similarity3, Vector3};
use rayon::prelude::*;
use smallvec::SmallVec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::body::SoftBody;
use crate::mesh::TriangleMesh;

/// How vertices are attached to particles.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SkinningMethod {
    /// Follow the single closest particle.
    #[default]
    Nearest,
    /// Inverse-distance blend of up to `max_influences` particles closer
    /// than `max_distance`.
    Blend {
        /// Influence cap per vertex.
        max_influences: usize,
        /// Particles farther than this do not influence a vertex.
        max_distance: f64,
    },
}

impl SkinningMethod {
    /// Blend over up to four particles within `max_distance`.
    #[must_use]
    pub const fn blend(max_distance: f64) -> Self {
        Self::Blend {
            max_influences: 4,
            max_distance,
        }
    }
}

/// One particle's pull on a vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParticleWeight {
    /// Particle index within the body.
    pub particle: usize,
    /// Normalized weight.
    pub weight: f64,
    /// Vertex position minus particle position at bind time.
    pub offset: Vector3<f64>,
}

type Influences = SmallVec<[ParticleWeight; 4]>;

/// Vertex-to-particle attachment for one mesh and one body.
#[derive(Debug, Clone, Default)]
pub struct SkinBinding {
    influences: Vec<Influences>,
}

impl SkinBinding {
    /// Bind world-space vertices to the body's current particle positions.
    ///
    /// An inert body yields a binding with no influences; applying it leaves
    /// vertex buffers untouched.
    #[must_use]
    pub fn bind(body: &SoftBody, vertices: &[Point3<f64>], method: SkinningMethod) -> Self {
        let positions = body.positions();
        if positions.is_empty() {
            return Self {
                influences: vec![Influences::new(); vertices.len()],
            };
        }

        let influences = vertices
            .par_iter()
            .map(|v| -> Influences {
                match method {
                    SkinningMethod::Nearest => nearest(positions, v).into_iter().collect(),
                    SkinningMethod::Blend {
                        max_influences,
                        max_distance,
                    } => {
                        let blended = blend(positions, v, max_influences.max(1), max_distance);
                        if blended.is_empty() {
                            nearest(positions, v).into_iter().collect()
                        } else {
                            blended
                        }
                    }
                }
            })
            .collect();

        Self { influences }
    }

    /// Bind a mesh placed in the world by `transform`.
    #[must_use]
    pub fn bind_mesh(
        body: &SoftBody,
        mesh: &TriangleMesh,
        transform: &Similarity3<f64>,
        method: SkinningMethod,
    ) -> Self {
        let vertices: Vec<Point3<f64>> = mesh
            .vertices
            .iter()
            .map(|v| transform.transform_point(v))
            .collect();
        Self::bind(body, &vertices, method)
    }

    /// Number of bound vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.influences.len()
    }

    /// Whether no vertex is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.influences.is_empty()
    }

    /// Influences of one vertex.
    #[must_use]
    pub fn influences(&self, vertex: usize) -> Option<&[ParticleWeight]> {
        self.influences.get(vertex).map(SmallVec::as_slice)
    }

    /// Write deformed world-space positions into `vertices`.
    ///
    /// Vertices without influences, or past the end of the binding, keep
    /// their current value. Returns the number of vertices written.
    pub fn apply(&self, body: &SoftBody, vertices: &mut [Point3<f64>]) -> usize {
        let positions = body.positions();
        vertices
            .par_iter_mut()
            .zip(self.influences.par_iter())
            .map(|(vertex, influences)| {
                let mut sum = Vector3::zeros();
                let mut total = 0.0;
                for w in influences {
                    if let Some(p) = positions.get(w.particle) {
                        sum += (p.coords + w.offset) * w.weight;
                        total += w.weight;
                    }
                }
                if total > 0.0 {
                    *vertex = Point3::from(sum / total);
                    1
                } else {
                    0
                }
            })
            .sum()
    }

    /// Deformed positions for every bound vertex.
    ///
    /// `rest` supplies the value for vertices without influences.
    #[must_use]
    pub fn deformed(&self, body: &SoftBody, rest: &[Point3<f64>]) -> Vec<Point3<f64>> {
        let mut out = rest.to_vec();
        self.apply(body, &mut out);
        out
    }
}

fn nearest(positions: &[Point3<f64>], vertex: &Point3<f64>) -> Option<ParticleWeight> {
    positions
        .iter()
        .enumerate()
        .map(|(i, p)| (i, (vertex - p).norm_squared()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| ParticleWeight {
            particle: i,
            weight: 1.0,
            offset: vertex - positions[i],
        })
}

fn blend(
    positions: &[Point3<f64>],
    vertex: &Point3<f64>,
    max_influences: usize,
    max_distance: f64,
) -> Influences {
    let mut candidates: Vec<(usize, f64)> = positions
        .iter()
        .enumerate()
        .filter_map(|(i, p)| {
            let distance = (vertex - p).norm();
            (distance < max_distance).then_some((i, distance))
        })
        .collect();
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
    candidates.truncate(max_influences);

    // Offset keeps a coincident particle finite
    let raw: SmallVec<[(usize, f64); 4]> = candidates
        .into_iter()
        .map(|(i, d)| (i, 1.0 / (d + 1e-3)))
        .collect();
    let total: f64 = raw.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return Influences::new();
    }

    raw.into_iter()
        .map(|(i, w)| ParticleWeight {
            particle: i,
            weight: w / total,
            offset: vertex - positions[i],
        })
        .collect()
}
