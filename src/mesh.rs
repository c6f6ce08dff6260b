//! Triangle mesh input and point-in-mesh classification.
//!
//! The sampler receives a mesh in its local (untransformed) space together
//! with a world transform. Containment is decided in local space by casting
//! jittered rays and counting Möller–Trumbore hits.
//!
//! # Cast rays
//!
//! ```text
//! 6 axis directions (±X, ±Y, ±Z)
//!   × 2 symmetric jitters (+J, -J)
//!   = 12 rays, inside if ANY ray counts an odd number of hits
//! ```
//!
//! The OR across rays errs toward "inside": a single ray that grazes an
//! edge or vertex can miscount, but it cannot veto the other eleven.

use nalgebra::{Point3, Similarity3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bounds::Aabb;
use crate::error::{Result, SoftBodyError};

/// Determinant magnitude below which a ray is treated as parallel to a triangle.
pub const PARALLEL_EPSILON: f64 = 1e-10;

/// Minimum hit distance along a ray; hits at or behind the origin are ignored.
pub const HIT_DISTANCE_EPSILON: f64 = 1e-7;

/// Perturbation added to (and subtracted from) each axis ray direction.
const RAY_JITTER: Vector3<f64> = Vector3::new(0.013_1, 0.017_3, 0.019_7);

const AXIS_DIRECTIONS: [Vector3<f64>; 6] = [
    Vector3::new(1.0, 0.0, 0.0),
    Vector3::new(-1.0, 0.0, 0.0),
    Vector3::new(0.0, 1.0, 0.0),
    Vector3::new(0.0, -1.0, 0.0),
    Vector3::new(0.0, 0.0, 1.0),
    Vector3::new(0.0, 0.0, -1.0),
];

/// A triangle mesh in local space.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TriangleMesh {
    /// Vertex positions in mesh-local space.
    pub vertices: Vec<Point3<f64>>,
    /// Triangles as vertex index triples.
    pub triangles: Vec<[usize; 3]>,
}

impl TriangleMesh {
    /// Create a mesh, checking that every triangle index is valid.
    ///
    /// # Errors
    ///
    /// Returns [`SoftBodyError::InvalidMesh`] if a triangle references a
    /// vertex that does not exist.
    pub fn new(vertices: Vec<Point3<f64>>, triangles: Vec<[usize; 3]>) -> Result<Self> {
        let mesh = Self {
            vertices,
            triangles,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Axis-aligned unit cube centered at the origin with the given half-size.
    #[must_use]
    pub fn cuboid(half_extents: Vector3<f64>) -> Self {
        let h = half_extents;
        let vertices = vec![
            Point3::new(-h.x, -h.y, -h.z),
            Point3::new(h.x, -h.y, -h.z),
            Point3::new(h.x, h.y, -h.z),
            Point3::new(-h.x, h.y, -h.z),
            Point3::new(-h.x, -h.y, h.z),
            Point3::new(h.x, -h.y, h.z),
            Point3::new(h.x, h.y, h.z),
            Point3::new(-h.x, h.y, h.z),
        ];
        let triangles = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [2, 3, 7],
            [2, 7, 6],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        Self {
            vertices,
            triangles,
        }
    }

    /// Check that every triangle references existing, distinct vertices.
    ///
    /// # Errors
    ///
    /// Returns [`SoftBodyError::InvalidMesh`] on the first bad triangle.
    pub fn validate(&self) -> Result<()> {
        let n = self.vertices.len();
        for (t, tri) in self.triangles.iter().enumerate() {
            if let Some(&bad) = tri.iter().find(|&&v| v >= n) {
                return Err(SoftBodyError::invalid_mesh(format!(
                    "triangle {t} references vertex {bad}, mesh has {n} vertices"
                )));
            }
        }
        Ok(())
    }

    /// Check whether the mesh has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Bounding box in local space.
    #[must_use]
    pub fn local_bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter())
    }

    /// Bounding box enclosing every vertex after applying `transform`.
    #[must_use]
    pub fn world_bounds(&self, transform: &Similarity3<f64>) -> Aabb {
        let mut aabb = Aabb::empty();
        for v in &self.vertices {
            aabb.expand_to_include(&transform.transform_point(v));
        }
        aabb
    }

    /// Count triangles hit by a ray starting at `origin` (local space).
    #[must_use]
    pub fn count_ray_hits(&self, origin: &Point3<f64>, direction: &Vector3<f64>) -> usize {
        self.triangles
            .iter()
            .filter(|tri| {
                ray_triangle_intersect(
                    origin,
                    direction,
                    &self.vertices[tri[0]],
                    &self.vertices[tri[1]],
                    &self.vertices[tri[2]],
                )
                .is_some()
            })
            .count()
    }

    /// Test whether a world-space point lies inside the mesh.
    ///
    /// The point is moved to local space with the inverse of `transform` and
    /// rejected straight away when it falls outside the local bounding box.
    /// Otherwise twelve jittered axis rays are cast and the point is inside
    /// if any of them reports an odd hit count.
    #[must_use]
    pub fn contains_point(&self, transform: &Similarity3<f64>, point: &Point3<f64>) -> bool {
        self.contains_point_within(transform, point, &self.local_bounds())
    }

    /// [`contains_point`](Self::contains_point) with precomputed local bounds.
    ///
    /// Callers testing many points compute `local_bounds()` once and pass it here.
    #[must_use]
    pub fn contains_point_within(
        &self,
        transform: &Similarity3<f64>,
        point: &Point3<f64>,
        local_bounds: &Aabb,
    ) -> bool {
        if self.triangles.is_empty() {
            return false;
        }
        let local = transform.inverse_transform_point(point);
        if !local_bounds.contains(&local) {
            return false;
        }
        ray_directions().any(|dir| self.count_ray_hits(&local, &dir) % 2 == 1)
    }
}

/// The twelve ray directions used by [`TriangleMesh::contains_point`].
pub fn ray_directions() -> impl Iterator<Item = Vector3<f64>> {
    AXIS_DIRECTIONS
        .into_iter()
        .flat_map(|axis| [axis + RAY_JITTER, axis - RAY_JITTER])
}

/// Ray-triangle intersection using the Möller–Trumbore algorithm.
///
/// # Returns
///
/// `Some(t)` with the ray parameter of the hit, or `None` if the ray is
/// parallel to the triangle, misses it, or hits at `t <= HIT_DISTANCE_EPSILON`.
#[must_use]
#[allow(clippy::many_single_char_names)]
pub fn ray_triangle_intersect(
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    v0: &Point3<f64>,
    v1: &Point3<f64>,
    v2: &Point3<f64>,
) -> Option<f64> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let h = direction.cross(&edge2);
    let a = edge1.dot(&h);

    // Ray is parallel to triangle
    if a.abs() < PARALLEL_EPSILON {
        return None;
    }

    let f = 1.0 / a;
    let s = origin - v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&edge1);
    let v = f * direction.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(&q);
    (t > HIT_DISTANCE_EPSILON).then_some(t)
}
