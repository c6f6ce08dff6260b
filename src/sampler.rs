//! Adaptive volume sampling of a triangle mesh.
//!
//! # Algorithm
//!
//! ```text
//! 1. Root cell = world bounds of the transformed vertices
//!    (paired with the mesh's local bounds)
//! 2. Subdivide depth-first until every axis of a cell is <= min_cell_size
//! 3. At each leaf:
//!      local cell holds mesh vertices  -> candidates = those vertices
//!      otherwise                       -> candidates = regular grid at point_spacing
//! 4. Accept a candidate if no accepted point lies within point_spacing / 2
//!    and the mesh contains it
//! 5. Classify accepted points as surface or interior
//! ```

use hashbrown::HashMap;
use nalgebra::{Point3, Similarity3, Vector3};
use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bounds::Aabb;
use crate::mesh::TriangleMesh;
use crate::octree::OctreeNode;

/// Smallest cell size and spacing the sampler will work with.
const MIN_LENGTH: f64 = 1e-4;

/// Configuration for mesh sampling.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SamplerConfig {
    /// Octree subdivision stops once every axis of a cell is at most this size.
    pub min_cell_size: f64,
    /// Target distance between sampled points.
    pub point_spacing: f64,
    /// Contact radius given to every sampled particle.
    pub particle_radius: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            min_cell_size: 0.25,
            point_spacing: 0.1,
            particle_radius: 0.05,
        }
    }
}

impl SamplerConfig {
    /// Coarse sampling for quick previews and tests.
    #[must_use]
    pub const fn coarse() -> Self {
        Self {
            min_cell_size: 0.5,
            point_spacing: 0.25,
            particle_radius: 0.12,
        }
    }

    /// Fine sampling for detailed bodies.
    #[must_use]
    pub const fn fine() -> Self {
        Self {
            min_cell_size: 0.1,
            point_spacing: 0.05,
            particle_radius: 0.025,
        }
    }

    /// Set the point spacing, keeping the radius at half of it.
    #[must_use]
    pub const fn with_spacing(mut self, spacing: f64) -> Self {
        self.point_spacing = spacing;
        self.particle_radius = spacing * 0.5;
        self
    }

    /// Set the minimum octree cell size.
    #[must_use]
    pub const fn with_min_cell_size(mut self, size: f64) -> Self {
        self.min_cell_size = size;
        self
    }
}

/// Points accepted by one sampling pass.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    /// Accepted world-space positions.
    pub points: Vec<Point3<f64>>,
    /// World-space octree leaf each point came from.
    pub cells: Vec<Aabb>,
    /// Whether each point lies on the mesh surface.
    pub surface: Vec<bool>,
    /// Node count reported by the octree build.
    pub node_count: usize,
}

impl SampleSet {
    /// Number of accepted points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no point was accepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Spatial hash used to reject candidates that crowd an accepted point.
#[derive(Debug)]
struct SpacingIndex {
    bucket_size: f64,
    min_distance_sq: f64,
    buckets: HashMap<[i64; 3], SmallVec<[Point3<f64>; 4]>>,
}

impl SpacingIndex {
    fn new(min_distance: f64) -> Self {
        Self {
            bucket_size: min_distance.max(MIN_LENGTH),
            min_distance_sq: min_distance * min_distance,
            buckets: HashMap::new(),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn key(&self, p: &Point3<f64>) -> [i64; 3] {
        [
            (p.x / self.bucket_size).floor() as i64,
            (p.y / self.bucket_size).floor() as i64,
            (p.z / self.bucket_size).floor() as i64,
        ]
    }

    fn is_crowded(&self, p: &Point3<f64>) -> bool {
        let [kx, ky, kz] = self.key(p);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if let Some(bucket) = self.buckets.get(&[kx + dx, ky + dy, kz + dz]) {
                        if bucket
                            .iter()
                            .any(|q| (q - p).norm_squared() < self.min_distance_sq)
                        {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    fn insert(&mut self, p: Point3<f64>) {
        let key = self.key(&p);
        self.buckets.entry(key).or_default().push(p);
    }
}

/// Fills a mesh volume with particles.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshSampler {
    config: SamplerConfig,
}

impl MeshSampler {
    /// Create a sampler with the given configuration.
    #[must_use]
    pub const fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    /// Get the sampler configuration.
    #[must_use]
    pub const fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Sample a mesh placed in the world by `transform`.
    ///
    /// An empty mesh yields an empty set; the caller ends up with an inert body.
    #[must_use]
    pub fn sample(&self, mesh: &TriangleMesh, transform: &Similarity3<f64>) -> SampleSet {
        if mesh.is_empty() {
            warn!("Mesh has no vertices; sampling aborted");
            return SampleSet::default();
        }

        let spacing = self.config.point_spacing.max(MIN_LENGTH);
        let min_cell = self.config.min_cell_size.max(MIN_LENGTH);

        let local_bounds = mesh.local_bounds();
        let mut root = OctreeNode::new(mesh.world_bounds(transform), local_bounds);
        let mut index = SpacingIndex::new(spacing * 0.5);
        let mut points = Vec::new();
        let mut cells = Vec::new();
        let mut from_vertex = Vec::new();

        let node_count = root.build(min_cell, &mut |leaf| {
            let vertex_hits: Vec<Point3<f64>> = mesh
                .vertices
                .iter()
                .filter(|v| leaf.local_bounds().contains(v))
                .map(|v| transform.transform_point(v))
                .collect();
            let follows_mesh = !vertex_hits.is_empty();
            let candidates = if follows_mesh {
                vertex_hits
            } else {
                grid_points(leaf.world_bounds(), spacing)
            };

            for candidate in candidates {
                if index.is_crowded(&candidate)
                    || !mesh.contains_point_within(transform, &candidate, &local_bounds)
                {
                    continue;
                }
                index.insert(candidate);
                points.push(candidate);
                cells.push(*leaf.world_bounds());
                from_vertex.push(follows_mesh);
            }
        });

        let surface: Vec<bool> = points
            .par_iter()
            .zip(from_vertex.par_iter())
            .map(|(p, &on_vertex)| {
                on_vertex || touches_boundary(mesh, transform, &local_bounds, p, spacing)
            })
            .collect();

        if points.is_empty() {
            warn!(node_count, "Sampling accepted no points; body will be inert");
        } else {
            debug!(
                node_count,
                points = points.len(),
                surface = surface.iter().filter(|&&s| s).count(),
                "Sampled mesh volume"
            );
        }

        SampleSet {
            points,
            cells,
            surface,
            node_count,
        }
    }
}

/// Regular grid of cell-centered points inside `cell`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn grid_points(cell: &Aabb, spacing: f64) -> Vec<Point3<f64>> {
    let size = cell.size();
    let counts = size.map(|extent| ((extent / spacing).floor() as usize).max(1));
    let step = Vector3::new(
        size.x / counts.x as f64,
        size.y / counts.y as f64,
        size.z / counts.z as f64,
    );

    let mut out = Vec::with_capacity(counts.x * counts.y * counts.z);
    for i in 0..counts.x {
        for j in 0..counts.y {
            for k in 0..counts.z {
                out.push(Point3::new(
                    cell.min.x + (i as f64 + 0.5) * step.x,
                    cell.min.y + (j as f64 + 0.5) * step.y,
                    cell.min.z + (k as f64 + 0.5) * step.z,
                ));
            }
        }
    }
    out
}

/// A point is on the boundary if stepping one spacing along any axis leaves the mesh.
fn touches_boundary(
    mesh: &TriangleMesh,
    transform: &Similarity3<f64>,
    local_bounds: &Aabb,
    point: &Point3<f64>,
    spacing: f64,
) -> bool {
    [
        Vector3::x(),
        -Vector3::x(),
        Vector3::y(),
        -Vector3::y(),
        Vector3::z(),
        -Vector3::z(),
    ]
    .iter()
    .any(|axis| {
        !mesh.contains_point_within(transform, &(point + axis * spacing), local_bounds)
    })
}
