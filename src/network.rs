//! Spring-damper network connecting sampled particles.
//!
//! Every unordered particle pair closer than the connection radius gets one
//! edge. Edge stiffness falls off with distance:
//!
//! ```text
//! k = base_stiffness * reference_distance / distance
//! ```
//!
//! so short, local links stay taut while long-range links stay soft. Rest
//! lengths are clamped to `[min_rest_length, max_rest_length]`.

use hashbrown::HashSet;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Distances below this are treated as coincident points.
const MIN_DISTANCE: f64 = 1e-9;

/// Configuration for building the spring network.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkConfig {
    /// Pairs closer than this are connected.
    pub connection_radius: f64,
    /// Lower clamp for rest lengths.
    pub min_rest_length: f64,
    /// Upper clamp for rest lengths.
    pub max_rest_length: f64,
    /// Stiffness of an edge whose length equals `reference_distance` (N/m).
    pub base_stiffness: f64,
    /// Distance at which an edge gets exactly `base_stiffness`.
    pub reference_distance: f64,
    /// Damping coefficient along the spring axis (N·s/m).
    pub damping: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::for_spacing(0.1)
    }
}

impl NetworkConfig {
    /// Defaults scaled to a sampling point spacing.
    #[must_use]
    pub fn for_spacing(spacing: f64) -> Self {
        Self {
            connection_radius: spacing * 1.8,
            min_rest_length: 0.01,
            max_rest_length: 1.0,
            base_stiffness: 50.0,
            reference_distance: spacing,
            damping: 0.2,
        }
    }

    /// Set the base stiffness.
    #[must_use]
    pub const fn with_stiffness(mut self, stiffness: f64) -> Self {
        self.base_stiffness = stiffness;
        self
    }

    /// Set the damping coefficient.
    #[must_use]
    pub const fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    /// Set the connection radius.
    #[must_use]
    pub const fn with_connection_radius(mut self, radius: f64) -> Self {
        self.connection_radius = radius;
        self
    }

    /// Build an edge for a pair at `distance`, or `None` if out of range.
    #[must_use]
    pub fn edge_for(&self, a: usize, b: usize, distance: f64) -> Option<SpringEdge> {
        if a == b || distance > self.connection_radius || distance < MIN_DISTANCE {
            return None;
        }
        let rest_length = distance.clamp(self.min_rest_length, self.max_rest_length);
        let stiffness = self.base_stiffness * self.reference_distance / distance;
        Some(SpringEdge {
            a,
            b,
            rest_length,
            stiffness,
            damping: self.damping,
        })
    }
}

/// A damped spring between two particles.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpringEdge {
    /// First particle index.
    pub a: usize,
    /// Second particle index.
    pub b: usize,
    /// Length at which the spring exerts no force.
    pub rest_length: f64,
    /// Hooke stiffness (N/m).
    pub stiffness: f64,
    /// Damping along the spring axis (N·s/m).
    pub damping: f64,
}

impl SpringEdge {
    /// Unordered key identifying the particle pair.
    #[must_use]
    pub const fn key(&self) -> (usize, usize) {
        if self.a <= self.b {
            (self.a, self.b)
        } else {
            (self.b, self.a)
        }
    }

    /// Check if this edge touches the given particle.
    #[must_use]
    pub const fn contains(&self, index: usize) -> bool {
        self.a == index || self.b == index
    }

    /// Spring plus damper force acting on endpoint `a`.
    ///
    /// Endpoint `b` receives the negation. Returns `None` when the endpoints
    /// coincide and the spring axis is undefined.
    #[must_use]
    pub fn force(
        &self,
        pos_a: &Point3<f64>,
        pos_b: &Point3<f64>,
        vel_a: &Vector3<f64>,
        vel_b: &Vector3<f64>,
    ) -> Option<Vector3<f64>> {
        let delta = pos_b - pos_a;
        let distance = delta.norm();
        if distance <= 0.0 {
            return None;
        }
        let direction = delta / distance;
        let spring = self.stiffness * (distance - self.rest_length);
        let damper = self.damping * (vel_b - vel_a).dot(&direction);
        Some(direction * (spring + damper))
    }
}

/// Graph of spring edges with no duplicate pairs.
#[derive(Debug, Clone, Default)]
pub struct SpringNetwork {
    edges: Vec<SpringEdge>,
    keys: HashSet<(usize, usize)>,
}

impl SpringNetwork {
    /// Create an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect every pair of `positions` within the connection radius.
    #[must_use]
    pub fn build(positions: &[Point3<f64>], config: &NetworkConfig) -> Self {
        let candidates: Vec<SpringEdge> = (0..positions.len())
            .into_par_iter()
            .flat_map_iter(|i| {
                let p = positions[i];
                positions[i + 1..]
                    .iter()
                    .enumerate()
                    .filter_map(move |(offset, q)| {
                        config.edge_for(i, i + 1 + offset, (q - p).norm())
                    })
            })
            .collect();

        let mut network = Self::new();
        network.edges.reserve(candidates.len());
        for edge in candidates {
            network.add_edge(edge);
        }
        network
    }

    /// Add an edge unless it is a self-loop or its pair is already connected.
    ///
    /// Returns `true` if the edge was added.
    pub fn add_edge(&mut self, edge: SpringEdge) -> bool {
        if edge.a == edge.b || !self.keys.insert(edge.key()) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    /// Connect the particle at `index` to every qualifying existing particle.
    ///
    /// Returns the number of edges added.
    pub fn connect_particle(
        &mut self,
        index: usize,
        positions: &[Point3<f64>],
        config: &NetworkConfig,
    ) -> usize {
        let Some(p) = positions.get(index) else {
            return 0;
        };
        let new_edges: Vec<SpringEdge> = positions
            .iter()
            .enumerate()
            .filter_map(|(j, q)| config.edge_for(j, index, (p - q).norm()))
            .collect();
        new_edges
            .into_iter()
            .filter(|&edge| self.add_edge(edge))
            .count()
    }

    /// Check if two particles are connected (in either order).
    #[must_use]
    pub fn is_connected(&self, a: usize, b: usize) -> bool {
        self.keys.contains(&(a.min(b), a.max(b)))
    }

    /// All edges.
    #[must_use]
    pub fn edges(&self) -> &[SpringEdge] {
        &self.edges
    }

    /// Number of edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the network has no edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Number of edges touching a particle.
    #[must_use]
    pub fn degree(&self, index: usize) -> usize {
        self.edges.iter().filter(|e| e.contains(index)).count()
    }
}
