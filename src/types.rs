//! Core types for soft body simulation.
//!
//! - [`BodyId`] - Unique identifier for soft bodies
//! - [`ParticleFlags`] - Flags for particle state (fixed, surface, etc.)
//! - [`Particle`] - Snapshot of one mass point

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bounds::Aabb;

/// Unique identifier for a soft body in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(pub u64);

impl BodyId {
    /// Create a new body ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for BodyId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SoftBody({})", self.0)
    }
}

bitflags::bitflags! {
    /// Flags for particle state and behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct ParticleFlags: u32 {
        /// Particle is fixed: skipped by integration and contact correction.
        const FIXED = 0b0000_0001;
        /// Particle lies on the body surface and takes part in inter-body contact.
        const SURFACE = 0b0000_0010;
        /// Particle was touched by a contact during the last tick.
        const COLLIDING = 0b0000_0100;
    }
}

/// A snapshot of a single mass point.
///
/// The store keeps particles as parallel arrays; this record is what
/// [`ParticleStore::particle`](crate::ParticleStore::particle) hands out.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Particle {
    /// Position in world coordinates.
    pub position: Point3<f64>,
    /// Velocity in world coordinates.
    pub velocity: Vector3<f64>,
    /// Net force applied during the last integration.
    pub force: Vector3<f64>,
    /// Mass in kg (always positive).
    pub mass: f64,
    /// Contact radius.
    pub radius: f64,
    /// State flags.
    pub flags: ParticleFlags,
    /// Bounding box of the neighborhood this particle was sampled from.
    pub cell: Aabb,
}

impl Particle {
    /// Check if this particle is fixed.
    #[must_use]
    pub const fn is_fixed(&self) -> bool {
        self.flags.contains(ParticleFlags::FIXED)
    }

    /// Check if this particle is on the body surface.
    #[must_use]
    pub const fn is_surface(&self) -> bool {
        self.flags.contains(ParticleFlags::SURFACE)
    }

    /// Get the kinetic energy of this particle.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.mass * self.velocity.norm_squared()
    }
}

/// ID generator for soft bodies.
///
/// Thread-safe counter for generating unique IDs.
pub struct BodyIdGenerator {
    next_id: std::sync::atomic::AtomicU64,
}

impl Default for BodyIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyIdGenerator {
    /// Create a new ID generator starting at 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_id: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Generate the next unique ID.
    pub fn next(&self) -> BodyId {
        BodyId(
            self.next_id
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed),
        )
    }
}

static ID_GENERATOR: BodyIdGenerator = BodyIdGenerator::new();

/// Generate a new unique soft body ID.
pub fn next_body_id() -> BodyId {
    ID_GENERATOR.next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_id() {
        let id = BodyId::new(7);
        assert_eq!(id.raw(), 7);
        assert_eq!(id.to_string(), "SoftBody(7)");

        let id2: BodyId = 7.into();
        assert_eq!(id, id2);
    }

    #[test]
    fn test_id_generator() {
        let generator = BodyIdGenerator::new();
        let id1 = generator.next();
        let id2 = generator.next();

        assert_eq!(id1.raw(), 0);
        assert_eq!(id2.raw(), 1);
    }

    #[test]
    fn test_particle_flags() {
        let mut flags = ParticleFlags::empty();
        assert!(!flags.contains(ParticleFlags::FIXED));

        flags.insert(ParticleFlags::FIXED | ParticleFlags::SURFACE);
        assert!(flags.contains(ParticleFlags::FIXED));
        assert!(flags.contains(ParticleFlags::SURFACE));

        flags.remove(ParticleFlags::FIXED);
        assert!(!flags.contains(ParticleFlags::FIXED));
    }

    #[test]
    fn test_particle_kinetic_energy() {
        let p = Particle {
            position: Point3::origin(),
            velocity: Vector3::new(2.0, 0.0, 0.0),
            force: Vector3::zeros(),
            mass: 0.5,
            radius: 0.1,
            flags: ParticleFlags::SURFACE,
            cell: Aabb::from_point(Point3::origin()),
        };
        assert!((p.kinetic_energy() - 1.0).abs() < 1e-12);
        assert!(p.is_surface());
        assert!(!p.is_fixed());
    }
}
