//! Mass-spring soft body simulation.
//!
//! This crate turns triangle meshes into deformable bodies and simulates
//! them:
//!
//! # Building bodies
//!
//! - [`OctreeNode`] - Adaptive subdivision of a mesh's bounding volume
//! - [`MeshSampler`] - Fills a mesh with points (vertices near the surface,
//!   a regular grid inside) using a 12-ray point-in-mesh test
//! - [`SpringNetwork`] - Damped springs between nearby points, with
//!   distance-scaled stiffness
//!
//! # Simulating
//!
//! - [`ForceIntegrator`] - Gravity, spring and damper forces gathered in
//!   parallel through an [`Accumulator`], then semi-implicit Euler on
//!   double-buffered state
//! - [`collision`] - Ground plane, convex primitive tests (sphere, box via
//!   SAT) and impulse-based contact between bodies
//! - [`World`] - Body registry and the per-tick pipeline
//! - [`SkinBinding`] - Drives a render mesh's vertices from particle positions
//!
//! # Layer 0 Crate
//!
//! No engine dependencies. Positions are plain arrays that a renderer or
//! mesh deformer can read by index.
//!
//! # Example
//!
//! ```
//! use nalgebra::{Similarity3, Translation3, UnitQuaternion, Vector3};
//! use sim_softbody::{SimulationConfig, TriangleMesh, World};
//!
//! let mut world = World::new(SimulationConfig::default());
//! let cube = TriangleMesh::cuboid(Vector3::new(0.3, 0.3, 0.3));
//! let placement = Similarity3::from_parts(
//!     Translation3::new(0.0, 1.0, 0.0),
//!     UnitQuaternion::identity(),
//!     1.0,
//! );
//! let id = world.spawn_from_mesh("cube", &cube, &placement).unwrap();
//!
//! let stats = world.run_for(0.5);
//! assert!(stats.particles > 0);
//! assert!(world.body(id).unwrap().positions().iter().all(|p| p.y >= 0.0));
//! ```
//!
//! # Concurrency
//!
//! Parallel passes use `rayon`. No pass writes to a particle another task
//! may touch: per-particle contributions are appended and reduced after a
//! join, and integration reads one state buffer while writing the other.

// Safety: Deny unwrap/expect in library code. Tests may use them.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_precision_loss,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]
#![cfg_attr(test, allow(clippy::float_cmp))]

mod accumulator;
mod body;
mod bounds;
pub mod collision;
mod config;
mod error;
mod integrator;
mod material;
mod mesh;
mod network;
mod octree;
mod particles;
mod sampler;
mod skinning;
mod types;
mod world;

pub use accumulator::Accumulator;
pub use body::SoftBody;
pub use bounds::Aabb;
pub use collision::{
    collide_bodies, intersects, Collider, ContactConfig, ConvexShape, GroundPlane, PairSet,
    ResponseMode, ShapeKind,
};
pub use config::SimulationConfig;
pub use error::{Result, SoftBodyError};
pub use integrator::{ForceIntegrator, IntegrationReport, IntegratorConfig};
pub use material::{Material, MaterialPreset};
pub use mesh::{ray_directions, ray_triangle_intersect, TriangleMesh};
pub use network::{NetworkConfig, SpringEdge, SpringNetwork};
pub use octree::OctreeNode;
pub use particles::{ParticleState, ParticleStore, StateBuffers};
pub use sampler::{MeshSampler, SampleSet, SamplerConfig};
pub use skinning::{ParticleWeight, SkinBinding, SkinningMethod};
pub use types::{next_body_id, BodyId, BodyIdGenerator, Particle, ParticleFlags};
pub use world::{BodyRegistry, StepStats, World};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::collision::{ContactConfig, GroundPlane, ResponseMode};
    pub use crate::{
        BodyId, Material, MaterialPreset, SimulationConfig, SoftBody, SoftBodyError, StepStats,
        TriangleMesh, World,
    };
}
