//! Mass-spring soft bodies built from triangle meshes.
//!
//! A [`SoftBody`] owns its particles, spring network and material. It is
//! created by sampling a mesh volume:
//!
//! ```text
//! TriangleMesh + transform
//!        │  MeshSampler (octree + point-in-mesh)
//!        ▼
//!   sampled points ──> ParticleStore (mass = total / count)
//!        │
//!        ▼  SpringNetwork::build
//!   spring edges
//! ```
//!
//! Every tick [`SoftBody::integrate`] runs the parallel force passes over
//! the body's own arrays. Contact passes then read and adjust the current
//! state.

use nalgebra::{Point3, Similarity3, Vector3};
use tracing::{debug, warn};

use crate::accumulator::Accumulator;
use crate::bounds::Aabb;
use crate::config::SimulationConfig;
use crate::error::{Result, SoftBodyError};
use crate::integrator::{ForceIntegrator, IntegrationReport};
use crate::material::Material;
use crate::mesh::TriangleMesh;
use crate::network::{NetworkConfig, SpringNetwork};
use crate::particles::ParticleStore;
use crate::sampler::MeshSampler;
use crate::types::{next_body_id, BodyId, Particle, ParticleFlags};

/// A deformable body made of point masses joined by damped springs.
#[derive(Debug, Clone)]
pub struct SoftBody {
    id: BodyId,
    name: String,
    particles: ParticleStore,
    network: SpringNetwork,
    network_config: NetworkConfig,
    material: Material,
    total_mass: f64,
    particle_radius: f64,
    /// External and contact forces queued for the next tick.
    pending_forces: Accumulator,
    /// Forces acting on every substep of the tick in progress.
    tick_forces: Accumulator,
}

impl SoftBody {
    /// Create an empty body with no particles.
    #[must_use]
    pub fn new(name: &str, config: &SimulationConfig) -> Self {
        Self {
            id: next_body_id(),
            name: name.to_string(),
            particles: ParticleStore::new(),
            network: SpringNetwork::new(),
            network_config: config.network,
            material: config.material,
            total_mass: config.total_mass,
            particle_radius: config.sampler.particle_radius,
            pending_forces: Accumulator::new(),
            tick_forces: Accumulator::new(),
        }
    }

    /// Sample a mesh placed by `transform` and connect the samples.
    ///
    /// An empty mesh produces an inert body with zero particles.
    ///
    /// # Errors
    ///
    /// Returns [`SoftBodyError::InvalidMesh`] if a triangle references a
    /// missing vertex.
    pub fn from_mesh(
        name: &str,
        mesh: &TriangleMesh,
        transform: &Similarity3<f64>,
        config: &SimulationConfig,
    ) -> Result<Self> {
        mesh.validate()?;

        let mut body = Self::new(name, config);
        if mesh.is_empty() {
            warn!(body = name, "Empty mesh; body is inert");
            return Ok(body);
        }

        let samples = MeshSampler::new(config.sampler).sample(mesh, transform);
        let mass = body.total_mass / samples.len().max(1) as f64;
        for ((point, cell), on_surface) in samples
            .points
            .iter()
            .zip(&samples.cells)
            .zip(&samples.surface)
        {
            let flags = if *on_surface {
                ParticleFlags::SURFACE
            } else {
                ParticleFlags::empty()
            };
            body.particles
                .push(*point, mass, body.particle_radius, flags, *cell);
        }

        body.network = SpringNetwork::build(body.particles.positions(), &body.network_config);

        debug!(
            body = name,
            particles = body.particles.len(),
            edges = body.network.len(),
            nodes = samples.node_count,
            "Built soft body"
        );
        Ok(body)
    }

    /// Unique identifier.
    #[must_use]
    pub const fn id(&self) -> BodyId {
        self.id
    }

    /// Name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Particle storage.
    #[must_use]
    pub const fn particles(&self) -> &ParticleStore {
        &self.particles
    }

    /// Mutable particle storage, for serial edits between ticks.
    pub fn particles_mut(&mut self) -> &mut ParticleStore {
        &mut self.particles
    }

    /// Spring network.
    #[must_use]
    pub const fn network(&self) -> &SpringNetwork {
        &self.network
    }

    /// Contact material.
    #[must_use]
    pub const fn material(&self) -> &Material {
        &self.material
    }

    /// Set the contact material.
    pub fn set_material(&mut self, material: Material) {
        self.material = material;
    }

    /// Number of particles.
    #[must_use]
    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    /// Whether the body has no particles and takes no part in the simulation.
    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.particles.is_empty()
    }

    /// Snapshot one particle.
    #[must_use]
    pub fn particle(&self, index: usize) -> Option<Particle> {
        self.particles.particle(index)
    }

    /// Current particle positions.
    #[must_use]
    pub fn positions(&self) -> &[Point3<f64>] {
        self.particles.positions()
    }

    /// Current particle velocities.
    #[must_use]
    pub fn velocities(&self) -> &[Vector3<f64>] {
        self.particles.velocities()
    }

    /// Endpoints of every spring, for line rendering.
    #[must_use]
    pub fn edge_segments(&self) -> Vec<(Point3<f64>, Point3<f64>)> {
        let positions = self.particles.positions();
        self.network
            .edges()
            .iter()
            .map(|e| (positions[e.a], positions[e.b]))
            .collect()
    }

    /// Insert a particle and connect it to its neighbors.
    ///
    /// Masses are rebalanced so they still sum to the body's total mass.
    /// Returns the new particle's index.
    pub fn insert_particle(&mut self, position: Point3<f64>) -> usize {
        let radius = self.particle_radius;
        let cell = Aabb::from_point(position).expanded(self.network_config.connection_radius * 0.5);
        let index = self
            .particles
            .push(position, 0.0, radius, ParticleFlags::SURFACE, cell);
        self.particles
            .set_uniform_mass(self.total_mass / self.particles.len() as f64);

        let added =
            self.network
                .connect_particle(index, self.particles.positions(), &self.network_config);
        debug!(body = %self.id, index, edges = added, "Inserted particle");
        index
    }

    /// Pin a particle in place.
    ///
    /// # Errors
    ///
    /// Returns [`SoftBodyError::IndexOutOfBounds`] for an invalid index.
    pub fn pin_particle(&mut self, index: usize) -> Result<()> {
        self.particles.set_flag(index, ParticleFlags::FIXED, true)?;
        self.particles.velocities_mut()[index] = Vector3::zeros();
        Ok(())
    }

    /// Release a pinned particle.
    ///
    /// # Errors
    ///
    /// Returns [`SoftBodyError::IndexOutOfBounds`] for an invalid index.
    pub fn unpin_particle(&mut self, index: usize) -> Result<()> {
        self.particles.set_flag(index, ParticleFlags::FIXED, false)
    }

    /// Whether a particle is pinned.
    #[must_use]
    pub fn is_pinned(&self, index: usize) -> bool {
        self.particles.is_fixed(index)
    }

    /// Pin every particle within `threshold` of the lowest one.
    ///
    /// Returns the number of particles pinned.
    pub fn pin_bottom(&mut self, threshold: f64) -> usize {
        let min_y = self
            .positions()
            .iter()
            .map(|p| p.y)
            .fold(f64::INFINITY, f64::min);

        let to_pin: Vec<usize> = self
            .positions()
            .iter()
            .enumerate()
            .filter(|(_, p)| p.y - min_y < threshold)
            .map(|(i, _)| i)
            .collect();

        to_pin
            .into_iter()
            .filter(|&i| self.pin_particle(i).is_ok())
            .count()
    }

    /// Queue a force on one particle for the next tick.
    ///
    /// Inside a [`World`](crate::World) tick the force acts on every
    /// integration substep, so its impulse does not depend on the substep
    /// count.
    ///
    /// # Errors
    ///
    /// Returns [`SoftBodyError::IndexOutOfBounds`] for an invalid index.
    pub fn apply_force(&mut self, index: usize, force: Vector3<f64>) -> Result<()> {
        let len = self.particles.len();
        if index >= len {
            return Err(SoftBodyError::index_out_of_bounds(index, len));
        }
        self.pending_forces.push(index, force);
        Ok(())
    }

    /// Queue a force from a contact pass. Out-of-range indices are dropped
    /// at reduction.
    pub(crate) fn queue_force(&mut self, index: usize, force: Vector3<f64>) {
        self.pending_forces.push(index, force);
    }

    /// Move queued forces into the tick that is starting.
    pub(crate) fn begin_tick(&mut self) {
        self.tick_forces.clear();
        std::mem::swap(&mut self.tick_forces, &mut self.pending_forces);
    }

    /// Drop the forces held for the finished tick.
    pub(crate) fn end_tick(&mut self) {
        self.tick_forces.clear();
    }

    /// Run one pass of the force pipeline over this body.
    ///
    /// Forces held for the current tick are applied again on every call.
    pub fn integrate(&mut self, integrator: &ForceIntegrator, dt: f64) -> IntegrationReport {
        self.pending_forces.extend_from(&self.tick_forces);
        integrator.step(
            &mut self.particles,
            self.network.edges(),
            &mut self.pending_forces,
            dt,
        )
    }

    /// Sum of particle masses.
    #[must_use]
    pub fn total_mass(&self) -> f64 {
        self.particles.total_mass()
    }

    /// Mass-weighted mean position, or `None` for an inert body.
    #[must_use]
    pub fn center_of_mass(&self) -> Option<Point3<f64>> {
        let mass = self.total_mass();
        if self.is_inert() || mass <= 0.0 {
            return None;
        }
        let weighted = self
            .positions()
            .iter()
            .zip(self.particles.masses())
            .fold(Vector3::zeros(), |acc, (p, m)| acc + p.coords * *m);
        Some(Point3::from(weighted / mass))
    }

    /// Bounds of all particles including their contact radius.
    #[must_use]
    pub fn bounding_box(&self) -> Aabb {
        self.particles.bounding_box()
    }

    /// Total kinetic energy.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        self.particles.kinetic_energy()
    }

    /// Indices of particles on the body surface.
    #[must_use]
    pub fn surface_indices(&self) -> Vec<usize> {
        self.particles.surface_indices()
    }

    /// Move every particle and its cell by `offset`.
    pub fn translate(&mut self, offset: &Vector3<f64>) {
        let n = self.particles.len();
        self.particles
            .apply_deltas(&vec![Vector3::zeros(); n], &vec![*offset; n]);
    }

    /// Set the same velocity on every unpinned particle.
    pub fn set_velocity(&mut self, velocity: Vector3<f64>) {
        let fixed: Vec<bool> = (0..self.particles.len())
            .map(|i| self.particles.is_fixed(i))
            .collect();
        for (v, pinned) in self.particles.velocities_mut().iter_mut().zip(fixed) {
            if !pinned {
                *v = velocity;
            }
        }
    }
}
