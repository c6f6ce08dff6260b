//! Body registry and the per-tick simulation pipeline.
//!
//! # Tick
//!
//! ```text
//! 1. reset per-tick state (pair set, COLLIDING flags), hold queued forces
//! 2. for each substep (held forces applied on every one):
//!      integrate every body       (parallel over bodies, each body's
//!                                  force passes parallel inside)
//!      ground contact             (parallel over bodies)
//! 3. inter-body contact           (every registered pair, in order)
//! 4. collect StepStats
//! ```
//!
//! Each body owns its arrays exclusively; the only cross-body step is 3,
//! which reads both bodies and writes through per-body accumulators.

use hashbrown::HashMap;
use nalgebra::Similarity3;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::body::SoftBody;
use crate::collision::{collide_bodies, PairSet};
use crate::config::SimulationConfig;
use crate::error::{Result, SoftBodyError};
use crate::integrator::{ForceIntegrator, IntegrationReport};
use crate::mesh::TriangleMesh;
use crate::types::{BodyId, ParticleFlags};

/// Summary of one simulation tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepStats {
    /// Particles across all bodies.
    pub particles: usize,
    /// Spring edges across all bodies.
    pub edges: usize,
    /// Particle updates discarded for non-finite values.
    pub numerical_faults: usize,
    /// Particles whose speed hit the velocity clamp.
    pub velocity_clamps: usize,
    /// Particles touching the ground after the last ground pass.
    pub ground_contacts: usize,
    /// Particle pairs resolved between bodies.
    pub body_contacts: usize,
    /// Total kinetic energy after the tick.
    pub kinetic_energy: f64,
}

/// Registered bodies with lookup by id.
#[derive(Debug, Clone, Default)]
pub struct BodyRegistry {
    bodies: Vec<SoftBody>,
    index: HashMap<BodyId, usize>,
}

impl BodyRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a body.
    ///
    /// # Errors
    ///
    /// Returns [`SoftBodyError::DuplicateBody`] if a body with the same id
    /// is already registered.
    pub fn register(&mut self, body: SoftBody) -> Result<BodyId> {
        let id = body.id();
        if self.index.contains_key(&id) {
            return Err(SoftBodyError::DuplicateBody(id));
        }
        self.index.insert(id, self.bodies.len());
        self.bodies.push(body);
        Ok(id)
    }

    /// Remove a body and hand it back.
    ///
    /// # Errors
    ///
    /// Returns [`SoftBodyError::UnknownBody`] if no such body is registered.
    pub fn unregister(&mut self, id: BodyId) -> Result<SoftBody> {
        let slot = self
            .index
            .remove(&id)
            .ok_or(SoftBodyError::UnknownBody(id))?;
        let body = self.bodies.swap_remove(slot);
        if let Some(moved) = self.bodies.get(slot) {
            self.index.insert(moved.id(), slot);
        }
        Ok(body)
    }

    /// Look up a body.
    #[must_use]
    pub fn get(&self, id: BodyId) -> Option<&SoftBody> {
        self.index.get(&id).map(|&slot| &self.bodies[slot])
    }

    /// Look up a body mutably.
    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut SoftBody> {
        self.index.get(&id).map(|&slot| &mut self.bodies[slot])
    }

    /// Whether a body is registered.
    #[must_use]
    pub fn contains(&self, id: BodyId) -> bool {
        self.index.contains_key(&id)
    }

    /// Iterate bodies in registration order (until the first removal).
    pub fn iter(&self) -> impl Iterator<Item = &SoftBody> {
        self.bodies.iter()
    }

    /// Iterate bodies mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SoftBody> {
        self.bodies.iter_mut()
    }

    /// Number of registered bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Whether no body is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    fn as_mut_slice(&mut self) -> &mut [SoftBody] {
        &mut self.bodies
    }
}

/// A soft body simulation: configuration, registered bodies and time.
#[derive(Debug, Clone, Default)]
pub struct World {
    config: SimulationConfig,
    integrator: ForceIntegrator,
    registry: BodyRegistry,
    pairs: PairSet,
    time: f64,
    step_count: u64,
}

impl World {
    /// Create a world with the given configuration.
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            integrator: ForceIntegrator::new(config.integrator),
            ..Self::default()
        }
    }

    /// Create a world after validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SoftBodyError::InvalidConfig`] if validation fails.
    pub fn try_new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Replace the configuration. Existing bodies keep their networks.
    pub fn set_config(&mut self, config: SimulationConfig) {
        self.integrator.set_config(config.integrator);
        self.config = config;
    }

    /// Simulated time (seconds).
    #[must_use]
    pub const fn time(&self) -> f64 {
        self.time
    }

    /// Number of completed ticks.
    #[must_use]
    pub const fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Registered bodies.
    #[must_use]
    pub const fn bodies(&self) -> &BodyRegistry {
        &self.registry
    }

    /// Registered bodies, mutably.
    pub fn bodies_mut(&mut self) -> &mut BodyRegistry {
        &mut self.registry
    }

    /// Look up a body.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&SoftBody> {
        self.registry.get(id)
    }

    /// Look up a body mutably.
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut SoftBody> {
        self.registry.get_mut(id)
    }

    /// Register an existing body.
    ///
    /// # Errors
    ///
    /// Returns [`SoftBodyError::DuplicateBody`] if it is already registered.
    pub fn add_body(&mut self, body: SoftBody) -> Result<BodyId> {
        self.registry.register(body)
    }

    /// Build a body from a mesh with the world's configuration and register it.
    ///
    /// # Errors
    ///
    /// Returns [`SoftBodyError::InvalidMesh`] for malformed mesh buffers.
    pub fn spawn_from_mesh(
        &mut self,
        name: &str,
        mesh: &TriangleMesh,
        transform: &Similarity3<f64>,
    ) -> Result<BodyId> {
        let body = SoftBody::from_mesh(name, mesh, transform, &self.config)?;
        self.registry.register(body)
    }

    /// Unregister a body, dropping it from the simulation.
    ///
    /// # Errors
    ///
    /// Returns [`SoftBodyError::UnknownBody`] if no such body is registered.
    pub fn remove_body(&mut self, id: BodyId) -> Result<SoftBody> {
        self.registry.unregister(id)
    }

    /// Advance one tick of the configured timestep.
    pub fn step(&mut self) -> StepStats {
        self.step_with(self.config.timestep)
    }

    /// Advance whole ticks until at least `duration` seconds have been
    /// simulated.
    ///
    /// Returns the stats of the last tick.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn run_for(&mut self, duration: f64) -> StepStats {
        let dt = self.config.timestep;
        if !(dt > 0.0 && duration > 0.0) {
            return StepStats::default();
        }
        let ticks = (duration / dt - 1e-9).ceil() as u64;
        let mut stats = StepStats::default();
        for _ in 0..ticks {
            stats = self.step_with(dt);
        }
        stats
    }

    /// Advance one tick of length `dt`.
    pub fn step_with(&mut self, dt: f64) -> StepStats {
        let integrator = self.integrator;
        let ground = self.config.ground;
        let contact = self.config.contact;
        let min_mass = self.config.integrator.min_mass;

        self.pairs.clear();
        let bodies = self.registry.as_mut_slice();
        bodies.par_iter_mut().for_each(|b| {
            b.particles_mut().clear_flag(ParticleFlags::COLLIDING);
            b.begin_tick();
        });

        let substeps = self.config.substeps.max(1);
        let sub_dt = dt / f64::from(substeps);
        let mut report = IntegrationReport::default();
        let mut ground_contacts = 0;
        for _ in 0..substeps {
            let pass = bodies
                .par_iter_mut()
                .map(|b| b.integrate(&integrator, sub_dt))
                .reduce(IntegrationReport::default, IntegrationReport::merge);
            report = report.merge(pass);
            ground_contacts = ground.map_or(0, |plane| {
                bodies
                    .par_iter_mut()
                    .map(|b| plane.resolve(b.particles_mut()))
                    .sum::<usize>()
            });
        }

        bodies.iter_mut().for_each(SoftBody::end_tick);

        let mut body_contacts = 0;
        if self.config.enable_body_contacts {
            for i in 0..bodies.len() {
                let (head, tail) = bodies.split_at_mut(i + 1);
                let a = &mut head[i];
                for b in tail.iter_mut() {
                    body_contacts += collide_bodies(a, b, &contact, min_mass, &mut self.pairs);
                }
            }
        }

        let stats = StepStats {
            particles: bodies.iter().map(SoftBody::num_particles).sum(),
            edges: bodies.iter().map(|b| b.network().len()).sum(),
            numerical_faults: report.numerical_faults,
            velocity_clamps: report.velocity_clamps,
            ground_contacts,
            body_contacts,
            kinetic_energy: bodies.iter().map(SoftBody::kinetic_energy).sum(),
        };

        if stats.numerical_faults > 0 {
            warn!(
                faults = stats.numerical_faults,
                step = self.step_count,
                "Zeroed non-finite particle state"
            );
        }
        if body_contacts > 0 {
            debug!(contacts = body_contacts, step = self.step_count, "Resolved body contacts");
        }

        self.time += dt;
        self.step_count += 1;
        stats
    }
}
