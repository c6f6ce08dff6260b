//! Parallel force integration for mass-spring bodies.
//!
//! # Tick pipeline
//!
//! ```text
//! 1. Gravity pass     (parallel over particles)  m * g        -> accumulator
//! 2. Spring pass      (parallel over edges)      ±(spring+damper) -> accumulator
//! 3. Reduction pass   (parallel over particles)  sum per particle
//! 4. Integration      (parallel over particles)  semi-implicit Euler
//!                      reads front buffers, writes back buffers
//! 5. Swap buffers
//! ```
//!
//! Each pass joins before the next starts. No pass writes to another
//! particle's slot: forces flow only through the [`Accumulator`].
//!
//! # Fault handling
//!
//! A non-finite force, velocity or position is a numerical fault. The
//! particle keeps its previous position and its velocity and force are
//! zeroed for that tick. Faults are counted and logged, never propagated.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::accumulator::Accumulator;
use crate::network::SpringEdge;
use crate::particles::ParticleStore;
use crate::types::ParticleFlags;

/// Configuration for the force integrator.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntegratorConfig {
    /// Gravity acceleration (m/s²).
    pub gravity: Vector3<f64>,
    /// Whether the gravity pass runs.
    pub gravity_enabled: bool,
    /// Maximum particle speed (prevents explosion from stiff springs).
    /// Set to `f64::INFINITY` to disable.
    pub max_velocity: f64,
    /// Maximum distance a particle may move in one tick.
    pub max_displacement: f64,
    /// Masses below this are raised to it before dividing.
    pub min_mass: f64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, -9.81, 0.0),
            gravity_enabled: true,
            max_velocity: 50.0,
            max_displacement: 0.5,
            min_mass: 1e-6,
        }
    }
}

impl IntegratorConfig {
    /// Disable gravity.
    #[must_use]
    pub const fn without_gravity(mut self) -> Self {
        self.gravity_enabled = false;
        self
    }

    /// Set the gravity vector.
    #[must_use]
    pub const fn with_gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Set the velocity clamp.
    #[must_use]
    pub const fn with_max_velocity(mut self, max_velocity: f64) -> Self {
        self.max_velocity = max_velocity;
        self
    }
}

/// Outcome of one integration tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegrationReport {
    /// Particles whose update was discarded because of non-finite values.
    pub numerical_faults: usize,
    /// Particles whose speed hit the velocity clamp.
    pub velocity_clamps: usize,
}

impl IntegrationReport {
    /// Combine two reports.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self {
            numerical_faults: self.numerical_faults + other.numerical_faults,
            velocity_clamps: self.velocity_clamps + other.velocity_clamps,
        }
    }
}

/// Result of advancing one particle.
struct ParticleUpdate {
    position: Point3<f64>,
    velocity: Vector3<f64>,
    force: Vector3<f64>,
    fault: bool,
    clamped: bool,
}

/// Semi-implicit Euler integrator driving the parallel force passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForceIntegrator {
    config: IntegratorConfig,
}

impl ForceIntegrator {
    /// Create an integrator with the given configuration.
    #[must_use]
    pub const fn new(config: IntegratorConfig) -> Self {
        Self { config }
    }

    /// Get the integrator configuration.
    #[must_use]
    pub const fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    /// Set the integrator configuration.
    pub const fn set_config(&mut self, config: IntegratorConfig) {
        self.config = config;
    }

    /// Advance one tick of length `dt`.
    ///
    /// `accumulator` may already hold contributions queued since the last
    /// tick (external or contact forces); they are included and then cleared.
    pub fn step(
        &self,
        store: &mut ParticleStore,
        edges: &[SpringEdge],
        accumulator: &mut Accumulator,
        dt: f64,
    ) -> IntegrationReport {
        let n = store.len();
        if n == 0 {
            accumulator.clear();
            return IntegrationReport::default();
        }
        let dt = dt.max(1e-10);

        self.gravity_pass(store, accumulator);
        Self::spring_pass(store, edges, accumulator);
        accumulator.reduce(n);

        let report = self.integrate(store, accumulator.totals(), dt);
        accumulator.clear();

        if report.numerical_faults > 0 {
            debug!(
                faults = report.numerical_faults,
                "Discarded non-finite particle updates"
            );
        }
        report
    }

    fn gravity_pass(&self, store: &ParticleStore, accumulator: &mut Accumulator) {
        if !self.config.gravity_enabled {
            return;
        }
        let gravity = self.config.gravity;
        let masses = &store.masses;
        let flags = &store.flags;
        accumulator.par_extend(
            (0..store.len())
                .into_par_iter()
                .filter(|&i| !flags[i].contains(ParticleFlags::FIXED))
                .map(|i| (i, gravity * masses[i])),
        );
    }

    fn spring_pass(store: &ParticleStore, edges: &[SpringEdge], accumulator: &mut Accumulator) {
        let front = store.state.front();
        let n = store.len();
        accumulator.par_extend(
            edges
                .par_iter()
                .filter(|e| e.a < n && e.b < n)
                .filter_map(|e| {
                    e.force(
                        &front.positions[e.a],
                        &front.positions[e.b],
                        &front.velocities[e.a],
                        &front.velocities[e.b],
                    )
                    .map(|f| (e, f))
                })
                .flat_map_iter(|(e, f)| [(e.a, f), (e.b, -f)]),
        );
    }

    fn integrate(
        &self,
        store: &mut ParticleStore,
        forces: &[Vector3<f64>],
        dt: f64,
    ) -> IntegrationReport {
        let config = self.config;
        let ParticleStore {
            masses,
            flags,
            cells,
            state,
            ..
        } = store;
        let masses = masses.as_slice();
        let flags = flags.as_slice();

        let (front, back) = state.split();

        let report = back
            .positions
            .par_iter_mut()
            .zip(back.velocities.par_iter_mut())
            .zip(back.forces.par_iter_mut())
            .zip(cells.par_iter_mut())
            .enumerate()
            .map(|(i, (((pos, vel), force), cell))| {
                let prev_pos = front.positions[i];
                let prev_vel = front.velocities[i];

                if flags[i].contains(ParticleFlags::FIXED) {
                    *pos = prev_pos;
                    *vel = prev_vel;
                    *force = Vector3::zeros();
                    return IntegrationReport::default();
                }

                let update = advance(&config, prev_pos, prev_vel, forces[i], masses[i], dt);
                *pos = update.position;
                *vel = update.velocity;
                *force = update.force;
                cell.translate(&(update.position - prev_pos));

                IntegrationReport {
                    numerical_faults: usize::from(update.fault),
                    velocity_clamps: usize::from(update.clamped),
                }
            })
            .reduce(IntegrationReport::default, IntegrationReport::merge);

        state.swap();
        report
    }
}

fn is_finite(v: &Vector3<f64>) -> bool {
    v.iter().all(|c| c.is_finite())
}

/// Semi-implicit Euler step for one unfixed particle.
fn advance(
    config: &IntegratorConfig,
    position: Point3<f64>,
    velocity: Vector3<f64>,
    force: Vector3<f64>,
    mass: f64,
    dt: f64,
) -> ParticleUpdate {
    let fault = ParticleUpdate {
        position,
        velocity: Vector3::zeros(),
        force: Vector3::zeros(),
        fault: true,
        clamped: false,
    };
    if !is_finite(&force) || !is_finite(&velocity) {
        return fault;
    }

    let acceleration = force / mass.max(config.min_mass);
    let mut new_velocity = velocity + acceleration * dt;
    if !is_finite(&new_velocity) {
        return fault;
    }

    let mut clamped = false;
    let speed = new_velocity.norm();
    if speed > config.max_velocity {
        new_velocity *= config.max_velocity / speed;
        clamped = true;
    }

    let mut displacement = new_velocity * dt;
    let distance = displacement.norm();
    if distance > config.max_displacement {
        displacement *= config.max_displacement / distance;
    }

    let new_position = position + displacement;
    if !new_position.coords.iter().all(|c| c.is_finite()) {
        return fault;
    }

    ParticleUpdate {
        position: new_position,
        velocity: new_velocity,
        force,
        fault: false,
        clamped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Aabb;
    use approx::assert_relative_eq;

    fn store_with(points: &[Point3<f64>]) -> ParticleStore {
        let mut store = ParticleStore::new();
        for p in points {
            store.push(*p, 1.0, 0.1, ParticleFlags::empty(), Aabb::from_point(*p));
        }
        store
    }

    fn edge(a: usize, b: usize, rest_length: f64) -> SpringEdge {
        SpringEdge {
            a,
            b,
            rest_length,
            stiffness: 100.0,
            damping: 0.0,
        }
    }

    #[test]
    fn test_gravity_semi_implicit() {
        let mut store = store_with(&[Point3::origin()]);
        let integrator = ForceIntegrator::default();
        let mut acc = Accumulator::new();
        let dt = 0.1;

        integrator.step(&mut store, &[], &mut acc, dt);

        // v = g*dt, x = v*dt (velocity updated first)
        assert_relative_eq!(store.velocities()[0].y, -0.981, epsilon = 1e-12);
        assert_relative_eq!(store.positions()[0].y, -0.0981, epsilon = 1e-12);
        assert_relative_eq!(store.forces()[0].y, -9.81, epsilon = 1e-12);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_fixed_particle_does_not_move() {
        let mut store = store_with(&[Point3::origin(), Point3::new(2.0, 0.0, 0.0)]);
        assert!(store.set_flag(0, ParticleFlags::FIXED, true).is_ok());
        let integrator = ForceIntegrator::default();
        let mut acc = Accumulator::new();

        for _ in 0..10 {
            integrator.step(&mut store, &[edge(0, 1, 1.0)], &mut acc, 1.0 / 60.0);
        }
        assert_eq!(store.positions()[0], Point3::origin());
        assert!(store.positions()[1].x < 2.0);
    }

    #[test]
    fn test_spring_forces_are_opposite() {
        let mut store = store_with(&[Point3::origin(), Point3::new(2.0, 0.0, 0.0)]);
        let integrator = ForceIntegrator::new(IntegratorConfig::default().without_gravity());
        let mut acc = Accumulator::new();

        integrator.step(&mut store, &[edge(0, 1, 1.0)], &mut acc, 0.01);

        let forces = store.forces();
        assert_relative_eq!(forces[0], Vector3::new(100.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(forces[1], -forces[0], epsilon = 1e-12);
    }

    #[test]
    fn test_damper_forces_are_opposite() {
        let mut store = store_with(&[Point3::origin(), Point3::new(1.0, 0.0, 0.0)]);
        store.velocities_mut()[1] = Vector3::new(-1.0, 0.0, 0.0);
        let integrator = ForceIntegrator::new(IntegratorConfig::default().without_gravity());
        let mut acc = Accumulator::new();
        let damped = SpringEdge {
            damping: 10.0,
            ..edge(0, 1, 1.0)
        };

        integrator.step(&mut store, &[damped], &mut acc, 0.01);

        let forces = store.forces();
        assert_relative_eq!(forces[0], Vector3::new(-10.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(forces[1], Vector3::new(10.0, 0.0, 0.0), epsilon = 1e-12);
        // Closing speed drops on both ends
        assert!(store.velocities()[0].x < 0.0);
        assert!(store.velocities()[1].x > -1.0);
    }

    #[test]
    fn test_spring_at_rest_no_motion() {
        let mut store = store_with(&[Point3::origin(), Point3::new(1.0, 0.0, 0.0)]);
        let integrator = ForceIntegrator::new(IntegratorConfig::default().without_gravity());
        let mut acc = Accumulator::new();

        integrator.step(&mut store, &[edge(0, 1, 1.0)], &mut acc, 0.01);
        assert_relative_eq!(store.positions()[0], Point3::origin());
        assert_relative_eq!(store.positions()[1], Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_non_finite_force_is_recovered() {
        let mut store = store_with(&[Point3::new(0.0, 1.0, 0.0)]);
        store.velocities_mut()[0] = Vector3::new(1.0, 0.0, 0.0);
        let integrator = ForceIntegrator::default();
        let mut acc = Accumulator::new();
        acc.push(0, Vector3::new(f64::NAN, 0.0, 0.0));

        let report = integrator.step(&mut store, &[], &mut acc, 0.01);

        assert_eq!(report.numerical_faults, 1);
        assert_eq!(store.positions()[0], Point3::new(0.0, 1.0, 0.0));
        assert_eq!(store.velocities()[0], Vector3::zeros());
        assert_eq!(store.forces()[0], Vector3::zeros());
    }

    #[test]
    fn test_velocity_clamped() {
        let mut store = store_with(&[Point3::origin()]);
        let integrator = ForceIntegrator::new(
            IntegratorConfig::default()
                .without_gravity()
                .with_max_velocity(2.0),
        );
        let mut acc = Accumulator::new();
        acc.push(0, Vector3::new(1e6, 0.0, 0.0));

        let report = integrator.step(&mut store, &[], &mut acc, 0.01);

        assert_eq!(report.velocity_clamps, 1);
        assert_relative_eq!(store.velocities()[0].norm(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_displacement_clamped() {
        let mut store = store_with(&[Point3::origin()]);
        let config = IntegratorConfig {
            max_velocity: f64::INFINITY,
            max_displacement: 0.1,
            ..IntegratorConfig::default().without_gravity()
        };
        store.velocities_mut()[0] = Vector3::new(100.0, 0.0, 0.0);
        let mut acc = Accumulator::new();

        ForceIntegrator::new(config).step(&mut store, &[], &mut acc, 0.1);
        assert_relative_eq!(store.positions()[0].x, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_buffers_swap_each_tick() {
        let mut store = store_with(&[Point3::origin()]);
        let integrator = ForceIntegrator::default();
        let mut acc = Accumulator::new();
        let start = store.state.active();

        integrator.step(&mut store, &[], &mut acc, 0.01);
        assert_ne!(store.state.active(), start);
        integrator.step(&mut store, &[], &mut acc, 0.01);
        assert_eq!(store.state.active(), start);
    }

    #[test]
    fn test_cell_follows_particle() {
        let mut store = store_with(&[Point3::origin()]);
        let integrator = ForceIntegrator::default();
        let mut acc = Accumulator::new();

        integrator.step(&mut store, &[], &mut acc, 0.1);
        let cell = store.cells()[0];
        assert_relative_eq!(cell.min, store.positions()[0], epsilon = 1e-12);
    }
}
