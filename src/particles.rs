//! Particle storage with double-buffered dynamic state.
//!
//! Static per-particle data (mass, radius, flags, owning cell) lives in
//! plain arrays. Position, velocity and force live in two [`ParticleState`]
//! sets: the *front* set is the last completed tick and is read-only while a
//! parallel pass runs; the integrator writes the *back* set and then flips
//! the active flag.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::bounds::Aabb;
use crate::error::{Result, SoftBodyError};
use crate::types::{Particle, ParticleFlags};

/// Dynamic state of all particles for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleState {
    /// Positions in world coordinates.
    pub positions: Vec<Point3<f64>>,
    /// Velocities in world coordinates.
    pub velocities: Vec<Vector3<f64>>,
    /// Net forces applied during the tick.
    pub forces: Vec<Vector3<f64>>,
}

impl ParticleState {
    fn push(&mut self, position: Point3<f64>) {
        self.positions.push(position);
        self.velocities.push(Vector3::zeros());
        self.forces.push(Vector3::zeros());
    }

    fn len(&self) -> usize {
        self.positions.len()
    }
}

/// Two state sets with a single active flag.
#[derive(Debug, Clone, Default)]
pub struct StateBuffers {
    sets: [ParticleState; 2],
    active: usize,
}

impl StateBuffers {
    /// The current (last completed) state.
    #[must_use]
    pub fn front(&self) -> &ParticleState {
        &self.sets[self.active]
    }

    /// Mutable access to the current state, for serial passes between ticks.
    pub fn front_mut(&mut self) -> &mut ParticleState {
        &mut self.sets[self.active]
    }

    /// Borrow the front set for reading and the back set for writing.
    pub fn split(&mut self) -> (&ParticleState, &mut ParticleState) {
        let (first, second) = self.sets.split_at_mut(1);
        if self.active == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        }
    }

    /// Make the back set the front set.
    pub fn swap(&mut self) {
        self.active = 1 - self.active;
    }

    /// Index of the active set (0 or 1).
    #[must_use]
    pub const fn active(&self) -> usize {
        self.active
    }

    fn push(&mut self, position: Point3<f64>) {
        for set in &mut self.sets {
            set.push(position);
        }
    }
}

/// Mass-point storage for one body.
#[derive(Debug, Clone, Default)]
pub struct ParticleStore {
    pub(crate) masses: Vec<f64>,
    pub(crate) radii: Vec<f64>,
    pub(crate) flags: Vec<ParticleFlags>,
    pub(crate) cells: Vec<Aabb>,
    pub(crate) state: StateBuffers,
}

impl ParticleStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a particle at rest; returns its index.
    ///
    /// Both state sets grow together so the next tick sees correctly sized buffers.
    pub fn push(
        &mut self,
        position: Point3<f64>,
        mass: f64,
        radius: f64,
        flags: ParticleFlags,
        cell: Aabb,
    ) -> usize {
        let index = self.masses.len();
        self.masses.push(mass);
        self.radii.push(radius);
        self.flags.push(flags);
        self.cells.push(cell);
        self.state.push(position);
        debug_assert_eq!(self.state.front().len(), self.masses.len());
        index
    }

    /// Number of particles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.masses.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    /// Snapshot one particle.
    #[must_use]
    pub fn particle(&self, index: usize) -> Option<Particle> {
        let front = self.state.front();
        Some(Particle {
            position: *front.positions.get(index)?,
            velocity: front.velocities[index],
            force: front.forces[index],
            mass: self.masses[index],
            radius: self.radii[index],
            flags: self.flags[index],
            cell: self.cells[index],
        })
    }

    /// Current positions.
    #[must_use]
    pub fn positions(&self) -> &[Point3<f64>] {
        &self.state.front().positions
    }

    /// Current velocities.
    #[must_use]
    pub fn velocities(&self) -> &[Vector3<f64>] {
        &self.state.front().velocities
    }

    /// Net forces from the last tick.
    #[must_use]
    pub fn forces(&self) -> &[Vector3<f64>] {
        &self.state.front().forces
    }

    /// Mutable current positions.
    pub fn positions_mut(&mut self) -> &mut [Point3<f64>] {
        &mut self.state.front_mut().positions
    }

    /// Mutable current velocities.
    pub fn velocities_mut(&mut self) -> &mut [Vector3<f64>] {
        &mut self.state.front_mut().velocities
    }

    /// Particle masses.
    #[must_use]
    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    /// Particle contact radii.
    #[must_use]
    pub fn radii(&self) -> &[f64] {
        &self.radii
    }

    /// Particle flags.
    #[must_use]
    pub fn flags(&self) -> &[ParticleFlags] {
        &self.flags
    }

    /// Owning cell of each particle.
    #[must_use]
    pub fn cells(&self) -> &[Aabb] {
        &self.cells
    }

    /// Give every particle the same mass.
    pub fn set_uniform_mass(&mut self, mass: f64) {
        self.masses.iter_mut().for_each(|m| *m = mass);
    }

    /// Set or clear a flag on one particle.
    ///
    /// # Errors
    ///
    /// Returns [`SoftBodyError::IndexOutOfBounds`] for an invalid index.
    pub fn set_flag(&mut self, index: usize, flag: ParticleFlags, value: bool) -> Result<()> {
        let len = self.len();
        let flags = self
            .flags
            .get_mut(index)
            .ok_or_else(|| SoftBodyError::index_out_of_bounds(index, len))?;
        flags.set(flag, value);
        Ok(())
    }

    /// Clear a flag on every particle.
    pub fn clear_flag(&mut self, flag: ParticleFlags) {
        self.flags.iter_mut().for_each(|f| f.remove(flag));
    }

    /// Add per-particle velocity and position changes to the current state.
    ///
    /// Fixed particles are skipped. Each moved particle's cell follows its
    /// position change. Slices shorter than the store leave the remaining
    /// particles untouched.
    pub fn apply_deltas(&mut self, velocity: &[Vector3<f64>], position: &[Vector3<f64>]) {
        let Self {
            flags,
            cells,
            state,
            ..
        } = self;
        let flags = flags.as_slice();
        let front = state.front_mut();

        front
            .positions
            .par_iter_mut()
            .zip(front.velocities.par_iter_mut())
            .zip(cells.par_iter_mut())
            .zip(velocity.par_iter().zip(position.par_iter()))
            .zip(flags.par_iter())
            .filter(|(_, f)| !f.contains(ParticleFlags::FIXED))
            .for_each(|((((pos, vel), cell), (dv, dp)), _)| {
                *vel += dv;
                *pos += dp;
                cell.translate(dp);
            });
    }

    /// Whether a particle is fixed (out-of-range indices are not).
    #[must_use]
    pub fn is_fixed(&self, index: usize) -> bool {
        self.flags
            .get(index)
            .is_some_and(|f| f.contains(ParticleFlags::FIXED))
    }

    /// Inverse mass, 0 for fixed particles.
    #[must_use]
    pub fn inverse_mass(&self, index: usize, min_mass: f64) -> f64 {
        if self.is_fixed(index) {
            0.0
        } else {
            1.0 / self.masses[index].max(min_mass)
        }
    }

    /// Indices of surface particles.
    #[must_use]
    pub fn surface_indices(&self) -> Vec<usize> {
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, f)| f.contains(ParticleFlags::SURFACE))
            .map(|(i, _)| i)
            .collect()
    }

    /// Sum of all particle masses.
    #[must_use]
    pub fn total_mass(&self) -> f64 {
        self.masses.iter().sum()
    }

    /// Total kinetic energy of the current state.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        self.velocities()
            .iter()
            .zip(&self.masses)
            .map(|(v, m)| 0.5 * m * v.norm_squared())
            .sum()
    }

    /// Bounding box of positions, expanded by each particle's radius.
    #[must_use]
    pub fn bounding_box(&self) -> Aabb {
        self.positions()
            .iter()
            .zip(&self.radii)
            .fold(Aabb::empty(), |acc, (p, r)| {
                acc.union(&Aabb::from_point(*p).expanded(*r))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cell() -> Aabb {
        Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_push_grows_both_buffers() {
        let mut store = ParticleStore::new();
        store.push(Point3::origin(), 1.0, 0.1, ParticleFlags::empty(), cell());
        store.push(Point3::new(1.0, 0.0, 0.0), 1.0, 0.1, ParticleFlags::SURFACE, cell());

        assert_eq!(store.len(), 2);
        let (front, back) = store.state.split();
        assert_eq!(front.positions.len(), 2);
        assert_eq!(back.positions.len(), 2);
        assert_eq!(store.surface_indices(), vec![1]);
    }

    #[test]
    fn test_split_and_swap() {
        let mut buffers = StateBuffers::default();
        buffers.push(Point3::origin());

        {
            let (front, back) = buffers.split();
            back.positions[0] = front.positions[0] + Vector3::new(1.0, 0.0, 0.0);
        }
        assert_eq!(buffers.front().positions[0], Point3::origin());

        buffers.swap();
        assert_eq!(buffers.active(), 1);
        assert_eq!(buffers.front().positions[0], Point3::new(1.0, 0.0, 0.0));

        let (front, back) = buffers.split();
        assert_eq!(front.positions[0], Point3::new(1.0, 0.0, 0.0));
        assert_eq!(back.positions[0], Point3::origin());
    }

    #[test]
    fn test_fixed_flag() {
        let mut store = ParticleStore::new();
        store.push(Point3::origin(), 2.0, 0.1, ParticleFlags::empty(), cell());

        assert_relative_eq!(store.inverse_mass(0, 1e-6), 0.5);
        assert!(store.set_flag(0, ParticleFlags::FIXED, true).is_ok());
        assert!(store.is_fixed(0));
        assert_eq!(store.inverse_mass(0, 1e-6), 0.0);
        assert!(store.set_flag(4, ParticleFlags::FIXED, true).is_err());
    }

    #[test]
    fn test_bounding_box_includes_radius() {
        let mut store = ParticleStore::new();
        store.push(Point3::origin(), 1.0, 0.5, ParticleFlags::empty(), cell());
        store.push(Point3::new(2.0, 0.0, 0.0), 1.0, 0.5, ParticleFlags::empty(), cell());

        let bounds = store.bounding_box();
        assert_relative_eq!(bounds.min, Point3::new(-0.5, -0.5, -0.5));
        assert_relative_eq!(bounds.max, Point3::new(2.5, 0.5, 0.5));
    }

    #[test]
    fn test_apply_deltas_skips_fixed() {
        let mut store = ParticleStore::new();
        store.push(Point3::origin(), 1.0, 0.1, ParticleFlags::empty(), cell());
        store.push(Point3::origin(), 1.0, 0.1, ParticleFlags::FIXED, cell());

        let dv = vec![Vector3::new(1.0, 0.0, 0.0); 2];
        let dp = vec![Vector3::new(0.0, 0.5, 0.0); 2];
        store.apply_deltas(&dv, &dp);

        assert_relative_eq!(store.velocities()[0], Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(store.positions()[0], Point3::new(0.0, 0.5, 0.0));
        assert_relative_eq!(store.cells()[0].min, Point3::new(0.0, 0.5, 0.0));
        assert_relative_eq!(store.velocities()[1], Vector3::zeros());
        assert_relative_eq!(store.positions()[1], Point3::origin());
    }

    #[test]
    fn test_clear_flag() {
        let mut store = ParticleStore::new();
        store.push(Point3::origin(), 1.0, 0.1, ParticleFlags::SURFACE | ParticleFlags::COLLIDING, cell());
        store.clear_flag(ParticleFlags::COLLIDING);
        assert_eq!(store.flags()[0], ParticleFlags::SURFACE);
    }

    #[test]
    fn test_particle_snapshot() {
        let mut store = ParticleStore::new();
        store.push(Point3::new(1.0, 2.0, 3.0), 0.25, 0.1, ParticleFlags::SURFACE, cell());
        store.velocities_mut()[0] = Vector3::new(2.0, 0.0, 0.0);

        let p = store.particle(0);
        assert!(p.is_some_and(|p| p.is_surface() && (p.kinetic_energy() - 0.5).abs() < 1e-12));
        assert!(store.particle(1).is_none());
        assert_relative_eq!(store.kinetic_energy(), 0.5);
    }
}
