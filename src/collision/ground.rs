//! Ground plane contact.

use nalgebra::Vector3;
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::particles::ParticleStore;
use crate::types::ParticleFlags;

/// A horizontal plane at `y = level` that particles cannot pass through.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroundPlane {
    /// Height of the plane.
    pub level: f64,
    /// Fraction of inbound vertical speed returned on contact.
    pub bounce: f64,
    /// Scale applied to horizontal velocity on an inbound contact.
    pub friction: f64,
}

impl Default for GroundPlane {
    fn default() -> Self {
        Self {
            level: 0.0,
            bounce: 0.5,
            friction: 0.8,
        }
    }
}

impl GroundPlane {
    /// Create a ground plane.
    #[must_use]
    pub const fn new(level: f64, bounce: f64, friction: f64) -> Self {
        Self {
            level,
            bounce,
            friction,
        }
    }

    /// Set the plane height.
    #[must_use]
    pub const fn with_level(mut self, level: f64) -> Self {
        self.level = level;
        self
    }

    /// Resolve ground contact for every unfixed particle.
    ///
    /// A particle at or below the plane is lifted onto it, together with its
    /// owning cell. If it is also
    /// moving downward, its vertical velocity is reflected and scaled by
    /// `bounce`, and its horizontal velocity is scaled by `friction`.
    ///
    /// Returns the number of particles in contact.
    pub fn resolve(&self, store: &mut ParticleStore) -> usize {
        let ParticleStore {
            flags,
            cells,
            state,
            ..
        } = store;
        let flags = flags.as_slice();
        let front = state.front_mut();

        front
            .positions
            .par_iter_mut()
            .zip(front.velocities.par_iter_mut())
            .zip(cells.par_iter_mut())
            .zip(flags.par_iter())
            .map(|(((pos, vel), cell), flag)| {
                if flag.contains(ParticleFlags::FIXED) || pos.y > self.level {
                    return 0_usize;
                }
                cell.translate(&Vector3::new(0.0, self.level - pos.y, 0.0));
                pos.y = self.level;
                if vel.y < 0.0 {
                    vel.y = -vel.y * self.bounce;
                    vel.x *= self.friction;
                    vel.z *= self.friction;
                }
                1
            })
            .sum()
    }
}
